//! Events of one segment stream.

use crate::segment::Segment;

/// One event of a segment stream. Exactly one `Done` or `Error` ends a stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A decoded segment plus the server's running transcript (a cross-check only; the
    /// client keeps its own).
    Segment { segment: Segment, full_text: String },
    /// The engine finished; no more segments.
    Done,
    /// The engine failed. Segments already sent stand.
    Error { message: String },
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Segment { .. })
    }
}
