//! Client-side running transcript: one rendered line per received segment.

use crate::segment::Segment;

/// `MM:SS.mmm` for a time offset in seconds. Minutes are not wrapped into hours.
pub fn format_timestamp(seconds: f64) -> String {
    let seconds = seconds.max(0.0);
    let minutes = (seconds / 60.0).floor();
    let rest = seconds - minutes * 60.0;
    format!("{:02}:{:06.3}", minutes as u64, rest)
}

/// Render a segment as a transcript line, optionally prefixed with its time range:
/// `MM:SS.mmm → MM:SS.mmm text`.
pub fn render_line(segment: &Segment, timestamps: bool) -> String {
    if timestamps {
        format!(
            "{} → {} {}",
            format_timestamp(segment.start),
            format_timestamp(segment.end),
            segment.text
        )
    } else {
        segment.text.clone()
    }
}

/// Append-only transcript of one stream session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptState {
    lines: Vec<String>,
    segments: Vec<Segment>,
    timestamps: bool,
}

impl TranscriptState {
    pub fn new(timestamps: bool) -> Self {
        Self {
            timestamps,
            ..Self::default()
        }
    }

    /// Append a segment. Returns `false` (and leaves the state untouched) when the id is not
    /// greater than the last accepted one, so replays and duplicates cannot double a line.
    /// Gaps are accepted: a skipped record must not block the segments after it.
    pub fn append(&mut self, segment: Segment) -> bool {
        if let Some(last) = self.segments.last() {
            if segment.id <= last.id {
                return false;
            }
        }
        self.lines.push(render_line(&segment, self.timestamps));
        self.segments.push(segment);
        true
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Lines joined by newline.
    pub fn full_text(&self) -> String {
        self.lines.join("\n")
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Id the next segment is expected to carry.
    pub fn expected_id(&self) -> u64 {
        self.segments.last().map(|s| s.id + 1).unwrap_or(0)
    }

    /// Discard everything (the consumer cleared the view).
    pub fn clear(&mut self) {
        self.lines.clear();
        self.segments.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_are_minutes_seconds_millis() {
        assert_eq!(format_timestamp(0.0), "00:00.000");
        assert_eq!(format_timestamp(2.5), "00:02.500");
        assert_eq!(format_timestamp(61.25), "01:01.250");
        assert_eq!(format_timestamp(3725.007), "62:05.007");
        assert_eq!(format_timestamp(-1.0), "00:00.000");
    }

    #[test]
    fn rendered_line_with_range() {
        let seg = Segment::new(0, 0.0, 2.5, "Hello");
        assert_eq!(render_line(&seg, true), "00:00.000 → 00:02.500 Hello");
        assert_eq!(render_line(&seg, false), "Hello");
    }

    #[test]
    fn append_builds_full_text() {
        let mut state = TranscriptState::new(false);
        assert!(state.append(Segment::new(0, 0.0, 2.5, "Hello")));
        assert!(state.append(Segment::new(1, 2.5, 5.0, "world")));
        assert_eq!(state.full_text(), "Hello\nworld");
        assert_eq!(state.expected_id(), 2);
    }

    #[test]
    fn duplicate_ids_are_ignored() {
        let mut state = TranscriptState::new(true);
        assert!(state.append(Segment::new(0, 0.0, 1.0, "a")));
        assert!(!state.append(Segment::new(0, 0.0, 1.0, "a")));
        assert_eq!(state.len(), 1);
        assert_eq!(state.full_text(), "00:00.000 → 00:01.000 a");
    }

    #[test]
    fn gaps_in_ids_are_accepted() {
        let mut state = TranscriptState::new(false);
        assert!(state.append(Segment::new(0, 0.0, 1.0, "a")));
        assert_eq!(state.expected_id(), 1);
        assert!(state.append(Segment::new(3, 3.0, 4.0, "d")));
        assert!(!state.append(Segment::new(2, 2.0, 3.0, "c")));
        assert_eq!(state.full_text(), "a\nd");
        assert_eq!(state.expected_id(), 4);
    }
}
