//! Server-Sent Events framing for segment streams.
//!
//! Records on the wire:
//!
//! ```text
//! data: {"type":"segment","id":0,"start":0.0,"end":2.5,"text":"Hello","full_text":"Hello"}
//!
//! data: {"type":"error","message":"decoder crashed"}
//!
//! data: [DONE]
//!
//! ```
//!
//! Comment lines (`: keepalive`) and other SSE fields are not records and are skipped.

use crate::error::{RelayError, RelayResult};
use crate::event::StreamEvent;
use crate::segment::Segment;
use serde::{Deserialize, Serialize};

/// Field marker that prefixes every record.
pub const DATA_FIELD: &str = "data:";
/// Terminal sentinel of a successful stream.
pub const DONE_SENTINEL: &str = "[DONE]";
pub const CONTENT_TYPE: &str = "text/event-stream";

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum Payload {
    Segment {
        id: u64,
        start: f64,
        end: f64,
        #[serde(default)]
        text: String,
        #[serde(default)]
        full_text: String,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

/// Payload of the `data:` field for `event` (no prefix, no trailing blank line).
pub fn encode_event(event: &StreamEvent) -> String {
    let payload = match event {
        StreamEvent::Done => return DONE_SENTINEL.to_string(),
        StreamEvent::Segment { segment, full_text } => Payload::Segment {
            id: segment.id,
            start: segment.start,
            end: segment.end,
            text: segment.text.clone(),
            full_text: full_text.clone(),
        },
        StreamEvent::Error { message } => Payload::Error {
            message: message.clone(),
        },
    };
    // Serializing a tagged enum of plain fields cannot fail.
    serde_json::to_string(&payload).unwrap_or_else(|_| String::from("{}"))
}

/// Complete SSE record for `event`, including the blank line that ends it.
pub fn frame_event(event: &StreamEvent) -> String {
    format!("{} {}\n\n", DATA_FIELD, encode_event(event))
}

/// Parse the payload of one `data:` field.
pub fn parse_data(data: &str) -> RelayResult<StreamEvent> {
    let data = data.trim();
    if data == DONE_SENTINEL {
        return Ok(StreamEvent::Done);
    }
    match serde_json::from_str::<Payload>(data)? {
        Payload::Segment {
            id,
            start,
            end,
            text,
            full_text,
        } => {
            if !start.is_finite() || !end.is_finite() {
                return Err(RelayError::MalformedRecord(format!(
                    "segment {} has non-finite timing",
                    id
                )));
            }
            Ok(StreamEvent::Segment {
                segment: Segment::new(id, start, end, text),
                full_text,
            })
        }
        Payload::Error { message } => Ok(StreamEvent::Error { message }),
    }
}

/// Parse one line of the stream. `None` for lines that are not records
/// (blank separators, comments, `event:`/`id:`/`retry:` fields).
pub fn parse_line(line: &str) -> Option<RelayResult<StreamEvent>> {
    let line = line.trim_end_matches(['\r', '\n']);
    let data = line.strip_prefix(DATA_FIELD)?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    Some(parse_data(data))
}

/// Splits a byte stream into lines. Bytes are buffered until a full line is available, so
/// multi-byte characters split across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk; returns every line completed by it (without line terminators).
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        lines
    }

    /// Remaining bytes after the stream closed without a final newline.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_event() -> StreamEvent {
        StreamEvent::Segment {
            segment: Segment::new(0, 0.0, 2.5, "Hola, ¿qué tal?"),
            full_text: "Hola, ¿qué tal?".to_string(),
        }
    }

    #[test]
    fn segment_record_has_wire_fields() {
        let framed = frame_event(&segment_event());
        assert!(framed.starts_with("data: {"));
        assert!(framed.ends_with("\n\n"));
        let json: serde_json::Value =
            serde_json::from_str(framed.trim().strip_prefix("data: ").unwrap()).unwrap();
        assert_eq!(json["type"], "segment");
        assert_eq!(json["id"], 0);
        assert_eq!(json["start"], 0.0);
        assert_eq!(json["end"], 2.5);
        assert_eq!(json["text"], "Hola, ¿qué tal?");
        assert_eq!(json["full_text"], "Hola, ¿qué tal?");
    }

    #[test]
    fn done_is_the_sentinel() {
        assert_eq!(frame_event(&StreamEvent::Done), "data: [DONE]\n\n");
        assert_eq!(parse_data("[DONE]").unwrap(), StreamEvent::Done);
    }

    #[test]
    fn lines_parse_back_into_events() {
        let framed = frame_event(&segment_event());
        let line = framed.lines().next().unwrap();
        assert_eq!(parse_line(line).unwrap().unwrap(), segment_event());

        let err = StreamEvent::Error {
            message: "decoder crashed".to_string(),
        };
        let framed = frame_event(&err);
        assert_eq!(parse_line(framed.lines().next().unwrap()).unwrap().unwrap(), err);
    }

    #[test]
    fn non_records_are_skipped() {
        assert!(parse_line("").is_none());
        assert!(parse_line(": keepalive").is_none());
        assert!(parse_line("event: token").is_none());
        // no space after the field name is still a record
        assert_eq!(parse_line("data:[DONE]").unwrap().unwrap(), StreamEvent::Done);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_line("data: {not json"),
            Some(Err(RelayError::MalformedRecord(_)))
        ));
        assert!(matches!(
            parse_line(r#"data: {"type":"token","text":"x"}"#),
            Some(Err(RelayError::MalformedRecord(_)))
        ));
    }

    #[test]
    fn decoder_reassembles_split_chunks() {
        let framed = frame_event(&segment_event());
        let bytes = framed.as_bytes();
        // split inside the multi-byte '¿'
        let split = framed.find('¿').unwrap() + 1;
        let mut decoder = LineDecoder::new();
        assert!(decoder.push(&bytes[..split]).is_empty());
        let lines = decoder.push(&bytes[split..]);
        assert_eq!(lines.len(), 2);
        assert_eq!(parse_line(&lines[0]).unwrap().unwrap(), segment_event());
        assert!(lines[1].is_empty());
        assert!(decoder.finish().is_none());
    }

    #[test]
    fn decoder_handles_crlf_and_trailing_bytes() {
        let mut decoder = LineDecoder::new();
        let lines = decoder.push(b"data: [DONE]\r\n\r\ndata: par");
        assert_eq!(lines, vec!["data: [DONE]".to_string(), String::new()]);
        assert_eq!(decoder.finish().as_deref(), Some("data: par"));
    }
}
