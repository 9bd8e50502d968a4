//! Incremental parser for `data: <json>` streaming frames.
//!
//! Completion endpoints deliver one JSON document per `data:` line and end
//! the stream with `data: [DONE]`. Frames are emitted per line rather than
//! per blank-line-delimited event, because several local backends omit the
//! blank separator.

/// A single `data:` frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    /// The `event:` field preceding this frame, if any.
    pub event_type: Option<String>,
    pub data: String,
}

impl SseFrame {
    /// Whether this frame is the `[DONE]` sentinel.
    pub fn is_done(&self) -> bool {
        self.data.trim() == "[DONE]"
    }
}

/// Incrementally parse stream bytes, yielding frames as lines complete.
///
/// Bytes are buffered until a newline so multi-byte UTF-8 characters split
/// across network chunks decode correctly.
#[derive(Debug, Default)]
pub struct SseLineParser {
    line_buffer: Vec<u8>,
    event_type: Option<String>,
}

impl SseLineParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes. Returns all frames completed by this chunk.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        for &byte in chunk {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.line_buffer);
                if let Some(frame) = self.process_line(&line) {
                    frames.push(frame);
                }
            } else {
                self.line_buffer.push(byte);
            }
        }
        frames
    }

    /// Process whatever is left when the stream ends without a final newline.
    pub fn flush(&mut self) -> Option<SseFrame> {
        if self.line_buffer.is_empty() {
            return None;
        }
        let line = std::mem::take(&mut self.line_buffer);
        self.process_line(&line)
    }

    fn process_line(&mut self, raw: &[u8]) -> Option<SseFrame> {
        let text = String::from_utf8_lossy(raw);
        let line = text.strip_suffix('\r').unwrap_or(&text);

        if line.is_empty() {
            self.event_type = None;
            return None;
        }
        // Comment / keep-alive
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = parse_field(line)?;
        match field {
            "data" => Some(SseFrame {
                event_type: self.event_type.clone(),
                data: value.to_owned(),
            }),
            "event" => {
                self.event_type = Some(value.to_owned());
                None
            }
            _ => None,
        }
    }
}

/// Split `field:value`, stripping one leading space from the value.
fn parse_field(line: &str) -> Option<(&str, &str)> {
    let colon = line.find(':')?;
    let field = &line[..colon];
    let value = &line[colon + 1..];
    Some((field, value.strip_prefix(' ').unwrap_or(value)))
}
