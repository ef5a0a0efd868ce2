//! Incremental Server-Sent Events parser.
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! characters split across network chunks decode correctly.
//!
//! ```text
//! event: content_block_delta
//! data: {"type":"content_block_delta", ...}
//!
//! ```

/// A parsed Server-Sent Event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if any.
    pub event_type: Option<String>,
    /// The `data:` lines joined with `\n`.
    pub data: String,
}

/// Streaming SSE parser. Feed chunks with [`push`](Self::push).
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_type: Option<String>,
    data_lines: Vec<String>,
}

impl SseParser {
    /// Create a parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a chunk of bytes, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    /// Emit a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&rest).into_owned();
            self.process_line(line.trim_end_matches('\r'));
        }
        self.take_event()
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.take_event();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => self.data_lines.push(value.to_owned()),
            "event" => self.event_type = Some(value.to_owned()),
            _ => {}
        }
        None
    }

    fn take_event(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            self.event_type = None;
            return None;
        }
        Some(SseEvent {
            event_type: self.event_type.take(),
            data: std::mem::take(&mut self.data_lines).join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_typed_events() {
        let mut parser = SseParser::new();
        let events = parser.push(b"event: ping\ndata: {}\n\nevent: message_stop\ndata: {\"a\":1}\n\n");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("ping"));
        assert_eq!(events[1].data, "{\"a\":1}");
    }

    #[test]
    fn handles_chunk_boundaries_inside_utf8() {
        let payload = "data: héllo\n\n".as_bytes();
        let split = payload.iter().position(|&b| b == 0xc3).unwrap_or(0) + 1;
        let mut parser = SseParser::new();
        assert!(parser.push(&payload[..split]).is_empty());
        let events = parser.push(&payload[split..]);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "héllo");
    }

    #[test]
    fn joins_multiline_data_and_skips_comments() {
        let mut parser = SseParser::new();
        let events = parser.push(b": keepalive\r\ndata: one\r\ndata:two\r\n\r\n");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data, "one\ntwo");
        assert!(events[0].event_type.is_none());
    }

    #[test]
    fn event_type_without_data_is_dropped() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: ping\n\ndata: x\n\n")[0].event_type.is_none());
    }

    #[test]
    fn finish_flushes_unterminated_event() {
        let mut parser = SseParser::new();
        assert!(parser.push(b"event: message_stop\ndata: {}").is_empty());
        let event = parser.finish();
        assert_eq!(
            event,
            Some(SseEvent {
                event_type: Some("message_stop".into()),
                data: "{}".into(),
            })
        );
    }
}
