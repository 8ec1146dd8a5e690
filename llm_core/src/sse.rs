//! Minimal Server-Sent Events decoding for streamed chat completions.
//!
//! Network reads do not line up with event boundaries: a `data:` line may
//! arrive split across several chunks, and a multi-byte UTF-8 character may
//! be cut in half. Bytes are therefore buffered until a full line is
//! available.

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SseEvent {
    Data(String),
    /// The `data: [DONE]` terminator.
    Done,
}

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, returning every event completed by them.
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = parse_line(line.trim_end_matches(|c| c == '\n' || c == '\r')) {
                events.push(event);
            }
        }
        events
    }
}

fn parse_line(line: &str) -> Option<SseEvent> {
    // Comments (": keep-alive"), `event:`/`id:` fields and blank separators
    // carry nothing we use.
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload.is_empty() {
        return None;
    }
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decodes_complete_lines() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b"data: {\"a\":1}\n\ndata: {\"a\":2}\n\ndata: [DONE]\n\n");
        assert_eq!(
            events,
            vec![
                SseEvent::Data("{\"a\":1}".to_string()),
                SseEvent::Data("{\"a\":2}".to_string()),
                SseEvent::Done,
            ]
        );
    }

    #[test]
    fn test_buffers_partial_lines() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: {\"content\":").is_empty());
        assert!(decoder.push(b"\"Once upon").is_empty());
        let events = decoder.push(b" a time\"}\r\n\r\n");
        assert_eq!(
            events,
            vec![SseEvent::Data("{\"content\":\"Once upon a time\"}".to_string())]
        );
    }

    #[test]
    fn test_split_utf8_character() {
        let line = "data: ✨\n".as_bytes();
        // cut inside the three-byte sparkle
        let (head, tail) = line.split_at(7);
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec![SseEvent::Data("✨".to_string())]);
    }

    #[test]
    fn test_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::default();
        let events = decoder.push(b": keep-alive\nevent: message\nid: 7\ndata:\n\ndata:[DONE]\n");
        assert_eq!(events, vec![SseEvent::Done]);
    }
}
