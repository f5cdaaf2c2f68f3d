// Incremental decoder for `text/event-stream` bodies.
//
// Chunks arrive with arbitrary boundaries (mid-line, mid-codepoint), so
// bytes are buffered until a blank line closes a frame. Only the `event`
// and `data` fields are used; comments (keep-alives) and `id`/`retry`
// lines are skipped.

/// One dispatched server-sent event.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SseFrame {
    /// Event name; "message" when the frame had no `event:` line.
    pub event: String,
    pub data: String,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feed one body chunk; returns every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend(chunk.iter().copied().filter(|b| *b != b'\r'));

        let mut frames = Vec::new();
        while let Some(end) = self.buf.windows(2).position(|w| w == b"\n\n") {
            let raw: Vec<u8> = self.buf.drain(..end + 2).collect();
            if let Some(frame) = parse_frame(&String::from_utf8_lossy(&raw)) {
                frames.push(frame);
            }
        }
        frames
    }
}

fn parse_frame(raw: &str) -> Option<SseFrame> {
    let mut event = None;
    let mut data: Vec<&str> = Vec::new();

    for line in raw.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = line.split_once(':').unwrap_or((line, ""));
        let value = value.strip_prefix(' ').unwrap_or(value);
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data.push(value),
            _ => {}
        }
    }

    if data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event: event.unwrap_or_else(|| "message".to_string()),
        data: data.join("\n"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: counters\nda").is_empty());
        let frames = decoder.push(b"ta: {\"postId\":1}\n\nevent: new-");
        assert_eq!(
            frames,
            vec![SseFrame {
                event: "counters".into(),
                data: "{\"postId\":1}".into(),
            }]
        );
        let frames = decoder.push(b"comment\ndata: {}\n\n");
        assert_eq!(frames[0].event, "new-comment");
    }

    #[test]
    fn test_keep_alive_and_crlf() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b":\n\n").is_empty());
        let frames = decoder.push(b"event: notification\r\ndata: a\r\ndata: b\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, "a\nb");
    }

    #[test]
    fn test_multibyte_split() {
        let mut decoder = SseDecoder::default();
        let body = "data: café\n\n".as_bytes();
        let (a, b) = body.split_at(9);
        assert!(decoder.push(a).is_empty());
        let frames = decoder.push(b);
        assert_eq!(frames[0].data, "café");
        assert_eq!(frames[0].event, "message");
    }
}
