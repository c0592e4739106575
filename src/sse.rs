//! Incremental decoder for `text/event-stream` narration bodies.
//!
//! Transport chunks do not line up with event boundaries, so the decoder
//! keeps the unterminated tail of the previous read (both the partial line
//! and the `data:` lines of a not-yet-dispatched event) and only emits an
//! event once its terminating blank line has arrived.

use serde_json::Value;

/// Payload that marks the end of a narration stream.
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Joined `data:` payload of one event.
    Data(String),
    /// The `[DONE]` sentinel; nothing follows it.
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Bytes after the last `\n` seen so far.
    partial: Vec<u8>,
    /// `data:` lines of the event currently being assembled.
    data_lines: Vec<String>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one transport chunk and return every event it completes, in
    /// wire order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if self.done {
            return events;
        }
        self.partial.extend_from_slice(chunk);

        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            // A newline never occurs inside a multibyte sequence, so a
            // complete line always decodes cleanly.
            let line = String::from_utf8_lossy(&raw[..raw.len() - 1]);
            let line = line.strip_suffix('\r').unwrap_or(&line);
            if let Some(event) = self.process_line(line) {
                let is_done = event == SseEvent::Done;
                events.push(event);
                if is_done {
                    self.done = true;
                    self.partial.clear();
                    break;
                }
            }
        }
        events
    }

    /// Flush whatever is left once the body is exhausted: an unterminated
    /// last line and an event still missing its blank line.
    pub fn finish(&mut self) -> Vec<SseEvent> {
        if self.done {
            return Vec::new();
        }
        let mut events = Vec::new();
        if !self.partial.is_empty() {
            let raw = std::mem::take(&mut self.partial);
            let line = String::from_utf8_lossy(&raw);
            let line = line.strip_suffix('\r').unwrap_or(&line).to_string();
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }
        if let Some(event) = self.dispatch() {
            events.push(event);
        }
        self.done = true;
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data_lines.push(value.to_string());
        }
        // event / id / retry carry nothing the narrator needs.
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data_lines.is_empty() {
            return None;
        }
        let payload = self.data_lines.join("\n");
        self.data_lines.clear();
        if payload.trim() == DONE_SENTINEL {
            Some(SseEvent::Done)
        } else {
            Some(SseEvent::Data(payload))
        }
    }
}

// ---------------------------------------------------------------------------
// Payload interpretation
// ---------------------------------------------------------------------------

/// What one event payload means for the reply being streamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    Text(String),
    /// The provider reported an error inside the stream.
    Error(String),
    /// Structured control event with no narration in it (`ping`,
    /// `message_start`, a final empty delta).
    Nothing,
}

/// Pull the narration delta out of an event payload.
///
/// JSON payloads are searched for the delta fields used by relays and by
/// the OpenAI and Anthropic streaming formats. Anything that is not JSON is
/// narration in its own right and comes back verbatim.
pub fn extract_delta(payload: &str) -> Extracted {
    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(_) => return Extracted::Text(payload.to_string()),
    };

    match &value {
        Value::String(s) => return Extracted::Text(s.clone()),
        Value::Object(_) => {}
        _ => return Extracted::Text(payload.to_string()),
    }

    if let Some(message) = error_message(&value) {
        return Extracted::Error(message);
    }

    let candidates = [
        value.get("content"),
        value.pointer("/choices/0/delta/content"),
        value.pointer("/choices/0/text"),
        value.pointer("/delta/text"),
        value.get("delta"),
        value.get("text"),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .find_map(|v| v.as_str())
        .map(|s| Extracted::Text(s.to_string()))
        .unwrap_or(Extracted::Nothing);
    found
}

fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    match error {
        Value::String(s) => Some(s.clone()),
        Value::Object(_) => Some(
            error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string()),
        ),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(s: &str) -> SseEvent {
        SseEvent::Data(s.to_string())
    }

    #[test]
    fn test_single_event() {
        let mut d = SseDecoder::new();
        assert_eq!(d.feed(b"data: hello\n\n"), vec![data("hello")]);
    }

    #[test]
    fn test_event_split_across_reads() {
        let mut d = SseDecoder::new();
        assert!(d.feed(br#"data: {"content":"Hel"#).is_empty());
        let events = d.feed(b"lo\"}\n\n");
        assert_eq!(events, vec![data(r#"{"content":"Hello"}"#)]);
        assert_eq!(extract_delta(r#"{"content":"Hello"}"#), Extracted::Text("Hello".to_string()));
    }

    #[test]
    fn test_blank_line_split_across_reads() {
        let mut d = SseDecoder::new();
        assert!(d.feed(b"data: one\n").is_empty());
        assert_eq!(d.feed(b"\n"), vec![data("one")]);
    }

    #[test]
    fn test_crlf_line_endings() {
        let mut d = SseDecoder::new();
        assert_eq!(d.feed(b"data: a\r\n\r\ndata: b\r\n\r\n"), vec![data("a"), data("b")]);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let bytes = "data: café\n\n".as_bytes();
        // Split inside the two-byte 'é'.
        let cut = bytes.len() - 3;
        let mut d = SseDecoder::new();
        assert!(d.feed(&bytes[..cut]).is_empty());
        assert_eq!(d.feed(&bytes[cut..]), vec![data("café")]);
    }

    #[test]
    fn test_multiline_data_joined() {
        let mut d = SseDecoder::new();
        assert_eq!(d.feed(b"data: first\ndata: second\n\n"), vec![data("first\nsecond")]);
    }

    #[test]
    fn test_comments_and_fields_ignored() {
        let mut d = SseDecoder::new();
        let events = d.feed(b": keep-alive\nevent: content_block_delta\nid: 7\nretry: 10\ndata: x\n\n");
        assert_eq!(events, vec![data("x")]);
    }

    #[test]
    fn test_data_without_space() {
        let mut d = SseDecoder::new();
        assert_eq!(d.feed(b"data:tight\n\n"), vec![data("tight")]);
    }

    #[test]
    fn test_done_sentinel_stops_decoding() {
        let mut d = SseDecoder::new();
        let events = d.feed(b"data: a\n\ndata: [DONE]\n\ndata: late\n\n");
        assert_eq!(events, vec![data("a"), SseEvent::Done]);
        assert!(d.is_done());
        assert!(d.feed(b"data: more\n\n").is_empty());
        assert!(d.finish().is_empty());
    }

    #[test]
    fn test_events_preserve_wire_order() {
        let mut d = SseDecoder::new();
        let mut all = Vec::new();
        for chunk in ["data: 1\n\nda", "ta: 2\n", "\ndata: 3\n\n"] {
            all.extend(d.feed(chunk.as_bytes()));
        }
        assert_eq!(all, vec![data("1"), data("2"), data("3")]);
    }

    #[test]
    fn test_finish_flushes_unterminated_event() {
        let mut d = SseDecoder::new();
        assert!(d.feed(b"data: tail").is_empty());
        assert_eq!(d.finish(), vec![data("tail")]);
    }

    #[test]
    fn test_finish_with_nothing_pending() {
        let mut d = SseDecoder::new();
        d.feed(b"data: a\n\n");
        assert!(d.finish().is_empty());
    }

    // -- extract_delta --

    #[test]
    fn test_extract_raw_text_passthrough() {
        assert_eq!(
            extract_delta("The wind howls."),
            Extracted::Text("The wind howls.".to_string())
        );
    }

    #[test]
    fn test_extract_relay_content_field() {
        assert_eq!(
            extract_delta(r#"{"content":"The lamp gutters.","text":"ignored"}"#),
            Extracted::Text("The lamp gutters.".to_string())
        );
    }

    #[test]
    fn test_extract_openai_chunk() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        assert_eq!(extract_delta(payload), Extracted::Text("Hi".to_string()));
    }

    #[test]
    fn test_extract_openai_final_chunk_is_nothing() {
        let payload = r#"{"id":"x","choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(extract_delta(payload), Extracted::Nothing);
    }

    #[test]
    fn test_extract_anthropic_delta() {
        let payload = r#"{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#;
        assert_eq!(extract_delta(payload), Extracted::Text("Hello".to_string()));
    }

    #[test]
    fn test_extract_anthropic_ping_is_nothing() {
        assert_eq!(extract_delta(r#"{"type":"ping"}"#), Extracted::Nothing);
    }

    #[test]
    fn test_extract_string_delta_field() {
        assert_eq!(extract_delta(r#"{"delta":"abc"}"#), Extracted::Text("abc".to_string()));
    }

    #[test]
    fn test_extract_bare_json_string() {
        assert_eq!(extract_delta(r#""quoted""#), Extracted::Text("quoted".to_string()));
    }

    #[test]
    fn test_extract_json_number_kept_as_text() {
        assert_eq!(extract_delta("42"), Extracted::Text("42".to_string()));
    }

    #[test]
    fn test_extract_error_object() {
        let payload = r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#;
        assert_eq!(extract_delta(payload), Extracted::Error("Overloaded".to_string()));
    }

    #[test]
    fn test_extract_error_string() {
        assert_eq!(
            extract_delta(r#"{"error":"quota exceeded"}"#),
            Extracted::Error("quota exceeded".to_string())
        );
    }

    #[test]
    fn test_extract_null_error_ignored() {
        assert_eq!(
            extract_delta(r#"{"error":null,"content":"ok"}"#),
            Extracted::Text("ok".to_string())
        );
    }
}
