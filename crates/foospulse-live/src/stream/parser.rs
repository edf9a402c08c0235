//! Incremental `text/event-stream` parser
//!
//! - `event:` names the event
//! - `data:` lines are joined with `\n`
//! - `id:` is kept for diagnostics
//! - a blank line dispatches the event
//! - `:` lines are comments (keepalive) and are dropped
//!
//! Bytes are buffered until a full line is available, so multi-byte UTF-8
//! sequences split across network chunks decode correctly.

/// A complete server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// From the `event:` field; `None` means the default `message` type
    pub event_type: Option<String>,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    /// Event name, defaulting to `message` as browsers do
    pub fn name(&self) -> &str {
        self.event_type.as_deref().unwrap_or("message")
    }
}

/// Streaming parser: feed chunks, collect complete events
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    event_type: Option<String>,
    data: Vec<String>,
    id: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and return every event it completes
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;

        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let raw = &self.buffer[start..end];
            let raw = raw.strip_suffix(b"\r").unwrap_or(raw);

            let decoded = std::str::from_utf8(raw).map(str::to_owned);

            match decoded {
                Ok(line) => {
                    if let Some(event) = self.process_line(&line) {
                        events.push(event);
                    }
                }
                Err(_) => {
                    tracing::warn!("Dropping SSE line with invalid UTF-8");
                }
            }

            start = end + 1;
        }

        self.buffer.drain(..start);
        events
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            if self.data.is_empty() && self.event_type.is_none() {
                return None;
            }
            let event = SseEvent {
                event_type: self.event_type.take(),
                data: self.data.join("\n"),
                id: self.id.take(),
            };
            self.data.clear();
            return Some(event);
        }

        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event_type = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" => self.id = Some(value.to_string()),
            // `retry:` is a browser reconnect hint; reconnect policy is ours.
            _ => {}
        }
        None
    }
}
