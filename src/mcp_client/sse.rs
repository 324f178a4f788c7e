//! Server-Sent Events parser.
//!
//! Used by both network transports: Streamable HTTP answers a POST with an
//! event stream when the provider wants to stream, and the legacy HTTP+SSE
//! transport keeps one long-lived stream open for all responses.

/// A parsed SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event type (from `event:` line), if present.
    pub event: Option<String>,
    /// Event data (from `data:` lines, joined with newlines).
    pub data: String,
}

impl SseEvent {
    /// Whether this is a plain message event (no type or `message`).
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Incremental SSE parser.
///
/// Buffers partial data (including split UTF-8 sequences) and emits complete
/// events.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: String,
    pending_bytes: Vec<u8>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from the network.
    pub fn feed_bytes(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.pending_bytes.extend_from_slice(chunk);
        let valid_up_to = match std::str::from_utf8(&self.pending_bytes) {
            Ok(_) => self.pending_bytes.len(),
            Err(e) => e.valid_up_to(),
        };
        let decoded = String::from_utf8_lossy(&self.pending_bytes[..valid_up_to]).into_owned();
        self.pending_bytes.drain(..valid_up_to);
        self.feed(&decoded)
    }

    /// Feed a chunk of text and return any complete events.
    ///
    /// Events are delimited by a blank line. `\r\n` line endings are
    /// normalized first.
    pub fn feed(&mut self, chunk: &str) -> Vec<SseEvent> {
        self.buffer.push_str(&chunk.replace("\r\n", "\n"));
        let mut events = Vec::new();

        while let Some(pos) = self.buffer.find("\n\n") {
            let event_text: String = self.buffer.drain(..pos + 2).collect();
            if let Some(event) = Self::parse_event(&event_text) {
                events.push(event);
            }
        }

        events
    }

    fn parse_event(text: &str) -> Option<SseEvent> {
        let mut event_type = None;
        let mut data_parts = Vec::new();

        for line in text.lines() {
            if let Some(value) = line.strip_prefix("event:") {
                event_type = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("data:") {
                data_parts.push(value.strip_prefix(' ').unwrap_or(value).to_string());
            }
            // `:` comments, `id:` and `retry:` are ignored
        }

        if data_parts.is_empty() {
            return None;
        }

        Some(SseEvent {
            event: event_type,
            data: data_parts.join("\n"),
        })
    }
}
