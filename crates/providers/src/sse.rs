/// SSE reader for Gemini streaming responses.
///
/// The `alt=sse` endpoint emits data-only events (`data: {json}`) separated
/// by blank lines; there are no `event:` fields to dispatch on.

/// Incremental parser that buffers partial lines across chunk boundaries
/// and yields each complete `data:` payload.
pub struct SseParser {
    buffer: String,
    data_lines: Vec<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            data_lines: Vec::new(),
        }
    }

    /// Feed raw bytes from the HTTP response. Returns the payloads of any
    /// events completed by this chunk.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\r', '\n']);

            if line.is_empty() {
                // Blank line terminates the event.
                if !self.data_lines.is_empty() {
                    payloads.push(self.data_lines.join("\n"));
                    self.data_lines.clear();
                }
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data_lines.push(data.trim_start_matches(' ').to_string());
            }
            // Other fields (id:, retry:, ":" comments) are ignored.
        }

        payloads
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}
