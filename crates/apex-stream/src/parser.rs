use crate::events::StreamEvent;

/// Incremental newline-delimited JSON parser.
///
/// Feed it chunks of text as they arrive from a subprocess's stdout;
/// it yields one [`StreamEvent`] per complete, well-formed JSON line.
/// A trailing partial line (no newline yet) stays buffered across
/// calls to [`StreamParser::feed`].
#[derive(Debug, Default)]
pub struct StreamParser {
    buffer: String,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `chunk` into the parser, returning every event completed
    /// by a newline within the accumulated buffer.
    pub fn feed(&mut self, chunk: &str) -> Vec<StreamEvent> {
        self.buffer.push_str(chunk);
        let mut events = Vec::new();

        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim().to_string();
            self.buffer.drain(..=newline_pos);

            if line.is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(payload) => events.push(StreamEvent::classify(payload)),
                Err(_) => {
                    // Non-JSON or a line that was split mid-token by the
                    // caller: silently accumulate (spec §4.C), do not
                    // surface a parse error for partial/garbage lines.
                    tracing::trace!(line = %line, "stream parser: non-JSON line dropped");
                }
            }
        }
        events
    }

    /// A single feed over a complete line iterator, for tests and
    /// batch-mode callers.
    pub fn parse_lines<'a>(&mut self, lines: impl IntoIterator<Item = &'a str>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in lines {
            events.extend(self.feed(line));
            events.extend(self.feed("\n"));
        }
        events
    }

    /// Whether a partial (unterminated) line is currently buffered.
    pub fn has_pending(&self) -> bool {
        !self.buffer.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AssistantEvent, StreamEvent, SystemEvent};

    #[test]
    fn classifies_system_and_assistant_lines() {
        let mut parser = StreamParser::new();
        let events = parser.feed(
            "{\"type\":\"system\",\"subtype\":\"init\"}\n{\"type\":\"assistant\",\"content\":\"hi\"}\n",
        );
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], StreamEvent::System(SystemEvent { .. })));
        assert!(matches!(
            events[1],
            StreamEvent::Assistant(AssistantEvent { .. })
        ));
    }

    #[test]
    fn buffers_partial_line_across_feeds() {
        let mut parser = StreamParser::new();
        let first = parser.feed("{\"type\":\"assistant\",");
        assert!(first.is_empty());
        assert!(parser.has_pending());

        let second = parser.feed("\"content\":\"done\"}\n");
        assert_eq!(second.len(), 1);
        assert!(!parser.has_pending());
    }

    #[test]
    fn non_json_lines_are_dropped_not_errored() {
        let mut parser = StreamParser::new();
        let events = parser.feed("not json at all\n{\"type\":\"assistant\",\"content\":1}\n");
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn unrecognized_type_becomes_other_not_discarded() {
        let mut parser = StreamParser::new();
        let events = parser.feed("{\"type\":\"mystery\",\"x\":1}\n");
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], StreamEvent::Other(_)));
    }

    #[test]
    fn detects_task_complete_sentinel() {
        let mut parser = StreamParser::new();
        let events = parser.feed("{\"type\":\"assistant\",\"content\":\"all done. TASK COMPLETE\"}\n");
        assert!(events[0].mentions_task_complete());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let mut parser = StreamParser::new();
        let events = parser.feed("\n\n{\"type\":\"system\",\"subtype\":\"x\"}\n\n");
        assert_eq!(events.len(), 1);
    }
}
