//! # Event Stream Framing
//!
//! Line-oriented `text/event-stream` parser. Feeds on lines from any
//! `BufRead` so the same code runs against a live HTTP body or an in-memory
//! buffer in tests.
//!
//! Only framing lives here. What a `peak` or `message` event means is decided
//! in `stream`.

use std::io::{self, BufRead};
use std::time::Duration;

/// Event type used when the server sends no `event:` field
pub const DEFAULT_EVENT: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental field parser; one instance per connection
#[derive(Debug, Default)]
pub struct EventStreamParser {
    event: Option<String>,
    data: String,
    has_data: bool,
    last_id: Option<String>,
    retry: Option<Duration>,
}

impl EventStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reconnect delay most recently requested by the server
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Feed one line (without its terminator). Returns an event when a blank line dispatches one.
    pub fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        let line = line.strip_suffix('\r').unwrap_or(line);

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

        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            "retry" => {
                if let Ok(ms) = value.parse::<u64>() {
                    self.retry = Some(Duration::from_millis(ms));
                }
            }
            other => log::trace!("Ignoring event-stream field {:?}", other),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if !self.has_data {
            return None;
        }
        self.has_data = false;

        Some(SseEvent {
            event: event
                .filter(|e| !e.is_empty())
                .unwrap_or_else(|| DEFAULT_EVENT.to_string()),
            data: std::mem::take(&mut self.data),
            id: self.last_id.clone(),
        })
    }
}

/// Iterator over the events of a stream
pub struct EventReader<R> {
    reader: R,
    parser: EventStreamParser,
    line: String,
    first_line: bool,
}

impl<R: BufRead> EventReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: EventStreamParser::new(),
            line: String::new(),
            first_line: true,
        }
    }

    pub fn retry(&self) -> Option<Duration> {
        self.parser.retry()
    }
}

impl<R: BufRead> Iterator for EventReader<R> {
    type Item = io::Result<SseEvent>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                // Stream closed; an unterminated trailing event is discarded
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }

            let mut line = self.line.strip_suffix('\n').unwrap_or(&self.line);
            if self.first_line {
                line = line.strip_prefix('\u{feff}').unwrap_or(line);
                self.first_line = false;
            }

            if let Some(event) = self.parser.feed_line(line) {
                return Some(Ok(event));
            }
        }
    }
}
