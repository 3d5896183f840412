use bytes::{Buf, BytesMut};
use log::trace;

const DEFAULT_EVENT_TYPE: &str = "message";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseEvent {
    pub fn is_message(&self) -> bool {
        self.event == DEFAULT_EVENT_TYPE
    }
}

/// Incremental `text/event-stream` decoder.
///
/// Bytes may be fed in arbitrary slices; lines split across reads are held
/// back until their terminator arrives.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    started: bool,
    event: String,
    data: String,
    last_event_id: Option<String>,
    retry: Option<u64>,
    // last line ended in a CR at the end of a read; a leading LF belongs to it
    skip_lf: bool,
}

impl SseDecoder {
    /// Reconnection delay in milliseconds last announced by the server.
    pub fn retry(&self) -> Option<u64> {
        self.retry
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();

        if !self.started {
            if self.buffer.len() < 3 && b"\xEF\xBB\xBF".starts_with(&self.buffer) {
                return events;
            }
            if self.buffer.starts_with(b"\xEF\xBB\xBF") {
                self.buffer.advance(3);
            }
            self.started = true;
        }

        while let Some(line) = self.next_line() {
            if let Some(event) = self.process_line(&line) {
                events.push(event);
            }
        }

        events
    }

    fn next_line(&mut self) -> Option<String> {
        if self.skip_lf && !self.buffer.is_empty() {
            if self.buffer[0] == b'\n' {
                self.buffer.advance(1);
            }
            self.skip_lf = false;
        }

        let pos = self.buffer.iter().position(|&b| b == b'\n' || b == b'\r')?;
        let terminator_len = if self.buffer[pos] == b'\r' {
            match self.buffer.get(pos + 1) {
                Some(b'\n') => 2,
                Some(_) => 1,
                None => {
                    self.skip_lf = true;
                    1
                }
            }
        } else {
            1
        };

        let line = self.buffer.split_to(pos);
        self.buffer.advance(terminator_len);
        Some(String::from_utf8_lossy(&line).into_owned())
    }

    fn process_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            trace!("sse comment: {line:?}");
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => self.event = value.to_owned(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            }
            "id" if !value.contains('\0') => self.last_event_id = Some(value.to_owned()),
            "retry" => {
                if let Ok(retry) = value.parse() {
                    self.retry = Some(retry);
                }
            }
            _ => trace!("ignoring sse field {field:?}"),
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = std::mem::take(&mut self.event);
        if self.data.is_empty() {
            return None;
        }

        let mut data = std::mem::take(&mut self.data);
        data.pop();

        Some(SseEvent {
            event: if event.is_empty() {
                DEFAULT_EVENT_TYPE.to_owned()
            } else {
                event
            },
            data,
            id: self.last_event_id.clone(),
        })
    }
}
