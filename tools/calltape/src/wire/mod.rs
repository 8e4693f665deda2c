//! Event log wire formats and the listener that streams events to a writer.

pub mod json;
pub mod text;

use crate::codec::CodecRegistry;
use crate::errors::TapeError;
use crate::event::{Event, EventListener};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WireFormat {
    Json,
    Text,
}

impl WireFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
        }
    }

    pub fn parse(value: &str) -> Result<Self, TapeError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "jsonl" => Ok(Self::Json),
            "text" | "txt" => Ok(Self::Text),
            other => Err(TapeError::InvalidConfig(format!(
                "unknown wire format {other}; expected json or text"
            ))),
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_extension(path: &Path) -> Option<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json" | "jsonl") => Some(Self::Json),
            Some("txt" | "tape") => Some(Self::Text),
            _ => None,
        }
    }

    pub fn encode(self, event: &Event) -> Result<String, TapeError> {
        match self {
            Self::Json => json::encode(event),
            Self::Text => Ok(text::encode(event)),
        }
    }

    pub fn decode(self, registry: &CodecRegistry, line: &str) -> Result<Event, TapeError> {
        match self {
            Self::Json => json::decode(registry, line),
            Self::Text => text::decode(registry, line),
        }
    }

    pub fn decode_all(
        self,
        registry: &CodecRegistry,
        input: &str,
    ) -> Result<Vec<Event>, TapeError> {
        match self {
            Self::Json => json::decode_all(registry, input),
            Self::Text => text::decode_all(registry, input),
        }
    }

    pub fn encode_all(self, events: &[Event]) -> Result<String, TapeError> {
        let mut out = String::new();
        for event in events {
            out.push_str(&self.encode(event)?);
            out.push('\n');
        }
        Ok(out)
    }
}

struct WriterState<W> {
    writer: W,
    written: usize,
    error: Option<TapeError>,
}

/// Streams each event as one line in the chosen format.
///
/// `on_event` cannot fail, so the first encode or write error is held and every
/// later event is dropped. [`EventWriter::flush`] reports it.
pub struct EventWriter<W: Write + Send> {
    format: WireFormat,
    state: Mutex<WriterState<W>>,
}

impl EventWriter<File> {
    /// Append to `path`, creating it and its parent directory when missing.
    pub fn append(path: &Path, format: WireFormat) -> Result<Self, TapeError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TapeError::Io(e.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| TapeError::Io(e.to_string()))?;
        Ok(Self::new(file, format))
    }
}

impl<W: Write + Send> EventWriter<W> {
    pub fn new(writer: W, format: WireFormat) -> Self {
        Self {
            format,
            state: Mutex::new(WriterState {
                writer,
                written: 0,
                error: None,
            }),
        }
    }

    pub fn format(&self) -> WireFormat {
        self.format
    }

    pub fn written(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .written
    }

    pub fn flush(&self) -> Result<(), TapeError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(error) = state.error.clone() {
            return Err(error);
        }
        state
            .writer
            .flush()
            .map_err(|e| TapeError::Io(e.to_string()))
    }

    pub fn into_inner(self) -> Result<W, TapeError> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        match state.error {
            Some(error) => Err(error),
            None => Ok(state.writer),
        }
    }
}

impl<W: Write + Send> EventListener for EventWriter<W> {
    fn on_event(&self, event: Event) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.error.is_some() {
            return;
        }
        let outcome = self.format.encode(&event).and_then(|line| {
            writeln!(state.writer, "{line}").map_err(|e| TapeError::Io(e.to_string()))
        });
        match outcome {
            Ok(()) => state.written += 1,
            Err(error) => state.error = Some(error),
        }
    }
}

/// Read and decode a whole event log file.
pub fn read_log(
    path: &Path,
    format: WireFormat,
    registry: &CodecRegistry,
) -> Result<Vec<Event>, TapeError> {
    let input = fs::read_to_string(path).map_err(|e| TapeError::Io(e.to_string()))?;
    format.decode_all(registry, &input)
}
