//! Structured encoding: one JSON object per event.
//!
//! ```text
//! {"target":{"type":"Node","value":13},"method":"setProperty",
//!  "arguments":[{"type":"String","value":"name"},{"type":"String","value":"Alistair"}],
//!  "result":{"type":"Null"}}
//! ```

use crate::codec::CodecRegistry;
use crate::errors::TapeError;
use crate::event::Event;
use crate::parameter::Parameter;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireParameter {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default, skip_serializing_if = "Json::is_null")]
    value: Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireEvent {
    target: WireParameter,
    #[serde(alias = "methodName")]
    method: String,
    #[serde(alias = "args")]
    arguments: Vec<WireParameter>,
    #[serde(default)]
    result: Option<WireParameter>,
}

fn to_wire(parameter: &Parameter) -> WireParameter {
    WireParameter {
        type_name: parameter.type_name(),
        value: parameter.wire_value(),
    }
}

fn from_wire(registry: &CodecRegistry, wire: &WireParameter) -> Result<Parameter, TapeError> {
    registry.from_wire(&wire.type_name, &wire.value)
}

pub fn event_to_value(event: &Event) -> Result<Json, TapeError> {
    let wire = WireEvent {
        target: to_wire(event.target()),
        method: event.method().to_string(),
        arguments: event.arguments().iter().map(to_wire).collect(),
        result: Some(to_wire(event.result())),
    };
    serde_json::to_value(wire).map_err(|e| TapeError::Malformed(e.to_string()))
}

pub fn event_from_value(registry: &CodecRegistry, value: Json) -> Result<Event, TapeError> {
    let wire: WireEvent =
        serde_json::from_value(value).map_err(|e| TapeError::Malformed(e.to_string()))?;
    let target = from_wire(registry, &wire.target)?;
    let arguments = wire
        .arguments
        .iter()
        .map(|argument| from_wire(registry, argument))
        .collect::<Result<Vec<_>, _>>()?;
    let result = match &wire.result {
        Some(result) => from_wire(registry, result)?,
        None => Parameter::Null,
    };
    Ok(Event::new(target, wire.method, arguments, result))
}

/// Single-line JSON rendering of `event`.
pub fn encode(event: &Event) -> Result<String, TapeError> {
    let value = event_to_value(event)?;
    serde_json::to_string(&value).map_err(|e| TapeError::Malformed(e.to_string()))
}

pub fn decode(registry: &CodecRegistry, line: &str) -> Result<Event, TapeError> {
    let value: Json =
        serde_json::from_str(line).map_err(|e| TapeError::Malformed(format!("invalid json: {e}")))?;
    event_from_value(registry, value)
}

/// Decode a whole log: either a JSON array of events or one event per line.
pub fn decode_all(registry: &CodecRegistry, text: &str) -> Result<Vec<Event>, TapeError> {
    if text.trim_start().starts_with('[') {
        let values: Vec<Json> = serde_json::from_str(text)
            .map_err(|e| TapeError::Malformed(format!("invalid json array: {e}")))?;
        return values
            .into_iter()
            .map(|value| event_from_value(registry, value))
            .collect();
    }
    let mut events = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let event = decode(registry, line).map_err(|e| {
            TapeError::Malformed(format!("event log line {}: {e}", idx + 1))
        })?;
        events.push(event);
    }
    Ok(events)
}
