//! One recorded invocation, and the sinks recording feeds events into.

use crate::parameter::Parameter;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    target: Parameter,
    method: String,
    arguments: Vec<Parameter>,
    result: Parameter,
}

impl Event {
    pub fn new(
        target: Parameter,
        method: impl Into<String>,
        arguments: Vec<Parameter>,
        result: Parameter,
    ) -> Self {
        Self {
            target,
            method: method.into(),
            arguments,
            result,
        }
    }

    pub fn target(&self) -> &Parameter {
        &self.target
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn arguments(&self) -> &[Parameter] {
        &self.arguments
    }

    pub fn result(&self) -> &Parameter {
        &self.result
    }
}

/// Receives every event a recording session produces, in call order.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: Event);
}

/// In-memory accumulator.
#[derive(Default, Clone)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EventListener for EventLog {
    fn on_event(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Drops events for methods that carry no replay-relevant state change.
pub struct FilteredListener {
    inner: Arc<dyn EventListener>,
    ignored: BTreeSet<String>,
}

impl FilteredListener {
    pub fn new<I, S>(inner: Arc<dyn EventListener>, ignored: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            inner,
            ignored: ignored.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_ignored(&self, method: &str) -> bool {
        self.ignored.contains(method)
    }
}

impl EventListener for FilteredListener {
    fn on_event(&self, event: Event) {
        if self.is_ignored(event.method()) {
            return;
        }
        self.inner.on_event(event);
    }
}
