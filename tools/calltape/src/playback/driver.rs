use super::listener::PlaybackListener;
use super::state::PlaybackState;
use crate::contract::ContractTable;
use crate::errors::TapeError;
use crate::event::Event;
use crate::parameter::Parameter;
use crate::value::{ObjectRef, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlaybackReport {
    pub played: usize,
    pub failed: usize,
}

/// Replays events, in order, against a fresh backend reachable from `root`.
pub struct PlaybackDriver {
    contracts: ContractTable,
    state: PlaybackState,
    verify_results: bool,
}

impl PlaybackDriver {
    pub fn new(contracts: ContractTable, root: ObjectRef) -> Self {
        Self {
            contracts,
            state: PlaybackState::new(root),
            verify_results: false,
        }
    }

    /// Compare every replayed result with the recorded one.
    pub fn with_verify_results(mut self, verify: bool) -> Self {
        self.verify_results = verify;
        self
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn playback<'a, I>(
        &mut self,
        events: I,
        listener: &mut dyn PlaybackListener,
    ) -> Result<PlaybackReport, TapeError>
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut report = PlaybackReport::default();
        for (index, event) in events.into_iter().enumerate() {
            listener.before_playback(index, event);
            match self.play(event) {
                Ok(result) => {
                    report.played += 1;
                    listener.after_playback(index, event, &result);
                }
                Err(error) => {
                    report.failed += 1;
                    listener.playback_exception(index, event, error)?;
                }
            }
        }
        Ok(report)
    }

    /// Replay a single event and return the live result.
    pub fn play(&mut self, event: &Event) -> Result<Value, TapeError> {
        let target = self.state.resolve(event.target())?;
        let target = target.as_object().cloned().ok_or_else(|| {
            TapeError::Unresolved(format!(
                "target {} of {} is not an object",
                event.target().type_name(),
                event.method()
            ))
        })?;
        let args = event
            .arguments()
            .iter()
            .map(|argument| self.state.resolve(argument))
            .collect::<Result<Vec<_>, _>>()?;
        let contract = event.target().type_name();
        let operation = self.contracts.locate(&contract, event.method(), &args)?;
        let result = operation.invoke(&target, &args)?;
        self.state.capture(&result, event.result());
        if self.verify_results {
            self.verify(event, &result)?;
        }
        Ok(result)
    }

    fn verify(&self, event: &Event, live: &Value) -> Result<(), TapeError> {
        let recorded = event.result();
        let matches = match recorded {
            Parameter::Null => live.is_null(),
            Parameter::Scalar(_)
            | Parameter::Array(_)
            | Parameter::Enum(_)
            | Parameter::Label(_) => self.state.resolve(recorded)? == *live,
            Parameter::Stable { type_name, .. }
            | Parameter::Surrogate { type_name, .. }
            | Parameter::Ambient { type_name, .. } => live
                .as_object()
                .is_some_and(|object| object.satisfies(type_name)),
        };
        if matches {
            Ok(())
        } else {
            Err(TapeError::Divergence(format!(
                "{}.{} recorded {} but returned {}",
                event.target().type_name(),
                event.method(),
                recorded.type_name(),
                live.describe()
            )))
        }
    }
}
