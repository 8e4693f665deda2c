//! Identity state for one playback run.
//!
//! Recorded events refer to objects by the identities they had while recording.
//! During playback the backend hands out new objects with new identities, so the
//! state keeps a map from recorded identity to the live object standing in for it.

use crate::errors::TapeError;
use crate::parameter::{AmbientRole, Parameter};
use crate::value::{innermost, ObjectKind, ObjectRef, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub struct PlaybackState {
    root: ObjectRef,
    transaction: Option<ObjectRef>,
    stable: HashMap<(String, i64), ObjectRef>,
    surrogates: HashMap<(String, u64), ObjectRef>,
}

impl PlaybackState {
    pub fn new(root: ObjectRef) -> Self {
        Self {
            root: innermost(&root),
            transaction: None,
            stable: HashMap::new(),
            surrogates: HashMap::new(),
        }
    }

    pub fn root(&self) -> &ObjectRef {
        &self.root
    }

    pub fn current_transaction(&self) -> Option<&ObjectRef> {
        self.transaction.as_ref()
    }

    pub fn tracked_entities(&self) -> usize {
        self.stable.len()
    }

    pub fn tracked_surrogates(&self) -> usize {
        self.surrogates.len()
    }

    /// Remember what a successful invocation returned.
    ///
    /// `recorded` is the result as it appears in the log; its identity is the key
    /// later events use. Logs without results fall back to the live identity.
    pub fn capture(&mut self, live: &Value, recorded: &Parameter) {
        let Some(object) = live.as_object() else {
            return;
        };
        let object = innermost(object);
        if object.kind() == ObjectKind::Transaction {
            self.transaction = Some(Arc::clone(&object));
        }
        match recorded {
            Parameter::Stable { type_name, id } => {
                self.stable.insert((type_name.clone(), *id), object);
            }
            Parameter::Surrogate { type_name, id } => {
                self.surrogates.insert((type_name.clone(), *id), object);
            }
            Parameter::Null => {
                if let ObjectKind::Entity(id) = object.kind() {
                    self.stable.insert((object.contract().to_string(), id), object);
                }
            }
            _ => {}
        }
    }

    /// Turn a recorded parameter into the live value it now stands for.
    pub fn resolve(&self, parameter: &Parameter) -> Result<Value, TapeError> {
        match parameter {
            Parameter::Null => Ok(Value::Null),
            Parameter::Scalar(scalar) => Ok(scalar.clone().into_value()),
            Parameter::Array(array) => Ok(Value::Array(array.clone())),
            Parameter::Enum(value) => Ok(Value::Enum(value.clone())),
            Parameter::Label(label) => Ok(Value::Label(label.clone())),
            Parameter::Stable { type_name, id } => self
                .stable
                .get(&(type_name.clone(), *id))
                .map(|object| Value::Object(Arc::clone(object)))
                .ok_or_else(|| {
                    TapeError::Unresolved(format!("{type_name}({id}) was never produced"))
                }),
            Parameter::Surrogate { type_name, id } => self
                .surrogates
                .get(&(type_name.clone(), *id))
                .map(|object| Value::Object(Arc::clone(object)))
                .ok_or_else(|| {
                    TapeError::Unresolved(format!("surrogate {type_name}({id}) was never produced"))
                }),
            Parameter::Ambient {
                role: AmbientRole::Root,
                ..
            } => Ok(Value::Object(Arc::clone(&self.root))),
            Parameter::Ambient {
                type_name,
                role: AmbientRole::Transaction,
            } => self
                .transaction
                .as_ref()
                .map(|object| Value::Object(Arc::clone(object)))
                .ok_or_else(|| TapeError::Unresolved(format!("no current {type_name}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{LiveObject, Scalar};
    use std::any::Any;

    struct Thing {
        contract: &'static str,
        kind: ObjectKind,
    }

    impl LiveObject for Thing {
        fn contract(&self) -> &str {
            self.contract
        }

        fn kind(&self) -> ObjectKind {
            self.kind
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn object(contract: &'static str, kind: ObjectKind) -> ObjectRef {
        Arc::new(Thing { contract, kind })
    }

    fn state() -> PlaybackState {
        PlaybackState::new(object("Service", ObjectKind::Service))
    }

    #[test]
    fn stable_entities_resolve_by_recorded_identity() {
        let mut state = state();
        let live = object("Node", ObjectKind::Entity(101));
        state.capture(
            &Value::Object(Arc::clone(&live)),
            &Parameter::Stable {
                type_name: "Node".into(),
                id: 1,
            },
        );
        let resolved = state
            .resolve(&Parameter::Stable {
                type_name: "Node".into(),
                id: 1,
            })
            .expect("resolve");
        assert_eq!(resolved, Value::Object(live));
        assert!(matches!(
            state.resolve(&Parameter::Stable {
                type_name: "Node".into(),
                id: 101,
            }),
            Err(TapeError::Unresolved(_))
        ));
    }

    #[test]
    fn missing_recorded_result_falls_back_to_live_identity() {
        let mut state = state();
        let live = object("Node", ObjectKind::Entity(7));
        state.capture(&Value::Object(live), &Parameter::Null);
        assert!(state
            .resolve(&Parameter::Stable {
                type_name: "Node".into(),
                id: 7,
            })
            .is_ok());
    }

    #[test]
    fn transactions_replace_the_ambient_slot() {
        let mut state = state();
        let transaction = Parameter::Ambient {
            type_name: "Transaction".into(),
            role: AmbientRole::Transaction,
        };
        assert!(matches!(
            state.resolve(&transaction),
            Err(TapeError::Unresolved(_))
        ));
        let first = object("Transaction", ObjectKind::Transaction);
        let second = object("Transaction", ObjectKind::Transaction);
        state.capture(&Value::Object(first), &transaction);
        state.capture(&Value::Object(Arc::clone(&second)), &transaction);
        assert_eq!(
            state.resolve(&transaction).expect("current"),
            Value::Object(second)
        );
    }

    #[test]
    fn surrogates_and_values_resolve() {
        let mut state = state();
        let cursor = object("Iterator", ObjectKind::Cursor);
        let recorded = Parameter::Surrogate {
            type_name: "Iterator".into(),
            id: 0,
        };
        state.capture(&Value::Object(Arc::clone(&cursor)), &recorded);
        assert_eq!(state.resolve(&recorded).expect("cursor"), Value::Object(cursor));
        assert_eq!(
            state
                .resolve(&Parameter::Scalar(Scalar::Int(5)))
                .expect("scalar"),
            Value::Int(5)
        );
        assert_eq!(state.resolve(&Parameter::Null).expect("null"), Value::Null);
        assert_eq!(state.tracked_surrogates(), 1);
    }
}
