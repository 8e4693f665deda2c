//! Ordered registry of parameter handlers.
//!
//! Recording asks the registry to turn runtime values into [`Parameter`]s, and the
//! wire decoders ask it to turn `(type tag, wire value)` pairs back into
//! parameters. The first handler that claims a value or tag wins, so handlers a
//! backend registers are consulted before the generic primitive fallbacks.

pub mod handlers;

use crate::errors::TapeError;
use crate::parameter::{AmbientRole, Parameter, WireKind};
use crate::value::{innermost, object_address, ObjectRef, ScalarKind, Value};
use handlers::{
    AmbientHandler, ArrayHandler, EnumHandler, LabelHandler, NullHandler, ScalarHandler,
    StableHandler, SurrogateHandler,
};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::sync::Arc;

pub trait ParameterHandler: Send + Sync {
    /// Wire type tag this handler produces.
    fn type_name(&self) -> &str;
    fn wire_kind(&self) -> WireKind;
    fn accepts_value(&self, value: &Value) -> bool;
    fn from_value(&self, value: &Value, scope: &mut SurrogateScope)
        -> Result<Parameter, TapeError>;
    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError>;

    fn accepts_type_name(&self, type_name: &str) -> bool {
        self.type_name() == type_name
    }
}

/// Surrogate numbering for one recording session.
///
/// Numbers are sequential per surrogate type and start at zero. An object seen a
/// second time keeps its first number. The scope keeps every numbered object
/// alive so its address cannot be reused by a later allocation.
#[derive(Default)]
pub struct SurrogateScope {
    next: HashMap<String, u64>,
    assigned: HashMap<(String, usize), u64>,
    retained: Vec<ObjectRef>,
}

impl SurrogateScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identify(&mut self, type_name: &str, object: &ObjectRef) -> u64 {
        let object = innermost(object);
        let key = (type_name.to_string(), object_address(&object));
        if let Some(id) = self.assigned.get(&key) {
            return *id;
        }
        let counter = self.next.entry(type_name.to_string()).or_insert(0);
        let id = *counter;
        *counter += 1;
        self.assigned.insert(key, id);
        self.retained.push(object);
        id
    }

    pub fn len(&self) -> usize {
        self.assigned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assigned.is_empty()
    }
}

#[derive(Clone, Default)]
pub struct CodecRegistry {
    handlers: Vec<Arc<dyn ParameterHandler>>,
    fallback_start: usize,
}

impl CodecRegistry {
    /// Null, every scalar kind, and plain plus nullable arrays of each.
    pub fn standard() -> Self {
        let mut this = Self::default();
        this.push_fallback(Arc::new(NullHandler));
        for kind in ScalarKind::ALL {
            this.push_fallback(Arc::new(ScalarHandler::new(kind)));
        }
        for kind in ScalarKind::ALL {
            this.push_fallback(Arc::new(ArrayHandler::new(kind, false)));
            this.push_fallback(Arc::new(ArrayHandler::new(kind, true)));
        }
        this
    }

    /// Add a specific handler. It is consulted after previously registered specific
    /// handlers and before every fallback.
    pub fn register(&mut self, handler: Arc<dyn ParameterHandler>) {
        self.handlers.insert(self.fallback_start, handler);
        self.fallback_start += 1;
    }

    fn push_fallback(&mut self, handler: Arc<dyn ParameterHandler>) {
        self.handlers.push(handler);
    }

    pub fn with_ambient(mut self, type_name: &str, role: AmbientRole) -> Self {
        self.register(Arc::new(AmbientHandler::new(type_name, role)));
        self
    }

    pub fn with_stable(mut self, type_name: &str) -> Self {
        self.register(Arc::new(StableHandler::new(type_name)));
        self
    }

    pub fn with_surrogate(mut self, type_name: &str) -> Self {
        self.register(Arc::new(SurrogateHandler::new(type_name)));
        self
    }

    pub fn with_enum(mut self, type_name: &str, variants: &[&str]) -> Self {
        self.register(Arc::new(EnumHandler::new(type_name, variants)));
        self
    }

    pub fn with_label(mut self, type_name: &str) -> Self {
        self.register(Arc::new(LabelHandler::new(type_name)));
        self
    }

    pub fn type_names(&self) -> Vec<String> {
        self.handlers
            .iter()
            .map(|handler| handler.type_name().to_string())
            .collect()
    }

    pub fn from_value(
        &self,
        value: &Value,
        scope: &mut SurrogateScope,
    ) -> Result<Parameter, TapeError> {
        let handler = self
            .handlers
            .iter()
            .find(|handler| handler.accepts_value(value))
            .ok_or_else(|| {
                TapeError::Unsupported(format!("no handler accepts {}", value.describe()))
            })?;
        handler.from_value(value, scope)
    }

    /// Encode `value` as the declared capability `type_name`.
    pub fn from_value_as(
        &self,
        value: &Value,
        type_name: &str,
        scope: &mut SurrogateScope,
    ) -> Result<Parameter, TapeError> {
        self.handler_for(type_name)?.from_value(value, scope)
    }

    pub fn from_wire(&self, type_name: &str, wire: &Json) -> Result<Parameter, TapeError> {
        self.handler_for(type_name)?.from_wire(wire)
    }

    pub fn wire_kind(&self, type_name: &str) -> Result<WireKind, TapeError> {
        Ok(self.handler_for(type_name)?.wire_kind())
    }

    fn handler_for(&self, type_name: &str) -> Result<&Arc<dyn ParameterHandler>, TapeError> {
        self.handlers
            .iter()
            .find(|handler| handler.accepts_type_name(type_name))
            .ok_or_else(|| TapeError::Unsupported(format!("unknown type tag {type_name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{EnumValue, LiveObject, ObjectKind, PrimitiveArray, Scalar};
    use std::any::Any;

    struct Stub {
        contract: &'static str,
        kind: ObjectKind,
    }

    impl LiveObject for Stub {
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

    fn registry() -> CodecRegistry {
        CodecRegistry::standard()
            .with_ambient("Service", AmbientRole::Root)
            .with_ambient("Transaction", AmbientRole::Transaction)
            .with_stable("Node")
            .with_surrogate("Cursor")
            .with_enum("Direction", &["OUTGOING", "INCOMING", "BOTH"])
            .with_label("RelationshipType")
    }

    fn round_trip(value: Value) {
        let registry = registry();
        let mut scope = SurrogateScope::new();
        let parameter = registry.from_value(&value, &mut scope).expect("encode");
        let decoded = registry
            .from_wire(&parameter.type_name(), &parameter.wire_value())
            .expect("decode");
        assert_eq!(decoded, parameter, "round trip of {value:?}");
    }

    #[test]
    fn scalars_round_trip() {
        round_trip(Value::Null);
        round_trip(Value::Bool(true));
        round_trip(Value::Byte(i8::MAX));
        round_trip(Value::Int(23));
        round_trip(Value::Long(12));
        round_trip(Value::Float(2.3));
        round_trip(Value::Double(3.4));
        round_trip(Value::str("I am a String"));
    }

    #[test]
    fn arrays_round_trip_including_empty_and_nullable() {
        round_trip(Value::Array(PrimitiveArray::Bool(vec![true, false, true])));
        round_trip(Value::Array(PrimitiveArray::Byte(vec![i8::MAX, i8::MIN])));
        round_trip(Value::Array(PrimitiveArray::Int(vec![1, 2, 3])));
        round_trip(Value::Array(PrimitiveArray::Long(Vec::new())));
        round_trip(Value::Array(PrimitiveArray::Float(vec![1.0, 2.5])));
        round_trip(Value::Array(PrimitiveArray::Str(vec![
            "These".into(),
            "are".into(),
            "strings".into(),
        ])));
        round_trip(Value::Array(PrimitiveArray::Nullable {
            kind: ScalarKind::Byte,
            elements: vec![Some(Scalar::Byte(1)), None, Some(Scalar::Byte(-1))],
        }));
    }

    #[test]
    fn enum_and_handles_round_trip() {
        round_trip(Value::Enum(EnumValue::new("Direction", "OUTGOING")));
        round_trip(Value::Object(Arc::new(Stub {
            contract: "Node",
            kind: ObjectKind::Entity(13),
        })));
        round_trip(Value::Object(Arc::new(Stub {
            contract: "Cursor",
            kind: ObjectKind::Cursor,
        })));
        round_trip(Value::Object(Arc::new(Stub {
            contract: "Transaction",
            kind: ObjectKind::Transaction,
        })));
    }

    #[test]
    fn unknown_value_and_tag_are_unsupported() {
        let registry = registry();
        let mut scope = SurrogateScope::new();
        let stranger = Value::Object(Arc::new(Stub {
            contract: "Widget",
            kind: ObjectKind::Entity(1),
        }));
        assert!(matches!(
            registry.from_value(&stranger, &mut scope),
            Err(TapeError::Unsupported(_))
        ));
        assert!(matches!(
            registry.from_wire("Widget", &Json::from(1)),
            Err(TapeError::Unsupported(_))
        ));
    }

    #[test]
    fn surrogate_numbers_are_per_scope_and_stable_per_object() {
        let registry = registry();
        let first: ObjectRef = Arc::new(Stub {
            contract: "Cursor",
            kind: ObjectKind::Cursor,
        });
        let second: ObjectRef = Arc::new(Stub {
            contract: "Cursor",
            kind: ObjectKind::Cursor,
        });
        let mut scope = SurrogateScope::new();
        let a = registry
            .from_value(&Value::Object(Arc::clone(&first)), &mut scope)
            .expect("first");
        let b = registry
            .from_value(&Value::Object(Arc::clone(&second)), &mut scope)
            .expect("second");
        let again = registry
            .from_value(&Value::Object(Arc::clone(&first)), &mut scope)
            .expect("again");
        assert_eq!(a.wire_value(), Json::from(0));
        assert_eq!(b.wire_value(), Json::from(1));
        assert_eq!(again, a);

        let mut fresh = SurrogateScope::new();
        let other = registry
            .from_value(&Value::Object(second), &mut fresh)
            .expect("fresh scope");
        assert_eq!(other.wire_value(), Json::from(0));
    }

    #[test]
    fn specific_handlers_precede_fallbacks() {
        let names = registry().type_names();
        let node = names.iter().position(|n| n == "Node").expect("node");
        let string = names.iter().position(|n| n == "String").expect("string");
        assert!(node < string);
        assert_eq!(names[0], "Service");
    }

    #[test]
    fn declared_capability_overrides_primary_contract() {
        struct Both;
        impl LiveObject for Both {
            fn contract(&self) -> &str {
                "Node"
            }
            fn kind(&self) -> ObjectKind {
                ObjectKind::Entity(4)
            }
            fn as_any(&self) -> &dyn Any {
                self
            }
            fn satisfies(&self, contract: &str) -> bool {
                contract == "Node" || contract == "PropertyContainer"
            }
        }
        let registry = registry().with_stable("PropertyContainer");
        let mut scope = SurrogateScope::new();
        let parameter = registry
            .from_value_as(
                &Value::Object(Arc::new(Both)),
                "PropertyContainer",
                &mut scope,
            )
            .expect("encode as declared");
        assert_eq!(
            parameter,
            Parameter::Stable {
                type_name: "PropertyContainer".into(),
                id: 4
            }
        );
    }
}
