use super::{ParameterHandler, SurrogateScope};
use crate::errors::TapeError;
use crate::parameter::{
    array_type_name, scalar_from_json, AmbientRole, Parameter, WireKind, NULL_TYPE_NAME,
};
use crate::value::{
    EnumValue, Label, ObjectKind, ObjectRef, PrimitiveArray, Scalar, ScalarKind, Value,
};
use serde_json::Value as Json;

fn unsupported(type_name: &str, value: &Value) -> TapeError {
    TapeError::Unsupported(format!("{} cannot encode {}", type_name, value.describe()))
}

fn malformed(type_name: &str, wire: &Json) -> TapeError {
    TapeError::Malformed(format!("{type_name} cannot decode wire value {wire}"))
}

fn object_of<'a>(type_name: &str, value: &'a Value) -> Result<&'a ObjectRef, TapeError> {
    match value {
        Value::Object(object) if object.satisfies(type_name) => Ok(object),
        other => Err(unsupported(type_name, other)),
    }
}

// Ambient and null parameters carry no value; accept the shapes older logs used for "empty".
fn is_empty_wire(wire: &Json) -> bool {
    match wire {
        Json::Null => true,
        Json::String(text) => text.is_empty(),
        _ => false,
    }
}

pub struct NullHandler;

impl ParameterHandler for NullHandler {
    fn type_name(&self) -> &str {
        NULL_TYPE_NAME
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Empty
    }

    fn accepts_value(&self, value: &Value) -> bool {
        value.is_null()
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        if value.is_null() {
            Ok(Parameter::Null)
        } else {
            Err(unsupported(NULL_TYPE_NAME, value))
        }
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        if is_empty_wire(wire) {
            Ok(Parameter::Null)
        } else {
            Err(malformed(NULL_TYPE_NAME, wire))
        }
    }
}

pub struct ScalarHandler {
    kind: ScalarKind,
}

impl ScalarHandler {
    pub fn new(kind: ScalarKind) -> Self {
        Self { kind }
    }
}

impl ParameterHandler for ScalarHandler {
    fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::for_scalar(self.kind)
    }

    fn accepts_value(&self, value: &Value) -> bool {
        value
            .as_scalar()
            .is_some_and(|scalar| scalar.kind() == self.kind)
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        match value.as_scalar() {
            Some(scalar) if scalar.kind() == self.kind => {
                Ok(Parameter::Scalar(scalar))
            }
            _ => Err(unsupported(self.type_name(), value)),
        }
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        scalar_from_json(self.kind, wire)
            .map(Parameter::Scalar)
            .ok_or_else(|| malformed(self.type_name(), wire))
    }
}

pub struct ArrayHandler {
    kind: ScalarKind,
    nullable: bool,
    type_name: String,
}

impl ArrayHandler {
    pub fn new(kind: ScalarKind, nullable: bool) -> Self {
        Self {
            kind,
            nullable,
            type_name: array_type_name(kind, nullable),
        }
    }

    fn build(&self, elements: Vec<Option<Scalar>>) -> Option<PrimitiveArray> {
        if self.nullable {
            return Some(PrimitiveArray::Nullable {
                kind: self.kind,
                elements,
            });
        }
        let scalars = elements.into_iter().collect::<Option<Vec<_>>>()?;
        macro_rules! collect {
            ($variant:ident, $scalar:ident) => {
                scalars
                    .into_iter()
                    .map(|scalar| match scalar {
                        Scalar::$scalar(v) => Some(v),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .map(PrimitiveArray::$variant)
            };
        }
        match self.kind {
            ScalarKind::Boolean => collect!(Bool, Bool),
            ScalarKind::Byte => collect!(Byte, Byte),
            ScalarKind::Integer => collect!(Int, Int),
            ScalarKind::Long => collect!(Long, Long),
            ScalarKind::Float => collect!(Float, Float),
            ScalarKind::Double => collect!(Double, Double),
            ScalarKind::String => collect!(Str, Str),
        }
    }
}

impl ParameterHandler for ArrayHandler {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Array
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Array(array) => {
                array.element_kind() == self.kind && array.is_nullable() == self.nullable
            }
            _ => false,
        }
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        match value {
            Value::Array(array) if self.accepts_value(value) && array.is_homogeneous() => {
                Ok(Parameter::Array(array.clone()))
            }
            other => Err(unsupported(&self.type_name, other)),
        }
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        let items = wire
            .as_array()
            .ok_or_else(|| malformed(&self.type_name, wire))?;
        let mut elements = Vec::with_capacity(items.len());
        for item in items {
            if item.is_null() && self.nullable {
                elements.push(None);
                continue;
            }
            let scalar =
                scalar_from_json(self.kind, item).ok_or_else(|| malformed(&self.type_name, wire))?;
            elements.push(Some(scalar));
        }
        self.build(elements)
            .map(Parameter::Array)
            .ok_or_else(|| malformed(&self.type_name, wire))
    }
}

pub struct AmbientHandler {
    type_name: String,
    role: AmbientRole,
}

impl AmbientHandler {
    pub fn new(type_name: &str, role: AmbientRole) -> Self {
        Self {
            type_name: type_name.to_string(),
            role,
        }
    }

    fn kind_matches(&self, kind: ObjectKind) -> bool {
        matches!(
            (self.role, kind),
            (AmbientRole::Root, ObjectKind::Service)
                | (AmbientRole::Transaction, ObjectKind::Transaction)
        )
    }
}

impl ParameterHandler for AmbientHandler {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Empty
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Object(object) => {
                object.contract() == self.type_name && self.kind_matches(object.kind())
            }
            _ => false,
        }
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        let object = object_of(&self.type_name, value)?;
        if !self.kind_matches(object.kind()) {
            return Err(unsupported(&self.type_name, value));
        }
        Ok(Parameter::Ambient {
            type_name: self.type_name.clone(),
            role: self.role,
        })
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        if !is_empty_wire(wire) {
            return Err(malformed(&self.type_name, wire));
        }
        Ok(Parameter::Ambient {
            type_name: self.type_name.clone(),
            role: self.role,
        })
    }
}

pub struct StableHandler {
    type_name: String,
}

impl StableHandler {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

impl ParameterHandler for StableHandler {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Integer
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Object(object) => {
                object.contract() == self.type_name
                    && matches!(object.kind(), ObjectKind::Entity(_))
            }
            _ => false,
        }
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        match object_of(&self.type_name, value)?.kind() {
            ObjectKind::Entity(id) => Ok(Parameter::Stable {
                type_name: self.type_name.clone(),
                id,
            }),
            _ => Err(unsupported(&self.type_name, value)),
        }
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        let id = wire
            .as_i64()
            .ok_or_else(|| malformed(&self.type_name, wire))?;
        Ok(Parameter::Stable {
            type_name: self.type_name.clone(),
            id,
        })
    }
}

pub struct SurrogateHandler {
    type_name: String,
}

impl SurrogateHandler {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

impl ParameterHandler for SurrogateHandler {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Integer
    }

    fn accepts_value(&self, value: &Value) -> bool {
        match value {
            Value::Object(object) => {
                object.contract() == self.type_name && object.kind() == ObjectKind::Cursor
            }
            _ => false,
        }
    }

    fn from_value(
        &self,
        value: &Value,
        scope: &mut SurrogateScope,
    ) -> Result<Parameter, TapeError> {
        let object = object_of(&self.type_name, value)?;
        if object.kind() != ObjectKind::Cursor {
            return Err(unsupported(&self.type_name, value));
        }
        Ok(Parameter::Surrogate {
            type_name: self.type_name.clone(),
            id: scope.identify(&self.type_name, object),
        })
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        let id = wire
            .as_u64()
            .ok_or_else(|| malformed(&self.type_name, wire))?;
        Ok(Parameter::Surrogate {
            type_name: self.type_name.clone(),
            id,
        })
    }
}

pub struct EnumHandler {
    type_name: String,
    variants: Vec<String>,
}

impl EnumHandler {
    pub fn new(type_name: &str, variants: &[&str]) -> Self {
        Self {
            type_name: type_name.to_string(),
            variants: variants.iter().map(|v| v.to_string()).collect(),
        }
    }

    fn lookup(&self, name: &str) -> Option<EnumValue> {
        self.variants
            .iter()
            .find(|variant| variant.as_str() == name)
            .map(|variant| EnumValue::new(self.type_name.clone(), variant.clone()))
    }
}

impl ParameterHandler for EnumHandler {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Name
    }

    fn accepts_value(&self, value: &Value) -> bool {
        matches!(value, Value::Enum(e) if e.type_name == self.type_name)
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        match value {
            Value::Enum(e) if e.type_name == self.type_name => self
                .lookup(&e.name)
                .map(Parameter::Enum)
                .ok_or_else(|| unsupported(&self.type_name, value)),
            other => Err(unsupported(&self.type_name, other)),
        }
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        wire.as_str()
            .and_then(|name| self.lookup(name))
            .map(Parameter::Enum)
            .ok_or_else(|| malformed(&self.type_name, wire))
    }
}

pub struct LabelHandler {
    type_name: String,
}

impl LabelHandler {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
        }
    }
}

impl ParameterHandler for LabelHandler {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn wire_kind(&self) -> WireKind {
        WireKind::Text
    }

    fn accepts_value(&self, value: &Value) -> bool {
        matches!(value, Value::Label(l) if l.type_name == self.type_name)
    }

    fn from_value(&self, value: &Value, _: &mut SurrogateScope) -> Result<Parameter, TapeError> {
        match value {
            Value::Label(l) if l.type_name == self.type_name => Ok(Parameter::Label(l.clone())),
            other => Err(unsupported(&self.type_name, other)),
        }
    }

    fn from_wire(&self, wire: &Json) -> Result<Parameter, TapeError> {
        wire.as_str()
            .map(|name| Parameter::Label(Label::new(self.type_name.clone(), name)))
            .ok_or_else(|| malformed(&self.type_name, wire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn enum_handler_rejects_undeclared_names() {
        let handler = EnumHandler::new("Direction", &["OUTGOING", "INCOMING"]);
        assert!(matches!(
            handler.from_wire(&json!("SIDEWAYS")),
            Err(TapeError::Malformed(_))
        ));
        let mut scope = SurrogateScope::new();
        assert!(matches!(
            handler.from_value(
                &Value::Enum(EnumValue::new("Direction", "SIDEWAYS")),
                &mut scope
            ),
            Err(TapeError::Unsupported(_))
        ));
    }

    #[test]
    fn plain_array_rejects_null_elements() {
        let handler = ArrayHandler::new(ScalarKind::Integer, false);
        assert!(handler.from_wire(&json!([1, null])).is_err());
        let boxed = ArrayHandler::new(ScalarKind::Integer, true);
        assert_eq!(
            boxed.from_wire(&json!([1, null])).expect("nullable"),
            Parameter::Array(PrimitiveArray::Nullable {
                kind: ScalarKind::Integer,
                elements: vec![Some(Scalar::Int(1)), None],
            })
        );
    }

    #[test]
    fn scalar_handler_encodes_non_finite_floats() {
        let handler = ScalarHandler::new(ScalarKind::Double);
        let mut scope = SurrogateScope::new();
        assert_eq!(
            handler
                .from_value(&Value::Double(f64::INFINITY), &mut scope)
                .expect("infinity"),
            Parameter::Scalar(Scalar::Double(f64::INFINITY))
        );
        assert!(handler.from_value(&Value::Double(f64::NAN), &mut scope).is_ok());
        assert!(handler.from_value(&Value::Int(1), &mut scope).is_err());
    }

    #[test]
    fn float_handler_rejects_wire_values_outside_f32_range() {
        let handler = ScalarHandler::new(ScalarKind::Float);
        assert!(matches!(
            handler.from_wire(&json!(1e300)),
            Err(TapeError::Malformed(_))
        ));
        assert_eq!(
            handler.from_wire(&json!("Infinity")).expect("infinity"),
            Parameter::Scalar(Scalar::Float(f32::INFINITY))
        );
    }

    #[test]
    fn ambient_handler_accepts_legacy_empty_string() {
        let handler = AmbientHandler::new("Transaction", AmbientRole::Transaction);
        assert!(handler.from_wire(&json!("")).is_ok());
        assert!(handler.from_wire(&Json::Null).is_ok());
        assert!(handler.from_wire(&json!(3)).is_err());
    }

    #[test]
    fn stable_handler_decodes_integer_identity() {
        let handler = StableHandler::new("Node");
        assert_eq!(
            handler.from_wire(&json!(13)).expect("node"),
            Parameter::Stable {
                type_name: "Node".into(),
                id: 13
            }
        );
        assert!(handler.from_wire(&json!("13")).is_err());
    }
}
