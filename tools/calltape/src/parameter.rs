//! Portable, typed representation of a value crossing the recording boundary.

use crate::value::{EnumValue, Label, PrimitiveArray, Scalar, ScalarKind};
use serde_json::{Number, Value as Json};

/// Role of an ambient singleton, resolved by asking the playback state for "the current X".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AmbientRole {
    Root,
    Transaction,
}

/// Shape of a parameter's wire value. Drives literal rendering in the text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireKind {
    /// No value (ambient singletons and null).
    Empty,
    Boolean,
    Integer,
    Float,
    /// Quoted string.
    Text,
    /// Bare identifier, used for enumeration constants.
    Name,
    Array,
}

impl WireKind {
    pub fn for_scalar(kind: ScalarKind) -> Self {
        match kind {
            ScalarKind::Boolean => Self::Boolean,
            ScalarKind::Byte | ScalarKind::Integer | ScalarKind::Long => Self::Integer,
            ScalarKind::Float | ScalarKind::Double => Self::Float,
            ScalarKind::String => Self::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    Null,
    Scalar(Scalar),
    Array(PrimitiveArray),
    Enum(EnumValue),
    Label(Label),
    /// Backend entity with a durable identity.
    Stable { type_name: String, id: i64 },
    /// Transient object numbered by the recorder.
    Surrogate { type_name: String, id: u64 },
    Ambient { type_name: String, role: AmbientRole },
}

pub const NULL_TYPE_NAME: &str = "Null";

pub fn array_type_name(kind: ScalarKind, nullable: bool) -> String {
    if nullable {
        format!("{}?[]", kind.type_name())
    } else {
        format!("{}[]", kind.type_name())
    }
}

impl Parameter {
    /// The wire type tag.
    pub fn type_name(&self) -> String {
        match self {
            Self::Null => NULL_TYPE_NAME.to_string(),
            Self::Scalar(scalar) => scalar.kind().type_name().to_string(),
            Self::Array(array) => array_type_name(array.element_kind(), array.is_nullable()),
            Self::Enum(value) => value.type_name.clone(),
            Self::Label(label) => label.type_name.clone(),
            Self::Stable { type_name, .. }
            | Self::Surrogate { type_name, .. }
            | Self::Ambient { type_name, .. } => type_name.clone(),
        }
    }

    pub fn wire_kind(&self) -> WireKind {
        match self {
            Self::Null | Self::Ambient { .. } => WireKind::Empty,
            Self::Scalar(scalar) => WireKind::for_scalar(scalar.kind()),
            Self::Array(_) => WireKind::Array,
            Self::Enum(_) => WireKind::Name,
            Self::Label(_) => WireKind::Text,
            Self::Stable { .. } | Self::Surrogate { .. } => WireKind::Integer,
        }
    }

    /// The wire value. Byte arrays come out as plain integer arrays.
    pub fn wire_value(&self) -> Json {
        match self {
            Self::Null | Self::Ambient { .. } => Json::Null,
            Self::Scalar(scalar) => scalar_to_json(scalar),
            Self::Array(array) => Json::Array(
                array
                    .elements()
                    .iter()
                    .map(|element| element.as_ref().map_or(Json::Null, scalar_to_json))
                    .collect(),
            ),
            Self::Enum(value) => Json::String(value.name.clone()),
            Self::Label(label) => Json::String(label.name.clone()),
            Self::Stable { id, .. } => Json::from(*id),
            Self::Surrogate { id, .. } => Json::from(*id),
        }
    }

    /// Handles refer to backend objects and are resolved through playback state.
    pub fn is_handle(&self) -> bool {
        matches!(
            self,
            Self::Stable { .. } | Self::Surrogate { .. } | Self::Ambient { .. }
        )
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

fn scalar_to_json(scalar: &Scalar) -> Json {
    match scalar {
        Scalar::Bool(v) => Json::Bool(*v),
        Scalar::Byte(v) => Json::from(*v),
        Scalar::Int(v) => Json::from(*v),
        Scalar::Long(v) => Json::from(*v),
        Scalar::Float(v) => float_to_json(f64::from(*v)),
        Scalar::Double(v) => float_to_json(*v),
        Scalar::Str(v) => Json::String(v.clone()),
    }
}

pub const NAN_NAME: &str = "NaN";
pub const INFINITY_NAME: &str = "Infinity";
pub const NEG_INFINITY_NAME: &str = "-Infinity";

/// Wire spelling of a float JSON numbers cannot hold.
pub fn non_finite_name(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some(NAN_NAME)
    } else if value == f64::INFINITY {
        Some(INFINITY_NAME)
    } else if value == f64::NEG_INFINITY {
        Some(NEG_INFINITY_NAME)
    } else {
        None
    }
}

fn float_to_json(value: f64) -> Json {
    match non_finite_name(value) {
        Some(name) => Json::String(name.to_string()),
        None => Number::from_f64(value).map_or(Json::Null, Json::Number),
    }
}

fn float_from_json(wire: &Json) -> Option<f64> {
    match wire {
        Json::Number(number) => number.as_f64().filter(|v| v.is_finite()),
        Json::String(name) => match name.as_str() {
            NAN_NAME => Some(f64::NAN),
            INFINITY_NAME => Some(f64::INFINITY),
            NEG_INFINITY_NAME => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

// A finite double outside the f32 range has no Float representation.
fn narrow_to_f32(value: f64) -> Option<f32> {
    let narrowed = value as f32;
    (narrowed.is_finite() || !value.is_finite()).then_some(narrowed)
}

/// Parse one wire element as a scalar of `kind`.
pub fn scalar_from_json(kind: ScalarKind, wire: &Json) -> Option<Scalar> {
    match kind {
        ScalarKind::Boolean => wire.as_bool().map(Scalar::Bool),
        ScalarKind::Byte => wire
            .as_i64()
            .and_then(|v| i8::try_from(v).ok())
            .map(Scalar::Byte),
        ScalarKind::Integer => wire
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .map(Scalar::Int),
        ScalarKind::Long => wire.as_i64().map(Scalar::Long),
        ScalarKind::Float => float_from_json(wire)
            .and_then(narrow_to_f32)
            .map(Scalar::Float),
        ScalarKind::Double => float_from_json(wire).map(Scalar::Double),
        ScalarKind::String => wire.as_str().map(|v| Scalar::Str(v.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn type_names_follow_category() {
        assert_eq!(Parameter::Null.type_name(), "Null");
        assert_eq!(Parameter::Scalar(Scalar::Long(3)).type_name(), "Long");
        assert_eq!(
            Parameter::Array(PrimitiveArray::Int(vec![1])).type_name(),
            "Integer[]"
        );
        let boxed = PrimitiveArray::Nullable {
            kind: ScalarKind::Double,
            elements: vec![None],
        };
        assert_eq!(Parameter::Array(boxed).type_name(), "Double?[]");
        assert_eq!(
            Parameter::Stable {
                type_name: "Node".into(),
                id: 13
            }
            .type_name(),
            "Node"
        );
    }

    #[test]
    fn byte_arrays_use_integer_wire_form() {
        let parameter = Parameter::Array(PrimitiveArray::Byte(vec![i8::MAX, i8::MIN, 0]));
        assert_eq!(parameter.wire_value(), json!([127, -128, 0]));
    }

    #[test]
    fn float_wire_value_reparses_to_same_f32() {
        let wire = Parameter::Scalar(Scalar::Float(2.3)).wire_value();
        assert_eq!(
            scalar_from_json(ScalarKind::Float, &wire),
            Some(Scalar::Float(2.3))
        );
    }

    #[test]
    fn non_finite_floats_use_named_wire_values() {
        let cases = [
            (f64::INFINITY, "Infinity"),
            (f64::NEG_INFINITY, "-Infinity"),
            (f64::NAN, "NaN"),
        ];
        for (value, name) in cases {
            let wire = Parameter::Scalar(Scalar::Double(value)).wire_value();
            assert_eq!(wire, json!(name));
            match scalar_from_json(ScalarKind::Double, &wire) {
                Some(Scalar::Double(back)) => {
                    assert_eq!(back.is_nan(), value.is_nan());
                    assert!(back.is_nan() || back == value);
                }
                other => panic!("{name} did not decode: {other:?}"),
            }
        }
        let wire = Parameter::Scalar(Scalar::Float(f32::NEG_INFINITY)).wire_value();
        assert_eq!(wire, json!("-Infinity"));
        assert_eq!(
            scalar_from_json(ScalarKind::Float, &wire),
            Some(Scalar::Float(f32::NEG_INFINITY))
        );
        assert_eq!(scalar_from_json(ScalarKind::Double, &json!("inf")), None);
    }

    #[test]
    fn float_rejects_doubles_outside_f32_range() {
        assert_eq!(scalar_from_json(ScalarKind::Float, &json!(1e300)), None);
        assert_eq!(scalar_from_json(ScalarKind::Float, &json!(-1e39)), None);
        assert_eq!(
            scalar_from_json(ScalarKind::Float, &json!(f64::from(f32::MAX))),
            Some(Scalar::Float(f32::MAX))
        );
        assert_eq!(
            scalar_from_json(ScalarKind::Double, &json!(1e300)),
            Some(Scalar::Double(1e300))
        );
    }

    #[test]
    fn scalar_from_json_rejects_out_of_range_integers() {
        assert_eq!(scalar_from_json(ScalarKind::Byte, &json!(300)), None);
        assert_eq!(
            scalar_from_json(ScalarKind::Integer, &json!(i64::MAX)),
            None
        );
        assert_eq!(
            scalar_from_json(ScalarKind::Long, &json!(i64::MAX)),
            Some(Scalar::Long(i64::MAX))
        );
    }

    #[test]
    fn ambient_and_null_have_empty_wire_value() {
        let ambient = Parameter::Ambient {
            type_name: "Transaction".into(),
            role: AmbientRole::Transaction,
        };
        assert_eq!(ambient.wire_value(), Json::Null);
        assert_eq!(ambient.wire_kind(), WireKind::Empty);
        assert!(ambient.is_handle());
    }
}
