//! Runtime values exchanged with a backend, and the `LiveObject` seam that backend
//! objects implement so they can be dispatched to, recorded, and resolved.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared handle to a live backend object (or a recording proxy over one).
pub type ObjectRef = Arc<dyn LiveObject>;

/// How an object is identified across a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    /// The root service handle.
    Service,
    /// The currently active transaction.
    Transaction,
    /// A durable entity carrying a backend-assigned identity.
    Entity(i64),
    /// A transient object (cursor, enumerator) with no durable identity.
    Cursor,
}

impl ObjectKind {
    /// Entities, transactions and cursors get wrapped when returned from a recorded call.
    pub fn is_trackable(self) -> bool {
        !matches!(self, Self::Service)
    }
}

pub trait LiveObject: Send + Sync {
    /// Primary contract name, e.g. `Node`.
    fn contract(&self) -> &str;
    fn kind(&self) -> ObjectKind;
    fn as_any(&self) -> &dyn Any;

    fn satisfies(&self, contract: &str) -> bool {
        self.contract() == contract
    }

    /// The wrapped object when `self` is a proxy.
    fn delegate(&self) -> Option<ObjectRef> {
        None
    }
}

impl fmt::Debug for dyn LiveObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ObjectKind::Entity(id) => write!(f, "{}[{id}]", self.contract()),
            kind => write!(f, "{}[{kind:?}]", self.contract()),
        }
    }
}

/// Address of the object behind `object`, stable for as long as the `Arc` lives.
pub fn object_address(object: &ObjectRef) -> usize {
    Arc::as_ptr(object) as *const () as usize
}

pub fn same_object(a: &ObjectRef, b: &ObjectRef) -> bool {
    object_address(a) == object_address(b)
}

/// Strip any number of proxy layers.
pub fn innermost(object: &ObjectRef) -> ObjectRef {
    let mut current = Arc::clone(object);
    while let Some(inner) = current.delegate() {
        current = inner;
    }
    current
}

pub fn downcast_object<T: 'static>(object: &ObjectRef) -> Option<&T> {
    object.as_any().downcast_ref::<T>()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Boolean,
    Byte,
    Integer,
    Long,
    Float,
    Double,
    String,
}

impl ScalarKind {
    pub const ALL: [ScalarKind; 7] = [
        Self::Boolean,
        Self::Byte,
        Self::Integer,
        Self::Long,
        Self::Float,
        Self::Double,
        Self::String,
    ];

    pub fn type_name(self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::Byte => "Byte",
            Self::Integer => "Integer",
            Self::Long => "Long",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_name() == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Bool(bool),
    Byte(i8),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Boolean,
            Self::Byte(_) => ScalarKind::Byte,
            Self::Int(_) => ScalarKind::Integer,
            Self::Long(_) => ScalarKind::Long,
            Self::Float(_) => ScalarKind::Float,
            Self::Double(_) => ScalarKind::Double,
            Self::Str(_) => ScalarKind::String,
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            Self::Bool(v) => Value::Bool(v),
            Self::Byte(v) => Value::Byte(v),
            Self::Int(v) => Value::Int(v),
            Self::Long(v) => Value::Long(v),
            Self::Float(v) => Value::Float(v),
            Self::Double(v) => Value::Double(v),
            Self::Str(v) => Value::Str(v),
        }
    }
}

/// Homogeneous array of one scalar kind. `Nullable` is the boxed variant whose
/// elements may be absent.
#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveArray {
    Bool(Vec<bool>),
    Byte(Vec<i8>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Str(Vec<String>),
    Nullable {
        kind: ScalarKind,
        elements: Vec<Option<Scalar>>,
    },
}

impl PrimitiveArray {
    pub fn element_kind(&self) -> ScalarKind {
        match self {
            Self::Bool(_) => ScalarKind::Boolean,
            Self::Byte(_) => ScalarKind::Byte,
            Self::Int(_) => ScalarKind::Integer,
            Self::Long(_) => ScalarKind::Long,
            Self::Float(_) => ScalarKind::Float,
            Self::Double(_) => ScalarKind::Double,
            Self::Str(_) => ScalarKind::String,
            Self::Nullable { kind, .. } => *kind,
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Self::Nullable { .. })
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Bool(v) => v.len(),
            Self::Byte(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::Str(v) => v.len(),
            Self::Nullable { elements, .. } => elements.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements as optional scalars, in order. Plain arrays never yield `None`.
    pub fn elements(&self) -> Vec<Option<Scalar>> {
        match self {
            Self::Bool(v) => v.iter().map(|x| Some(Scalar::Bool(*x))).collect(),
            Self::Byte(v) => v.iter().map(|x| Some(Scalar::Byte(*x))).collect(),
            Self::Int(v) => v.iter().map(|x| Some(Scalar::Int(*x))).collect(),
            Self::Long(v) => v.iter().map(|x| Some(Scalar::Long(*x))).collect(),
            Self::Float(v) => v.iter().map(|x| Some(Scalar::Float(*x))).collect(),
            Self::Double(v) => v.iter().map(|x| Some(Scalar::Double(*x))).collect(),
            Self::Str(v) => v.iter().map(|x| Some(Scalar::Str(x.clone()))).collect(),
            Self::Nullable { elements, .. } => elements.clone(),
        }
    }

    /// Every element has the declared kind.
    pub fn is_homogeneous(&self) -> bool {
        match self {
            Self::Nullable { kind, elements } => elements
                .iter()
                .flatten()
                .all(|element| element.kind() == *kind),
            _ => true,
        }
    }
}

/// A value drawn from a closed, backend-declared enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EnumValue {
    pub type_name: String,
    pub name: String,
}

impl EnumValue {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

/// An open, caller-defined named token such as a relationship type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label {
    pub type_name: String,
    pub name: String,
}

impl Label {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Array(PrimitiveArray),
    Enum(EnumValue),
    Label(Label),
    Object(ObjectRef),
}

impl Value {
    pub fn str(value: impl Into<String>) -> Self {
        Self::Str(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_scalar(&self) -> Option<Scalar> {
        match self {
            Self::Bool(v) => Some(Scalar::Bool(*v)),
            Self::Byte(v) => Some(Scalar::Byte(*v)),
            Self::Int(v) => Some(Scalar::Int(*v)),
            Self::Long(v) => Some(Scalar::Long(*v)),
            Self::Float(v) => Some(Scalar::Float(*v)),
            Self::Double(v) => Some(Scalar::Double(*v)),
            Self::Str(v) => Some(Scalar::Str(v.clone())),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    /// Replace a proxy with the object it wraps.
    pub fn detached(&self) -> Value {
        match self {
            Self::Object(object) => Self::Object(innermost(object)),
            other => other.clone(),
        }
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Array(array) => {
                let suffix = if array.is_nullable() { "?[]" } else { "[]" };
                format!("{}{suffix}", array.element_kind().type_name())
            }
            Self::Enum(value) => format!("{}.{}", value.type_name, value.name),
            Self::Label(label) => format!("{}({})", label.type_name, label.name),
            Self::Object(object) => format!("{object:?}"),
            other => match other.as_scalar() {
                Some(scalar) => scalar.kind().type_name().to_string(),
                None => "value".to_string(),
            },
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Array(a), Self::Array(b)) => a == b,
            (Self::Enum(a), Self::Enum(b)) => a == b,
            (Self::Label(a), Self::Label(b)) => a == b,
            (Self::Object(a), Self::Object(b)) => same_object(&innermost(a), &innermost(b)),
            (a, b) => match (a.as_scalar(), b.as_scalar()) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Long(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<ObjectRef> for Value {
    fn from(value: ObjectRef) -> Self {
        Self::Object(value)
    }
}
