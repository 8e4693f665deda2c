//! Operation tables: the named operations each contract exposes, with parameter
//! shapes used to pick an overload for a list of runtime arguments.

use crate::errors::{BackendError, TapeError};
use crate::value::{innermost, ObjectRef, ScalarKind, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What an operation parameter accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shape {
    Any,
    Scalar(ScalarKind),
    Array(ScalarKind),
    NullableArray(ScalarKind),
    Enum(String),
    Label(String),
    Object(String),
    /// The inner shape or null.
    Optional(Box<Shape>),
}

impl Shape {
    pub fn object(contract: &str) -> Self {
        Self::Object(contract.to_string())
    }

    pub fn enumeration(type_name: &str) -> Self {
        Self::Enum(type_name.to_string())
    }

    pub fn label(type_name: &str) -> Self {
        Self::Label(type_name.to_string())
    }

    pub fn optional(inner: Shape) -> Self {
        Self::Optional(Box::new(inner))
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Any, _) => true,
            (Self::Optional(_), Value::Null) => true,
            (Self::Optional(inner), other) => inner.accepts(other),
            (Self::Scalar(kind), other) => other
                .as_scalar()
                .is_some_and(|scalar| scalar.kind() == *kind),
            (Self::Array(kind), Value::Array(array)) => {
                !array.is_nullable() && array.element_kind() == *kind
            }
            (Self::NullableArray(kind), Value::Array(array)) => array.element_kind() == *kind,
            (Self::Enum(name), Value::Enum(value)) => &value.type_name == name,
            (Self::Label(name), Value::Label(label)) => &label.type_name == name,
            (Self::Object(contract), Value::Object(object)) => object.satisfies(contract),
            _ => false,
        }
    }
}

pub type OperationFn =
    Arc<dyn Fn(&ObjectRef, &[Value]) -> Result<Value, BackendError> + Send + Sync>;

#[derive(Clone)]
pub struct Operation {
    name: String,
    params: Vec<Shape>,
    call: OperationFn,
}

impl Operation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Shape] {
        &self.params
    }

    pub fn accepts(&self, args: &[Value]) -> bool {
        self.params.len() == args.len()
            && self
                .params
                .iter()
                .zip(args)
                .all(|(shape, arg)| shape.accepts(arg))
    }

    /// Run against the unwrapped target with already detached arguments.
    pub fn invoke(&self, target: &ObjectRef, args: &[Value]) -> Result<Value, BackendError> {
        (self.call)(&innermost(target), args)
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// A named operation table. Overloads are tried in registration order.
#[derive(Debug, Clone)]
pub struct Contract {
    name: String,
    operations: Vec<Operation>,
}

impl Contract {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            operations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn operation<F>(mut self, name: &str, params: Vec<Shape>, call: F) -> Self
    where
        F: Fn(&ObjectRef, &[Value]) -> Result<Value, BackendError> + Send + Sync + 'static,
    {
        self.operations.push(Operation {
            name: name.to_string(),
            params,
            call: Arc::new(call),
        });
        self
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn has_method(&self, method: &str) -> bool {
        self.operations.iter().any(|op| op.name == method)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ContractTable {
    contracts: BTreeMap<String, Contract>,
}

impl ContractTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, contract: Contract) {
        self.contracts.insert(contract.name.clone(), contract);
    }

    pub fn with(mut self, contract: Contract) -> Self {
        self.register(contract);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Contract> {
        self.contracts.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.contracts.keys().map(String::as_str)
    }

    /// First operation on `contract` named `method` whose shapes accept `args`.
    pub fn locate(
        &self,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<&Operation, TapeError> {
        let table = self
            .get(contract)
            .ok_or_else(|| TapeError::NoOperation(format!("unknown contract {contract}")))?;
        if !table.has_method(method) {
            return Err(TapeError::NoOperation(format!(
                "{contract} has no method {method}"
            )));
        }
        table
            .operations
            .iter()
            .filter(|op| op.name == method)
            .find(|op| op.accepts(args))
            .ok_or_else(|| {
                let described = args.iter().map(Value::describe).collect::<Vec<_>>();
                TapeError::NoOperation(format!(
                    "{contract}.{method}({}) matches no overload",
                    described.join(", ")
                ))
            })
    }

    /// Locate and invoke. Backend failures surface as [`TapeError::Backend`].
    pub fn dispatch(
        &self,
        target: &ObjectRef,
        contract: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, TapeError> {
        let operation = self.locate(contract, method, args)?;
        Ok(operation.invoke(target, args)?)
    }
}
