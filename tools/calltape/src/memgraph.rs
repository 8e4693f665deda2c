//! In-memory property graph used as the reference backend.
//!
//! The object model is a small graph database: a root service that hands out
//! transactions and nodes, nodes joined by typed relationships, and iterators
//! over query results. Node and relationship ids come from per-kind counters
//! starting at a configurable base, so two graphs built with different bases
//! hand out different identities for the same sequence of calls.

use crate::codec::CodecRegistry;
use crate::contract::{Contract, ContractTable, Shape};
use crate::errors::BackendError;
use crate::parameter::AmbientRole;
use crate::value::{
    downcast_object, EnumValue, Label, LiveObject, ObjectKind, ObjectRef, ScalarKind, Value,
};
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const SERVICE: &str = "GraphDatabaseService";
pub const TRANSACTION: &str = "Transaction";
pub const NODE: &str = "Node";
pub const RELATIONSHIP: &str = "Relationship";
pub const ITERATOR: &str = "Iterator";
pub const DIRECTION: &str = "Direction";
pub const RELATIONSHIP_TYPE: &str = "RelationshipType";
pub const DIRECTIONS: [&str; 3] = ["OUTGOING", "INCOMING", "BOTH"];

pub fn direction(name: &str) -> Value {
    Value::Enum(EnumValue::new(DIRECTION, name))
}

pub fn relationship_type(name: &str) -> Value {
    Value::Label(Label::new(RELATIONSHIP_TYPE, name))
}

pub type Properties = BTreeMap<String, Value>;

/// Largest accepted id base; ids above it stay exactly representable as JSON
/// doubles and leave ample room before the counters overflow.
pub const MAX_ID_BASE: i64 = 1 << 53;

#[derive(Debug, Clone)]
struct RelationshipData {
    start: i64,
    end: i64,
    rel_type: String,
    properties: Properties,
}

#[derive(Debug, Clone, Default)]
struct GraphData {
    next_node_id: i64,
    next_relationship_id: i64,
    nodes: BTreeMap<i64, Properties>,
    relationships: BTreeMap<i64, RelationshipData>,
    transaction_open: bool,
    shut_down: bool,
}

fn allocate(counter: &mut i64, kind: &str) -> Result<i64, BackendError> {
    let id = *counter;
    *counter = id
        .checked_add(1)
        .ok_or_else(|| BackendError::new(format!("{kind} ids are exhausted")))?;
    Ok(id)
}

impl GraphData {
    fn node(&self, id: i64) -> Result<&Properties, BackendError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| BackendError::new(format!("node {id} not found")))
    }

    fn node_mut(&mut self, id: i64) -> Result<&mut Properties, BackendError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| BackendError::new(format!("node {id} not found")))
    }

    fn relationship(&self, id: i64) -> Result<&RelationshipData, BackendError> {
        self.relationships
            .get(&id)
            .ok_or_else(|| BackendError::new(format!("relationship {id} not found")))
    }

    fn relationship_mut(&mut self, id: i64) -> Result<&mut RelationshipData, BackendError> {
        self.relationships
            .get_mut(&id)
            .ok_or_else(|| BackendError::new(format!("relationship {id} not found")))
    }
}

struct Shared {
    data: Mutex<GraphData>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, GraphData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock for an operation; fails once the service is shut down.
    fn open(&self) -> Result<MutexGuard<'_, GraphData>, BackendError> {
        let data = self.lock();
        if data.shut_down {
            return Err(BackendError::new("graph database has been shut down"));
        }
        Ok(data)
    }
}

/// One graph instance plus its root service object.
#[derive(Clone)]
pub struct MemGraph {
    shared: Arc<Shared>,
    service: ObjectRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeView {
    pub id: i64,
    pub properties: Properties,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipView {
    pub id: i64,
    pub start: i64,
    pub end: i64,
    pub rel_type: String,
    pub properties: Properties,
}

/// Full contents of a graph, ordered by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphSnapshot {
    pub nodes: Vec<NodeView>,
    pub relationships: Vec<RelationshipView>,
}

impl GraphSnapshot {
    pub fn node(&self, id: i64) -> Option<&NodeView> {
        self.nodes.iter().find(|node| node.id == id)
    }

    /// Ids of nodes whose `key` property equals `value`.
    pub fn nodes_with(&self, key: &str, value: &Value) -> Vec<i64> {
        self.nodes
            .iter()
            .filter(|node| node.properties.get(key) == Some(value))
            .map(|node| node.id)
            .collect()
    }
}

impl Default for MemGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl MemGraph {
    pub fn new() -> Self {
        Self::with_id_base(0)
    }

    pub fn with_id_base(id_base: i64) -> Self {
        let shared = Arc::new(Shared {
            data: Mutex::new(GraphData {
                next_node_id: id_base,
                next_relationship_id: id_base,
                ..GraphData::default()
            }),
        });
        let service: ObjectRef = Arc::new(GraphService {
            shared: Arc::clone(&shared),
        });
        Self { shared, service }
    }

    pub fn service(&self) -> ObjectRef {
        Arc::clone(&self.service)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        let data = self.shared.lock();
        GraphSnapshot {
            nodes: data
                .nodes
                .iter()
                .map(|(id, properties)| NodeView {
                    id: *id,
                    properties: properties.clone(),
                })
                .collect(),
            relationships: data
                .relationships
                .iter()
                .map(|(id, rel)| RelationshipView {
                    id: *id,
                    start: rel.start,
                    end: rel.end,
                    rel_type: rel.rel_type.clone(),
                    properties: rel.properties.clone(),
                })
                .collect(),
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().shut_down
    }
}

struct GraphService {
    shared: Arc<Shared>,
}

impl LiveObject for GraphService {
    fn contract(&self) -> &str {
        SERVICE
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Service
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Success,
    Failure,
}

struct TxState {
    outcome: Outcome,
    finished: bool,
}

/// Changes apply immediately; `finish` without `success` restores the entities
/// as they were when the transaction began. Id counters never roll back.
///
/// At most one transaction is open per graph, and every change made while it is
/// open belongs to it, so restoring the snapshot undoes exactly its work.
struct GraphTransaction {
    shared: Arc<Shared>,
    snapshot: GraphData,
    state: Mutex<TxState>,
}

impl LiveObject for GraphTransaction {
    fn contract(&self) -> &str {
        TRANSACTION
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Transaction
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct NodeHandle {
    shared: Arc<Shared>,
    id: i64,
}

impl LiveObject for NodeHandle {
    fn contract(&self) -> &str {
        NODE
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Entity(self.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct RelationshipHandle {
    shared: Arc<Shared>,
    id: i64,
}

impl LiveObject for RelationshipHandle {
    fn contract(&self) -> &str {
        RELATIONSHIP
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Entity(self.id)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

struct GraphCursor {
    items: Mutex<VecDeque<Value>>,
}

impl GraphCursor {
    fn over(items: Vec<Value>) -> Value {
        Value::Object(Arc::new(GraphCursor {
            items: Mutex::new(items.into()),
        }))
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<Value>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LiveObject for GraphCursor {
    fn contract(&self) -> &str {
        ITERATOR
    }

    fn kind(&self) -> ObjectKind {
        ObjectKind::Cursor
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn this<'a, T: 'static>(target: &'a ObjectRef, contract: &str) -> Result<&'a T, BackendError> {
    downcast_object::<T>(target)
        .ok_or_else(|| BackendError::new(format!("target is not a memgraph {contract}")))
}

fn node_value(shared: &Arc<Shared>, id: i64) -> Value {
    Value::Object(Arc::new(NodeHandle {
        shared: Arc::clone(shared),
        id,
    }))
}

fn relationship_value(shared: &Arc<Shared>, id: i64) -> Value {
    Value::Object(Arc::new(RelationshipHandle {
        shared: Arc::clone(shared),
        id,
    }))
}

fn arg<'a>(args: &'a [Value], index: usize) -> Result<&'a Value, BackendError> {
    args.get(index)
        .ok_or_else(|| BackendError::new(format!("missing argument {index}")))
}

fn str_arg(args: &[Value], index: usize) -> Result<String, BackendError> {
    arg(args, index)?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| BackendError::new(format!("argument {index} must be a string")))
}

fn long_arg(args: &[Value], index: usize) -> Result<i64, BackendError> {
    arg(args, index)?
        .as_i64()
        .ok_or_else(|| BackendError::new(format!("argument {index} must be an integer")))
}

fn node_arg(args: &[Value], index: usize) -> Result<i64, BackendError> {
    arg(args, index)?
        .as_object()
        .and_then(downcast_object::<NodeHandle>)
        .map(|node| node.id)
        .ok_or_else(|| BackendError::new(format!("argument {index} must be a node")))
}

fn label_arg(args: &[Value], index: usize) -> Result<String, BackendError> {
    match arg(args, index)? {
        Value::Label(label) => Ok(label.name.clone()),
        _ => Err(BackendError::new(format!(
            "argument {index} must be a relationship type"
        ))),
    }
}

fn direction_arg(args: &[Value], index: usize) -> Result<String, BackendError> {
    match arg(args, index)? {
        Value::Enum(value) if value.type_name == DIRECTION => Ok(value.name.clone()),
        _ => Err(BackendError::new(format!("argument {index} must be a direction"))),
    }
}

fn property_value(value: &Value) -> Result<Value, BackendError> {
    match value {
        Value::Null => Err(BackendError::new("null is not a valid property value")),
        Value::Enum(_) | Value::Label(_) | Value::Object(_) => Err(BackendError::new(format!(
            "{} is not a valid property value",
            value.describe()
        ))),
        other => Ok(other.clone()),
    }
}

fn matches_direction(rel: &RelationshipData, node: i64, direction: &str) -> bool {
    match direction {
        "OUTGOING" => rel.start == node,
        "INCOMING" => rel.end == node,
        _ => rel.start == node || rel.end == node,
    }
}

// Properties are stored on nodes and relationships alike.
trait PropertyOwner: 'static {
    const CONTRACT: &'static str;
    fn shared(&self) -> &Arc<Shared>;
    fn properties<'a>(&self, data: &'a mut GraphData) -> Result<&'a mut Properties, BackendError>;
}

impl PropertyOwner for NodeHandle {
    const CONTRACT: &'static str = NODE;

    fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    fn properties<'a>(&self, data: &'a mut GraphData) -> Result<&'a mut Properties, BackendError> {
        data.node_mut(self.id)
    }
}

impl PropertyOwner for RelationshipHandle {
    const CONTRACT: &'static str = RELATIONSHIP;

    fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    fn properties<'a>(&self, data: &'a mut GraphData) -> Result<&'a mut Properties, BackendError> {
        data.relationship_mut(self.id).map(|rel| &mut rel.properties)
    }
}

fn with_properties<T, R, F>(target: &ObjectRef, f: F) -> Result<R, BackendError>
where
    T: PropertyOwner,
    F: FnOnce(&mut Properties) -> Result<R, BackendError>,
{
    let owner = this::<T>(target, T::CONTRACT)?;
    let mut data = owner.shared().open()?;
    f(owner.properties(&mut data)?)
}

fn property_operations<T: PropertyOwner>(contract: Contract) -> Contract {
    let string = || Shape::Scalar(ScalarKind::String);
    contract
        .operation("setProperty", vec![string(), Shape::Any], |target, args| {
            let key = str_arg(args, 0)?;
            let value = property_value(arg(args, 1)?)?;
            with_properties::<T, _, _>(target, |props| {
                props.insert(key, value);
                Ok(Value::Null)
            })
        })
        .operation("getProperty", vec![string()], |target, args| {
            let key = str_arg(args, 0)?;
            with_properties::<T, _, _>(target, |props| {
                props
                    .get(&key)
                    .cloned()
                    .ok_or_else(|| BackendError::new(format!("property {key} not found")))
            })
        })
        .operation("getProperty", vec![string(), Shape::Any], |target, args| {
            let key = str_arg(args, 0)?;
            let default = arg(args, 1)?.clone();
            with_properties::<T, _, _>(target, |props| {
                Ok(props.get(&key).cloned().unwrap_or(default))
            })
        })
        .operation("hasProperty", vec![string()], |target, args| {
            let key = str_arg(args, 0)?;
            with_properties::<T, _, _>(target, |props| Ok(Value::Bool(props.contains_key(&key))))
        })
        .operation("removeProperty", vec![string()], |target, args| {
            let key = str_arg(args, 0)?;
            with_properties::<T, _, _>(target, |props| {
                Ok(props.remove(&key).unwrap_or(Value::Null))
            })
        })
        .operation("getPropertyKeys", Vec::new(), |target, _| {
            with_properties::<T, _, _>(target, |props| {
                Ok(GraphCursor::over(props.keys().map(|key| Value::str(key.as_str())).collect()))
            })
        })
}

fn service_contract() -> Contract {
    Contract::new(SERVICE)
        .operation("beginTx", Vec::new(), |target, _| {
            let service = this::<GraphService>(target, SERVICE)?;
            let mut data = service.shared.open()?;
            if data.transaction_open {
                return Err(BackendError::new("a transaction is already open"));
            }
            let snapshot = data.clone();
            data.transaction_open = true;
            Ok(Value::Object(Arc::new(GraphTransaction {
                shared: Arc::clone(&service.shared),
                snapshot,
                state: Mutex::new(TxState {
                    outcome: Outcome::Pending,
                    finished: false,
                }),
            })))
        })
        .operation("createNode", Vec::new(), |target, _| {
            let service = this::<GraphService>(target, SERVICE)?;
            let mut data = service.shared.open()?;
            let id = allocate(&mut data.next_node_id, NODE)?;
            data.nodes.insert(id, Properties::new());
            Ok(node_value(&service.shared, id))
        })
        .operation(
            "getNodeById",
            vec![Shape::Scalar(ScalarKind::Long)],
            |target, args| {
                let service = this::<GraphService>(target, SERVICE)?;
                let id = long_arg(args, 0)?;
                service.shared.open()?.node(id)?;
                Ok(node_value(&service.shared, id))
            },
        )
        .operation(
            "getRelationshipById",
            vec![Shape::Scalar(ScalarKind::Long)],
            |target, args| {
                let service = this::<GraphService>(target, SERVICE)?;
                let id = long_arg(args, 0)?;
                service.shared.open()?.relationship(id)?;
                Ok(relationship_value(&service.shared, id))
            },
        )
        .operation("getAllNodes", Vec::new(), |target, _| {
            let service = this::<GraphService>(target, SERVICE)?;
            let ids = service.shared.open()?.nodes.keys().copied().collect::<Vec<_>>();
            Ok(GraphCursor::over(
                ids.into_iter()
                    .map(|id| node_value(&service.shared, id))
                    .collect(),
            ))
        })
        .operation("shutdown", Vec::new(), |target, _| {
            let service = this::<GraphService>(target, SERVICE)?;
            service.shared.lock().shut_down = true;
            Ok(Value::Null)
        })
        .operation("toString", Vec::new(), |_, _| Ok(Value::str("MemGraph")))
}

fn transaction_contract() -> Contract {
    fn mark(target: &ObjectRef, outcome: Outcome) -> Result<Value, BackendError> {
        let tx = this::<GraphTransaction>(target, TRANSACTION)?;
        let mut state = tx.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished {
            return Err(BackendError::new("transaction already finished"));
        }
        // failure is sticky
        if state.outcome != Outcome::Failure {
            state.outcome = outcome;
        }
        Ok(Value::Null)
    }

    Contract::new(TRANSACTION)
        .operation("success", Vec::new(), |target, _| mark(target, Outcome::Success))
        .operation("failure", Vec::new(), |target, _| mark(target, Outcome::Failure))
        .operation("finish", Vec::new(), |target, _| {
            let tx = this::<GraphTransaction>(target, TRANSACTION)?;
            let mut state = tx.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.finished {
                return Ok(Value::Null);
            }
            let mut data = tx.shared.open()?;
            if state.outcome != Outcome::Success {
                data.nodes = tx.snapshot.nodes.clone();
                data.relationships = tx.snapshot.relationships.clone();
            }
            data.transaction_open = false;
            state.finished = true;
            Ok(Value::Null)
        })
}

fn node_contract() -> Contract {
    let node = Contract::new(NODE)
        .operation("getId", Vec::new(), |target, _| {
            Ok(Value::Long(this::<NodeHandle>(target, NODE)?.id))
        })
        .operation(
            "createRelationshipTo",
            vec![Shape::object(NODE), Shape::label(RELATIONSHIP_TYPE)],
            |target, args| {
                let node = this::<NodeHandle>(target, NODE)?;
                let end = node_arg(args, 0)?;
                let rel_type = label_arg(args, 1)?;
                let mut data = node.shared.open()?;
                data.node(node.id)?;
                data.node(end)?;
                let id = allocate(&mut data.next_relationship_id, RELATIONSHIP)?;
                data.relationships.insert(
                    id,
                    RelationshipData {
                        start: node.id,
                        end,
                        rel_type,
                        properties: Properties::new(),
                    },
                );
                Ok(relationship_value(&node.shared, id))
            },
        )
        .operation("getRelationships", Vec::new(), |target, _| {
            relationships_of(target, None, "BOTH")
        })
        .operation(
            "getRelationships",
            vec![Shape::enumeration(DIRECTION)],
            |target, args| relationships_of(target, None, &direction_arg(args, 0)?),
        )
        .operation(
            "getRelationships",
            vec![Shape::label(RELATIONSHIP_TYPE), Shape::enumeration(DIRECTION)],
            |target, args| {
                let rel_type = label_arg(args, 0)?;
                relationships_of(target, Some(&rel_type), &direction_arg(args, 1)?)
            },
        )
        .operation("hasRelationship", Vec::new(), |target, _| {
            let node = this::<NodeHandle>(target, NODE)?;
            let data = node.shared.open()?;
            Ok(Value::Bool(
                data.relationships
                    .values()
                    .any(|rel| matches_direction(rel, node.id, "BOTH")),
            ))
        })
        .operation("delete", Vec::new(), |target, _| {
            let node = this::<NodeHandle>(target, NODE)?;
            let mut data = node.shared.open()?;
            data.node(node.id)?;
            if data
                .relationships
                .values()
                .any(|rel| matches_direction(rel, node.id, "BOTH"))
            {
                return Err(BackendError::new(format!(
                    "node {} still has relationships",
                    node.id
                )));
            }
            data.nodes.remove(&node.id);
            Ok(Value::Null)
        })
        .operation("describe", Vec::new(), |target, _| {
            let node = this::<NodeHandle>(target, NODE)?;
            Ok(Value::str(format!("Node[{}]", node.id)))
        });
    property_operations::<NodeHandle>(node)
}

fn relationships_of(
    target: &ObjectRef,
    rel_type: Option<&str>,
    direction: &str,
) -> Result<Value, BackendError> {
    let node = this::<NodeHandle>(target, NODE)?;
    let data = node.shared.open()?;
    data.node(node.id)?;
    let ids = data
        .relationships
        .iter()
        .filter(|(_, rel)| rel_type.map_or(true, |wanted| rel.rel_type == wanted))
        .filter(|(_, rel)| matches_direction(rel, node.id, direction))
        .map(|(id, _)| *id)
        .collect::<Vec<_>>();
    Ok(GraphCursor::over(
        ids.into_iter()
            .map(|id| relationship_value(&node.shared, id))
            .collect(),
    ))
}

fn relationship_contract() -> Contract {
    fn endpoint(
        target: &ObjectRef,
        pick: fn(&RelationshipData) -> i64,
    ) -> Result<Value, BackendError> {
        let rel = this::<RelationshipHandle>(target, RELATIONSHIP)?;
        let id = pick(rel.shared.open()?.relationship(rel.id)?);
        Ok(node_value(&rel.shared, id))
    }

    let relationship = Contract::new(RELATIONSHIP)
        .operation("getId", Vec::new(), |target, _| {
            Ok(Value::Long(this::<RelationshipHandle>(target, RELATIONSHIP)?.id))
        })
        .operation("getStartNode", Vec::new(), |target, _| {
            endpoint(target, |rel| rel.start)
        })
        .operation("getEndNode", Vec::new(), |target, _| {
            endpoint(target, |rel| rel.end)
        })
        .operation("getOtherNode", vec![Shape::object(NODE)], |target, args| {
            let node = node_arg(args, 0)?;
            let rel = this::<RelationshipHandle>(target, RELATIONSHIP)?;
            let other = {
                let data = rel.shared.open()?;
                let found = data.relationship(rel.id)?;
                if found.start == node {
                    found.end
                } else if found.end == node {
                    found.start
                } else {
                    return Err(BackendError::new(format!(
                        "node {node} is not part of relationship {}",
                        rel.id
                    )));
                }
            };
            Ok(node_value(&rel.shared, other))
        })
        .operation("getType", Vec::new(), |target, _| {
            let rel = this::<RelationshipHandle>(target, RELATIONSHIP)?;
            let rel_type = rel.shared.open()?.relationship(rel.id)?.rel_type.clone();
            Ok(relationship_type(&rel_type))
        })
        .operation("delete", Vec::new(), |target, _| {
            let rel = this::<RelationshipHandle>(target, RELATIONSHIP)?;
            let mut data = rel.shared.open()?;
            data.relationship(rel.id)?;
            data.relationships.remove(&rel.id);
            Ok(Value::Null)
        });
    property_operations::<RelationshipHandle>(relationship)
}

fn iterator_contract() -> Contract {
    Contract::new(ITERATOR)
        .operation("hasNext", Vec::new(), |target, _| {
            let cursor = this::<GraphCursor>(target, ITERATOR)?;
            Ok(Value::Bool(!cursor.items().is_empty()))
        })
        .operation("next", Vec::new(), |target, _| {
            let cursor = this::<GraphCursor>(target, ITERATOR)?;
            cursor
                .items()
                .pop_front()
                .ok_or_else(|| BackendError::new("iterator is exhausted"))
        })
}

/// Operation tables for every memgraph contract.
pub fn contracts() -> ContractTable {
    ContractTable::new()
        .with(service_contract())
        .with(transaction_contract())
        .with(node_contract())
        .with(relationship_contract())
        .with(iterator_contract())
}

/// Codec registry covering every memgraph value category.
pub fn registry() -> CodecRegistry {
    CodecRegistry::standard()
        .with_ambient(SERVICE, AmbientRole::Root)
        .with_ambient(TRANSACTION, AmbientRole::Transaction)
        .with_stable(NODE)
        .with_stable(RELATIONSHIP)
        .with_label(RELATIONSHIP_TYPE)
        .with_surrogate(ITERATOR)
        .with_enum(DIRECTION, &DIRECTIONS)
}
