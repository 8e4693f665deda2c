//! Recording interceptor.
//!
//! A [`RecordingProxy`] stands in for a live backend object. Every call made
//! through it is dispatched to the real object via the contract table, then
//! reported to the session's listener as an [`Event`]. Entities, transactions and
//! cursors handed back by a call come back wrapped in their own proxies, so the
//! whole object graph reachable from the first wrapped object is observed.

use crate::codec::{CodecRegistry, SurrogateScope};
use crate::config::RecordingConfig;
use crate::contract::ContractTable;
use crate::errors::TapeError;
use crate::event::{Event, EventListener, FilteredListener};
use crate::parameter::Parameter;
use crate::value::{downcast_object, innermost, LiveObject, ObjectKind, ObjectRef, Value};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Methods that never carry replay-relevant state changes.
pub const DEFAULT_IGNORED_METHODS: [&str; 2] = ["toString", "describe"];

struct Session {
    registry: CodecRegistry,
    contracts: ContractTable,
    listener: Arc<dyn EventListener>,
    scope: Mutex<SurrogateScope>,
}

impl Session {
    fn scope(&self) -> MutexGuard<'_, SurrogateScope> {
        self.scope.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One recording session. Surrogate numbering is local to the session, so two
/// recorders number their cursors independently.
#[derive(Clone)]
pub struct Recorder {
    session: Arc<Session>,
}

impl Recorder {
    pub fn new(
        registry: CodecRegistry,
        contracts: ContractTable,
        listener: Arc<dyn EventListener>,
    ) -> Self {
        Self::with_ignored_methods(registry, contracts, listener, DEFAULT_IGNORED_METHODS)
    }

    /// Recorder that skips the methods listed under `[recording]`.
    pub fn from_config(
        registry: CodecRegistry,
        contracts: ContractTable,
        listener: Arc<dyn EventListener>,
        config: &RecordingConfig,
    ) -> Self {
        Self::with_ignored_methods(
            registry,
            contracts,
            listener,
            config.ignored_methods.iter().cloned(),
        )
    }

    pub fn with_ignored_methods<I, S>(
        registry: CodecRegistry,
        contracts: ContractTable,
        listener: Arc<dyn EventListener>,
        ignored: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let listener: Arc<dyn EventListener> = Arc::new(FilteredListener::new(listener, ignored));
        Self {
            session: Arc::new(Session {
                registry,
                contracts,
                listener,
                scope: Mutex::new(SurrogateScope::new()),
            }),
        }
    }

    /// Track `object` as `contract`. The contract becomes the target type tag of
    /// every event recorded through the returned proxy.
    pub fn wrap(&self, object: ObjectRef, contract: &str) -> Arc<RecordingProxy> {
        Arc::new(RecordingProxy {
            session: Arc::clone(&self.session),
            inner: innermost(&object),
            contract: contract.to_string(),
        })
    }

    /// Number of distinct surrogate objects observed so far.
    pub fn surrogates_seen(&self) -> usize {
        self.session.scope().len()
    }
}

enum Returned {
    Plain(Value),
    Tracked(Arc<RecordingProxy>),
}

pub struct RecordingProxy {
    session: Arc<Session>,
    inner: ObjectRef,
    contract: String,
}

impl RecordingProxy {
    pub fn inner(&self) -> &ObjectRef {
        &self.inner
    }

    /// Invoke `method`, record it, and return the result. Trackable objects come
    /// back as `Value::Object` holding a new proxy.
    pub fn call(&self, method: &str, args: &[Value]) -> Result<Value, TapeError> {
        Ok(match self.record(method, args)? {
            Returned::Plain(value) => value,
            Returned::Tracked(proxy) => Value::Object(proxy),
        })
    }

    /// Like [`call`](Self::call) for methods that return a trackable object.
    pub fn call_object(
        &self,
        method: &str,
        args: &[Value],
    ) -> Result<Arc<RecordingProxy>, TapeError> {
        match self.record(method, args)? {
            Returned::Tracked(proxy) => Ok(proxy),
            Returned::Plain(value) => Err(TapeError::Unsupported(format!(
                "{}.{method} returned {}, not a trackable object",
                self.contract,
                value.describe()
            ))),
        }
    }

    fn record(&self, method: &str, args: &[Value]) -> Result<Returned, TapeError> {
        let session = &self.session;
        let args = args.iter().map(Value::detached).collect::<Vec<_>>();
        let target_value = Value::Object(Arc::clone(&self.inner));
        let (target, arguments) = {
            let mut scope = session.scope();
            let target = session
                .registry
                .from_value_as(&target_value, &self.contract, &mut scope)?;
            let arguments = args
                .iter()
                .map(|arg| session.registry.from_value(arg, &mut scope))
                .collect::<Result<Vec<Parameter>, _>>()?;
            (target, arguments)
        };

        let result = session
            .contracts
            .dispatch(&self.inner, &self.contract, method, &args)?;

        let encoded = session.registry.from_value(&result, &mut session.scope())?;
        session
            .listener
            .on_event(Event::new(target, method, arguments, encoded));

        Ok(match result {
            Value::Object(object) if object.kind().is_trackable() => {
                let contract = object.contract().to_string();
                Returned::Tracked(Arc::new(RecordingProxy {
                    session: Arc::clone(session),
                    inner: innermost(&object),
                    contract,
                }))
            }
            other => Returned::Plain(other),
        })
    }
}

impl LiveObject for RecordingProxy {
    fn contract(&self) -> &str {
        &self.contract
    }

    fn kind(&self) -> ObjectKind {
        self.inner.kind()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn satisfies(&self, contract: &str) -> bool {
        self.contract == contract || self.inner.satisfies(contract)
    }

    fn delegate(&self) -> Option<ObjectRef> {
        Some(Arc::clone(&self.inner))
    }
}

/// The proxy held by `value`, if it holds one.
pub fn as_proxy(value: &Value) -> Option<&RecordingProxy> {
    value.as_object().and_then(downcast_object::<RecordingProxy>)
}
