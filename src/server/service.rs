//! Service definition and typed method registration.
//!
//! A [`Service`] is an explicit dispatch table: each method is
//! registered by name with a typed handler, and the builder erases the
//! handler behind a byte-level invocation handle. The handler shape,
//! a receiver plus mutable argument and reply, is enforced by the
//! builder's type parameters, so a method that would not be callable
//! cannot be registered in the first place.
//!
//! # Example
//!
//! ```
//! use wirecall::server::Service;
//!
//! #[derive(serde::Deserialize)]
//! struct AddArgs {
//!     a: i64,
//!     b: i64,
//! }
//!
//! #[derive(Default, serde::Serialize)]
//! struct AddReply {
//!     sum: i64,
//! }
//!
//! struct Arith;
//!
//! let service = Service::builder(Arith)
//!     .method("Add", |_arith: &Arith, args: &mut AddArgs, reply: &mut AddReply| {
//!         reply.sum = args.a + args.b;
//!         Ok(())
//!     })
//!     .build()?;
//! assert_eq!(service.name(), "Arith");
//! # Ok::<(), wirecall::WirecallError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::Codec;
use crate::error::{MethodResult, Result, WirecallError};

/// Byte-level entry point for one registered method.
trait Handler<S>: Send + Sync {
    fn call(&self, receiver: &S, codec: Codec, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Adapter giving a typed handler the byte-level calling convention:
/// decode the argument with the request's codec, allocate a default
/// reply, invoke, encode the reply.
struct TypedMethod<A, R, F> {
    handler: F,
    _phantom: PhantomData<fn(A) -> R>,
}

impl<A, R, F> TypedMethod<A, R, F> {
    fn new(handler: F) -> Self {
        Self {
            handler,
            _phantom: PhantomData,
        }
    }
}

impl<S, A, R, F> Handler<S> for TypedMethod<A, R, F>
where
    S: Send + Sync + 'static,
    A: DeserializeOwned + Send + 'static,
    R: Serialize + Default + Send + 'static,
    F: Fn(&S, &mut A, &mut R) -> MethodResult + Send + Sync + 'static,
{
    fn call(&self, receiver: &S, codec: Codec, payload: &[u8]) -> Result<Vec<u8>> {
        let mut args: A = codec.decode(payload)?;
        let mut reply = R::default();
        (self.handler)(receiver, &mut args, &mut reply)?;
        codec.encode(&reply)
    }
}

/// A method with its receiver bound in, keyed by name in the table.
type BoundMethod = Box<dyn Fn(Codec, &[u8]) -> Result<Vec<u8>> + Send + Sync>;

/// A named dispatch table of methods sharing one receiver.
pub struct Service {
    name: String,
    methods: HashMap<String, BoundMethod>,
}

impl Service {
    /// Start a builder whose service name is derived from the
    /// receiver's type name.
    ///
    /// The derived name is the bare type name without its module path.
    /// It must start with an uppercase letter or [`ServiceBuilder::build`]
    /// fails; use [`Service::builder_named`] to pick a name explicitly.
    pub fn builder<S>(receiver: S) -> ServiceBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        ServiceBuilder {
            receiver: Arc::new(receiver),
            name: None,
            methods: HashMap::new(),
        }
    }

    /// Start a builder with an explicit service name.
    pub fn builder_named<S>(receiver: S, name: &str) -> ServiceBuilder<S>
    where
        S: Send + Sync + 'static,
    {
        ServiceBuilder {
            receiver: Arc::new(receiver),
            name: Some(name.to_string()),
            methods: HashMap::new(),
        }
    }

    /// The name callers address this service by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registered method names, sorted.
    pub fn method_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Invoke a method with an already-decompressed payload.
    pub(crate) fn invoke(&self, method: &str, codec: Codec, payload: &[u8]) -> Result<Vec<u8>> {
        match self.methods.get(method) {
            Some(bound) => bound(codec, payload),
            None => Err(WirecallError::MethodNotFound(format!(
                "{}.{method}",
                self.name
            ))),
        }
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.method_names())
            .finish()
    }
}

/// Accumulates typed method registrations for one receiver.
pub struct ServiceBuilder<S> {
    receiver: Arc<S>,
    name: Option<String>,
    methods: HashMap<String, BoundMethod>,
}

impl<S> ServiceBuilder<S>
where
    S: Send + Sync + 'static,
{
    /// Register a method handler under `name`.
    ///
    /// The handler receives the shared receiver, the decoded argument
    /// and a default-initialized reply to fill in. Registering the same
    /// name twice replaces the earlier handler.
    pub fn method<A, R, F>(mut self, name: &str, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Default + Send + 'static,
        F: Fn(&S, &mut A, &mut R) -> MethodResult + Send + Sync + 'static,
    {
        let receiver = Arc::clone(&self.receiver);
        let typed = TypedMethod::new(handler);
        let bound: BoundMethod =
            Box::new(move |codec, payload| typed.call(receiver.as_ref(), codec, payload));
        self.methods.insert(name.to_string(), bound);
        self
    }

    /// Validate the registration table and produce the service.
    ///
    /// # Errors
    ///
    /// [`WirecallError::InvalidServiceName`] when the explicit name is
    /// empty or the derived name does not start with an uppercase
    /// letter; [`WirecallError::NoExportedMethods`] when no method was
    /// registered.
    pub fn build(self) -> Result<Service> {
        let name = match self.name {
            Some(name) => {
                if name.is_empty() {
                    return Err(WirecallError::InvalidServiceName(
                        "service name is empty".to_string(),
                    ));
                }
                name
            }
            None => derived_service_name::<S>()?,
        };
        if self.methods.is_empty() {
            return Err(WirecallError::NoExportedMethods(name));
        }
        Ok(Service {
            name,
            methods: self.methods,
        })
    }
}

/// Bare receiver type name, checked for an exported spelling.
fn derived_service_name<S>() -> Result<String> {
    let full = std::any::type_name::<S>();
    let base = full.split('<').next().unwrap_or(full);
    let name = base.rsplit("::").next().unwrap_or(base);
    let exported = name.chars().next().map(char::is_uppercase).unwrap_or(false);
    if !exported {
        return Err(WirecallError::InvalidServiceName(format!(
            "derived service name {name:?} is not exported"
        )));
    }
    Ok(name.to_string())
}
