//! RPC server: connection handling and request dispatch.
//!
//! Each accepted connection is split in two. The read half runs a loop
//! that decodes one request frame at a time and spawns a worker task
//! per request, so a slow method never holds up the frames behind it.
//! The write half is owned by a single writer task fed through a
//! bounded frame queue that workers submit finished responses to.
//!
//! A request that cannot be dispatched (unknown codec or compressor
//! tag, unregistered service, unknown method, undecodable argument,
//! failing handler) is logged and dropped without a response; the
//! caller learns about it by timing out. Malformed framing is
//! different: it kills the connection.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::codec::CodecRegistry;
use crate::compress::CompressorRegistry;
use crate::error::{Result, WirecallError};
use crate::protocol::Message;
use crate::transport::{self, Connection, Listener};

mod service;

pub use crate::outbound::DEFAULT_OUTBOUND_CAPACITY;
pub use service::{Service, ServiceBuilder};

use crate::outbound::{spawn_outbound_writer, OutboundQueue};

/// Server tuning knobs.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Capacity of each connection's response queue. Workers block
    /// submitting once it fills.
    pub outbound_capacity: usize,
    /// Codecs accepted from clients, by tag.
    pub codecs: CodecRegistry,
    /// Compressors accepted from clients, by tag.
    pub compressors: CompressorRegistry,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            codecs: CodecRegistry::new(),
            compressors: CompressorRegistry::new(),
        }
    }
}

/// An RPC server hosting a set of named services.
///
/// Services are registered up front; the table is frozen when
/// [`Server::start`] hands it to the dispatch workers.
///
/// # Example
///
/// ```no_run
/// use wirecall::server::{Server, Service};
///
/// #[derive(Default, serde::Serialize)]
/// struct Pong {
///     ok: bool,
/// }
///
/// struct Ping;
///
/// # async fn run() -> wirecall::Result<()> {
/// let service = Service::builder(Ping)
///     .method("Ping", |_ping: &Ping, _args: &mut (), reply: &mut Pong| {
///         reply.ok = true;
///         Ok(())
///     })
///     .build()?;
///
/// let mut server = Server::new();
/// server.register(service)?;
/// let handle = server.start("tcp", "127.0.0.1:9090").await?;
/// println!("listening on {}", handle.local_addr());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct Server {
    options: ServerOptions,
    services: HashMap<String, Service>,
}

impl Server {
    /// Create a server with default options.
    pub fn new() -> Self {
        Self::with_options(ServerOptions::default())
    }

    /// Create a server with explicit options.
    pub fn with_options(options: ServerOptions) -> Self {
        Self {
            options,
            services: HashMap::new(),
        }
    }

    /// Register a service under its name.
    ///
    /// # Errors
    ///
    /// [`WirecallError::ServiceAlreadyRegistered`] when a service with
    /// the same name is already registered.
    pub fn register(&mut self, service: Service) -> Result<()> {
        if self.services.contains_key(service.name()) {
            return Err(WirecallError::ServiceAlreadyRegistered(
                service.name().to_string(),
            ));
        }
        tracing::debug!(service = %service.name(), methods = ?service.method_names(), "registered service");
        self.services.insert(service.name().to_string(), service);
        Ok(())
    }

    /// Bind `addr` over `protocol` and start serving.
    pub async fn start(self, protocol: &str, addr: &str) -> Result<ServerHandle> {
        let listener = transport::bind(protocol, addr).await?;
        self.serve_listener(listener)
    }

    /// Start serving on an already-bound listener.
    pub fn serve_listener(self, listener: Listener) -> Result<ServerHandle> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "server listening");
        let shared = Arc::new(Shared {
            services: self.services,
            codecs: self.options.codecs,
            compressors: self.options.compressors,
            outbound_capacity: self.options.outbound_capacity,
        });
        let task = tokio::spawn(accept_loop(listener, shared));
        Ok(ServerHandle { local_addr, task })
    }
}

/// Dispatch state shared by every connection.
struct Shared {
    services: HashMap<String, Service>,
    codecs: CodecRegistry,
    compressors: CompressorRegistry,
    outbound_capacity: usize,
}

/// Handle to a running server.
///
/// Dropping the handle leaves the server running detached;
/// [`ServerHandle::shutdown`] stops the accept loop. Connections that
/// are already open run until their peers disconnect.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: String,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The bound address, in the transport's own format.
    pub fn local_addr(&self) -> &str {
        &self.local_addr
    }

    /// Stop accepting connections.
    pub fn shutdown(&self) {
        self.task.abort();
    }
}

async fn accept_loop(listener: Listener, shared: Arc<Shared>) {
    loop {
        match listener.accept().await {
            Ok(conn) => {
                tokio::spawn(handle_connection(conn, Arc::clone(&shared)));
            }
            Err(error) => {
                tracing::warn!(%error, "accept failed");
            }
        }
    }
}

/// Per-connection loop: read frames, fan out workers, keep the writer
/// fed until the peer goes away.
async fn handle_connection(conn: Connection, shared: Arc<Shared>) {
    let peer = conn.peer_addr().unwrap_or_else(|| "unknown".to_string());
    tracing::debug!(%peer, "connection open");

    let (mut reader, writer) = conn.into_split();
    let (queue, writer_task) = spawn_outbound_writer(writer, shared.outbound_capacity);

    loop {
        let request = match Message::read_from(&mut reader).await {
            Ok(request) => request,
            Err(WirecallError::ConnectionClosed) => {
                tracing::debug!(%peer, "connection closed by peer");
                break;
            }
            Err(error) => {
                tracing::warn!(%peer, %error, "dropping connection");
                break;
            }
        };
        let shared = Arc::clone(&shared);
        let queue = queue.clone();
        tokio::spawn(handle_request(request, shared, queue));
    }

    // In-flight workers keep their queue clones; the writer drains
    // whatever they still submit, then exits.
    drop(queue);
    match writer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(error)) => tracing::debug!(%peer, %error, "writer stopped"),
        Err(error) => tracing::debug!(%peer, %error, "writer task aborted"),
    }
}

/// One request from decode to queued response.
///
/// Every early return here is a dropped request: the failure is
/// logged, no frame goes back, and the client's own deadline is what
/// surfaces it.
async fn handle_request(request: Message, shared: Arc<Shared>, queue: OutboundQueue) {
    let compressor = match shared.compressors.get(request.header.compressor_type) {
        Ok(compressor) => compressor,
        Err(error) => {
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };
    let codec = match shared.codecs.get(request.header.codec_type) {
        Ok(codec) => codec,
        Err(error) => {
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };
    let service = match shared.services.get(&request.service_name) {
        Some(service) => service,
        None => {
            let error = WirecallError::ServiceNotFound(request.service_name.clone());
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };

    let payload = match compressor.decompress(&request.payload) {
        Ok(payload) => payload,
        Err(error) => {
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };
    let reply = match service.invoke(&request.method_name, codec, &payload) {
        Ok(reply) => reply,
        Err(error) => {
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };
    let compressed = match compressor.compress(&reply) {
        Ok(compressed) => compressed,
        Err(error) => {
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };

    let response = match Message::response_to(&request, Bytes::from(compressed)) {
        Ok(response) => response,
        Err(error) => {
            tracing::warn!(%error, call_id = %request.call_id, "dropping request");
            return;
        }
    };
    if let Err(error) = queue.send(response.encode()).await {
        tracing::warn!(%error, call_id = %request.call_id, "dropping response");
    }
}
