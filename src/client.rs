//! Multiplexing RPC client.
//!
//! One connection carries any number of in-flight calls. Each call
//! registers a waiter keyed by its generated call id, hands its
//! request frame to the connection's writer task, and parks on a
//! oneshot channel; a single reader task owns the read half and routes
//! every response frame to the waiter with the matching id, so
//! responses may arrive in any order.
//!
//! Requests reach the wire through the same bounded-queue writer task
//! the server uses for responses: a caller enqueues its encoded frame
//! whole, so frames from concurrent calls never interleave, and a
//! call future dropped mid-submit (deadline, `select!`) has left
//! either a complete frame in the queue or nothing.
//!
//! The lifecycle in [`Client::connect`]:
//! 1. Dial through the transport factory (with the connect timeout)
//! 2. Split the connection; the write half goes to the writer task
//!    behind its bounded frame queue, the read half into the reader
//!    task
//! 3. Spawn the reader task
//!
//! When the reader hits a connection-fatal error it fails every
//! pending call, so no caller is left parked on a dead connection.
//!
//! # Example
//!
//! ```no_run
//! use wirecall::client::{Client, ClientOptions};
//!
//! #[derive(serde::Serialize)]
//! struct HelloArgs {
//!     name: String,
//! }
//!
//! #[derive(Default, serde::Deserialize)]
//! struct HelloReply {
//!     msg: String,
//! }
//!
//! # async fn run() -> wirecall::Result<()> {
//! let client = Client::connect("tcp", "127.0.0.1:9090", ClientOptions::default()).await?;
//!
//! let args = HelloArgs { name: "cyj".to_string() };
//! let mut reply = HelloReply::default();
//! client.call("HelloWorld", "Hello", &args, &mut reply).await?;
//! println!("{}", reply.msg);
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::ReadHalf;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::codec::{Codec, CodecRegistry, JSON_CODEC};
use crate::compress::{CompressorRegistry, GZIP_COMPRESSOR};
use crate::error::{Result, WirecallError};
use crate::outbound::{spawn_outbound_writer, OutboundQueue, DEFAULT_OUTBOUND_CAPACITY};
use crate::protocol::Message;
use crate::transport::{self, Connection};

/// Default limit on how long a dial may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Client tuning knobs.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Codec tag stamped on outgoing requests.
    pub codec_type: u8,
    /// Compressor tag stamped on outgoing requests.
    pub compressor_type: u8,
    /// Limit on connection establishment.
    pub connect_timeout: Duration,
    /// Per-call deadline. `None` waits indefinitely, which with a
    /// server that drops unroutable requests means forever; set one
    /// when calling servers you do not control.
    pub call_timeout: Option<Duration>,
    /// Capacity of the request frame queue. Callers block submitting
    /// once it fills.
    pub outbound_capacity: usize,
    /// Codecs known to this client, by tag.
    pub codecs: CodecRegistry,
    /// Compressors known to this client, by tag.
    pub compressors: CompressorRegistry,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            codec_type: JSON_CODEC,
            compressor_type: GZIP_COMPRESSOR,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            call_timeout: None,
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            codecs: CodecRegistry::new(),
            compressors: CompressorRegistry::new(),
        }
    }
}

/// A response routed back to its waiting caller: the codec named by
/// the response header plus the decompressed payload.
type ReplySender = oneshot::Sender<Result<(Codec, Bytes)>>;

struct Inner {
    options: ClientOptions,
    /// Waiters by call id. Entries are removed by whichever side gets
    /// there first: the reader on delivery, or the caller's guard on
    /// cancellation.
    pending: Mutex<HashMap<String, ReplySender>>,
    /// Sender side of the frame queue. Taken, and thereby dropped, on
    /// close or reader teardown so the writer task drains and exits.
    outbound: Mutex<Option<OutboundQueue>>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
    closed: AtomicBool,
}

impl Inner {
    fn pending_map(&self) -> MutexGuard<'_, HashMap<String, ReplySender>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn outbound_queue(&self) -> Option<OutboundQueue> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn take_outbound(&self) -> Option<OutboundQueue> {
        self.outbound
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn take_writer_task(&self) -> Option<JoinHandle<Result<()>>> {
        self.writer_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

/// Removes the pending entry unless the reader already delivered it.
///
/// Dropping an in-flight call future (caller cancellation, call
/// timeout) runs this and unregisters the waiter, so a response
/// arriving later finds no entry and is dropped.
struct PendingGuard<'a> {
    inner: &'a Inner,
    call_id: &'a str,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.inner.pending_map().remove(self.call_id);
    }
}

/// Handle to one multiplexed connection.
///
/// Cloning is cheap and every clone shares the connection.
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("closed", &self.is_closed())
            .field("pending", &self.inner.pending_map().len())
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Dial `addr` over `protocol` and start the reader task.
    pub async fn connect(protocol: &str, addr: &str, options: ClientOptions) -> Result<Self> {
        // 1. Dial with the configured timeout.
        let conn = transport::connect(protocol, addr, Some(options.connect_timeout)).await?;
        tracing::debug!(%protocol, %addr, "connected");

        // 2. Split: callers feed the writer task through its queue,
        //    the reader task owns the read half.
        let (read_half, write_half) = conn.into_split();
        let (queue, writer_task) = spawn_outbound_writer(write_half, options.outbound_capacity);

        let inner = Arc::new(Inner {
            options,
            pending: Mutex::new(HashMap::new()),
            outbound: Mutex::new(Some(queue)),
            writer_task: Mutex::new(Some(writer_task)),
            closed: AtomicBool::new(false),
        });

        // 3. Spawn the reader task.
        tokio::spawn(read_loop(read_half, Arc::clone(&inner)));

        Ok(Self { inner })
    }

    /// Call `service.method` with `args`, decoding the response into
    /// `reply`.
    ///
    /// Safe to invoke concurrently from any number of tasks; responses
    /// are matched by call id, not by order. Dropping the returned
    /// future before it resolves unregisters the waiter and leaves at
    /// most one complete request frame behind, never a partial one.
    ///
    /// # Errors
    ///
    /// [`WirecallError::InvalidCall`] for an empty service or method
    /// name, [`WirecallError::ConnectionClosed`] once the connection is
    /// closed or failed, [`WirecallError::Timeout`] when a configured
    /// call deadline elapses first.
    pub async fn call<A, R>(
        &self,
        service: &str,
        method: &str,
        args: &A,
        reply: &mut R,
    ) -> Result<()>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        match self.inner.options.call_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.do_call(service, method, args, reply)).await
                {
                    Ok(result) => result,
                    // Dropping the call future unregistered the waiter.
                    Err(_) => Err(WirecallError::Timeout),
                }
            }
            None => self.do_call(service, method, args, reply).await,
        }
    }

    async fn do_call<A, R>(
        &self,
        service: &str,
        method: &str,
        args: &A,
        reply: &mut R,
    ) -> Result<()>
    where
        A: Serialize,
        R: DeserializeOwned,
    {
        if service.is_empty() {
            return Err(WirecallError::InvalidCall("service name is empty".to_string()));
        }
        if method.is_empty() {
            return Err(WirecallError::InvalidCall("method name is empty".to_string()));
        }
        let queue = match self.inner.outbound_queue() {
            Some(queue) => queue,
            None => return Err(WirecallError::ConnectionClosed),
        };
        if self.is_closed() {
            return Err(WirecallError::ConnectionClosed);
        }

        let options = &self.inner.options;
        let codec = options.codecs.get(options.codec_type)?;
        let compressor = options.compressors.get(options.compressor_type)?;

        let encoded = codec.encode(args)?;
        let compressed = compressor.compress(&encoded)?;

        let call_id = uuid::Uuid::new_v4().to_string();
        let request = Message::new(
            options.codec_type,
            options.compressor_type,
            call_id.clone(),
            service.to_string(),
            method.to_string(),
            Bytes::from(compressed),
        )?;
        let frame = request.encode();

        // Register the waiter before the frame can reach the wire, so
        // even an instant response finds it.
        let (tx, rx) = oneshot::channel();
        self.inner.pending_map().insert(call_id.clone(), tx);
        let _guard = PendingGuard {
            inner: &self.inner,
            call_id: &call_id,
        };
        // The reader drains the map when the connection dies; an entry
        // inserted after that drain would wait forever, so re-check.
        if self.is_closed() {
            return Err(WirecallError::ConnectionClosed);
        }

        // The frame is handed to the writer task whole; if this future
        // is dropped while waiting for queue space, none of it reaches
        // the wire.
        queue
            .send(frame)
            .await
            .map_err(|_| WirecallError::ConnectionClosed)?;

        let (codec, payload) = rx
            .await
            .map_err(|_| WirecallError::ConnectionClosed)??;
        *reply = codec.decode(&payload)?;
        Ok(())
    }

    /// Whether the connection has been closed or has failed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the connection. Subsequent calls fail with
    /// [`WirecallError::ConnectionClosed`], and so do calls still in
    /// flight.
    ///
    /// Frames already queued are flushed before the write side shuts
    /// down.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        // Fail the waiters first: their calls resolve and release
        // their queue handles, letting the writer drain.
        let drained: Vec<ReplySender> = self
            .inner
            .pending_map()
            .drain()
            .map(|(_, sender)| sender)
            .collect();
        for sender in drained {
            let _ = sender.send(Err(WirecallError::ConnectionClosed));
        }
        // Dropping the stored sender lets the writer drain the queue,
        // shut the write side down, and exit.
        drop(self.inner.take_outbound());
        if let Some(task) = self.inner.take_writer_task() {
            match task.await {
                Ok(result) => result?,
                Err(error) => tracing::debug!(%error, "writer task aborted"),
            }
        }
        Ok(())
    }
}

/// Reader task: routes response frames to waiters until the
/// connection dies, then fails whoever is still parked.
async fn read_loop(mut reader: ReadHalf<Connection>, inner: Arc<Inner>) {
    let reason = loop {
        let response = match Message::read_from(&mut reader).await {
            Ok(response) => response,
            Err(error) => break error,
        };

        let sender = match inner.pending_map().remove(&response.call_id) {
            Some(sender) => sender,
            None => {
                // Cancelled, timed out, or never ours.
                tracing::debug!(call_id = %response.call_id, "dropping unmatched response");
                continue;
            }
        };

        // A response that cannot be prepared fails its own caller and
        // nobody else.
        let result = prepare_response(&inner, &response);
        if sender.send(result).is_err() {
            tracing::trace!(call_id = %response.call_id, "caller gone, dropping response");
        }
    };

    inner.closed.store(true, Ordering::Release);
    let drained: Vec<(String, ReplySender)> = inner.pending_map().drain().collect();
    match &reason {
        WirecallError::ConnectionClosed => {
            tracing::debug!(pending = drained.len(), "connection closed")
        }
        error => tracing::warn!(pending = drained.len(), %error, "connection failed"),
    }
    for (_, sender) in drained {
        let _ = sender.send(Err(WirecallError::ConnectionClosed));
    }
    // Without the stored sender the writer drains whatever in-flight
    // callers still submit, then exits on its own.
    drop(inner.take_outbound());
}

/// Resolve the response's own tags and decompress its payload; the
/// typed decode happens on the calling task.
fn prepare_response(inner: &Inner, response: &Message) -> Result<(Codec, Bytes)> {
    let codec = inner.options.codecs.get(response.header.codec_type)?;
    let compressor = inner.options.compressors.get(response.header.compressor_type)?;
    let payload = compressor.decompress(&response.payload)?;
    Ok((codec, Bytes::from(payload)))
}
