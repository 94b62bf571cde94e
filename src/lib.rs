//! # wirecall
//!
//! A compact binary RPC framework over TCP and Unix sockets.
//!
//! Requests and responses share one frame format: a fixed 20-byte
//! header carrying a sentinel, version, codec and compressor tags and
//! four section lengths, followed by the call id, service name, method
//! name and payload. Payloads are serialized by a pluggable codec and
//! wrapped in a pluggable compressor, both named per frame by tag.
//!
//! ## Pieces
//!
//! - **Client** ([`client`]): multiplexes any number of concurrent
//!   calls over one connection, correlating responses by call id.
//! - **Server** ([`server`]): dispatches each request frame to a
//!   registered service method on its own task; responses funnel
//!   through a bounded per-connection writer queue.
//! - **Registry** ([`registry`]): a small HTTP service where servers
//!   announce themselves with TTL'd heartbeats.
//! - **Discovery** ([`discovery`]): client-side server selection over
//!   a static list or a registry-backed cache, with pluggable load
//!   balancing ([`balance`]).
//!
//! ## Example
//!
//! ```no_run
//! use wirecall::client::{Client, ClientOptions};
//! use wirecall::server::{Server, Service};
//!
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct HelloArgs {
//!     name: String,
//! }
//!
//! #[derive(Default, serde::Serialize, serde::Deserialize)]
//! struct HelloReply {
//!     msg: String,
//! }
//!
//! struct HelloWorld;
//!
//! #[tokio::main]
//! async fn main() -> wirecall::Result<()> {
//!     let service = Service::builder(HelloWorld)
//!         .method("Hello", |_s: &HelloWorld, args: &mut HelloArgs, reply: &mut HelloReply| {
//!             reply.msg = format!("hello {}", args.name);
//!             Ok(())
//!         })
//!         .build()?;
//!
//!     let mut server = Server::new();
//!     server.register(service)?;
//!     let handle = server.start("tcp", "127.0.0.1:0").await?;
//!
//!     let client = Client::connect("tcp", handle.local_addr(), ClientOptions::default()).await?;
//!     let args = HelloArgs { name: "cyj".to_string() };
//!     let mut reply = HelloReply::default();
//!     client.call("HelloWorld", "Hello", &args, &mut reply).await?;
//!     assert_eq!(reply.msg, "hello cyj");
//!
//!     client.close().await?;
//!     handle.shutdown();
//!     Ok(())
//! }
//! ```

pub mod balance;
pub mod client;
pub mod codec;
pub mod compress;
pub mod discovery;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

mod outbound;

pub use client::{Client, ClientOptions};
pub use error::{MethodError, MethodResult, Result, WirecallError};
pub use registry::ServerEntry;
pub use server::{Server, ServerOptions, Service};
