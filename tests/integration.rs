//! End-to-end tests over real sockets: client, server, registry,
//! heartbeat and discovery working together.

use std::time::Duration;

use wirecall::balance::RoundRobin;
use wirecall::client::{Client, ClientOptions};
use wirecall::codec::{BYTE_CODEC, MSGPACK_CODEC};
use wirecall::discovery::{Discovery, RegistryDiscovery, StaticDiscovery};
use wirecall::registry::{start_heartbeat, RegistryOptions, RegistryServer, DEFAULT_REGISTRY_PATH};
use wirecall::server::ServerHandle;
use wirecall::{Server, ServerEntry, Service, WirecallError};

#[derive(serde::Serialize, serde::Deserialize)]
struct HelloArgs {
    name: String,
}

#[derive(Default, serde::Serialize, serde::Deserialize)]
struct HelloReply {
    msg: String,
}

struct HelloWorld;

fn hello_service() -> Service {
    Service::builder(HelloWorld)
        .method(
            "Hello",
            |_hw: &HelloWorld, args: &mut HelloArgs, reply: &mut HelloReply| {
                reply.msg = format!("hello {}", args.name);
                Ok(())
            },
        )
        .method(
            "Echo",
            |_hw: &HelloWorld, args: &mut String, reply: &mut String| {
                *reply = std::mem::take(args);
                Ok(())
            },
        )
        .build()
        .unwrap()
}

async fn start_hello_server() -> ServerHandle {
    let mut server = Server::new();
    server.register(hello_service()).unwrap();
    server.start("tcp", "127.0.0.1:0").await.unwrap()
}

/// The canonical call: `HelloWorld.Hello` with JSON and gzip defaults.
#[tokio::test]
async fn test_hello_world_end_to_end() {
    let handle = start_hello_server().await;
    let client = Client::connect("tcp", handle.local_addr(), ClientOptions::default())
        .await
        .unwrap();

    let args = HelloArgs {
        name: "cyj".to_string(),
    };
    let mut reply = HelloReply::default();
    client.call("HelloWorld", "Hello", &args, &mut reply).await.unwrap();
    assert_eq!(reply.msg, "hello cyj");

    client.close().await.unwrap();
    handle.shutdown();
}

/// Service names are matched exactly. A misspelled name gets no error
/// frame back; the caller's own deadline is the only signal.
#[tokio::test]
async fn test_misspelled_service_name_times_out() {
    let handle = start_hello_server().await;
    let options = ClientOptions {
        call_timeout: Some(Duration::from_millis(300)),
        ..ClientOptions::default()
    };
    let client = Client::connect("tcp", handle.local_addr(), options).await.unwrap();

    let args = HelloArgs {
        name: "cyj".to_string(),
    };
    let mut reply = HelloReply::default();
    let err = client
        .call("helloworld", "Hello", &args, &mut reply)
        .await
        .unwrap_err();
    assert!(matches!(err, WirecallError::Timeout));

    // The same connection still serves correctly addressed calls.
    client.call("HelloWorld", "Hello", &args, &mut reply).await.unwrap();
    assert_eq!(reply.msg, "hello cyj");
    handle.shutdown();
}

/// Many concurrent calls share one connection and each gets its own
/// answer back.
#[tokio::test]
async fn test_concurrent_calls_multiplex_over_one_connection() {
    let handle = start_hello_server().await;
    let client = Client::connect("tcp", handle.local_addr(), ClientOptions::default())
        .await
        .unwrap();

    let mut tasks = Vec::new();
    for i in 0..32 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let args = HelloArgs {
                name: format!("caller-{i}"),
            };
            let mut reply = HelloReply::default();
            client.call("HelloWorld", "Hello", &args, &mut reply).await.unwrap();
            assert_eq!(reply.msg, format!("hello caller-{i}"));
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    handle.shutdown();
}

/// A payload measured in megabytes survives the whole pipeline.
#[tokio::test]
async fn test_multi_megabyte_payload_roundtrip() {
    let handle = start_hello_server().await;
    let client = Client::connect("tcp", handle.local_addr(), ClientOptions::default())
        .await
        .unwrap();

    let big = "wirecall ".repeat(256 * 1024);
    assert!(big.len() > 2 * 1024 * 1024);
    let mut reply = String::new();
    client.call("HelloWorld", "Echo", &big, &mut reply).await.unwrap();
    assert_eq!(reply, big);
    handle.shutdown();
}

/// The byte codec moves raw buffers without a serialization format.
#[tokio::test]
async fn test_byte_codec_end_to_end() {
    struct Blob;
    let service = Service::builder(Blob)
        .method("Reverse", |_b: &Blob, args: &mut Vec<u8>, reply: &mut Vec<u8>| {
            *reply = args.iter().rev().copied().collect();
            Ok(())
        })
        .build()
        .unwrap();
    let mut server = Server::new();
    server.register(service).unwrap();
    let handle = server.start("tcp", "127.0.0.1:0").await.unwrap();

    let options = ClientOptions {
        codec_type: BYTE_CODEC,
        ..ClientOptions::default()
    };
    let client = Client::connect("tcp", handle.local_addr(), options).await.unwrap();

    let mut reply: Vec<u8> = Vec::new();
    client
        .call("Blob", "Reverse", &vec![1u8, 2, 3, 4], &mut reply)
        .await
        .unwrap();
    assert_eq!(reply, vec![4u8, 3, 2, 1]);
    handle.shutdown();
}

/// MessagePack works wherever JSON does, selected purely by tag.
#[tokio::test]
async fn test_msgpack_codec_end_to_end() {
    let handle = start_hello_server().await;
    let options = ClientOptions {
        codec_type: MSGPACK_CODEC,
        ..ClientOptions::default()
    };
    let client = Client::connect("tcp", handle.local_addr(), options).await.unwrap();

    let args = HelloArgs {
        name: "pack".to_string(),
    };
    let mut reply = HelloReply::default();
    client.call("HelloWorld", "Hello", &args, &mut reply).await.unwrap();
    assert_eq!(reply.msg, "hello pack");
    handle.shutdown();
}

/// Full service lifecycle: announce over heartbeat, discover through
/// the registry, dial the discovered address, call.
#[tokio::test]
async fn test_registry_heartbeat_discovery_end_to_end() {
    let registry = RegistryServer::bind("127.0.0.1:0").await.unwrap();
    let registry_addr = registry.local_addr().unwrap();
    tokio::spawn(registry.serve());
    let registry_url = format!("http://{registry_addr}{DEFAULT_REGISTRY_PATH}");

    let handle = start_hello_server().await;
    let entry = ServerEntry::new("tcp", handle.local_addr());
    let beater = start_heartbeat(&registry_url, entry, Some(Duration::from_millis(100)))
        .await
        .unwrap();

    let discovery =
        RegistryDiscovery::with_options(&registry_url, Duration::ZERO, Box::new(RoundRobin::new()))
            .unwrap();
    let discovered = discovery.get().await.unwrap();
    assert_eq!(discovered.address, handle.local_addr());

    let client = Client::connect(
        &discovered.protocol,
        &discovered.address,
        ClientOptions::default(),
    )
    .await
    .unwrap();
    let args = HelloArgs {
        name: "dns".to_string(),
    };
    let mut reply = HelloReply::default();
    client.call("HelloWorld", "Hello", &args, &mut reply).await.unwrap();
    assert_eq!(reply.msg, "hello dns");

    beater.abort();
    handle.shutdown();
}

/// Without a heartbeat an entry ages out of the registry, lazily, on
/// the next enumeration after its TTL.
#[tokio::test]
async fn test_registry_entry_expires_without_heartbeat() {
    let options = RegistryOptions {
        ttl: Duration::from_millis(150),
        ..RegistryOptions::default()
    };
    let registry = RegistryServer::bind_with("127.0.0.1:0", options).await.unwrap();
    let registry_addr = registry.local_addr().unwrap();
    tokio::spawn(registry.serve());
    let registry_url = format!("http://{registry_addr}{DEFAULT_REGISTRY_PATH}");

    let entry = ServerEntry::new("tcp", "127.0.0.1:4000");
    reqwest::Client::new()
        .post(&registry_url)
        .json(&entry)
        .send()
        .await
        .unwrap()
        .error_for_status()
        .unwrap();

    let discovery =
        RegistryDiscovery::with_options(&registry_url, Duration::ZERO, Box::new(RoundRobin::new()))
            .unwrap();
    assert_eq!(discovery.get_all().await.unwrap(), vec![entry]);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        discovery.get().await,
        Err(WirecallError::NoAvailableServers)
    ));
}

/// Round-robin discovery alternates between two live servers.
#[tokio::test]
async fn test_round_robin_alternates_between_servers() {
    struct WhoAmI {
        label: String,
    }

    #[derive(Default, serde::Serialize, serde::Deserialize)]
    struct Label {
        label: String,
    }

    async fn start_labeled(label: &str) -> ServerHandle {
        let service = Service::builder_named(
            WhoAmI {
                label: label.to_string(),
            },
            "WhoAmI",
        )
        .method("Tell", |who: &WhoAmI, _args: &mut (), reply: &mut Label| {
            reply.label = who.label.clone();
            Ok(())
        })
        .build()
        .unwrap();
        let mut server = Server::new();
        server.register(service).unwrap();
        server.start("tcp", "127.0.0.1:0").await.unwrap()
    }

    let first = start_labeled("alpha").await;
    let second = start_labeled("beta").await;
    let discovery = StaticDiscovery::new(vec![
        ServerEntry::new("tcp", first.local_addr()),
        ServerEntry::new("tcp", second.local_addr()),
    ]);

    let mut seen = Vec::new();
    for _ in 0..4 {
        let entry = discovery.get().await.unwrap();
        let client = Client::connect(&entry.protocol, &entry.address, ClientOptions::default())
            .await
            .unwrap();
        let mut reply = Label::default();
        client.call("WhoAmI", "Tell", &(), &mut reply).await.unwrap();
        seen.push(reply.label);
        client.close().await.unwrap();
    }
    assert_eq!(seen, vec!["alpha", "beta", "alpha", "beta"]);

    first.shutdown();
    second.shutdown();
}

/// The same stack runs over a Unix domain socket.
#[cfg(unix)]
#[tokio::test]
async fn test_unix_socket_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wirecall.sock");
    let path = path.to_str().unwrap();

    let mut server = Server::new();
    server.register(hello_service()).unwrap();
    let handle = server.start("unix", path).await.unwrap();

    let client = Client::connect("unix", path, ClientOptions::default()).await.unwrap();
    let args = HelloArgs {
        name: "sock".to_string(),
    };
    let mut reply = HelloReply::default();
    client.call("HelloWorld", "Hello", &args, &mut reply).await.unwrap();
    assert_eq!(reply.msg, "hello sock");

    client.close().await.unwrap();
    handle.shutdown();
}
