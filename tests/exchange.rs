use std::{
    io::Write,
    net::{SocketAddr, TcpStream},
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use docwire::{
    DocumentStore, MemoryStore,
    protocol::{Client, ClientError, Payload, Request, RequestContent, Shutdown, StorageServer},
    storage::Filter,
};
use serde_json::{Value, json};

struct Running {
    address: SocketAddr,
    shutdown: Shutdown,
    handle: JoinHandle<MemoryStore>,
}

impl Running {
    fn start() -> Self {
        let server = StorageServer::bind("127.0.0.1:0".parse().unwrap(), MemoryStore::new())
            .unwrap();
        let address = server.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let handle = {
            let shutdown = shutdown.clone();
            thread::spawn(move || server.listen(&shutdown).unwrap())
        };
        Running {
            address,
            shutdown,
            handle,
        }
    }

    fn send(&self, content: Value) -> Value {
        let content: RequestContent = serde_json::from_value(content).unwrap();
        match Client::new(self.address).send(content.into()).unwrap() {
            Payload::Json(response) => response,
            Payload::Binary(bytes) => panic!("unexpected binary response {bytes:?}"),
        }
    }

    fn stop(self) -> MemoryStore {
        self.shutdown.trigger();
        self.handle.join().unwrap()
    }
}

#[test]
fn test_action_round_trip() {
    let server = Running::start();

    assert_eq!(
        server.send(json!({"action": "test"})),
        json!({"results": {"Success": "Your client is communicating with the server."}})
    );
    server.stop();
}

#[test]
fn send_returns_as_soon_as_response_arrives() {
    let server = Running::start();

    // Well under the client's one second poll timeout.
    for _ in 0..3 {
        let started = Instant::now();
        server.send(json!({"action": "test"}));
        assert!(started.elapsed() < Duration::from_millis(500));
    }
    server.stop();
}

#[test]
fn inserted_document_is_found_by_key() {
    let server = Running::start();

    let inserted = server.send(json!({
        "action": "insert",
        "collection": "stockdata",
        "data": "{\"Symbol\": \"GOOG\", \"Year\": 2018}",
    }));
    assert_eq!(inserted["results"]["success"], json!(true));
    let id = inserted["results"]["result_id"].clone();

    let found = server.send(json!({
        "action": "searchkey",
        "collection": "stockdata",
        "key": "Symbol",
        "value": "GOOG",
    }));
    assert_eq!(found["results"]["count"], json!(1));
    assert_eq!(found["results"]["data"][0]["_id"], id);

    let missing = server.send(json!({
        "action": "searchkey",
        "collection": "stockdata",
        "key": "Symbol",
        "value": "AAPL",
    }));
    assert_eq!(
        missing,
        json!({"results": {
            "success": false,
            "collection": "stockdata",
            "message": "No results with params {'Symbol': 'AAPL'} ",
        }})
    );

    let mut store = server.stop();
    assert_eq!(store.find("stockdata", &Filter::all()).unwrap().len(), 1);
}

#[test]
fn binary_request_gets_binary_echo() {
    let server = Running::start();

    let request = Request::binary("binary/custom-client-binary-type", b"abcdefghijklmnop".to_vec());
    let response = Client::new(server.address).send(request).unwrap();

    assert_eq!(
        response,
        Payload::Binary(b"First 10 bytes of request: abcdefghij".to_vec())
    );
    server.stop();
}

#[test]
fn malformed_connection_does_not_disturb_others() {
    let server = Running::start();

    let mut rogue = TcpStream::connect(server.address).unwrap();
    let header = br#"{"byteorder": "big"}"#;
    rogue
        .write_all(&(header.len() as u16).to_be_bytes())
        .unwrap();
    rogue.write_all(header).unwrap();

    let mut idle = TcpStream::connect(server.address).unwrap();
    idle.write_all(&[0]).unwrap();

    assert_eq!(
        server.send(json!({"action": "test"}))["results"]["Success"],
        json!("Your client is communicating with the server.")
    );
    drop(rogue);
    drop(idle);
    server.stop();
}

#[test]
fn refused_connection_is_reported() {
    let address = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };

    let result = Client::new(address).send(RequestContent::new("test").into());
    assert!(matches!(
        result,
        Err(ClientError::Connection(_)) | Err(ClientError::Io(_))
    ));
}

#[test]
fn shutdown_stops_an_idle_server() {
    let server = Running::start();
    let store = server.stop();

    assert_eq!(store.len("anything"), 0);
}
