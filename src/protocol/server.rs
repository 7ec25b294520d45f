use std::{io, net::SocketAddr};

use log::{info, warn};
use mio::net::{TcpListener, TcpStream};
use thiserror::Error;

use crate::{query, storage::DocumentStore};

use super::{
    Response,
    codec::{FrameError, Payload, encode_frame, encode_json},
    connection::{Connection, ConnectionError, Phase, Role, drive},
    multiplexer::{Interest, LISTENER, Multiplexer, WAKE},
    shutdown::Shutdown,
};

const BINARY_CONTENT_TYPE: &str = "binary/custom-server-binary-type";
const BINARY_PREVIEW: usize = 10;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server IO error: {0}")]
    Io(#[from] io::Error),
}

/// Server side of a connection: answers one request from the store.
pub struct Responder {
    peer: SocketAddr,
}

impl Responder {
    pub fn new(peer: SocketAddr) -> Self {
        Self { peer }
    }
}

impl Role for Responder {
    type Context = dyn DocumentStore;
    const INITIAL: Phase = Phase::AwaitingHeaderLength;

    fn opening(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        Ok(None)
    }

    fn on_message(
        &mut self,
        message: Payload,
        store: &mut Self::Context,
    ) -> Result<Option<Vec<u8>>, ConnectionError> {
        let frame = match message {
            Payload::Json(request) => {
                info!("received request {request} from {}", self.peer);
                let response = Response::from(query::execute(store, &request));
                encode_json(&response)?
            }
            Payload::Binary(bytes) => {
                info!("received {} byte binary request from {}", bytes.len(), self.peer);
                binary_reply(&bytes)?
            }
        };
        Ok(Some(frame))
    }
}

fn binary_reply(request: &[u8]) -> Result<Vec<u8>, FrameError> {
    let mut payload = b"First 10 bytes of request: ".to_vec();
    payload.extend_from_slice(&request[..request.len().min(BINARY_PREVIEW)]);
    encode_frame(&payload, BINARY_CONTENT_TYPE, "binary")
}

type ServerConnection = Connection<TcpStream, Responder>;

pub struct StorageServer<S> {
    listener: TcpListener,
    store: S,
}

impl<S: DocumentStore + 'static> StorageServer<S> {
    /// Binds the listening socket. Port 0 picks a free port.
    pub fn bind(address: SocketAddr, store: S) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(address)?;
        Ok(Self { listener, store })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serves connections until `shutdown` is triggered, then closes every
    /// open connection and hands the store back.
    pub fn listen(mut self, shutdown: &Shutdown) -> Result<S, ServerError> {
        let mut multiplexer: Multiplexer<ServerConnection> = Multiplexer::new()?;
        shutdown.attach(multiplexer.waker()?);
        multiplexer.watch(&mut self.listener, LISTENER, Interest::Read)?;
        info!("listening on {}", self.listener.local_addr()?);

        while !shutdown.is_triggered() {
            for (token, readiness) in multiplexer.poll(None)? {
                match token {
                    WAKE => {}
                    LISTENER => self.accept(&mut multiplexer),
                    token => {
                        drive(&mut multiplexer, token, readiness, &mut self.store);
                    }
                }
            }
        }

        info!(
            "caught interrupt, closing {} open connections",
            multiplexer.len()
        );
        for connection in multiplexer.drain() {
            info!("closing connection to {}", connection.peer());
        }
        Ok(self.store)
    }

    fn accept(&mut self, multiplexer: &mut Multiplexer<ServerConnection>) {
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    info!("accepted connection from {peer}");
                    let connection = Connection::new(stream, peer, Responder::new(peer));
                    let interest = connection.interest();
                    if let Err(e) = multiplexer.register(connection, interest) {
                        warn!("failed to register connection from {peer}: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("broken connection: {e:?}");
                    return;
                }
            }
        }
    }
}
