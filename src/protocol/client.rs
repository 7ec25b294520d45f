use std::{
    io,
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

use log::{debug, info};
use mio::net::TcpStream;
use thiserror::Error;

use super::{
    codec::Payload,
    connection::{Connection, ConnectionError, Phase, Role, drive},
    multiplexer::{Multiplexer, WAKE},
    request::Request,
    shutdown::Shutdown,
};

const POLL_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("could not resolve {host}:{port}")]
    Resolve { host: String, port: u16 },
    #[error("client IO error: {0}")]
    Io(#[from] io::Error),
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),
    #[error("connection closed without a response")]
    NoResponse,
    #[error("interrupted before a response arrived")]
    Interrupted,
}

/// Client side of a connection: sends one request and keeps the reply.
pub struct Requester {
    request: Request,
    response: Option<Payload>,
}

impl Requester {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            response: None,
        }
    }

    pub fn into_response(self) -> Option<Payload> {
        self.response
    }
}

impl Role for Requester {
    type Context = ();
    const INITIAL: Phase = Phase::AwaitingSend;

    fn opening(&mut self) -> Result<Option<Vec<u8>>, ConnectionError> {
        Ok(Some(self.request.encode()?))
    }

    fn on_message(
        &mut self,
        message: Payload,
        _: &mut (),
    ) -> Result<Option<Vec<u8>>, ConnectionError> {
        self.response = Some(message);
        Ok(None)
    }
}

type ClientConnection = Connection<TcpStream, Requester>;

/// Sends requests to one server, one connection per request.
#[derive(Debug, Clone)]
pub struct Client {
    address: SocketAddr,
    shutdown: Shutdown,
}

impl Client {
    pub fn new(address: SocketAddr) -> Self {
        Self {
            address,
            shutdown: Shutdown::new(),
        }
    }

    /// Resolves `host` and uses its first address.
    pub fn resolve(host: &str, port: u16) -> Result<Self, ClientError> {
        let resolve = || ClientError::Resolve {
            host: host.to_string(),
            port,
        };
        let address = (host, port)
            .to_socket_addrs()
            .map_err(|_| resolve())?
            .next()
            .ok_or_else(resolve)?;
        Ok(Self::new(address))
    }

    /// Uses `shutdown` to abandon a request in flight.
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Opens a connection, sends `request` and waits for the response.
    pub fn send(&self, request: Request) -> Result<Payload, ClientError> {
        let mut multiplexer: Multiplexer<ClientConnection> = Multiplexer::new()?;
        self.shutdown.attach(multiplexer.waker()?);

        info!("starting connection to {}", self.address);
        let stream = TcpStream::connect(self.address)?;
        let connection = Connection::new(stream, self.address, Requester::new(request));
        let interest = connection.interest();
        multiplexer.register(connection, interest)?;

        let mut outcome = None;
        while !multiplexer.is_empty() && !self.shutdown.is_triggered() {
            for (token, readiness) in multiplexer.poll(Some(POLL_TIMEOUT))? {
                if token == WAKE {
                    continue;
                }
                if let Some((connection, result)) = drive(&mut multiplexer, token, readiness, &mut ())
                {
                    outcome = Some(result.map(|()| connection.into_role().into_response()));
                }
            }
        }

        for connection in multiplexer.drain() {
            debug!("abandoning connection to {}", connection.peer());
        }

        match outcome {
            Some(Ok(Some(response))) => Ok(response),
            Some(Ok(None)) => Err(ClientError::NoResponse),
            Some(Err(e)) => Err(e.into()),
            None => Err(ClientError::Interrupted),
        }
    }
}

/// Sends one request to `host:port`.
pub fn send(host: &str, port: u16, request: Request) -> Result<Payload, ClientError> {
    Client::resolve(host, port)?.send(request)
}
