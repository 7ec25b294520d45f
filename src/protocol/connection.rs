//! Per-socket protocol state.
//!
//! A [`Connection`] owns one non-blocking stream together with its receive and
//! send buffers and reacts to readiness events reported by the
//! [`Multiplexer`]. The shared buffering and framing logic lives here. What a
//! side sends and what it does with the message it receives is supplied by a
//! [`Role`]: the client's [`Requester`](super::client::Requester) or the
//! server's [`Responder`](super::server::Responder).
use std::{
    io::{self, Read, Write},
    net::SocketAddr,
};

use log::{debug, trace, warn};
use mio::{Token, event::Source};
use thiserror::Error;

use super::{
    codec::{FrameError, FrameReader, Payload},
    multiplexer::{Interest, Multiplexer, Pollable, Readiness},
};

const READ_CHUNK: usize = 4096;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("peer closed the connection")]
    PeerClosed,
    #[error("{0}")]
    Frame(#[from] FrameError),
    #[error("connection IO error: {0}")]
    Io(#[from] io::Error),
}

/// Protocol phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingSend,
    AwaitingHeaderLength,
    AwaitingHeader,
    AwaitingPayload,
    Complete,
}

impl Phase {
    pub fn is_receiving(self) -> bool {
        matches!(
            self,
            Phase::AwaitingHeaderLength | Phase::AwaitingHeader | Phase::AwaitingPayload
        )
    }
}

/// What the event loop should do with a connection after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Reregister(Interest),
    Close,
}

/// Side-specific behaviour of a connection.
pub trait Role {
    /// State shared by every connection of this role, lent per event.
    type Context: ?Sized;

    /// Phase a fresh connection starts in.
    const INITIAL: Phase;

    /// Frame queued on the first writable event, for the side that speaks first.
    fn opening(&mut self) -> Result<Option<Vec<u8>>, ConnectionError>;

    /// Handles the decoded inbound message. A returned frame is sent back
    /// before the connection completes.
    fn on_message(
        &mut self,
        message: Payload,
        context: &mut Self::Context,
    ) -> Result<Option<Vec<u8>>, ConnectionError>;
}

pub struct Connection<T, R> {
    stream: T,
    peer: SocketAddr,
    role: R,
    inbound: FrameReader,
    outbound: Vec<u8>,
    queued: bool,
    phase: Phase,
    interest: Interest,
}

impl<T: Read + Write, R: Role> Connection<T, R> {
    pub fn new(stream: T, peer: SocketAddr, role: R) -> Self {
        let mut connection = Self {
            stream,
            peer,
            role,
            inbound: FrameReader::new(),
            outbound: Vec::new(),
            queued: false,
            phase: R::INITIAL,
            interest: Interest::Read,
        };
        connection.interest = connection.wanted_interest();
        connection
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Interest the connection is currently registered for.
    pub fn interest(&self) -> Interest {
        self.interest
    }

    pub fn role(&self) -> &R {
        &self.role
    }

    /// Consumes the connection, closing its stream.
    pub fn into_role(self) -> R {
        self.role
    }

    /// Reacts to one readiness event.
    pub fn on_event(
        &mut self,
        readiness: Readiness,
        context: &mut R::Context,
    ) -> Result<Step, ConnectionError> {
        if readiness.readable {
            self.on_readable(context)?;
        }
        if readiness.writable && self.phase == Phase::AwaitingSend {
            self.on_writable(context)?;
        }

        if self.phase == Phase::Complete {
            return Ok(Step::Close);
        }

        let wanted = self.wanted_interest();
        if wanted == self.interest {
            Ok(Step::Continue)
        } else {
            self.interest = wanted;
            Ok(Step::Reregister(wanted))
        }
    }

    fn wanted_interest(&self) -> Interest {
        match self.phase {
            // The requester also listens while sending so a refused connect
            // surfaces as a read error.
            Phase::AwaitingSend if !self.inbound.is_complete() => Interest::ReadWrite,
            Phase::AwaitingSend => Interest::Write,
            _ => Interest::Read,
        }
    }

    fn on_readable(&mut self, context: &mut R::Context) -> Result<(), ConnectionError> {
        let mut chunk = [0; READ_CHUNK];

        loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ConnectionError::PeerClosed),
                Ok(n) => {
                    trace!("received {n} bytes from {}", self.peer);
                    self.inbound.extend(&chunk[..n]);
                    if self.phase.is_receiving() {
                        self.receive(context)?;
                        if !self.phase.is_receiving() {
                            return Ok(());
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn on_writable(&mut self, context: &mut R::Context) -> Result<(), ConnectionError> {
        if !self.queued {
            if let Some(frame) = self.role.opening()? {
                self.outbound.extend_from_slice(&frame);
            }
            self.queued = true;
        }

        self.flush()?;

        if self.outbound.is_empty() {
            if self.inbound.is_complete() {
                self.phase = Phase::Complete;
            } else {
                self.phase = self.inbound.phase();
                // Bytes may have arrived while the request was still going out.
                self.receive(context)?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ConnectionError> {
        while !self.outbound.is_empty() {
            match self.stream.write(&self.outbound) {
                Ok(0) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
                Ok(n) => {
                    trace!("sent {n} bytes to {}", self.peer);
                    self.outbound.drain(..n);
                }
                Err(e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::NotConnected =>
                {
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn receive(&mut self, context: &mut R::Context) -> Result<(), ConnectionError> {
        match self.inbound.advance()? {
            Some(message) => {
                debug!("received complete message from {}", self.peer);
                match self.role.on_message(message, context)? {
                    Some(frame) => {
                        self.outbound.extend_from_slice(&frame);
                        self.queued = true;
                        self.phase = Phase::AwaitingSend;
                    }
                    None => self.phase = Phase::Complete,
                }
            }
            None => self.phase = self.inbound.phase(),
        }
        Ok(())
    }
}

impl<T: Source, R> Pollable for Connection<T, R> {
    fn source(&mut self) -> &mut dyn Source {
        &mut self.stream
    }
}

/// Feeds one event to the connection registered under `token`. When the
/// connection finishes or fails it is unregistered and handed back together
/// with the outcome; it is closed once the caller drops it.
pub(crate) fn drive<T, R>(
    multiplexer: &mut Multiplexer<Connection<T, R>>,
    token: Token,
    readiness: Readiness,
    context: &mut R::Context,
) -> Option<(Connection<T, R>, Result<(), ConnectionError>)>
where
    T: Read + Write + Source,
    R: Role,
{
    let connection = multiplexer.get_mut(token)?;
    let peer = connection.peer();

    let outcome = match connection.on_event(readiness, context) {
        Ok(Step::Continue) => return None,
        Ok(Step::Reregister(interest)) => match multiplexer.modify(token, interest) {
            Ok(()) => return None,
            Err(e) => Err(ConnectionError::Io(e)),
        },
        Ok(Step::Close) => Ok(()),
        Err(e) => Err(e),
    };

    match &outcome {
        Ok(()) => debug!("closing connection to {peer}"),
        Err(e) => warn!("error: closing connection to {peer}: {e}"),
    }
    multiplexer.unregister(token).map(|connection| (connection, outcome))
}
