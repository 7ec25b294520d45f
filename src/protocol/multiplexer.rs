use std::{collections::HashMap, io, time::Duration};

use log::warn;
use mio::{Events, Poll, Token, Waker, event::Source};

/// Token reserved for the cross-thread waker.
pub const WAKE: Token = Token(0);
/// Token reserved for a listening socket.
pub const LISTENER: Token = Token(1);

const FIRST_ENTRY: usize = 2;
const EVENT_CAPACITY: usize = 1024;

/// Operations a registered socket is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Read,
    Write,
    ReadWrite,
}

impl From<Interest> for mio::Interest {
    fn from(value: Interest) -> Self {
        match value {
            Interest::Read => mio::Interest::READABLE,
            Interest::Write => mio::Interest::WRITABLE,
            Interest::ReadWrite => mio::Interest::READABLE | mio::Interest::WRITABLE,
        }
    }
}

/// Operations a socket can make progress on without blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
}

impl From<&mio::event::Event> for Readiness {
    fn from(event: &mio::event::Event) -> Self {
        // Errors and hang-ups surface through the next read.
        Self {
            readable: event.is_readable() || event.is_read_closed() || event.is_error(),
            writable: event.is_writable() || event.is_write_closed(),
        }
    }
}

/// State that owns a pollable socket.
pub trait Pollable {
    fn source(&mut self) -> &mut dyn Source;
}

/// Readiness poller owning the state of every registered socket.
pub struct Multiplexer<T> {
    poll: Poll,
    events: Events,
    entries: HashMap<Token, T>,
    next: usize,
}

impl<T: Pollable> Multiplexer<T> {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            entries: HashMap::new(),
            next: FIRST_ENTRY,
        })
    }

    /// Creates the waker that interrupts a blocked [`poll`](Self::poll) with
    /// a [`WAKE`] event.
    pub fn waker(&self) -> io::Result<Waker> {
        Waker::new(self.poll.registry(), WAKE)
    }

    /// Watches a socket that is not owned by the multiplexer, such as a
    /// listener, under a reserved token.
    pub fn watch<S: Source + ?Sized>(
        &self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> io::Result<()> {
        self.poll
            .registry()
            .register(source, token, interest.into())
    }

    pub fn register(&mut self, mut entry: T, interest: Interest) -> io::Result<Token> {
        let token = Token(self.next);
        self.poll
            .registry()
            .register(entry.source(), token, interest.into())?;
        self.next += 1;
        self.entries.insert(token, entry);
        Ok(token)
    }

    pub fn modify(&mut self, token: Token, interest: Interest) -> io::Result<()> {
        let entry = self
            .entries
            .get_mut(&token)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "unknown token"))?;
        self.poll
            .registry()
            .reregister(entry.source(), token, interest.into())
    }

    /// Removes an entry and hands it back; dropping it closes the socket.
    pub fn unregister(&mut self, token: Token) -> Option<T> {
        let mut entry = self.entries.remove(&token)?;
        if let Err(e) = self.poll.registry().deregister(entry.source()) {
            warn!("failed to deregister {token:?}: {e}");
        }
        Some(entry)
    }

    pub fn get_mut(&mut self, token: Token) -> Option<&mut T> {
        self.entries.get_mut(&token)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Waits for readiness. `None` blocks until something happens.
    pub fn poll(&mut self, timeout: Option<Duration>) -> io::Result<Vec<(Token, Readiness)>> {
        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(Vec::new()),
            Err(e) => return Err(e),
        }

        Ok(self
            .events
            .iter()
            .map(|event| (event.token(), Readiness::from(event)))
            .collect())
    }

    /// Unregisters every entry and hands them all back.
    pub fn drain(&mut self) -> Vec<T> {
        let registry = self.poll.registry();
        self.entries
            .drain()
            .map(|(token, mut entry)| {
                if let Err(e) = registry.deregister(entry.source()) {
                    warn!("failed to deregister {token:?}: {e}");
                }
                entry
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        net::{SocketAddr, TcpStream as StdStream},
        sync::Arc,
        thread,
    };

    use mio::net::{TcpListener, TcpStream};

    use super::*;

    struct Entry(TcpStream);

    impl Pollable for Entry {
        fn source(&mut self) -> &mut dyn Source {
            &mut self.0
        }
    }

    fn pair(listener: &TcpListener, addr: SocketAddr) -> (StdStream, TcpStream) {
        let client = StdStream::connect(addr).unwrap();
        loop {
            match listener.accept() {
                Ok((stream, _)) => return (client, stream),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::yield_now(),
                Err(e) => panic!("accept failed: {e}"),
            }
        }
    }

    #[test]
    fn reports_readable_entries() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (mut client, server) = pair(&listener, addr);

        let mut multiplexer = Multiplexer::new().unwrap();
        let token = multiplexer.register(Entry(server), Interest::Read).unwrap();
        client.write_all(b"ping").unwrap();

        let mut seen = false;
        for _ in 0..10 {
            let events = multiplexer.poll(Some(Duration::from_secs(1))).unwrap();
            if events.iter().any(|(t, r)| *t == token && r.readable) {
                seen = true;
                break;
            }
        }
        assert!(seen);
    }

    #[test]
    fn unregister_empties_registry() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let (_client, server) = pair(&listener, addr);

        let mut multiplexer = Multiplexer::new().unwrap();
        let token = multiplexer
            .register(Entry(server), Interest::ReadWrite)
            .unwrap();
        assert_eq!(multiplexer.len(), 1);
        assert!(token != WAKE && token != LISTENER);

        multiplexer.modify(token, Interest::Write).unwrap();
        assert!(multiplexer.unregister(token).is_some());
        assert!(multiplexer.unregister(token).is_none());
        assert!(multiplexer.is_empty());
        assert!(multiplexer.modify(token, Interest::Read).is_err());
    }

    #[test]
    fn drain_returns_every_entry() {
        let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = listener.local_addr().unwrap();
        let mut multiplexer = Multiplexer::new().unwrap();
        let mut clients = Vec::new();

        for _ in 0..3 {
            let (client, server) = pair(&listener, addr);
            clients.push(client);
            multiplexer.register(Entry(server), Interest::Read).unwrap();
        }

        assert_eq!(multiplexer.drain().len(), 3);
        assert!(multiplexer.is_empty());
    }

    #[test]
    fn waker_interrupts_blocking_poll() {
        let mut multiplexer: Multiplexer<Entry> = Multiplexer::new().unwrap();
        let waker = Arc::new(multiplexer.waker().unwrap());

        let remote = Arc::clone(&waker);
        let handle = thread::spawn(move || remote.wake().unwrap());

        let events = multiplexer.poll(None).unwrap();
        handle.join().unwrap();
        assert!(events.iter().any(|(token, _)| *token == WAKE));
    }
}
