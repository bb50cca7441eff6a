//! Listener and connection primitives.
//!
//! These wrap Tokio's TCP types one to one: a [`Socket`] is created and
//! bound, turned into a [`Listener`] with an explicit backlog, and each
//! accepted peer becomes a [`Connection`] used for exactly one exchange.
//! Sockets register with the Tokio reactor, so everything here must run
//! inside a runtime.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use log::debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;

use crate::parser::{Framing, RequestFramer};
use crate::server::error::Error;

/// Identifies an accepted connection for the lifetime of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<u64> for ConnectionId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A bound stream socket that is not listening yet.
#[derive(Debug)]
pub struct Socket {
    inner: TcpSocket,
    addr: SocketAddrV4,
}

impl Socket {
    /// Create a TCP socket and bind it to `address:port`.
    ///
    /// `address` must be a dotted-decimal IPv4 address.
    pub fn bind(address: &str, port: u16) -> Result<Self, Error> {
        let ip = parse_ipv4(address)?;
        let addr = SocketAddrV4::new(ip, port);

        let inner = TcpSocket::new_v4().map_err(Error::SocketCreationError)?;
        inner
            .bind(SocketAddr::V4(addr))
            .map_err(|source| Error::BindError { addr, source })?;

        Ok(Self { inner, addr })
    }

    /// The address the socket was bound to.
    pub fn addr(&self) -> SocketAddrV4 {
        self.addr
    }

    /// Start listening with room for `backlog` pending connections.
    pub fn listen(self, backlog: u32) -> Result<Listener, Error> {
        let inner = self.inner.listen(backlog).map_err(Error::ListenError)?;
        let local_addr = inner.local_addr().map_err(Error::ListenError)?;
        let (tx, closed) = watch::channel(false);

        Ok(Listener {
            inner,
            local_addr,
            closed,
            closer: ListenerCloser { tx: Arc::new(tx) },
            accepted: 0,
        })
    }
}

fn parse_ipv4(address: &str) -> Result<Ipv4Addr, Error> {
    if address.is_empty() {
        return Err(Error::InvalidAddress("no address provided".to_string()));
    }

    address
        .parse::<Ipv4Addr>()
        .map_err(|_| Error::InvalidAddress(format!("invalid address string {address}")))
}

/// A listening socket.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
    closed: watch::Receiver<bool>,
    closer: ListenerCloser,
    accepted: u64,
}

impl Listener {
    /// The address the listener is bound to, with the OS-assigned port if
    /// port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// A handle that can close this listener from another task.
    pub fn closer(&self) -> ListenerCloser {
        self.closer.clone()
    }

    /// Wait for the next peer.
    ///
    /// Returns [`Error::ListenerClosed`] once the listener has been closed
    /// through a [`ListenerCloser`], including while this call is pending.
    pub async fn accept(&mut self) -> Result<Connection, Error> {
        tokio::select! {
            biased;

            _ = self.closed.wait_for(|closed| *closed) => Err(Error::ListenerClosed),

            accepted = self.inner.accept() => {
                let (stream, peer) = accepted.map_err(Error::AcceptError)?;
                self.accepted += 1;
                let id = ConnectionId(self.accepted);
                debug!("Accepted connection {id} from {peer}");
                Ok(Connection::new(id, stream))
            }
        }
    }

    /// Release the socket. Further connection attempts are refused.
    pub fn close(self) {
        let Listener { inner, local_addr, .. } = self;
        drop(inner);
        debug!("Closed listener on {local_addr}");
    }
}

/// Closes a [`Listener`] from outside the task that owns it.
#[derive(Debug, Clone)]
pub struct ListenerCloser {
    tx: Arc<watch::Sender<bool>>,
}

impl ListenerCloser {
    /// Signal the listener to close, waking a pending `accept`.
    ///
    /// Closing twice is an error.
    pub fn close(&self) -> Result<(), Error> {
        if self.tx.send_replace(true) {
            return Err(Error::ListenerClosed);
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// One accepted peer.
///
/// Generic over the stream so the request/response exchange can be driven
/// by any async byte stream.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    id: ConnectionId,
    stream: S,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(id: ConnectionId, stream: S) -> Self {
        Self { id, stream }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// A single read into `buf`.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf).await
    }

    /// A single write of as much of `bytes` as the socket accepts.
    pub async fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        self.stream.write(bytes).await
    }

    /// Write all of `bytes` and flush.
    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    /// Read until a whole request has arrived or the peer stops sending.
    ///
    /// Reads `buffer_size` bytes at a time. The request is whole once the
    /// blank line after the headers has been seen and the declared
    /// `Content-Length` worth of body bytes follows it. Reading also stops
    /// as soon as the first line is not a three-token request line, leaving
    /// the parser to reject it.
    pub async fn read_request(&mut self, buffer_size: usize, max_request_size: usize) -> Result<Vec<u8>, Error> {
        let mut data = Vec::new();
        let mut chunk = vec![0; buffer_size.max(1)];
        let mut framer = RequestFramer::new();

        loop {
            let n = self.read(&mut chunk).await.map_err(Error::ReadError)?;
            if n == 0 {
                break;
            }

            data.extend_from_slice(&chunk[..n]);
            if data.len() > max_request_size {
                return Err(Error::RequestTooLarge(max_request_size));
            }
            match framer.advance(&data) {
                Framing::Incomplete => {}
                Framing::Complete => break,
                Framing::Malformed => {
                    debug!("Connection {id}: request line is malformed, stop reading", id = self.id);
                    break;
                }
            }
        }

        Ok(data)
    }

    /// Shut down the write half and release the stream.
    pub async fn close(mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

impl Connection<TcpStream> {
    /// The peer's IP address in dotted-decimal form, as reported by the OS.
    pub fn remote_address(&self) -> io::Result<String> {
        let peer = self.stream.peer_addr()?;
        Ok(peer.ip().to_string())
    }
}
