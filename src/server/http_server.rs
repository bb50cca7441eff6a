//! HTTP server implementation.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, error, info, warn};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::{JoinError, JoinSet};

use crate::parser::parse_request;
use crate::server::config::ServerConfig;
use crate::server::error::Error;
use crate::server::handler::{Handler, Router};
use crate::server::registry::ActiveConnections;
use crate::server::response::ResponseBuilder;
use crate::server::socket::{Connection, Listener, ListenerCloser, Socket};

/// Lifecycle of a bound server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Bound and accepting connections.
    Listening,
    /// Shutdown was requested or the accept loop failed; connections are
    /// being torn down.
    ShuttingDown,
    /// The accept loop has returned and every connection is closed.
    Closed,
}

/// State shared between the accept loop and [`ShutdownHandle`]s.
#[derive(Debug)]
struct Shared {
    state: Mutex<ServerState>,
    connections: ActiveConnections,
    closer: ListenerCloser,
    local_addr: SocketAddr,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ServerState) {
        *self.state() = state;
    }
}

/// An HTTP server.
///
/// Each accepted connection carries exactly one request and one response,
/// handled on its own task. There is no limit on concurrent connections
/// beyond the listen backlog.
pub struct HttpServer {
    /// The server configuration.
    pub config: Arc<ServerConfig>,
    router: Arc<Router>,
    listener: Listener,
    shared: Arc<Shared>,
}

impl HttpServer {
    /// Bind to the configured address and start listening.
    ///
    /// Must be called from within a Tokio runtime. Connections queue in the
    /// backlog until [`serve`](Self::serve) runs.
    pub fn bind(config: ServerConfig, router: Router) -> Result<Self, Error> {
        let (host, port) = config.host_port()?;
        let listener = Socket::bind(host, port)?.listen(config.backlog)?;
        let local_addr = listener.local_addr();
        info!("Server listening on http://{local_addr}");

        let shared = Arc::new(Shared {
            state: Mutex::new(ServerState::Listening),
            connections: ActiveConnections::new(),
            closer: listener.closer(),
            local_addr,
        });

        Ok(Self {
            config: Arc::new(config),
            router: Arc::new(router),
            listener,
            shared,
        })
    }

    /// The address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }

    /// A handle for stopping the server from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Display the registered endpoints.
    fn display_server_info(&self) {
        info!("Registered endpoints:");
        for path in self.router.paths() {
            info!("  {path}");
        }
    }

    /// Run the accept loop until shutdown or a fatal accept error.
    ///
    /// Returns `Ok(())` after [`ShutdownHandle::shutdown`]. Either way, by
    /// the time this returns the listener is closed and every connection
    /// task has finished.
    pub async fn serve(self) -> Result<(), Error> {
        self.display_server_info();

        let HttpServer { config, router, mut listener, shared } = self;
        let mut tasks = JoinSet::new();

        let result = loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => {
                        let id = conn.id();
                        let task = Self::handle_connection(conn, Arc::clone(&router), Arc::clone(&config));
                        shared.connections.spawn(&mut tasks, id, task);
                    }
                    Err(Error::ListenerClosed) => {
                        info!("Shutting down server...");
                        break Ok(());
                    }
                    Err(e) => {
                        error!("Critical error accepting connection, shutting down: {e}");
                        break Err(e);
                    }
                },

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::reap(joined);
                }
            }
        };

        shared.set_state(ServerState::ShuttingDown);

        // Connections accepted while shutdown was in progress, or all of
        // them if the loop failed.
        let aborted = shared.connections.abort_all();
        if aborted > 0 {
            debug!("Aborted {aborted} remaining connections");
        }
        // Already closed after a requested shutdown.
        let _ = shared.closer.close();
        listener.close();

        while let Some(joined) = tasks.join_next().await {
            Self::reap(joined);
        }

        shared.set_state(ServerState::Closed);
        info!("Server shutdown complete");

        result
    }

    fn reap(joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Connection task panicked: {e}");
            }
        }
    }

    /// Drive one accepted connection from first read to close.
    async fn handle_connection(mut conn: Connection, router: Arc<Router>, config: Arc<ServerConfig>) {
        let id = conn.id();
        let remote_addr = conn.remote_address().unwrap_or_else(|e| {
            debug!("Connection {id}: could not resolve peer address: {e}");
            String::new()
        });

        if let Err(e) = Self::exchange(&mut conn, router.as_ref(), remote_addr, &config).await {
            // No response is sent for a request that could not be read or parsed.
            warn!("Connection {id}: dropping request: {e}");
        }

        if let Err(e) = conn.close().await {
            debug!("Connection {id}: error while closing: {e}");
        }
    }

    /// Read one request from `conn`, run `handler` and write the response.
    ///
    /// Read and parse failures are returned without writing anything. A
    /// failed write is logged and otherwise ignored.
    pub async fn exchange<S>(
        conn: &mut Connection<S>,
        handler: &dyn Handler,
        remote_addr: String,
        config: &ServerConfig,
    ) -> Result<(), Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let data = conn
            .read_request(config.read_buffer_size, config.max_request_size)
            .await?;
        let mut request = parse_request(&data)?;
        request.remote_addr = remote_addr;
        debug!(
            "Connection {id}: {method} {path} {version} from {remote}",
            id = conn.id(),
            method = request.method,
            path = request.path,
            version = request.version,
            remote = request.remote_addr,
        );

        let mut response = ResponseBuilder::new();
        response.version(request.version.to_string());
        handler.serve(&mut response, &request);

        if let Err(e) = conn.write_all(&response.marshal()).await.map_err(Error::WriteError) {
            debug!("Connection {id}: {e}", id = conn.id());
        }

        Ok(())
    }
}

/// Stops a running [`HttpServer`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    shared: Arc<Shared>,
}

impl ShutdownHandle {
    /// Close every active connection, then the listener.
    ///
    /// The pending [`HttpServer::serve`] call returns once its connection
    /// tasks have unwound. Calling this when the server is not listening
    /// returns [`Error::NotListening`].
    pub fn shutdown(&self) -> Result<(), Error> {
        {
            let mut state = self.shared.state();
            if *state != ServerState::Listening {
                return Err(Error::NotListening);
            }
            *state = ServerState::ShuttingDown;
        }

        let closed = self.shared.connections.abort_all();
        info!("Closing {closed} active connections");

        self.shared.closer.close()
    }

    pub fn state(&self) -> ServerState {
        *self.shared.state()
    }

    /// Number of connections accepted and not yet closed.
    pub fn active_connections(&self) -> usize {
        self.shared.connections.len()
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.shared.local_addr
    }
}
