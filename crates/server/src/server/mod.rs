//! Metro control server: accept loop, per-connection tasks and the shared context.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context as _;
use futures_util::{SinkExt, StreamExt};
use protocol::messages::{GREETING, MALFORMED_LOGIN, SERVER_FULL};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::event_log::{EventLog, FileEventLog, LogCategory, stamp, stamp_client};

pub mod auth;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod registry;
pub mod simulation;
pub mod telemetry;

pub use auth::{CredentialFile, CredentialStore, StaticCredentials};
pub use codec::{Inbound, MetroCodec};
pub use connection::{ConnectionHandle, ConnectionId};
pub use registry::Registry;
pub use simulation::SimulationState;

/// State shared by every task of one server.
///
/// Lock order: `simulation` before `registry`.
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<Config>,
    pub simulation: Arc<Mutex<SimulationState>>,
    pub registry: Arc<Registry>,
    pub event_log: Arc<dyn EventLog>,
    pub credentials: Arc<dyn CredentialStore>,
}

impl ServerContext {
    pub fn new(config: Config, event_log: Arc<dyn EventLog>, credentials: Arc<dyn CredentialStore>) -> Self {
        let simulation = SimulationState::new(config.simulation.clone());
        let registry = Registry::new(config.server.max_connections);
        Self {
            config: Arc::new(config),
            simulation: Arc::new(Mutex::new(simulation)),
            registry: Arc::new(registry),
            event_log,
            credentials,
        }
    }

    /// Stamp `message`, log it under `category` and push it to every connection.
    pub async fn publish_event(&self, category: LogCategory, message: &str) {
        let record = stamp(message);
        info!("{}", message);
        self.event_log.append(category, &record);
        self.registry.broadcast_event(&record).await;
    }

    /// Log a record about one client. Not broadcast.
    pub fn record_client(&self, name: &str, addr: SocketAddr, message: &str) {
        info!("{} ({}): {}", name, addr, message);
        self.event_log.append(LogCategory::Client, &stamp_client(name, addr, message));
    }
}

/// Handshake progress of one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Session {
    Pending,
    Active { name: String },
}

/// A bound server, ready to run.
pub struct Server {
    listener: TcpListener,
    ctx: ServerContext,
}

impl Server {
    pub async fn bind(
        config: Config,
        event_log: Arc<dyn EventLog>,
        credentials: Arc<dyn CredentialStore>,
    ) -> anyhow::Result<Self> {
        let addr = format!("{}:{}", config.server.bind, config.server.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self { listener, ctx: ServerContext::new(config, event_log, credentials) })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn context(&self) -> &ServerContext {
        &self.ctx
    }

    /// Start the engine and telemetry loops, then accept connections forever.
    pub async fn run(self) -> anyhow::Result<()> {
        let Self { listener, ctx } = self;
        info!("Listening on {}", listener.local_addr()?);
        ctx.publish_event(LogCategory::Simulation, "Servidor iniciado.").await;

        tokio::spawn(simulation::run_simulation_loop(ctx.clone()));
        tokio::spawn(telemetry::run_telemetry_loop(ctx.clone()));

        loop {
            let (stream, addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Accept failed: {}", e);
                    continue;
                }
            };

            let (handle, rx) =
                ConnectionHandle::new(ctx.registry.next_id(), addr, ctx.config.server.outbound_queue);
            for line in GREETING {
                let _ = handle.send_line(line);
            }

            if let Err(e) = ctx.registry.register(Arc::clone(&handle)).await {
                warn!("Connection from {} rejected: {}", addr, e);
                ctx.event_log.append(
                    LogCategory::Client,
                    &stamp(&format!("Conexion rechazada desde {addr}: servidor lleno")),
                );
                tokio::spawn(reject_full(stream));
                continue;
            }
            info!("New connection {} from {}", handle.id, addr);

            let ctx = ctx.clone();
            tokio::spawn(async move {
                let mut session = Session::Pending;
                if let Err(e) = handle_connection(&ctx, &handle, stream, rx, &mut session).await {
                    error!("Connection error from {}: {}", addr, e);
                }

                handle.close();
                ctx.registry.unregister(handle.id).await;
                let name = match &session {
                    Session::Active { name } => name.as_str(),
                    Session::Pending => "anonimo",
                };
                ctx.record_client(name, addr, "Cliente desconectado.");
            });
        }
    }
}

async fn reject_full(mut stream: TcpStream) {
    let _ = stream.write_all(format!("{SERVER_FULL}\n").as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Drive one connection until the peer leaves or the handle is closed.
///
/// Queued lines are always written before a close is honoured.
async fn handle_connection(
    ctx: &ServerContext,
    handle: &ConnectionHandle,
    stream: TcpStream,
    mut rx: mpsc::Receiver<String>,
    session: &mut Session,
) -> anyhow::Result<()> {
    let framed = Framed::new(stream, MetroCodec::new());
    let (mut write, mut read) = framed.split::<String>();

    ctx.publish_event(
        LogCategory::Client,
        &format!("Cliente intentando conectarse desde {}", handle.addr),
    )
    .await;

    loop {
        tokio::select! {
            biased;
            Some(line) = rx.recv() => {
                write.send(line).await?;
            }
            () = handle.closed() => {
                while let Ok(line) = rx.try_recv() {
                    write.send(line).await?;
                }
                debug!("{} closed by server", handle.id);
                break;
            }
            frame = read.next() => match frame {
                Some(Ok(Inbound::Line(line))) => handle_line(ctx, handle, session, &line).await,
                Some(Ok(Inbound::Oversized)) => handle_oversized(handle, session),
                Some(Err(e)) => {
                    warn!("Read error from {}: {}", handle.addr, e);
                    break;
                }
                None => {
                    info!("Client {} ({}) disconnected", handle.id, handle.addr);
                    break;
                }
            },
        }
    }

    write.close().await?;
    Ok(())
}

async fn handle_line(ctx: &ServerContext, handle: &ConnectionHandle, session: &mut Session, line: &str) {
    match session {
        Session::Pending => match auth::authenticate(ctx, handle, line).await {
            Ok(identity) => *session = Session::Active { name: identity.name },
            Err(e) => {
                warn!("Handshake from {} refused: {}", handle.addr, e);
                let _ = handle.send_line(e.reply());
                handle.close();
            }
        },
        Session::Active { name } => {
            if line.trim().is_empty() {
                return;
            }
            if let Err(e) = dispatch::dispatch(ctx, handle, name, line).await {
                debug!("Command from {} rejected: {}", handle.id, e);
                let _ = handle.send_line(e.reply());
            }
        }
    }
}

/// An over-long line is a malformed handshake before login and an invalid
/// command after it.
fn handle_oversized(handle: &ConnectionHandle, session: &Session) {
    warn!("Over-long line from {} ({})", handle.id, handle.addr);
    match session {
        Session::Pending => {
            let _ = handle.send_line(MALFORMED_LOGIN);
            handle.close();
        }
        Session::Active { .. } => {
            let _ = handle.send_line(dispatch::CommandError::InvalidCommand.reply());
        }
    }
}

/// Run a server from `config`, logging events to the configured files.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let event_log = FileEventLog::open(&config.log)
        .with_context(|| format!("failed to open event log {}", config.log.file.display()))?;
    let credentials = CredentialFile::new(config.server.credentials_file.clone());
    Server::bind(config, Arc::new(event_log), Arc::new(credentials)).await?.run().await
}
