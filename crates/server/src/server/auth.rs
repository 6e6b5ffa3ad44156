//! Auth gate: turns the first line of a connection into a role.
//!
//! Admin logins are checked against a per-user credential table that is
//! consulted on every handshake and never cached.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use protocol::messages::{
    self, BAD_CREDENTIALS, INVALID_ROLE, LOGIN_ADMIN_OK, MALFORMED_LOGIN, NAME_IN_USE,
    NAME_TOO_LONG, OBSERVER_MODE,
};
use protocol::{Handshake, ProtocolError, Role};
use tracing::{info, warn};

use super::ServerContext;
use super::connection::ConnectionHandle;
use super::registry::RegistryError;
use crate::event_log::LogCategory;

/// Handshake failures. Every one of them closes the connection.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("invalid admin credentials")]
    InvalidCredentials,
    #[error("name {0:?} already in use")]
    NameInUse(String),
    #[error("name longer than {0} characters")]
    NameTooLong(usize),
    #[error("credential store unavailable: {0}")]
    CredentialStore(#[from] std::io::Error),
    #[error(transparent)]
    Registry(RegistryError),
}

impl AuthError {
    /// Line sent to the client before it is disconnected.
    pub fn reply(&self) -> String {
        match self {
            AuthError::Protocol(ProtocolError::MissingCredentials) => MALFORMED_LOGIN.to_string(),
            AuthError::Protocol(_) => INVALID_ROLE.to_string(),
            AuthError::InvalidCredentials | AuthError::CredentialStore(_) => {
                BAD_CREDENTIALS.to_string()
            }
            AuthError::NameInUse(_) => NAME_IN_USE.to_string(),
            AuthError::NameTooLong(_) => NAME_TOO_LONG.to_string(),
            AuthError::Registry(_) => messages::error_line("Conexion no registrada."),
        }
    }
}

impl From<RegistryError> for AuthError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NameInUse(name) => AuthError::NameInUse(name),
            other => AuthError::Registry(other),
        }
    }
}

/// Source of login grants.
pub trait CredentialStore: Send + Sync {
    /// Role granted to `user` if `password` matches, `None` otherwise.
    fn lookup(&self, user: &str, password: &str) -> std::io::Result<Option<Role>>;
}

/// Credential table on disk: one `user password role` entry per line,
/// `#` comments and blank lines ignored. Re-read on every lookup.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn parse_role(token: &str) -> Option<Role> {
    match token {
        "admin" => Some(Role::Admin),
        "observer" => Some(Role::Observer),
        _ => None,
    }
}

impl CredentialStore for CredentialFile {
    fn lookup(&self, user: &str, password: &str) -> std::io::Result<Option<Role>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("No credential file found at {:?}", self.path);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [u, p, r] = fields[..] else {
                warn!("Invalid entry in credential file: {}", line);
                continue;
            };
            if u == user && p == password {
                return Ok(parse_role(r));
            }
        }
        Ok(None)
    }
}

/// Fixed in-memory credential table.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    entries: HashMap<String, (String, Role)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, user: &str, password: &str, role: Role) -> Self {
        self.entries.insert(user.to_string(), (password.to_string(), role));
        self
    }
}

impl CredentialStore for StaticCredentials {
    fn lookup(&self, user: &str, password: &str) -> std::io::Result<Option<Role>> {
        Ok(self.entries.get(user).filter(|(p, _)| p == password).map(|(_, role)| *role))
    }
}

/// Authenticated identity of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub role: Role,
    pub name: String,
}

/// Validate a handshake line and install the resulting role.
///
/// On success the welcome line is queued for `conn`; an admin login evicts
/// and closes the previous admin after sending it a notice. On failure
/// nothing is sent: the caller replies with [`AuthError::reply`] and closes.
pub async fn authenticate(
    ctx: &ServerContext,
    conn: &ConnectionHandle,
    line: &str,
) -> Result<Identity, AuthError> {
    let (role, name) = match Handshake::parse(line)? {
        Handshake::Observer { name } => {
            (Role::Observer, name.unwrap_or_else(|| format!("Observer{}", conn.id.0)))
        }
        Handshake::Admin { user, password } => match ctx.credentials.lookup(&user, &password) {
            Ok(Some(Role::Admin)) => (Role::Admin, user),
            Ok(_) => {
                ctx.record_client(&user, conn.addr, "Intento de login admin fallido.");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => {
                warn!("Credential lookup failed for {}: {}", conn.addr, e);
                ctx.record_client(&user, conn.addr, "Intento de login admin fallido.");
                return Err(e.into());
            }
        },
    };

    let max = ctx.config.server.max_name_length;
    if name.chars().count() > max {
        return Err(AuthError::NameTooLong(max));
    }

    let evicted = ctx.registry.assign_role(conn.id, role, &name).await?;
    if let Some(prior) = evicted {
        let prior_name = prior.name.as_deref().unwrap_or(&name);
        info!("Admin {} replaced by {} ({})", prior.handle.id, conn.id, conn.addr);
        let _ = prior.handle.send_line(messages::ADMIN_REPLACED);
        prior.handle.close();
        ctx.record_client(prior_name, prior.handle.addr, "Sesion de administrador reemplazada.");
    }

    let (welcome, record) = match role {
        Role::Admin => (LOGIN_ADMIN_OK, "Administrador autenticado."),
        Role::Observer => (OBSERVER_MODE, "Observador autenticado."),
    };
    let _ = conn.send_line(welcome);
    ctx.record_client(&name, conn.addr, record);
    ctx.publish_event(
        LogCategory::Client,
        &format!("Cliente conectado: {} (IP: {}) Rol: {}", name, conn.addr.ip(), role.label()),
    )
    .await;

    Ok(Identity { role, name })
}
