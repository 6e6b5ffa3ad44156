//! Metro simulation server library.

pub mod config;
pub mod event_log;
pub mod server;

pub use config::Config;
pub use event_log::{EventLog, FileEventLog, LogCategory, MemoryEventLog};
pub use server::{CredentialFile, CredentialStore, Server, ServerContext, StaticCredentials, run};
