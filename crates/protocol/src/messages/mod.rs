//! Message definitions for the metro line protocol.
//!
//! Every message is one newline-terminated ASCII line. This module contains
//! both client->server requests and server->client lines.

mod client;
mod server;

pub use client::*;
pub use server::*;
