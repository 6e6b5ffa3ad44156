//! Shared protocol crate for the metro telemetry server.
//!
//! This crate contains:
//! - Line framing limits
//! - Typed client requests (handshake and admin commands)
//! - Server message rendering (telemetry frames, replies, notices)
//! - Shared types (Role, Direction, MotionState)

mod error;
pub mod messages;

pub use error::ProtocolError;
pub use messages::{Command, Handshake, Telemetry};

/// Longest accepted line in either direction, in bytes.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Role granted to an authenticated connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Read-only: receives telemetry and events.
    Observer,
    /// The single connection allowed to issue motion commands.
    Admin,
}

impl Role {
    /// Uppercase label used in connection records.
    pub const fn label(self) -> &'static str {
        match self {
            Role::Observer => "OBSERVER",
            Role::Admin => "ADMIN",
        }
    }
}

/// Travel direction along the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Towards the last station (`IDA`).
    #[default]
    Forward,
    /// Towards station 1 (`VUELTA`).
    Backward,
}

impl Direction {
    /// Station index delta for one hop.
    pub const fn step(self) -> i64 {
        match self {
            Direction::Forward => 1,
            Direction::Backward => -1,
        }
    }

    pub const fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }

    pub const fn wire_name(self) -> &'static str {
        match self {
            Direction::Forward => "IDA",
            Direction::Backward => "VUELTA",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "IDA" => Some(Direction::Forward),
            "VUELTA" => Some(Direction::Backward),
            _ => None,
        }
    }
}

/// Whether the train is held or free to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Stopped,
    Moving,
}

impl MotionState {
    pub const fn wire_name(self) -> &'static str {
        match self {
            MotionState::Stopped => "DETENIDO",
            MotionState::Moving => "MOVIMIENTO",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "DETENIDO" => Some(MotionState::Stopped),
            "MOVIMIENTO" => Some(MotionState::Moving),
            _ => None,
        }
    }
}
