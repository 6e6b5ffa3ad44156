//! Command dispatcher: admin-only motion commands.

use protocol::Command;
use protocol::messages::{self, OK};
use tracing::debug;

use super::ServerContext;
use super::connection::ConnectionHandle;
use super::simulation::SimulationState;
use crate::event_log::{LogCategory, stamp_client};

/// Rejected commands. None of them changes the simulation.
///
/// The display text is the reason sent back after `ERROR: `.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("Solo administrador puede enviar comandos.")]
    Unauthorized,
    #[error("Comando invalido.")]
    InvalidCommand,
    #[error("Velocidad máxima alcanzada.")]
    MaxSpeedReached,
    #[error("Velocidad mínima alcanzada.")]
    MinSpeedReached,
    #[error("Batería agotada, no puede iniciar.")]
    BatteryDepleted,
}

impl CommandError {
    pub fn reply(&self) -> String {
        messages::error_line(&self.to_string())
    }
}

/// Apply `command` to the simulation and set its one-shot tag.
///
/// Returns the event record describing the change.
pub fn apply_command(sim: &mut SimulationState, command: Command) -> Result<String, CommandError> {
    let record = match command {
        Command::SpeedUp => {
            if !sim.speed_up() {
                return Err(CommandError::MaxSpeedReached);
            }
            format!("CMD SPEEDUP -> Vel={}", sim.speed())
        }
        Command::SlowDown => {
            if !sim.slow_down() {
                return Err(CommandError::MinSpeedReached);
            }
            format!("CMD SLOWDOWN -> Vel={}", sim.speed())
        }
        Command::StopNow => {
            sim.stop();
            "CMD STOPNOW -> Detenido".to_string()
        }
        Command::StartNow => {
            if !sim.start() {
                return Err(CommandError::BatteryDepleted);
            }
            "CMD STARTNOW -> Reanudado".to_string()
        }
    };
    sim.set_command_tag(command.tag());
    Ok(record)
}

/// Handle one post-handshake line from `conn`.
///
/// Admin rights are checked against the registry's admin slot, so a
/// connection that was just evicted can no longer issue commands. On success
/// `OK` is queued for the sender and the change is logged and broadcast, all
/// under the simulation lock.
pub async fn dispatch(
    ctx: &ServerContext,
    conn: &ConnectionHandle,
    name: &str,
    line: &str,
) -> Result<(), CommandError> {
    let mut sim = ctx.simulation.lock().await;

    if ctx.registry.admin().await != Some(conn.id) {
        return Err(CommandError::Unauthorized);
    }
    let command = Command::parse(line).map_err(|_| CommandError::InvalidCommand)?;
    let record = apply_command(&mut sim, command)?;
    debug!("{} applied {:?}", conn.id, command);

    let record = stamp_client(name, conn.addr, &record);
    ctx.event_log.append(LogCategory::Client, &record);
    let _ = conn.send_line(OK);
    ctx.registry.broadcast_event(&record).await;
    Ok(())
}
