//! Periodic telemetry broadcast.

use protocol::Role;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info};

use super::ServerContext;
use crate::event_log::{LogCategory, stamp};

/// Send one telemetry frame to every connection.
///
/// Admins get the frame plus the `Eventos` field; everyone else, pending
/// connections included, gets the observer frame. The command tag is
/// consumed by the first admin frame rendered. Returns the number of
/// connections the frame was queued for.
pub async fn broadcast_telemetry(ctx: &ServerContext) -> usize {
    let mut sim = ctx.simulation.lock().await;
    let frame = sim.telemetry();
    let observer_line = frame.to_string();
    let mut admin_line = None;

    let delivered = ctx
        .registry
        .broadcast_telemetry(|role| match role {
            Some(Role::Admin) => admin_line
                .get_or_insert_with(|| frame.with_events(&sim.admin_events()).to_string())
                .clone(),
            _ => observer_line.clone(),
        })
        .await;
    drop(sim);

    ctx.event_log.append(LogCategory::Telemetry, &stamp(&observer_line));
    if let Some(line) = &admin_line {
        ctx.event_log.append(LogCategory::Telemetry, &stamp(line));
    }
    debug!("Telemetry queued for {} connection(s)", delivered);
    delivered
}

/// Broadcast telemetry on a fixed period, forever.
pub async fn run_telemetry_loop(ctx: ServerContext) {
    let period = ctx.config.telemetry.interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Telemetry broadcaster started ({:?} period)", period);

    loop {
        ticker.tick().await;
        broadcast_telemetry(&ctx).await;
    }
}
