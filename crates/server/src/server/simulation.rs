//! Simulation state and engine loop.

use std::time::Duration;

use protocol::messages::{AdminEvents, Telemetry};
use protocol::{Direction, MotionState};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use super::ServerContext;
use crate::config::SimulationConfig;
use crate::event_log::LogCategory;

/// Full battery level.
pub const BATTERY_FULL: u32 = 100;

/// Where the train is within its station cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Arrived (or resumed after a forced stop); the dwell starts next tick.
    AtStation,
    /// Waiting at the current station.
    Dwelling { elapsed: u32 },
    /// Moving towards `to`. `suspended` is set while held by a stop.
    Traveling { to: u32, progress: u32, suspended: bool },
    /// Forced stop after the battery ran out.
    Recovering { remaining: u32 },
}

/// One-shot slot for the last accepted command tag.
///
/// The tag is read-and-cleared by the next admin telemetry frame.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommandSlot(Option<String>);

impl CommandSlot {
    pub fn set(&mut self, tag: String) {
        self.0 = Some(tag);
    }

    pub fn take(&mut self) -> Option<String> {
        self.0.take()
    }

    pub fn peek(&self) -> Option<&str> {
        self.0.as_deref()
    }
}

/// Train state shared by the engine, the dispatcher and the telemetry broadcaster.
#[derive(Debug, Clone)]
pub struct SimulationState {
    config: SimulationConfig,
    station: u32,
    direction: Direction,
    speed: u32,
    battery: u32,
    stopped: bool,
    /// STOPNOW accepted during recovery; keeps the train stopped once it ends.
    held: bool,
    stations_traveled: u64,
    command_tag: CommandSlot,
    phase: Phase,
}

impl SimulationState {
    /// Train parked at station 1, heading forward at minimum speed, fully charged.
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            station: 1,
            direction: Direction::Forward,
            speed: config.speed_min,
            battery: BATTERY_FULL,
            stopped: false,
            held: false,
            stations_traveled: 0,
            command_tag: CommandSlot::default(),
            phase: Phase::AtStation,
            config,
        }
    }

    pub fn station(&self) -> u32 {
        self.station
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn battery(&self) -> u32 {
        self.battery
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn stations_traveled(&self) -> u64 {
        self.stations_traveled
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_recovering(&self) -> bool {
        matches!(self.phase, Phase::Recovering { .. })
    }

    pub fn at_terminus(&self) -> bool {
        self.station == 1 || self.station == self.config.stations
    }

    pub fn command_tag(&self) -> Option<&str> {
        self.command_tag.peek()
    }

    pub fn set_command_tag(&mut self, tag: String) {
        self.command_tag.set(tag);
    }

    /// Raise speed by one. Returns `false` (no change) at the cap.
    pub fn speed_up(&mut self) -> bool {
        if self.speed >= self.config.speed_max {
            return false;
        }
        self.speed += 1;
        true
    }

    /// Lower speed by one. Returns `false` (no change) at the floor.
    pub fn slow_down(&mut self) -> bool {
        if self.speed <= self.config.speed_min {
            return false;
        }
        self.speed -= 1;
        true
    }

    pub fn stop(&mut self) {
        self.stopped = true;
        if self.is_recovering() {
            self.held = true;
        }
    }

    /// Release a stop. Returns `false` (no change) with an empty battery.
    pub fn start(&mut self) -> bool {
        if self.battery == 0 {
            return false;
        }
        self.stopped = false;
        true
    }

    /// Observer view of the current state.
    pub fn telemetry(&self) -> Telemetry {
        Telemetry {
            station: self.station,
            direction: self.direction,
            speed: self.speed,
            battery: self.battery,
            motion: if self.stopped { MotionState::Stopped } else { MotionState::Moving },
            events: None,
        }
    }

    /// Admin-only fields. Consumes the command tag.
    pub fn admin_events(&mut self) -> AdminEvents {
        AdminEvents {
            command_tag: self.command_tag.take(),
            battery_depleted: self.battery == 0,
            at_terminus: self.at_terminus(),
            manually_stopped: (self.stopped && !self.is_recovering()) || self.held,
        }
    }

    fn next_station(&self) -> u32 {
        let next = i64::from(self.station) + self.direction.step();
        // Clamped to the line; reversal at the termini keeps it in range anyway.
        next.clamp(1, i64::from(self.config.stations)) as u32
    }

    /// Advance one tick. Returns the transitions that happened, as event text.
    pub fn tick(&mut self) -> Vec<String> {
        let mut events = Vec::new();

        // Forced stop: only the engine's own stop is lifted, an admin stop stays.
        if let Phase::Recovering { remaining } = self.phase {
            if remaining > 1 {
                self.phase = Phase::Recovering { remaining: remaining - 1 };
            } else {
                self.battery = self.config.recovery_charge.min(BATTERY_FULL);
                self.stopped = self.held;
                self.held = false;
                self.phase = Phase::AtStation;
                if self.stopped {
                    events.push("[BATERIA RECARGADA] Esperando STARTNOW...".to_string());
                } else {
                    events.push("[BATERIA RECARGADA] Metro reanuda recorrido.".to_string());
                }
            }
            return events;
        }

        // Held by the admin: recharge, no motion.
        if self.stopped {
            self.battery = self.battery.saturating_add(self.config.battery_recharge).min(BATTERY_FULL);
            if let Phase::Traveling { suspended, .. } = &mut self.phase {
                if !*suspended {
                    *suspended = true;
                    events.push("[DETENIDO EN VIA] Esperando STARTNOW...".to_string());
                }
            }
            return events;
        }

        // Dwell, then travel to the next station.
        match self.phase {
            Phase::AtStation => {
                events.push(format!("en estación {}", self.station));
                events.push(format!(
                    "espera de {}s en estación {}",
                    self.config.dwell_ticks, self.station
                ));
                self.phase = Phase::Dwelling { elapsed: 0 };
            }
            Phase::Dwelling { elapsed } if elapsed < self.config.dwell_ticks => {
                self.phase = Phase::Dwelling { elapsed: elapsed + 1 };
            }
            Phase::Dwelling { .. } => {
                let to = self.next_station();
                events.push(self.travel_record(to));
                self.phase = Phase::Traveling { to, progress: 0, suspended: false };
            }
            Phase::Traveling { to, progress, suspended: true } => {
                events.push(self.travel_record(to));
                self.phase = Phase::Traveling { to, progress, suspended: false };
            }
            Phase::Traveling { to, progress, suspended: false } => {
                let progress = (progress + self.speed).min(self.config.station_distance);
                if progress >= self.config.station_distance {
                    self.arrive(to, &mut events);
                } else {
                    self.phase = Phase::Traveling { to, progress, suspended: false };
                }
            }
            Phase::Recovering { .. } => {}
        }

        events
    }

    fn travel_record(&self, to: u32) -> String {
        format!("viajando de {} a {} a vel {}", self.station, to, self.speed)
    }

    fn arrive(&mut self, to: u32, events: &mut Vec<String>) {
        self.station = to;
        self.stations_traveled += 1;
        self.battery = self.battery.saturating_sub(self.config.battery_decay);
        self.phase = Phase::AtStation;

        events.push(format!("llegada a estación {to}"));

        // Battery empty: forced stop until recovery ends
        if self.battery == 0 {
            self.stopped = true;
            self.phase = Phase::Recovering { remaining: self.config.recovery_ticks };
            events.push(format!(
                "[BATERIA AGOTADA] Metro detenido {} ticks para recargar.",
                self.config.recovery_ticks
            ));
        }

        // Reverse at either end of the line
        if self.at_terminus() {
            self.direction = self.direction.reversed();
            events.push("[cambio de direccion]".to_string());
        }
    }
}

/// Run the engine: one tick per period, forever, whether or not anyone is connected.
pub async fn run_simulation_loop(ctx: ServerContext) {
    let period = ctx.config.simulation.tick_interval();
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!("Simulation engine started ({:?} per tick)", period);

    loop {
        ticker.tick().await;

        let mut sim = ctx.simulation.lock().await;
        let tick_start = std::time::Instant::now();
        let events = sim.tick();
        for event in &events {
            ctx.publish_event(LogCategory::Simulation, event).await;
        }
        drop(sim);

        let elapsed = tick_start.elapsed();
        if elapsed > period.mul_f64(0.9).max(Duration::from_millis(1)) {
            warn!("Slow tick: {:?} (budget: {:?}), {} event(s)", elapsed, period, events.len());
        } else {
            debug!("Tick done in {:?}", elapsed);
        }
    }
}
