//! Server configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from `path`, writing a default file there if none exists.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            info!("No {} found, creating default config", path.display());
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            default_config
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the simulation cannot honour.
    pub fn validate(&self) -> anyhow::Result<()> {
        let sim = &self.simulation;
        anyhow::ensure!(sim.stations >= 2, "simulation.stations must be at least 2");
        anyhow::ensure!(sim.speed_min >= 1, "simulation.speed_min must be at least 1");
        anyhow::ensure!(
            sim.speed_min <= sim.speed_max,
            "simulation.speed_min ({}) exceeds speed_max ({})",
            sim.speed_min,
            sim.speed_max
        );
        anyhow::ensure!(sim.station_distance > 0, "simulation.station_distance must be positive");
        anyhow::ensure!(sim.tick_interval_ms > 0, "simulation.tick_interval_ms must be positive");
        anyhow::ensure!(
            (1..=100).contains(&sim.recovery_charge),
            "simulation.recovery_charge must be within 1..=100"
        );
        anyhow::ensure!(self.telemetry.interval_ms > 0, "telemetry.interval_ms must be positive");
        anyhow::ensure!(self.server.max_connections > 0, "server.max_connections must be positive");
        anyhow::ensure!(self.server.outbound_queue > 0, "server.outbound_queue must be positive");
        Ok(())
    }
}

/// Server networking and general settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum simultaneous connections, authenticated or not.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Credential table (`user password role` per line), read on every admin login.
    #[serde(default = "default_credentials_file")]
    pub credentials_file: PathBuf,
    /// Longest display name accepted at handshake.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Lines buffered per connection before it counts as a failed send.
    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            credentials_file: default_credentials_file(),
            max_name_length: default_max_name_length(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

fn default_port() -> u16 {
    5000
}
fn default_bind() -> String {
    "0.0.0.0".to_string()
}
fn default_max_connections() -> usize {
    10
}
fn default_credentials_file() -> PathBuf {
    PathBuf::from("users.txt")
}
fn default_max_name_length() -> usize {
    49
}
fn default_outbound_queue() -> usize {
    64
}

/// Train and line parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    /// Number of stations on the line (N).
    #[serde(default = "default_stations")]
    pub stations: u32,
    #[serde(default = "default_speed_min")]
    pub speed_min: u32,
    #[serde(default = "default_speed_max")]
    pub speed_max: u32,
    /// Battery lost per station reached.
    #[serde(default = "default_battery_decay")]
    pub battery_decay: u32,
    /// Battery gained per tick while stopped.
    #[serde(default = "default_battery_recharge")]
    pub battery_recharge: u32,
    /// Progress units between two stations.
    #[serde(default = "default_station_distance")]
    pub station_distance: u32,
    /// Ticks spent waiting at each station.
    #[serde(default = "default_dwell_ticks")]
    pub dwell_ticks: u32,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Ticks the train stays forcibly stopped after the battery runs out.
    #[serde(default = "default_recovery_ticks")]
    pub recovery_ticks: u32,
    /// Battery level restored when the forced stop ends.
    #[serde(default = "default_recovery_charge")]
    pub recovery_charge: u32,
}

impl SimulationConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            stations: default_stations(),
            speed_min: default_speed_min(),
            speed_max: default_speed_max(),
            battery_decay: default_battery_decay(),
            battery_recharge: default_battery_recharge(),
            station_distance: default_station_distance(),
            dwell_ticks: default_dwell_ticks(),
            tick_interval_ms: default_tick_interval(),
            recovery_ticks: default_recovery_ticks(),
            recovery_charge: default_recovery_charge(),
        }
    }
}

fn default_stations() -> u32 {
    5
}
fn default_speed_min() -> u32 {
    1
}
fn default_speed_max() -> u32 {
    5
}
fn default_battery_decay() -> u32 {
    5
}
fn default_battery_recharge() -> u32 {
    2
}
fn default_station_distance() -> u32 {
    10
}
fn default_dwell_ticks() -> u32 {
    20
}
fn default_tick_interval() -> u64 {
    1000
}
fn default_recovery_ticks() -> u32 {
    10
}
fn default_recovery_charge() -> u32 {
    20
}

/// Periodic telemetry settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_interval")]
    pub interval_ms: u64,
}

impl TelemetryConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { interval_ms: default_telemetry_interval() }
    }
}

fn default_telemetry_interval() -> u64 {
    10_000
}

/// Event log files. Every record goes to `file`; the category files are optional.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    #[serde(default = "default_log_file")]
    pub file: PathBuf,
    #[serde(default = "default_clients_file")]
    pub clients_file: Option<PathBuf>,
    #[serde(default = "default_telemetry_file")]
    pub telemetry_file: Option<PathBuf>,
    #[serde(default = "default_simulation_file")]
    pub simulation_file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            file: default_log_file(),
            clients_file: default_clients_file(),
            telemetry_file: default_telemetry_file(),
            simulation_file: default_simulation_file(),
        }
    }
}

fn default_log_file() -> PathBuf {
    PathBuf::from("metro.log")
}
fn default_clients_file() -> Option<PathBuf> {
    Some(PathBuf::from("clientes.log"))
}
fn default_telemetry_file() -> Option<PathBuf> {
    Some(PathBuf::from("telemetria.log"))
}
fn default_simulation_file() -> Option<PathBuf> {
    Some(PathBuf::from("simulacion.log"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_line() {
        let config = Config::default();
        assert_eq!(config.server.max_connections, 10);
        assert_eq!(config.simulation.stations, 5);
        assert_eq!(config.simulation.dwell_ticks, 20);
        assert_eq!(config.telemetry.interval_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[server]\nport = 6000\n[simulation]\nspeed_max = 3\n").unwrap();
        assert_eq!(config.server.port, 6000);
        assert_eq!(config.server.bind, "0.0.0.0");
        assert_eq!(config.simulation.speed_max, 3);
        assert_eq!(config.simulation.speed_min, 1);
    }

    #[test]
    fn test_validate_rejects_inverted_speed_bounds() {
        let mut config = Config::default();
        config.simulation.speed_min = 4;
        config.simulation.speed_max = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.server.port, 5000);
        assert_eq!(Config::load(&path).unwrap().server.port, 5000);
    }
}
