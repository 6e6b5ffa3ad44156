//! Server -> Client line building.

use std::fmt;
use std::str::FromStr;

use crate::{Direction, MotionState, ProtocolError};

/// Greeting sent to every accepted connection, one line per entry.
pub const GREETING: [&str; 2] = [
    "Bienvenido al Metro.",
    "Ingrese 'admin <usuario> <password>' o 'observer'.",
];

pub const SERVER_FULL: &str = "Servidor lleno.";
pub const LOGIN_ADMIN_OK: &str = "Login Admin OK.";
pub const OBSERVER_MODE: &str = "Modo observador.";
pub const BAD_CREDENTIALS: &str = "Credenciales admin incorrectas.";
pub const INVALID_ROLE: &str = "ERROR: Rol invalido.";
pub const MALFORMED_LOGIN: &str = "ERROR: Formato de login invalido.";
pub const NAME_IN_USE: &str = "ERROR: Ese nombre ya está en uso.";
pub const NAME_TOO_LONG: &str = "ERROR: Nombre demasiado largo.";
pub const ADMIN_REPLACED: &str = "Sesion de administrador reemplazada por un nuevo login.";
pub const OK: &str = "OK";

/// Leading token of every telemetry frame.
pub const TELEMETRY_TAG: &str = "TELEMETRIA";

/// Build an `ERROR: <reason>` reply.
pub fn error_line(reason: &str) -> String {
    format!("ERROR: {reason}")
}

/// Admin-only part of a telemetry frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminEvents {
    /// One-shot tag of the last accepted command, if not yet reported.
    pub command_tag: Option<String>,
    pub battery_depleted: bool,
    pub at_terminus: bool,
    pub manually_stopped: bool,
}

impl AdminEvents {
    /// Render as `;`-terminated tokens, command tag first.
    pub fn render(&self) -> String {
        let mut out = self.command_tag.clone().unwrap_or_default();
        if self.battery_depleted {
            out.push_str("BATERIA_AGOTADA;");
        }
        if self.at_terminus {
            out.push_str("TERMINAL;");
        }
        if self.manually_stopped {
            out.push_str("PARADA_MANUAL;");
        }
        out
    }
}

/// One telemetry frame.
///
/// `events` is `Some` exactly for admin frames; the field is rendered even
/// when empty so the two roles always differ by its presence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Telemetry {
    pub station: u32,
    pub direction: Direction,
    pub speed: u32,
    pub battery: u32,
    pub motion: MotionState,
    pub events: Option<String>,
}

impl Telemetry {
    /// Copy of this frame carrying the admin events field.
    pub fn with_events(&self, events: &AdminEvents) -> Self {
        Self { events: Some(events.render()), ..self.clone() }
    }

    pub fn is_admin_frame(&self) -> bool {
        self.events.is_some()
    }
}

impl fmt::Display for Telemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Estacion:{} Direccion:{} Vel:{} Bateria:{} Estado:{}",
            TELEMETRY_TAG,
            self.station,
            self.direction.wire_name(),
            self.speed,
            self.battery,
            self.motion.wire_name(),
        )?;
        if let Some(events) = &self.events {
            write!(f, " Eventos:{events}")?;
        }
        Ok(())
    }
}

impl FromStr for Telemetry {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let malformed = |what: &str| ProtocolError::MalformedTelemetry(what.to_string());

        let mut tokens = line.split_whitespace();
        if tokens.next() != Some(TELEMETRY_TAG) {
            return Err(malformed("missing TELEMETRIA tag"));
        }

        let (mut station, mut direction, mut speed, mut battery, mut motion) =
            (None, None, None, None, None);
        let mut events = None;

        for token in tokens {
            let (key, value) = token.split_once(':').ok_or_else(|| malformed(token))?;
            match key {
                "Estacion" => station = value.parse().ok(),
                "Direccion" => direction = Direction::from_wire(value),
                "Vel" => speed = value.parse().ok(),
                "Bateria" => battery = value.parse().ok(),
                "Estado" => motion = MotionState::from_wire(value),
                "Eventos" => events = Some(value.to_string()),
                _ => return Err(malformed(key)),
            }
        }

        Ok(Telemetry {
            station: station.ok_or_else(|| malformed("Estacion"))?,
            direction: direction.ok_or_else(|| malformed("Direccion"))?,
            speed: speed.ok_or_else(|| malformed("Vel"))?,
            battery: battery.ok_or_else(|| malformed("Bateria"))?,
            motion: motion.ok_or_else(|| malformed("Estado"))?,
            events,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Telemetry {
        Telemetry {
            station: 1,
            direction: Direction::Forward,
            speed: 2,
            battery: 95,
            motion: MotionState::Moving,
            events: None,
        }
    }

    #[test]
    fn test_observer_frame_text() {
        assert_eq!(
            frame().to_string(),
            "TELEMETRIA Estacion:1 Direccion:IDA Vel:2 Bateria:95 Estado:MOVIMIENTO"
        );
    }

    #[test]
    fn test_admin_frame_has_events_field_even_when_empty() {
        let admin = frame().with_events(&AdminEvents::default());
        assert_eq!(admin.to_string(), format!("{} Eventos:", frame()));
    }

    #[test]
    fn test_admin_events_order() {
        let events = AdminEvents {
            command_tag: Some("CMD:STOPNOW;".to_string()),
            battery_depleted: false,
            at_terminus: true,
            manually_stopped: true,
        };
        assert_eq!(events.render(), "CMD:STOPNOW;TERMINAL;PARADA_MANUAL;");
    }

    #[test]
    fn test_parse_admin_frame() {
        let line = "TELEMETRIA Estacion:5 Direccion:VUELTA Vel:1 Bateria:0 Estado:DETENIDO Eventos:CMD:SLOWDOWN;BATERIA_AGOTADA;";
        let parsed: Telemetry = line.parse().unwrap();
        assert_eq!(parsed.station, 5);
        assert_eq!(parsed.direction, Direction::Backward);
        assert_eq!(parsed.motion, MotionState::Stopped);
        assert_eq!(parsed.events.as_deref(), Some("CMD:SLOWDOWN;BATERIA_AGOTADA;"));
        assert_eq!(parsed.to_string(), line);
    }

    #[test]
    fn test_parse_rejects_other_lines() {
        assert!("[12:00:00] en estación 1".parse::<Telemetry>().is_err());
        assert!("TELEMETRIA Estacion:1".parse::<Telemetry>().is_err());
    }
}
