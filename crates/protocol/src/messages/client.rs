//! Client -> Server line parsing.

use crate::ProtocolError;

/// First line of a connection: the requested role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// `observer [name]`.
    Observer { name: Option<String> },
    /// `admin <user> <password>`.
    Admin { user: String, password: String },
}

impl Handshake {
    /// Parse a handshake line. The role token is case-insensitive; extra
    /// trailing tokens are ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let role = tokens.next().unwrap_or_default();

        if role.eq_ignore_ascii_case("observer") {
            let name = tokens.next().map(str::to_string);
            Ok(Handshake::Observer { name })
        } else if role.eq_ignore_ascii_case("admin") {
            match (tokens.next(), tokens.next()) {
                (Some(user), Some(password)) => Ok(Handshake::Admin {
                    user: user.to_string(),
                    password: password.to_string(),
                }),
                _ => Err(ProtocolError::MissingCredentials),
            }
        } else {
            Err(ProtocolError::InvalidRole(role.to_string()))
        }
    }
}

/// Motion command accepted from the admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SpeedUp,
    SlowDown,
    StopNow,
    StartNow,
}

impl Command {
    /// Parse a command line, ignoring case and surrounding whitespace.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let word = line.trim();
        match word.to_ascii_uppercase().as_str() {
            "SPEEDUP" => Ok(Command::SpeedUp),
            "SLOWDOWN" => Ok(Command::SlowDown),
            "STOPNOW" => Ok(Command::StopNow),
            "STARTNOW" => Ok(Command::StartNow),
            _ => Err(ProtocolError::UnknownCommand(word.to_string())),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Command::SpeedUp => "SPEEDUP",
            Command::SlowDown => "SLOWDOWN",
            Command::StopNow => "STOPNOW",
            Command::StartNow => "STARTNOW",
        }
    }

    /// One-shot tag carried by the next admin telemetry frame.
    pub fn tag(self) -> String {
        format!("CMD:{};", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observer_with_and_without_name() {
        assert_eq!(Handshake::parse("observer"), Ok(Handshake::Observer { name: None }));
        assert_eq!(
            Handshake::parse("OBSERVER ana extra"),
            Ok(Handshake::Observer { name: Some("ana".to_string()) })
        );
    }

    #[test]
    fn test_admin_requires_both_credentials() {
        assert_eq!(
            Handshake::parse("admin root secret"),
            Ok(Handshake::Admin { user: "root".to_string(), password: "secret".to_string() })
        );
        assert_eq!(Handshake::parse("admin root"), Err(ProtocolError::MissingCredentials));
    }

    #[test]
    fn test_unknown_role() {
        assert_eq!(Handshake::parse("pilot x"), Err(ProtocolError::InvalidRole("pilot".to_string())));
        assert_eq!(Handshake::parse(""), Err(ProtocolError::InvalidRole(String::new())));
    }

    #[test]
    fn test_commands_are_case_insensitive() {
        assert_eq!(Command::parse("speedup"), Ok(Command::SpeedUp));
        assert_eq!(Command::parse("  SlowDown \r"), Ok(Command::SlowDown));
        assert_eq!(Command::parse("STOPNOW"), Ok(Command::StopNow));
        assert_eq!(Command::parse("startnow"), Ok(Command::StartNow));
        assert!(matches!(Command::parse("SPEEDUPX"), Err(ProtocolError::UnknownCommand(_))));
    }

    #[test]
    fn test_command_tag() {
        assert_eq!(Command::StopNow.tag(), "CMD:STOPNOW;");
    }
}
