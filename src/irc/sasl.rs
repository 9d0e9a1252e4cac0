//! SASL mechanisms supported during CAP negotiation.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaslMechanism {
    None,
    Plain,
    External,
    /// Configured but not implemented; negotiation is skipped with a warning.
    Unsupported(String),
}

impl SaslMechanism {
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_uppercase().as_str() {
            "" | "NONE" => Self::None,
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            _ => Self::Unsupported(name.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::None => "None",
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::Unsupported(name) => name,
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Base64 of `authzid \0 authcid \0 password` with authzid = authcid.
pub fn encode_plain(user: &str, password: &str) -> String {
    let payload = format!("{user}\0{user}\0{password}");
    BASE64.encode(payload.as_bytes())
}
