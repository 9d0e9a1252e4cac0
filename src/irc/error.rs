use thiserror::Error;

/// Failures surfaced by the protocol layer. None of them are fatal to the
/// process; each degrades to a visible message and, where applicable, a
/// connection reset.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IrcError {
    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    #[error("Connection error: {0}")]
    Transport(String),

    #[error("SASL authentication failed ({code}): {text}")]
    AuthenticationFailure { code: u16, text: String },

    #[error("[{code}] {text}")]
    Protocol { code: u16, text: String },

    #[error("Auto-reconnect: max attempts ({attempts}) reached for {host}")]
    ReconnectExhausted { host: String, attempts: u32 },
}
