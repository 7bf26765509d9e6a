use crate::effect::EffectState;

/// Result alias that carries the custom [`PlumeError`] type.
pub type Result<T> = std::result::Result<T, PlumeError>;

/// Common error type for the core crate.
///
/// Only API misuse and malformed definitions surface here. Faults inside a
/// running pipeline (missing elements, unknown controllers, shape mismatches)
/// are logged and degrade the affected entity instead.
#[derive(Debug, thiserror::Error)]
pub enum PlumeError {
    /// Free-form message, mostly raised by the command line front end.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A definition or configuration file could not be parsed or written.
    #[error("invalid definition: {0}")]
    Json(#[from] serde_json::Error),
    /// The effect is not in a state that allows the requested operation.
    #[error("effect is {found:?}, operation requires {expected:?}")]
    InvalidState {
        expected: EffectState,
        found: EffectState,
    },
    /// Two entities of the same category share a name.
    #[error("duplicate {kind} name `{name}`")]
    DuplicateName { kind: &'static str, name: String },
    #[error("unknown controller `{0}`")]
    UnknownController(String),
    #[error("unknown modifier `{0}`")]
    UnknownModifier(String),
}

impl PlumeError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}

impl From<&str> for PlumeError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for PlumeError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
