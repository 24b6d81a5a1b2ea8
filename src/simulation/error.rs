//! Errors surfaced by the channel model.
//!
//! Geometric edge cases never produce errors; only configuration misuse does.

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelError {
    /// No parameter with this identifier exists.
    UnknownParameter(String),
    /// A value of the wrong kind was supplied for a parameter.
    ParameterTypeMismatch {
        parameter: String,
        expected: &'static str,
        found: &'static str,
    },
    /// A text value could not be parsed as the parameter's kind.
    InvalidParameterValue { parameter: String, value: String },
    /// A persisted obstacle could not be applied.
    InvalidObstacle { index: usize, reason: String },
    /// Writing the transmission trace log failed.
    TraceFormat,
}

impl std::fmt::Display for ChannelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelError::UnknownParameter(id) => write!(f, "Unknown parameter: {}", id),
            ChannelError::ParameterTypeMismatch { parameter, expected, found } => {
                write!(f, "Parameter {} expects a {} value, got {}", parameter, expected, found)
            }
            ChannelError::InvalidParameterValue { parameter, value } => write!(f, "Invalid value for parameter {}: {:?}", parameter, value),
            ChannelError::InvalidObstacle { index, reason } => write!(f, "Invalid obstacle #{}: {}", index, reason),
            ChannelError::TraceFormat => write!(f, "Failed to format transmission trace"),
        }
    }
}

impl std::error::Error for ChannelError {}
