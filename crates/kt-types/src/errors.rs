use thiserror::Error;

/// Main error type for the knobtune system
#[derive(Error, Debug)]
pub enum KtError {
    #[error("Knob error: {0}")]
    Knob(#[from] KnobError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("DBMS error: {0}")]
    Dbms(#[from] DbmsError),

    #[error("Workload error: {0}")]
    Workload(#[from] WorkloadError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Knob-space construction and validation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnobError {
    #[error("Unsupported knob kind '{kind}' for knob {knob}")]
    UnsupportedKind { knob: String, kind: String },

    #[error("Invalid knob spec for {knob}: {message}")]
    InvalidSpec { knob: String, message: String },

    #[error("Duplicate knob name: {knob}")]
    DuplicateName { knob: String },

    #[error("Value {value} out of bounds for knob {knob}")]
    OutOfBounds { knob: String, value: String },

    #[error("Configuration is missing knob {knob}")]
    MissingKnob { knob: String },

    #[error("Configuration has unknown knob {knob}")]
    UnknownKnob { knob: String },

    #[error("Kind mismatch for knob {knob}: expected {expected}")]
    KindMismatch { knob: String, expected: String },
}

/// Space adapter construction errors. Decode problems never surface here:
/// unprojection clamps instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Invalid adapter configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Target dimension {target_dim} must be smaller than input dimension {input_dim}")]
    TargetDimTooLarge { target_dim: usize, input_dim: usize },
}

/// Errors surfaced by the DBMS driver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbmsError {
    #[error("Configuration apply failed: {reason}")]
    ApplyFailed { reason: String },

    #[error("DBMS restart failed: {reason}")]
    RestartFailed { reason: String },

    #[error("Internal statistics unavailable: {reason}")]
    StatsUnavailable { reason: String },

    #[error("DBMS connection failed: {message}")]
    Connection { message: String },
}

/// Errors surfaced by the workload runner
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkloadError {
    #[error("Workload run failed: {message}")]
    RunFailed { message: String },

    #[error("Metric unavailable: {metric}")]
    MetricUnavailable { metric: String },

    #[error("Metrics read before the workload finished")]
    NotRun,
}

/// Optimizer configuration and state errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OptimizerError {
    #[error("Invalid optimizer configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Baseline performance has not been established")]
    MissingBaseline,

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Result type alias for knobtune operations
pub type KtResult<T> = Result<T, KtError>;

/// Helper trait for converting string errors
pub trait IntoKtError {
    fn into_kt_error(self) -> KtError;
}

impl IntoKtError for String {
    fn into_kt_error(self) -> KtError {
        KtError::Internal(self)
    }
}

impl IntoKtError for &str {
    fn into_kt_error(self) -> KtError {
        KtError::Internal(self.to_string())
    }
}

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::KtError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::KtError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::KtError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = KnobError::OutOfBounds {
            knob: "shared_buffers".to_string(),
            value: "99".to_string(),
        };

        assert!(error.to_string().contains("out of bounds"));
        assert!(error.to_string().contains("shared_buffers"));
        assert!(error.to_string().contains("99"));
    }

    #[test]
    fn test_error_conversion() {
        let dbms_error = DbmsError::ApplyFailed {
            reason: "refused".to_string(),
        };
        let kt_error: KtError = dbms_error.into();

        match kt_error {
            KtError::Dbms(DbmsError::ApplyFailed { .. }) => (),
            _ => panic!("Expected Dbms error"),
        }
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, KtError::Validation(_)));
        let _internal_err = internal_error!("Something went wrong");
        let config_err = config_error!("Missing required field: {}", "knobs");
        assert!(config_err.to_string().contains("knobs"));
    }
}
