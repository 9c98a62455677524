//! Error type shared by the library and the `ef` binary.
//!
//! Every failure carries a [`ErrorKind`] (so callers can branch on it), a
//! process exit code (so the binary can map it), and a human-readable message
//! that already contains the expected/actual counts where they matter.

/// Failure categories surfaced by the forecasting pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Too few records for the configured lookback.
    DataInsufficient,
    /// Sample/lookback/feature dimensions are zero or inconsistent.
    ShapeMismatch,
    /// A requested model or metadata key was absent from the store.
    PersistenceMiss,
    /// An uploaded artifact is missing required pieces.
    ImportFormat,
    /// File or store I/O failed.
    Io,
    /// Invalid configuration or arguments.
    Config,
    /// A training run is already in flight.
    Busy,
    /// The engine produced non-finite values.
    Numeric,
}

impl ErrorKind {
    fn exit_code(self) -> u8 {
        match self {
            ErrorKind::ImportFormat | ErrorKind::Io | ErrorKind::Config => 2,
            ErrorKind::DataInsufficient => 3,
            ErrorKind::ShapeMismatch | ErrorKind::Numeric => 4,
            ErrorKind::PersistenceMiss => 5,
            ErrorKind::Busy => 6,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    kind: ErrorKind,
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            exit_code: kind.exit_code(),
            message: message.into(),
        }
    }

    /// Not enough records to build a single training window.
    pub fn data_insufficient(lookback: usize, available: usize) -> Self {
        Self::new(
            ErrorKind::DataInsufficient,
            format!(
                "Not enough data for training: need at least {lookback}, have {available}. \
                 A lookback of {lookback} years also needs one later year as the target."
            ),
        )
    }

    pub fn shape(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::ShapeMismatch, message)
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message)
    }

    pub fn missing_key(key: &str) -> Self {
        Self::new(ErrorKind::PersistenceMiss, format!("No saved entry under key '{key}'."))
    }

    /// Artifact upload rejected; `missing` lists the absent pieces.
    pub fn import_format(missing: &[&str]) -> Self {
        Self::new(
            ErrorKind::ImportFormat,
            format!("Invalid model artifact: missing {}.", missing.join(", ")),
        )
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("kind", &self.kind)
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
