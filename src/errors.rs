//! Error types shared by every stage of the surface pipeline.

use thiserror::Error;

/// Unified error type for loading, meshing, correlating and exporting surfaces.
#[derive(Error, Debug)]
pub enum SurfaceError {
    /// Malformed reference or dataset line, or an invalid option value
    #[error("Invalid input: {0}")]
    Input(String),

    /// The engine produced something other than what was asked for
    #[error("Engine contract violated during {stage}: {message}")]
    EngineContract {
        /// Pipeline stage that detected the violation
        stage: String,
        /// What was expected and what was produced
        message: String,
    },

    /// Inconsistent tables or mesh buffers
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// A requested capability that is deliberately not implemented
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// mmCIF / BinaryCIF syntax or encoding errors
    #[error("Failed to parse structure data: {0}")]
    Parse(String),

    /// Structure download failures
    #[error("Failed to fetch {url}: {message}")]
    Fetch {
        /// URL that could not be read
        url: String,
        /// Underlying transport or file error
        message: String,
    },

    /// I/O errors (dataset files, output files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Metadata or session serialization errors
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SurfaceError {
    /// Creates an input error.
    pub fn input(message: impl Into<String>) -> Self {
        SurfaceError::Input(message.into())
    }

    /// Creates an engine contract error for the given pipeline stage.
    pub fn contract(stage: impl Into<String>, message: impl Into<String>) -> Self {
        SurfaceError::EngineContract {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a data integrity error.
    pub fn integrity(message: impl Into<String>) -> Self {
        SurfaceError::DataIntegrity(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        SurfaceError::Parse(message.into())
    }
}

/// Result alias used across the crate.
pub type Result<T, E = SurfaceError> = std::result::Result<T, E>;
