use std::path::PathBuf;

use priority_map_scoring::ConfigError;
use priority_map_spatial::SpatialError;
use thiserror::Error;

/// Errors surfaced by the command-line front end.
#[derive(Debug, Error)]
pub enum CliError {
    /// Reading or writing a file failed.
    #[error("Failed to {action} {}: {source}", path.display())]
    Io {
        /// What was being done, e.g. `read`.
        action: &'static str,
        /// File involved.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The analysis file is not valid TOML or does not match the schema.
    #[error("Invalid analysis config: {0}")]
    Toml(#[from] toml::de::Error),

    /// The zone file could not be turned into zones.
    #[error("Failed to load zones: {0}")]
    Zones(#[from] SpatialError),

    /// A layer file could not be turned into a feature layer.
    #[error("Failed to load layer {layer}: {source}")]
    Layer {
        /// Layer name from the config.
        layer: String,
        /// Underlying error.
        source: SpatialError,
    },

    /// The scoring configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON export failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
