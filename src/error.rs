//! Error types returned by the library.
//!
//! Most public APIs return [`crate::Result`], which uses [`Error`] as the
//! error type. The variants provide access to more specific error categories
//! when needed.

use thiserror::Error;

/// Convenient result alias for the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Top level error surfaced by the library APIs.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The backing SQLite store could not be opened, migrated, or written.
    /// Hard failure: the run aborts (output tables were already
    /// dropped-and-recreated, so a re-run is the recovery mechanism).
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The `glibc_return.csv` catalog could not be parsed.
    /// Hard failure for the equivalence phase only.
    #[error("catalog load error: {0}")]
    CatalogLoad(#[from] CatalogError),

    /// The run configuration file was malformed.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O failure unrelated to the store (reading the catalog/config file).
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors from the storage adapter.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StoreError {
    /// The underlying SQLite driver reported an error.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A row read from an input table was missing a required column or had
    /// a value that could not be interpreted (e.g. non-UTF8 text).
    #[error("malformed row in `{table}`: {reason}")]
    MalformedRow {
        /// Table the row came from.
        table: &'static str,
        /// Human-readable description of the problem.
        reason: String,
    },
}

/// Errors from loading the return-semantics catalog.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// The CSV reader failed (missing file, malformed row, encoding error).
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A `ReturnType` column held a value other than `INT`/`POINTER`.
    #[error("unknown return type `{0}` (expected INT or POINTER)")]
    UnknownReturnType(String),
}

/// Errors from loading the TOML run configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read from disk.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file's TOML could not be parsed or had invalid values.
    #[error(transparent)]
    Parse(#[from] toml::de::Error),
}
