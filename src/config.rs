//! Configuration for the concurrent map's tunable constants.
//!
//! Provides layered configuration via `cereggii.toml`, `CEREGGII_*`
//! environment variables, and runtime overrides, following the same
//! priority order as the rest of this crate's lineage:
//!
//! 1. Runtime overrides (constructor arguments)
//! 2. Environment variables (`CEREGGII_*`)
//! 3. Configuration file (`cereggii.toml`)
//! 4. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to parse configuration from any of the layered sources.
    #[error("failed to parse configuration: {0}")]
    Parse(String),
}

/// Tunable constants for [`crate::map::ConcurrentMap`].
///
/// The `Default` impl matches the constants the original `cereggii` source
/// hardcodes as C preprocessor macros (`RESERVATION_BUFFER_SIZE`,
/// `BLOCKWISE_MIGRATE_SIZE`, ...); they are exposed here so an embedder can
/// tune them without forking the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// `log2` of the initial index size. The spec rounds any
    /// `initial_size < 64` up to 64 slots, i.e. `log_size = 6`.
    pub initial_log_size: u32,
    /// Per-accessor reservation buffer stride: how many contiguous entries
    /// an accessor reserves at once from the hot page. Must be a power of
    /// two no greater than `ENTRIES_IN_PAGE` (64).
    pub reservation_buffer_size: usize,
    /// Number of index nodes migrated per `fetch_add` claim during a
    /// blockwise migration round.
    pub blockwise_migrate_size: u64,
    /// Ceiling on `log_size`; `initial_size` may not exceed `2^max_log_size`.
    pub max_log_size: u32,
    /// Floor on `log_size` during shrink/compaction.
    pub min_log_size: u32,
}

impl Default for MapConfig {
    fn default() -> Self {
        MapConfig {
            initial_log_size: 6,
            reservation_buffer_size: 4,
            blockwise_migrate_size: 4096,
            max_log_size: 56,
            min_log_size: 6,
        }
    }
}

impl MapConfig {
    /// Loads configuration by merging defaults, an optional `cereggii.toml`
    /// in the current directory, and `CEREGGII_*` environment variables, in
    /// that priority order (env wins, then file, then defaults).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if an existing `cereggii.toml` or a
    /// set `CEREGGII_*` variable cannot be deserialized into `MapConfig`.
    pub fn load() -> Result<Self, ConfigError> {
        Figment::new()
            .merge(Serialized::defaults(MapConfig::default()))
            .merge(Toml::file("cereggii.toml"))
            .merge(Env::prefixed("CEREGGII_"))
            .extract()
            .map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validates the configuration, returning the reservation buffer size
    /// rounded to a supported power of two and the initial `log_size`
    /// clamped to `[min_log_size, max_log_size]`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::InvalidParameter`] if
    /// `reservation_buffer_size` is not one of `{1,2,4,8,16,32,64}`, or if
    /// `initial_log_size` is out of range.
    pub fn validate(self) -> crate::error::Result<Self> {
        let valid_buffer_sizes = [1usize, 2, 4, 8, 16, 32, 64];
        if !valid_buffer_sizes.contains(&self.reservation_buffer_size) {
            return Err(crate::error::Error::invalid_parameter(
                "reservation_buffer_size",
                "must be one of {1, 2, 4, 8, 16, 32, 64}",
            ));
        }
        if self.max_log_size > 56 {
            return Err(crate::error::Error::invalid_parameter(
                "max_log_size",
                "must not exceed 56 (2^56 slot ceiling)",
            ));
        }
        if self.initial_log_size < self.min_log_size || self.initial_log_size > self.max_log_size
        {
            return Err(crate::error::Error::invalid_parameter(
                "initial_log_size",
                "must be within [min_log_size, max_log_size]",
            ));
        }
        Ok(self)
    }
}
