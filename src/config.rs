//! Allocator configuration.

use std::env;

use crate::error::ConfigError;

/// Environment variable read by [`Config::from_env`].
pub const MIN_GROW_UNITS_VAR: &str = "RFALLOC_MIN_GROW_UNITS";

/// Smallest growth request, in header units, when nothing is configured.
pub const DEFAULT_MIN_GROW_UNITS: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
  /// Lower bound on every growth request. Small allocations share one
  /// growth call instead of each moving the break.
  pub min_grow_units: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      min_grow_units: DEFAULT_MIN_GROW_UNITS,
    }
  }
}

impl Config {
  pub fn with_min_grow_units(
    mut self,
    units: usize,
  ) -> Result<Self, ConfigError> {
    if units == 0 {
      return Err(ConfigError::InvalidMinGrowUnits {
        value: units.to_string(),
        reason: "must be at least one unit",
      });
    }

    self.min_grow_units = units;
    Ok(self)
  }

  /// Reads overrides from the process environment.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Builds a config from an arbitrary key lookup. Missing keys keep their
  /// defaults.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let config = Self::default();

    match lookup(MIN_GROW_UNITS_VAR) {
      None => Ok(config),
      Some(raw) => {
        let units = raw.trim().parse::<usize>().map_err(|_| ConfigError::InvalidMinGrowUnits {
          value: raw.clone(),
          reason: "not an unsigned integer",
        })?;
        config.with_min_grow_units(units)
      }
    }
  }
}
