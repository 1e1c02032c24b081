//! Planner configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Partition count used for wide operations that omit one (mirrors the usual
/// shuffle-partition default of data-parallel engines).
pub const DEFAULT_SHUFFLE_PARTITIONS: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    /// Partition count for wide operations without an explicit count and
    /// without a compatible parent to inherit one from. `None` makes such
    /// operations a planning error.
    pub default_partitions: Option<usize>,

    /// Run structural verification over every produced stage graph.
    pub verify: bool,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_partitions: Some(DEFAULT_SHUFFLE_PARTITIONS),
            verify: true,
        }
    }
}

impl PlannerConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `STAGECUT_DEFAULT_PARTITIONS`: default shuffle partition count (`none` clears it)
    /// - `STAGECUT_VERIFY`: `true`/`false`, verify produced stage graphs
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("STAGECUT_DEFAULT_PARTITIONS") {
            if s.trim().eq_ignore_ascii_case("none") {
                cfg.default_partitions = None;
            } else if let Ok(v) = s.trim().parse::<usize>() {
                cfg.default_partitions = Some(v);
            }
        }

        if let Ok(s) = std::env::var("STAGECUT_VERIFY") {
            if let Ok(v) = s.trim().parse::<bool>() {
                cfg.verify = v;
            }
        }

        cfg
    }

    pub fn with_default_partitions(mut self, partitions: Option<usize>) -> Self {
        self.default_partitions = partitions;
        self
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_partitions == Some(0) {
            return Err(Error::Config("default_partitions must be > 0 when set".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = PlannerConfig::default();
        assert_eq!(cfg.default_partitions, Some(DEFAULT_SHUFFLE_PARTITIONS));
        assert!(cfg.verify);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_default_partitions_is_rejected() {
        let cfg = PlannerConfig::default().with_default_partitions(Some(0));
        assert!(matches!(cfg.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn missing_default_is_allowed_by_config() {
        let cfg = PlannerConfig::default().with_default_partitions(None);
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: PlannerConfig = serde_json::from_str(r#"{"default_partitions": 16}"#).unwrap();
        assert_eq!(cfg.default_partitions, Some(16));
        assert!(cfg.verify);
    }
}
