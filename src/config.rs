use crate::error::ControllerError;
use crate::storage::{QueueConfig, RetrievalOrder};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Depth of the controller's phase queue unless configured otherwise.
pub const DEFAULT_QUEUE_DEPTH: usize = 16;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Lower bound of the randomly drawn phase duration.
    #[serde(rename = "cycle_min_ms", with = "duration_ms")]
    pub cycle_min: Duration,
    /// Upper bound of the randomly drawn phase duration.
    #[serde(rename = "cycle_max_ms", with = "duration_ms")]
    pub cycle_max: Duration,
    /// Sleep between iterations of the cycling loop and between receive
    /// attempts in `wait_for_green`.
    #[serde(rename = "poll_interval_ms", with = "duration_ms")]
    pub poll_interval: Duration,
    /// Draw a new duration after every flip instead of once per start.
    pub redraw_each_cycle: bool,
    pub queue: QueueConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cycle_min: Duration::from_secs(4),
            cycle_max: Duration::from_secs(6),
            poll_interval: Duration::from_millis(1),
            redraw_each_cycle: false,
            queue: QueueConfig {
                order: RetrievalOrder::Lifo,
                capacity: Some(DEFAULT_QUEUE_DEPTH),
            },
        }
    }
}

impl ControllerConfig {
    pub fn validate(&self) -> Result<(), ControllerError> {
        // Durations are stored as whole milliseconds in JSON.
        for (name, value) in [
            ("cycle_min", self.cycle_min),
            ("cycle_max", self.cycle_max),
            ("poll_interval", self.poll_interval),
        ] {
            if value.subsec_nanos() % 1_000_000 != 0 {
                return Err(ControllerError::InvalidConfig(format!(
                    "{name} ({value:?}) must be a whole number of milliseconds"
                )));
            }
        }
        if self.cycle_max.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "cycle_max must be greater than zero".to_string(),
            ));
        }
        if self.cycle_min > self.cycle_max {
            return Err(ControllerError::InvalidConfig(format!(
                "cycle_min ({:?}) exceeds cycle_max ({:?})",
                self.cycle_min, self.cycle_max
            )));
        }
        if self.poll_interval.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "poll_interval must be greater than zero".to_string(),
            ));
        }
        if self.queue.capacity == Some(0) {
            return Err(ControllerError::InvalidConfig(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load a config from a JSON file. Missing fields take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing config {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("rejected config {}", path.display()))?;
        Ok(config)
    }
}

mod duration_ms {
    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        if value.subsec_nanos() % 1_000_000 != 0 {
            return Err(S::Error::custom(format!(
                "{value:?} is not a whole number of milliseconds"
            )));
        }
        let millis = u64::try_from(value.as_millis())
            .map_err(|_| S::Error::custom(format!("{value:?} overflows u64 milliseconds")))?;
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn temp_config_path(prefix: &str) -> std::path::PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "trafficlight-config-{prefix}-{nanos}-{}.json",
            std::process::id()
        ))
    }

    #[test]
    fn defaults_match_reference_timing() {
        let config = ControllerConfig::default();
        assert_eq!(config.cycle_min, Duration::from_secs(4));
        assert_eq!(config.cycle_max, Duration::from_secs(6));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert!(!config.redraw_each_cycle);
        assert_eq!(config.queue.order, RetrievalOrder::Lifo);
        assert_eq!(config.queue.capacity, Some(DEFAULT_QUEUE_DEPTH));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_inverted_range() {
        let config = ControllerConfig {
            cycle_min: Duration::from_secs(7),
            ..ControllerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ControllerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_poll_and_zero_capacity() {
        let zero_poll = ControllerConfig {
            poll_interval: Duration::ZERO,
            ..ControllerConfig::default()
        };
        assert!(zero_poll.validate().is_err());

        let mut zero_capacity = ControllerConfig::default();
        zero_capacity.queue.capacity = Some(0);
        assert!(zero_capacity.validate().is_err());
    }

    #[test]
    fn rejects_sub_millisecond_durations() {
        let config = ControllerConfig {
            poll_interval: Duration::from_micros(500),
            ..ControllerConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("poll_interval"));
        assert!(serde_json::to_string(&config).is_err());

        let config = ControllerConfig {
            cycle_min: Duration::from_micros(4_000_250),
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn oversized_duration_fails_to_serialize() {
        let config = ControllerConfig {
            cycle_max: Duration::from_secs(u64::MAX),
            ..ControllerConfig::default()
        };
        assert!(config.validate().is_ok());
        let err = serde_json::to_string(&config).unwrap_err();
        assert!(err.to_string().contains("overflows"));
    }

    #[test]
    fn loads_partial_json_with_defaults() -> Result<()> {
        let path = temp_config_path("partial");
        std::fs::write(
            &path,
            r#"{ "cycle_min_ms": 100, "cycle_max_ms": 200, "queue": { "order": "fifo" } }"#,
        )?;

        let config = ControllerConfig::from_json_file(&path)?;
        assert_eq!(config.cycle_min, Duration::from_millis(100));
        assert_eq!(config.cycle_max, Duration::from_millis(200));
        assert_eq!(config.poll_interval, Duration::from_millis(1));
        assert_eq!(config.queue.order, RetrievalOrder::Fifo);
        assert_eq!(config.queue.capacity, None);

        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[test]
    fn invalid_json_config_is_reported() -> Result<()> {
        let path = temp_config_path("invalid");
        std::fs::write(&path, r#"{ "cycle_min_ms": 900, "cycle_max_ms": 100 }"#)?;

        let err = ControllerConfig::from_json_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("exceeds cycle_max"));

        let _ = std::fs::remove_file(path);
        Ok(())
    }

    #[test]
    fn round_trips_through_json() -> Result<()> {
        let config = ControllerConfig::default();
        let json = serde_json::to_string(&config)?;
        assert!(json.contains("\"cycle_max_ms\":6000"));
        let back: ControllerConfig = serde_json::from_str(&json)?;
        assert_eq!(back, config);
        Ok(())
    }
}
