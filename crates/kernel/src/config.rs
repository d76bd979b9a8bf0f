//! Engine-wide tunables, loaded from the environment. No database round
//! trip: this engine persists nothing, so config is just `Default` plus a
//! handful of env-var overrides, parsed the same way the config this grew
//! out of parses its seeded key/value table.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Per-SAM collaborator call timeout.
    pub collaborator_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collaborator_timeout: Duration::from_secs(5),
        }
    }
}

impl EngineConfig {
    /// Reads `PIQI_COLLABORATOR_TIMEOUT_MS`, falling back to the documented
    /// default when unset or unparsable.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            collaborator_timeout: get_or(
                "PIQI_COLLABORATOR_TIMEOUT_MS",
                defaults.collaborator_timeout,
            ),
        }
    }
}

fn get_or(var: &str, default: Duration) -> Duration {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_unset() {
        unsafe {
            std::env::remove_var("PIQI_COLLABORATOR_TIMEOUT_MS");
        }
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.collaborator_timeout, Duration::from_secs(5));
    }

    #[test]
    fn overrides_from_env() {
        unsafe {
            std::env::set_var("PIQI_COLLABORATOR_TIMEOUT_MS", "1500");
        }
        let cfg = EngineConfig::from_env();
        assert_eq!(cfg.collaborator_timeout, Duration::from_millis(1500));
        unsafe {
            std::env::remove_var("PIQI_COLLABORATOR_TIMEOUT_MS");
        }
    }
}
