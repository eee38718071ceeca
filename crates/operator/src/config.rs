use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::informer::DEFAULT_RESYNC_PERIOD;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    /// Namespace to watch. `None` watches all namespaces.
    pub namespace: Option<String>,
    /// How often cached TFJobs are replayed to the update handler
    pub resync_period: Duration,
    /// Reporting component on recorded events
    pub controller_name: String,
    /// Number of concurrent reconciliation workers
    pub workers: usize,
    /// Name of the pod running this controller, reported as the event
    /// instance. Usually injected through the downward API.
    pub pod_name: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            resync_period: DEFAULT_RESYNC_PERIOD,
            controller_name: "tf-operator".to_string(),
            workers: 1,
            pod_name: None,
        }
    }
}

impl Config {
    pub fn load() -> crate::Result<Self> {
        // Load environment variables from .env file if it exists
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();

        let config = Config {
            namespace: lookup("TFJOB_NAMESPACE").filter(|ns| !ns.is_empty()),
            resync_period: parse(&lookup, "TFJOB_RESYNC_SECONDS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.resync_period),
            controller_name: lookup("TFJOB_CONTROLLER_NAME").unwrap_or(defaults.controller_name),
            workers: parse(&lookup, "TFJOB_WORKERS")?.unwrap_or(defaults.workers),
            pod_name: lookup("POD_NAME").filter(|name| !name.is_empty()),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.resync_period.is_zero() {
            return Err(crate::Error::Config(
                "TFJOB_RESYNC_SECONDS must be greater than zero".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(crate::Error::Config(
                "TFJOB_WORKERS must be at least 1".to_string(),
            ));
        }
        if self.controller_name.is_empty() {
            return Err(crate::Error::Config(
                "TFJOB_CONTROLLER_NAME must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> crate::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| crate::Error::Config(format!("invalid {} {:?}: {}", key, raw, e)))
        })
        .transpose()
}
