//! Controller configuration, read from the environment.
//!
//! | Variable | Default | Meaning |
//! |---|---|---|
//! | `WATCH_NAMESPACE` | all namespaces | namespace whose HostClaims are reconciled |
//! | `METRICS_BIND_ADDRESS` | `0.0.0.0:8080` | address of the metrics and probe server |
//! | `RECONCILE_CONCURRENCY` | `3` | HostClaims reconciled in parallel |
//! | `LOG_FORMAT` | `text` | `text` or `json` |
//!
//! Log levels come from `RUST_LOG`.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::str::FromStr;

const DEFAULT_METRICS_BIND_ADDRESS: &str = "0.0.0.0:8080";
const DEFAULT_RECONCILE_CONCURRENCY: u16 = 3;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

impl FromStr for LogFormat {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ControllerError::InvalidConfig(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                other
            ))),
        }
    }
}

/// HostClaim controller configuration.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace to watch; `None` watches every namespace
    pub watch_namespace: Option<String>,
    pub metrics_bind_address: SocketAddr,
    /// Maximum number of concurrent reconciliations
    pub reconcile_concurrency: u16,
    pub log_format: LogFormat,
}

impl ControllerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the configuration through `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let metrics_bind_address = non_empty("METRICS_BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_METRICS_BIND_ADDRESS.to_string());
        let metrics_bind_address = metrics_bind_address.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!(
                "METRICS_BIND_ADDRESS '{}' is not a socket address: {}",
                metrics_bind_address, e
            ))
        })?;

        let reconcile_concurrency = match non_empty("RECONCILE_CONCURRENCY") {
            Some(value) => match value.parse::<u16>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "RECONCILE_CONCURRENCY must be a positive integer, got '{}'",
                        value
                    )));
                }
            },
            None => DEFAULT_RECONCILE_CONCURRENCY,
        };

        let log_format = match non_empty("LOG_FORMAT") {
            Some(value) => value.parse()?,
            None => LogFormat::default(),
        };

        Ok(Self {
            watch_namespace: non_empty("WATCH_NAMESPACE"),
            metrics_bind_address,
            reconcile_concurrency,
            log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ControllerConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.watch_namespace, None);
        assert_eq!(config.metrics_bind_address, "0.0.0.0:8080".parse::<SocketAddr>().unwrap());
        assert_eq!(config.reconcile_concurrency, 3);
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("WATCH_NAMESPACE", "tenant-a"),
            ("METRICS_BIND_ADDRESS", "127.0.0.1:9100"),
            ("RECONCILE_CONCURRENCY", "8"),
            ("LOG_FORMAT", "JSON"),
        ])
        .unwrap();
        assert_eq!(config.watch_namespace.as_deref(), Some("tenant-a"));
        assert_eq!(config.metrics_bind_address.port(), 9100);
        assert_eq!(config.reconcile_concurrency, 8);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_empty_namespace_means_all() {
        let config = config(&[("WATCH_NAMESPACE", "  ")]).unwrap();
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(matches!(
            config(&[("RECONCILE_CONCURRENCY", "0")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("METRICS_BIND_ADDRESS", "localhost")]),
            Err(ControllerError::InvalidConfig(_))
        ));
        assert!(matches!(
            config(&[("LOG_FORMAT", "yaml")]),
            Err(ControllerError::InvalidConfig(_))
        ));
    }
}
