//! Controller configuration

use std::time::Duration;

use crate::error::{KubeError, Result};

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace to watch; all namespaces when `None`
    pub namespace: Option<String>,

    /// Requeue delay after a retryable failure
    pub retry_backoff: Duration,

    /// Requeue delay after a failure that needs the App to change
    pub fatal_backoff: Duration,

    /// Requeue delay after a successful reconciliation
    pub resync_interval: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            namespace: None,
            retry_backoff: Duration::from_secs(5),
            fatal_backoff: Duration::from_secs(300),
            resync_interval: Duration::from_secs(300),
        }
    }
}

impl ControllerConfig {
    /// Reject settings the controller cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.namespace.as_deref().is_some_and(str::is_empty) {
            return Err(KubeError::InvalidConfig(
                "namespace must not be empty".to_string(),
            ));
        }

        for (name, value) in [
            ("retry backoff", self.retry_backoff),
            ("fatal backoff", self.fatal_backoff),
            ("resync interval", self.resync_interval),
        ] {
            if value.is_zero() {
                return Err(KubeError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// Parse a duration string (e.g., "5m", "30s", "1h", "500ms")
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    let (num_str, unit) = if let Some(stripped) = value.strip_suffix("ms") {
        (stripped, "ms")
    } else if let Some(stripped) = value.strip_suffix('s') {
        (stripped, "s")
    } else if let Some(stripped) = value.strip_suffix('m') {
        (stripped, "m")
    } else if let Some(stripped) = value.strip_suffix('h') {
        (stripped, "h")
    } else {
        // Bare numbers are seconds
        (value, "s")
    };

    let num: u64 = num_str.parse().ok()?;

    match unit {
        "ms" => Some(Duration::from_millis(num)),
        "s" => Some(Duration::from_secs(num)),
        "m" => num.checked_mul(60).map(Duration::from_secs),
        "h" => num.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("60"), Some(Duration::from_secs(60)));
        assert_eq!(parse_duration(" 10s "), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("fast"), None);
        assert_eq!(parse_duration("-5s"), None);
        assert_eq!(parse_duration("1.5h"), None);
    }

    #[test]
    fn test_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.retry_backoff, Duration::from_secs(5));
        assert_eq!(config.fatal_backoff, Duration::from_secs(300));
        assert_eq!(config.resync_interval, Duration::from_secs(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_backoff() {
        let config = ControllerConfig {
            retry_backoff: Duration::ZERO,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(KubeError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_empty_namespace() {
        let config = ControllerConfig {
            namespace: Some(String::new()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
