//! Controller settings read from the environment.

use crate::error::ControllerError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_NAMESPACE: &str = "gpu-operator";
pub const DEFAULT_MANIFESTS_DIR: &str = "/opt/gpu-operator/manifests";
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Runtime settings of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Namespace operands are deployed into (`OPERATOR_NAMESPACE`)
    pub namespace: String,
    /// Root of the per-state manifest directories (`MANIFESTS_DIR`)
    pub manifests_dir: PathBuf,
    /// Requeue delay after a successful pass (`RECONCILE_INTERVAL_SECS`)
    pub reconcile_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from `lookup`. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let namespace = get("OPERATOR_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
        let manifests_dir = get("MANIFESTS_DIR")
            .map_or_else(|| PathBuf::from(DEFAULT_MANIFESTS_DIR), PathBuf::from);

        let reconcile_interval = match get("RECONCILE_INTERVAL_SECS") {
            None => Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ControllerError::InvalidConfig(format!(
                        "RECONCILE_INTERVAL_SECS must be a positive integer, got {:?}",
                        raw
                    )));
                }
            },
        };

        Ok(Self {
            namespace,
            manifests_dir,
            reconcile_interval,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Result<Settings, ControllerError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.namespace, "gpu-operator");
        assert_eq!(s.manifests_dir, PathBuf::from("/opt/gpu-operator/manifests"));
        assert_eq!(s.reconcile_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("OPERATOR_NAMESPACE", "nvidia"),
            ("MANIFESTS_DIR", "/manifests"),
            ("RECONCILE_INTERVAL_SECS", "60"),
        ])
        .unwrap();
        assert_eq!(s.namespace, "nvidia");
        assert_eq!(s.manifests_dir, PathBuf::from("/manifests"));
        assert_eq!(s.reconcile_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_empty_values_use_defaults() {
        let s = settings(&[("OPERATOR_NAMESPACE", ""), ("RECONCILE_INTERVAL_SECS", " ")]).unwrap();
        assert_eq!(s.namespace, "gpu-operator");
        assert_eq!(s.reconcile_interval, Duration::from_secs(300));
    }

    #[test]
    fn test_invalid_interval() {
        for raw in ["abc", "0", "-5", "1.5"] {
            let err = settings(&[("RECONCILE_INTERVAL_SECS", raw)]).unwrap_err();
            assert!(matches!(err, ControllerError::InvalidConfig(_)), "{raw}");
        }
    }
}
