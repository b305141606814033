//! flowgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::types::{RatingTable, RouteResource, ScoreWeights, Target};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid flowgrid.toml: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub controller: ControllerConfig,
    pub metrics: MetricsConfig,
    pub score: ScoreWeights,
    pub ratings: RatingTable,
    pub route: RouteConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Interval between passes in `watch` mode.
    pub interval: String,
    /// Directory holding per-resource lock files. Defaults to the system temp dir.
    pub lock_dir: Option<PathBuf>,
    /// Age after which an abandoned lock file is reclaimed.
    pub stale_lock: String,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            interval: "30s".to_string(),
            lock_dir: None,
            stale_lock: "10m".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// `host:port` of the Prometheus server.
    pub address: String,
    /// Instant-query endpoint path.
    pub path: String,
    pub timeout: String,
    /// Label carrying the target identity.
    pub target_label: String,
    /// Only identities starting with this prefix are routed to.
    pub target_prefix: Option<String>,
    /// Label carrying the GPU model name.
    pub model_label: String,
    pub utilization_query: String,
    pub memory_query: String,
    pub power_query: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            address: "localhost:9090".to_string(),
            path: "/api/v1/query".to_string(),
            timeout: "10s".to_string(),
            target_label: "pod".to_string(),
            target_prefix: None,
            model_label: "modelName".to_string(),
            utilization_query: "DCGM_FI_DEV_GPU_UTIL{}".to_string(),
            memory_query: "DCGM_FI_DEV_MEM_COPY_UTIL{}".to_string(),
            power_query: "DCGM_FI_DEV_POWER_USAGE{}".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub kind: String,
    pub name: String,
    pub namespace: String,
    /// Index into `spec.http`.
    pub group: usize,
    /// Static route order. When unset the order is read from the live resource.
    pub targets: Option<Vec<String>>,
    /// Path or name of the kubectl binary.
    pub kubectl: String,
    pub timeout: String,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            kind: "virtualservice".to_string(),
            name: String::new(),
            namespace: "default".to_string(),
            group: 0,
            targets: None,
            kubectl: "kubectl".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

impl FlowConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: FlowConfig = content.parse()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config for a Stable Diffusion API fronted by an Istio VirtualService.
    pub fn scaffold() -> Self {
        FlowConfig {
            controller: ControllerConfig::default(),
            metrics: MetricsConfig {
                address: "kube-prometheus-stack-prometheus.monitoring.svc:9090".to_string(),
                target_prefix: Some("stable-diffusion-api".to_string()),
                ..Default::default()
            },
            score: ScoreWeights::default(),
            ratings: RatingTable::default(),
            route: RouteConfig {
                name: "sd-api-virtual".to_string(),
                namespace: "intern".to_string(),
                ..Default::default()
            },
        }
    }

    /// Check values that serde cannot: durations, ratings, weights, names.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.route.name.trim().is_empty() {
            return Err(ConfigError::Invalid("route.name must be set".to_string()));
        }
        if self.route.namespace.trim().is_empty() {
            return Err(ConfigError::Invalid("route.namespace must be set".to_string()));
        }
        let interval = self.interval()?;
        let stale_lock = self.stale_lock()?;
        let metrics_timeout = self.metrics_timeout()?;
        let route_timeout = self.route_timeout()?;
        for (field, value) in [
            ("controller.interval", interval),
            ("controller.stale_lock", stale_lock),
            ("metrics.timeout", metrics_timeout),
            ("route.timeout", route_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid(format!("{field} must be positive")));
            }
        }

        // A lock younger than the longest possible pass is still held.
        let longest_pass = metrics_timeout
            .saturating_mul(3)
            .saturating_add(route_timeout.saturating_mul(2));
        if stale_lock < longest_pass {
            return Err(ConfigError::Invalid(format!(
                "controller.stale_lock ({stale_lock:?}) is shorter than the longest pass \
                 (3 x metrics.timeout + 2 x route.timeout = {longest_pass:?})"
            )));
        }

        for (name, value) in self.score.named() {
            check_non_negative(&format!("score.{name}"), value)?;
        }
        check_non_negative("ratings.default", self.ratings.default)?;
        for (model, value) in &self.ratings.models {
            check_non_negative(&format!("ratings.models.\"{model}\""), *value)?;
        }
        for (target, value) in &self.ratings.targets {
            check_non_negative(&format!("ratings.targets.\"{target}\""), *value)?;
        }

        if let Some(targets) = &self.route.targets {
            let mut seen = std::collections::HashSet::new();
            for t in targets {
                if !seen.insert(t.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "route.targets lists \"{t}\" twice"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn interval(&self) -> Result<Duration, ConfigError> {
        duration_field("controller.interval", &self.controller.interval)
    }

    pub fn stale_lock(&self) -> Result<Duration, ConfigError> {
        duration_field("controller.stale_lock", &self.controller.stale_lock)
    }

    pub fn metrics_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("metrics.timeout", &self.metrics.timeout)
    }

    pub fn route_timeout(&self) -> Result<Duration, ConfigError> {
        duration_field("route.timeout", &self.route.timeout)
    }

    pub fn lock_dir(&self) -> PathBuf {
        self.controller
            .lock_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }

    pub fn route_resource(&self) -> RouteResource {
        RouteResource {
            kind: self.route.kind.clone(),
            name: self.route.name.clone(),
            namespace: self.route.namespace.clone(),
            group: self.route.group,
        }
    }

    /// Statically configured route order, if any.
    pub fn static_targets(&self) -> Option<Vec<Target>> {
        self.route
            .targets
            .as_ref()
            .map(|ts| ts.iter().map(|t| Target::from(t.as_str())).collect())
    }
}

impl std::str::FromStr for FlowConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}

fn duration_field(field: &str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value)
        .ok_or_else(|| ConfigError::Invalid(format!("{field}: cannot parse duration \"{value}\"")))
}

fn check_non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{field} must be a non-negative number, got {value}"
        )))
    }
}

/// Parse a duration string like "5s", "500ms", "1m". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
