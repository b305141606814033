//! kubectl-backed routing sink.
//!
//! Reads the route list with `kubectl get <kind> <name> -n <ns> -o json`
//! and applies weights with `kubectl patch ... --type=json -p <doc>`.
//! Every invocation runs under a timeout; the child is killed when it
//! expires.

use std::path::PathBuf;
use std::process::Output;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use flow_core::config::RouteConfig;
use flow_core::{RouteResource, Target};

use crate::error::{SinkError, SinkResult};
use crate::patch::{PatchDocument, RouteEntry};
use crate::sink::RoutingSink;

#[derive(Debug, Clone)]
pub struct KubectlSink {
    binary: PathBuf,
    timeout: Duration,
}

impl KubectlSink {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    pub fn from_config(config: &RouteConfig, timeout: Duration) -> Self {
        Self::new(&config.kubectl, timeout)
    }

    fn program(&self) -> String {
        self.binary.display().to_string()
    }

    async fn run(&self, resource: &RouteResource, args: &[&str]) -> SinkResult<Output> {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args).kill_on_drop(true);
        debug!(program = %self.program(), ?args, "running");

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| SinkError::Timeout {
                program: self.program(),
                timeout: self.timeout,
            })?
            .map_err(|source| SinkError::Spawn {
                program: self.program(),
                source,
            })?;

        if !output.status.success() {
            return Err(SinkError::Rejected {
                resource: resource.id(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl RoutingSink for KubectlSink {
    async fn current_routes(&self, resource: &RouteResource) -> SinkResult<Vec<RouteEntry>> {
        let output = self
            .run(
                resource,
                &[
                    "get",
                    resource.kind.as_str(),
                    resource.name.as_str(),
                    "-n",
                    resource.namespace.as_str(),
                    "-o",
                    "json",
                ],
            )
            .await?;
        parse_routes(resource, &output.stdout)
    }

    async fn apply(&self, resource: &RouteResource, patch: &PatchDocument) -> SinkResult<()> {
        let payload = patch.to_json()?;
        self.run(
            resource,
            &[
                "patch",
                resource.kind.as_str(),
                resource.name.as_str(),
                "-n",
                resource.namespace.as_str(),
                "--type=json",
                "-p",
                payload.as_str(),
            ],
        )
        .await?;
        info!(resource = %resource, ops = patch.len(), "routing resource patched");
        Ok(())
    }
}

#[derive(Deserialize)]
struct VirtualService {
    spec: VirtualServiceSpec,
}

#[derive(Deserialize)]
struct VirtualServiceSpec {
    #[serde(default)]
    http: Vec<HttpRoute>,
}

#[derive(Deserialize)]
struct HttpRoute {
    #[serde(default)]
    route: Vec<RouteDestination>,
}

#[derive(Deserialize)]
struct RouteDestination {
    destination: Destination,
    #[serde(default)]
    weight: Option<u32>,
}

#[derive(Deserialize)]
struct Destination {
    host: String,
    #[serde(default)]
    subset: Option<String>,
}

/// Extract the route list of `resource.group` from a resource document.
///
/// A destination is identified by its subset, or by its host when no
/// subset is set.
pub fn parse_routes(resource: &RouteResource, json: &[u8]) -> SinkResult<Vec<RouteEntry>> {
    let routes_err = |reason: String| SinkError::Routes {
        resource: resource.id(),
        reason,
    };

    let vs: VirtualService = serde_json::from_slice(json).map_err(|e| routes_err(e.to_string()))?;
    let group = vs.spec.http.into_iter().nth(resource.group).ok_or_else(|| {
        routes_err(format!("spec.http[{}] does not exist", resource.group))
    })?;

    Ok(group
        .route
        .into_iter()
        .map(|r| RouteEntry {
            destination: Target::from(r.destination.subset.unwrap_or(r.destination.host)),
            weight: r.weight,
        })
        .collect())
}
