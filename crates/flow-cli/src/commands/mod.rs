pub mod init;
pub mod pass;
pub mod watch;

use std::path::Path;

use anyhow::Context;
use flow_core::FlowConfig;
use flowgrid_controller::Controller;
use flowgrid_metrics::PrometheusSource;
use flowgrid_sink::KubectlSink;

pub type LiveController = Controller<PrometheusSource, KubectlSink>;

pub fn load_config(path: &Path) -> anyhow::Result<FlowConfig> {
    FlowConfig::from_file(path).with_context(|| {
        format!(
            "failed to load {} (run `flowctl init` to scaffold one)",
            path.display()
        )
    })
}

/// Controller wired to Prometheus and kubectl from `config`.
pub fn controller(config: &FlowConfig) -> anyhow::Result<LiveController> {
    let source = PrometheusSource::from_config(&config.metrics);
    let sink = KubectlSink::from_config(&config.route, config.route_timeout()?);
    Ok(Controller::from_config(config, source, sink)?)
}
