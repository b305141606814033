use std::fmt::Write;
use std::path::Path;

use flowgrid_controller::{PassOutcome, PassReport};

use crate::OutputFormat;

pub async fn run(config: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let controller = super::controller(&config)?;
    let report = controller.run_once().await?;
    print(&report, format)
}

pub async fn plan(config: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let config = super::load_config(config)?;
    let controller = super::controller(&config)?;
    let report = controller.plan().await?;
    print(&report, format)
}

fn print(report: &PassReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => print!("{}", format_report(report)?),
    }
    Ok(())
}

pub fn format_report(report: &PassReport) -> anyhow::Result<String> {
    let mut out = String::new();
    writeln!(out, "Resource: {}", report.resource)?;

    if report.outcome == PassOutcome::NoRoutes {
        writeln!(out, "  no route destinations; nothing to do")?;
        return Ok(out);
    }

    writeln!(
        out,
        "  {:<32} {:>6} {:>6} {:>6} {:>7} {:>8} {:>6}",
        "TARGET", "RATING", "UTIL", "MEM", "POWER", "SCORE", "WEIGHT"
    )?;
    for (target, weight) in &report.weights.weights {
        match report.scores.iter().find(|s| &s.target == target) {
            Some(s) => writeln!(
                out,
                "  {:<32} {:>6.2} {:>6.1} {:>6.1} {:>7.1} {:>8.2} {:>6}",
                target.as_str(),
                s.rating,
                s.sample.utilization,
                s.sample.memory,
                s.sample.power,
                s.score,
                weight
            )?,
            None => writeln!(
                out,
                "  {:<32} {:>6} {:>6} {:>6} {:>7} {:>8.2} {:>6}",
                target.as_str(),
                "-",
                "-",
                "-",
                "-",
                0.0,
                weight
            )?,
        }
    }

    if report.weights.degenerate {
        writeln!(out, "  ! every score is zero; traffic split equally")?;
    }
    for target in &report.unobserved {
        writeln!(out, "  ! {target}: no metrics, scored 0")?;
    }
    for target in &report.unrouted {
        writeln!(out, "  ! {target}: observed but not in the route list")?;
    }

    writeln!(out, "Patch: {}", report.patch.to_json()?)?;
    let outcome = match report.outcome {
        PassOutcome::Applied => "✓ Applied",
        PassOutcome::Unchanged => "✓ Unchanged (live weights already match)",
        PassOutcome::Planned => "Planned (not applied)",
        PassOutcome::NoRoutes => "Nothing to do",
    };
    writeln!(out, "{outcome}")?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use flow_core::Target;
    use flowgrid_controller::{PatchBuilder, ScoreEngine, normalize};
    use flowgrid_metrics::SampleSet;

    use super::*;

    fn report() -> PassReport {
        let mut samples = SampleSet::new();
        samples.observe(Target::from("gpu-a"), None);
        samples.observe(Target::from("gpu-b"), None);
        let scores = ScoreEngine::default().score_all(&samples);
        let routes = vec![Target::from("gpu-a"), Target::from("gpu-b"), Target::from("gpu-c")];
        let by_target: HashMap<Target, f64> =
            scores.iter().map(|s| (s.target.clone(), s.score)).collect();
        let weights = normalize(&by_target, &routes);
        let patch = PatchBuilder::default().build(&weights.weights);
        PassReport {
            resource: "intern/virtualservice/sd-api-virtual".to_string(),
            routes,
            scores,
            weights,
            patch,
            outcome: PassOutcome::Planned,
            unobserved: vec![Target::from("gpu-c")],
            unrouted: Vec::new(),
        }
    }

    #[test]
    fn text_report_lists_every_route() {
        let text = format_report(&report()).unwrap();
        assert!(text.starts_with("Resource: intern/virtualservice/sd-api-virtual\n"));
        assert!(text.contains("gpu-a"));
        assert!(text.contains("gpu-c"));
        assert!(text.contains("! gpu-c: no metrics, scored 0"));
        assert!(text.contains(r#""path":"/spec/http/0/route/2/weight","value":0"#));
        assert!(text.ends_with("Planned (not applied)\n"));
    }

    #[test]
    fn empty_route_list_is_reported() {
        let mut r = report();
        r.outcome = PassOutcome::NoRoutes;
        let text = format_report(&r).unwrap();
        assert!(text.contains("nothing to do"));
        assert!(!text.contains("Patch:"));
    }
}
