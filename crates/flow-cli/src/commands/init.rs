use std::path::Path;

use flow_core::FlowConfig;

pub fn init(output: &Path, force: bool) -> anyhow::Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists (pass --force to overwrite)", output.display());
    }

    std::fs::write(output, FlowConfig::scaffold().to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    println!("  Set [route].name and [route].namespace before running `flowctl run`.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowgrid.toml");

        init(&path, false).unwrap();
        let config = crate::commands::load_config(&path).unwrap();
        assert_eq!(config.route.name, "sd-api-virtual");
        assert_eq!(config.route.namespace, "intern");
        assert_eq!(config.metrics.target_prefix.as_deref(), Some("stable-diffusion-api"));
        config.validate().unwrap();
    }

    #[test]
    fn existing_file_needs_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flowgrid.toml");
        std::fs::write(&path, "# mine\n").unwrap();

        assert!(init(&path, false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        init(&path, true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("[route]"));
    }
}
