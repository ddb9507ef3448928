//! `nightshift init`: write a default config and create the state directory.

use nightshift_config::AppConfig;
use std::path::Path;

/// Write the default config unless one exists. Returns whether it wrote.
fn write_config(config_path: &Path, force: bool) -> std::io::Result<bool> {
    if config_path.exists() && !force {
        return Ok(false);
    }
    if let Some(parent) = config_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let toml = AppConfig::default_toml()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(config_path, toml)?;
    Ok(true)
}

pub fn run(config_path: &Path, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🌙 nightshift: setup");
    println!("====================\n");

    if write_config(config_path, force)? {
        println!("✅ Wrote config: {}", config_path.display());
    } else {
        println!("  Config file exists: {}", config_path.display());
        println!("  (use --force to overwrite)");
    }

    let config = AppConfig::load_from(config_path)?;
    let state_dir = &config.worker.state_dir;
    if state_dir.exists() {
        println!("  State directory exists: {}", state_dir.display());
    } else {
        std::fs::create_dir_all(state_dir)?;
        println!("✅ Created state directory: {}", state_dir.display());
    }

    if !config.executor.is_configured() {
        println!();
        println!("  Next: set [executor] command in {} so the worker", config_path.display());
        println!("  has an agent to run, then `nightshift run`.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_loadable_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf/nightshift.toml");

        assert!(write_config(&path, false).unwrap());
        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.worker.max_queue_items, 100);
    }

    #[test]
    fn keeps_existing_config_unless_forced() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nightshift.toml");
        std::fs::write(&path, "[worker]\nmax_budget_usd = 3.0\n").unwrap();

        assert!(!write_config(&path, false).unwrap());
        assert_eq!(AppConfig::load_from(&path).unwrap().worker.max_budget_usd, 3.0);

        assert!(write_config(&path, true).unwrap());
        assert_eq!(AppConfig::load_from(&path).unwrap().worker.max_budget_usd, 10.0);
    }
}
