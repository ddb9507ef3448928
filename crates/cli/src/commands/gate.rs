//! `nightshift gate`: run the enforcement hook in front of a workflow phase.

use nightshift_config::AppConfig;
use nightshift_hooks::{EnforcementHooks, HookContext, Phase};
use std::path::Path;

pub async fn run(
    config: &AppConfig,
    phase: &str,
    dir: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let phase: Phase = phase.parse()?;
    let hooks = EnforcementHooks::new(config.hooks.clone());
    let result = hooks.gate(phase, &HookContext::new(dir)).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    for warning in &result.warnings {
        eprintln!("⚠️  {warning}");
    }

    if !result.passed {
        return Err(format!(
            "{phase} gate failed: {}",
            result.error.as_deref().unwrap_or("no reason given")
        )
        .into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unknown_phase_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let err = run(&AppConfig::default(), "before-lunch", dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown phase"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn refactor_gate_follows_test_command() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();

        config.hooks.test_command = "echo '3 passing'".into();
        run(&config, "before-refactor", dir.path()).await.unwrap();

        config.hooks.test_command = "echo '2 passing, 1 failing'; exit 1".into();
        let err = run(&config, "before-refactor", dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("before-refactor gate failed"));
    }
}
