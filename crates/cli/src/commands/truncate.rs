//! `nightshift truncate`: apply tool-output truncation to stdin or a file.
//!
//! Lets an external agent loop reuse the same limits the config sets.

use nightshift_agent::ContextManager;
use nightshift_config::AppConfig;
use std::io::Read;
use std::path::Path;

pub fn run(config: &AppConfig, tool: &str, file: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let output = match file {
        Some(path) => std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let manager = ContextManager::new(config.context.clone());
    let result = manager.truncate_tool_output(tool, &output);
    print!("{}", result.content);
    if result.was_truncated {
        tracing::debug!(
            tool,
            original_len = result.original_len,
            omitted = result.omitted,
            "Output truncated"
        );
    }
    Ok(())
}
