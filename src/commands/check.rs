//! Validate a replay script.

use std::path::PathBuf;

use clap::Args;

use crate::replay::{ReplayError, ReplayScript};

/// Validate a replay script and summarize what it will play back
#[derive(Debug, Args)]
pub struct CheckCommand {
    /// Replay script to check
    script: PathBuf,
}

impl CheckCommand {
    pub fn run(&self) -> Result<(), ReplayError> {
        let script = ReplayScript::load(&self.script)?;
        print!("{}", summarize(&script));
        Ok(())
    }
}

fn summarize(script: &ReplayScript) -> String {
    let mut out = String::new();

    out.push_str(&format!("Docs pages: {}\n", script.docs.len()));
    for entry in &script.docs {
        let page = if entry.path.is_empty() {
            "(root)"
        } else {
            entry.path.as_str()
        };
        let outcome = if entry.content.is_some() {
            "content"
        } else {
            "error"
        };
        out.push_str(&format!("  {} -> {} after {}ms\n", page, outcome, entry.delay_ms));
    }

    out.push_str(&format!(
        "Sync: {} log line{} over {}ms\n",
        script.sync.lines.len(),
        if script.sync.lines.len() == 1 { "" } else { "s" },
        script.sync.delay_ms
    ));

    match (&script.sync.result, &script.sync.error) {
        (Some(tag), _) => match script.sync_result() {
            Some(result) => out.push_str(&format!("  result: {}\n", result)),
            None => out.push_str(&format!(
                "  result: {} (not a known result tag, the reader will reject it)\n",
                tag
            )),
        },
        (None, Some(error)) => out.push_str(&format!("  error: {}\n", error)),
        (None, None) => {}
    }

    out
}
