//! Repository mirror repair
//!
//! The OS release these devices run shipped with a mirror that has since
//! gone dark; every package operation fails until sources.list points at the
//! archive host. This runs before any package action.

use anyhow::{Context, Result};
use converge::{Action, Severity};
use regex::Regex;
use std::fs;
use std::path::PathBuf;

use crate::probe::sources_mention_host;
use crate::runner::{self, NETWORK_TIMEOUT};

#[derive(Debug, Clone)]
pub struct ReplaceMirror {
    pub sources_list: PathBuf,
    pub dead_host: String,
    pub replacement_host: String,
}

impl ReplaceMirror {
    pub fn new(sources_list: PathBuf, dead_host: &str, replacement_host: &str) -> Self {
        Self {
            sources_list,
            dead_host: dead_host.to_string(),
            replacement_host: replacement_host.to_string(),
        }
    }
}

impl Action for ReplaceMirror {
    fn id(&self) -> String {
        format!("mirror:{}", self.dead_host)
    }

    fn description(&self) -> String {
        format!(
            "repoint {} from {} to {}",
            self.sources_list.display(),
            self.dead_host,
            self.replacement_host
        )
    }

    fn kind(&self) -> &'static str {
        "replace_mirror"
    }

    fn severity(&self) -> Severity {
        // A broken mirror blocks everything downstream.
        Severity::Fatal
    }

    fn is_satisfied(&self) -> Result<bool> {
        let content = fs::read_to_string(&self.sources_list)
            .with_context(|| format!("Could not read {}", self.sources_list.display()))?;
        Ok(!sources_mention_host(&content, &self.dead_host))
    }

    fn apply(&self) -> Result<()> {
        let content = fs::read_to_string(&self.sources_list)
            .with_context(|| format!("Could not read {}", self.sources_list.display()))?;

        if let Some(rewritten) = rewrite_sources(&content, &self.dead_host, &self.replacement_host)
        {
            let backup = self.sources_list.with_extension("list.pifleet.bak");
            if !backup.exists() {
                fs::write(&backup, &content)
                    .with_context(|| format!("Could not back up to {}", backup.display()))?;
            }
            fs::write(&self.sources_list, rewritten)
                .with_context(|| format!("Could not write {}", self.sources_list.display()))?;
        }

        // The index must be refreshed against the new host before any
        // install can trust it.
        let mut update = runner::command("apt-get", &["update"]);
        update.env("DEBIAN_FRONTEND", "noninteractive");
        runner::run_command(update, None, NETWORK_TIMEOUT)?.require_success("apt-get update")?;
        Ok(())
    }
}

/// Replace the dead host in every active deb line; `None` when unchanged
pub fn rewrite_sources(content: &str, dead_host: &str, replacement_host: &str) -> Option<String> {
    let pattern = Regex::new(&regex::escape(dead_host)).ok()?;
    if !sources_mention_host(content, dead_host) {
        return None;
    }
    let rewritten: Vec<String> = content
        .lines()
        .map(|line| {
            if line.trim_start().starts_with('#') {
                line.to_string()
            } else {
                pattern.replace_all(line, replacement_host).into_owned()
            }
        })
        .collect();
    Some(rewritten.join("\n") + "\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_active_lines_only() {
        let sources = "# deb http://mirrordirector.raspbian.org/raspbian buster main\ndeb http://mirrordirector.raspbian.org/raspbian buster main contrib\n";
        let rewritten =
            rewrite_sources(sources, "mirrordirector.raspbian.org", "legacy.raspbian.org").unwrap();
        assert!(rewritten.contains("deb http://legacy.raspbian.org/raspbian buster main contrib"));
        // Commented lines are left as documentation of the old state.
        assert!(rewritten.contains("# deb http://mirrordirector.raspbian.org"));
    }

    #[test]
    fn unchanged_content_yields_none() {
        let sources = "deb http://legacy.raspbian.org/raspbian buster main\n";
        assert_eq!(
            rewrite_sources(sources, "mirrordirector.raspbian.org", "legacy.raspbian.org"),
            None
        );
    }

    #[test]
    fn rewrite_is_idempotent() {
        let sources = "deb http://mirrordirector.raspbian.org/raspbian buster main\n";
        let once =
            rewrite_sources(sources, "mirrordirector.raspbian.org", "legacy.raspbian.org").unwrap();
        assert_eq!(
            rewrite_sources(&once, "mirrordirector.raspbian.org", "legacy.raspbian.org"),
            None
        );
    }
}
