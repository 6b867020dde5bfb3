//! Created-if-absent filesystem artifacts

use anyhow::{Context, Result};
use converge::{Action, Severity};
use std::fs;
use std::path::PathBuf;

/// Create a file only when absent; existing content is never touched
/// (device-local files like the error log or a seeded config)
#[derive(Debug, Clone)]
pub struct CreateFile {
    pub path: PathBuf,
    pub contents: Option<String>,
}

impl CreateFile {
    pub fn new(path: PathBuf, contents: Option<String>) -> Self {
        Self { path, contents }
    }
}

impl Action for CreateFile {
    fn id(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn description(&self) -> String {
        format!("create {} if absent", self.path.display())
    }

    fn kind(&self) -> &'static str {
        "create_file"
    }

    fn severity(&self) -> Severity {
        Severity::Fatal
    }

    fn is_satisfied(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn apply(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Could not create {}", parent.display()))?;
        }
        fs::write(&self.path, self.contents.as_deref().unwrap_or(""))
            .with_context(|| format!("Could not create {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_file_with_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/error.log");
        let action = CreateFile::new(path.clone(), None);

        assert!(!action.is_satisfied().unwrap());
        action.apply().unwrap();
        assert!(action.is_satisfied().unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), "");
    }

    #[test]
    fn existing_file_is_left_alone() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config_WM.py");
        fs::write(&path, "device_id = \"WM-07\"\n").unwrap();

        let action = CreateFile::new(path.clone(), Some("device_id = \"CHANGE-ME\"\n".into()));
        assert!(action.is_satisfied().unwrap());
        // The planner omits satisfied actions; the on-disk content stays.
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "device_id = \"WM-07\"\n"
        );
    }
}
