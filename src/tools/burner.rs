//! Disc burner driver

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::Result;

use super::{CommandRunner, ToolCommand};

/// Writes one directory to a disc as an ISO 9660 + Rock Ridge + Joliet image
#[derive(Debug, Clone)]
pub struct MediaWriter {
    program: String,
    device: PathBuf,
}

impl MediaWriter {
    /// Writer burning to `device` with `program`
    pub fn new(program: impl Into<String>, device: impl Into<PathBuf>) -> Self {
        MediaWriter {
            program: program.into(),
            device: device.into(),
        }
    }

    /// Writer as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tools.burner.clone(), config.burn.device.clone())
    }

    /// Burn `dir` under volume title `title`
    pub fn burn<R: CommandRunner + ?Sized>(
        &self,
        runner: &mut R,
        title: &str,
        dir: &Path,
    ) -> Result<()> {
        info!("burning {:?} to {:?} as {}", dir, self.device, title);
        let cwd = dir.parent().unwrap_or(dir);
        let command = ToolCommand::new(self.program.clone(), cwd)
            .arg("-Z")
            .arg(&self.device)
            .args(["-R", "-J", "-V", title])
            .arg(dir);
        runner
            .run(&command)?
            .check(&self.program, format!("burning disc {}", title))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::tools::MockRunner;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_burn_arguments() {
        let dir = tempdir().unwrap();
        let disc = dir.path().join("__disc0001");
        fs::create_dir(&disc).unwrap();
        fs::write(disc.join("thing.0001.dar"), b"x").unwrap();

        let writer = MediaWriter::new("growisofs", "/dev/zero");
        let mut runner = MockRunner::new();
        writer.burn(&mut runner, "thing-0001-001", &disc).unwrap();

        assert_eq!(
            runner.calls()[0].args,
            vec![
                "-Z".to_string(),
                "/dev/zero".to_string(),
                "-R".to_string(),
                "-J".to_string(),
                "-V".to_string(),
                "thing-0001-001".to_string(),
                disc.to_string_lossy().into_owned(),
            ]
        );
        assert_eq!(runner.burned()[0].files, vec!["thing.0001.dar"]);
    }

    #[test]
    fn test_burn_failure_names_disc() {
        let dir = tempdir().unwrap();
        let writer = MediaWriter::new("growisofs", "/dev/sr0");
        let mut runner = MockRunner::new().failing("growisofs");
        let err = writer
            .burn(&mut runner, "thing-0002-004", dir.path())
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { .. }));
        assert!(err.to_string().contains("thing-0002-004"));
    }
}
