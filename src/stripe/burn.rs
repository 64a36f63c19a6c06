//! Flushing a disc directory: burn it, or move it to a title folder

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::operator::Operator;
use crate::tools::{CommandRunner, MediaWriter};

/// Writes full disc directories to media
#[derive(Debug, Clone)]
pub struct BurnController {
    writer: MediaWriter,
    dry_run: bool,
    scratch_root: PathBuf,
}

impl BurnController {
    /// Controller burning with `writer`, or filing discs under `scratch_root`
    /// when `dry_run` is set
    pub fn new(writer: MediaWriter, dry_run: bool, scratch_root: impl Into<PathBuf>) -> Self {
        BurnController {
            writer,
            dry_run,
            scratch_root: scratch_root.into(),
        }
    }

    /// Controller as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            MediaWriter::from_config(config),
            config.dry_run(),
            config.scratch.dir.clone(),
        )
    }

    /// Whether discs are only simulated
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Folder a dry run files disc `title` under
    pub fn title_folder(&self, title: &str) -> PathBuf {
        self.scratch_root.join(title)
    }

    /// Write `dir` to a disc titled `title`
    ///
    /// `dir` is left as it is; the caller empties it once every disc of
    /// the set has been written.
    pub fn flush<R, O>(&self, runner: &mut R, operator: &mut O, title: &str, dir: &Path) -> Result<()>
    where
        R: CommandRunner + ?Sized,
        O: Operator + ?Sized,
    {
        if self.dry_run {
            return self.file_under_title(title, dir);
        }
        operator.confirm_blank_media(title)?;
        self.writer.burn(runner, title, dir)
    }

    fn file_under_title(&self, title: &str, dir: &Path) -> Result<()> {
        let folder = self.title_folder(title);
        fs::create_dir(&folder).map_err(|e| match e.kind() {
            io::ErrorKind::AlreadyExists => {
                Error::Invariant(format!("disc {} was already written", title))
            }
            _ => Error::Io(e),
        })?;

        let mut moved = 0;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                let target = folder.join(entry.file_name());
                debug!("moving {:?} to {:?}", entry.path(), target);
                fs::rename(entry.path(), target)?;
                moved += 1;
            }
        }
        info!("dry run: filed {} files from {:?} as {}", moved, dir, title);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::DiscRequest;
    use crate::tools::MockRunner;
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingOperator {
        confirmed: Vec<String>,
    }

    impl Operator for CountingOperator {
        fn confirm_blank_media(&mut self, title: &str) -> Result<()> {
            self.confirmed.push(title.to_string());
            Ok(())
        }

        fn request_mount_path(&mut self, _request: &DiscRequest) -> Result<Option<PathBuf>> {
            Ok(None)
        }
    }

    fn disc_dir(root: &Path) -> PathBuf {
        let dir = root.join("__disc0001");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("thing.0001.dar"), b"1").unwrap();
        fs::write(dir.join("README.txt"), b"r").unwrap();
        dir
    }

    #[test]
    fn test_flush_burns_after_confirmation() {
        let root = tempdir().unwrap();
        let dir = disc_dir(root.path());
        let controller = BurnController::new(
            MediaWriter::new("growisofs", "/dev/zero"),
            false,
            root.path(),
        );
        let mut runner = MockRunner::new();
        let mut operator = CountingOperator::default();

        controller
            .flush(&mut runner, &mut operator, "thing-0001-001", &dir)
            .unwrap();

        assert_eq!(operator.confirmed, vec!["thing-0001-001"]);
        assert_eq!(runner.burned()[0].title, "thing-0001-001");
        assert_eq!(runner.burned()[0].files, vec!["README.txt", "thing.0001.dar"]);
        assert!(dir.join("thing.0001.dar").is_file());
    }

    #[test]
    fn test_dry_run_moves_into_title_folder() {
        let root = tempdir().unwrap();
        let dir = disc_dir(root.path());
        let controller = BurnController::new(
            MediaWriter::new("growisofs", "/dev/zero"),
            true,
            root.path(),
        );
        let mut runner = MockRunner::new();
        let mut operator = CountingOperator::default();

        controller
            .flush(&mut runner, &mut operator, "thing-0001-001", &dir)
            .unwrap();

        let folder = root.path().join("thing-0001-001");
        assert!(folder.join("thing.0001.dar").is_file());
        assert!(folder.join("README.txt").is_file());
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        assert!(runner.calls().is_empty());
        assert!(operator.confirmed.is_empty());

        let err = controller
            .flush(&mut runner, &mut operator, "thing-0001-001", &dir)
            .unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn test_burn_failure_propagates() {
        let root = tempdir().unwrap();
        let dir = disc_dir(root.path());
        let controller = BurnController::new(
            MediaWriter::new("growisofs", "/dev/zero"),
            false,
            root.path(),
        );
        let mut runner = MockRunner::new().failing("growisofs");
        let err = controller
            .flush(&mut runner, &mut CountingOperator::default(), "thing-0001-002", &dir)
            .unwrap_err();
        assert!(matches!(err, Error::ToolFailed { .. }));
    }
}
