//! Striping of archive slices across redundancy sets
//!
//! The archiver calls back once per slice. Each callback is handled by a
//! fresh scheduler that reads the scratch area, does one state transition
//! and returns; nothing is kept in memory between callbacks.

pub mod burn;
pub mod read;
pub mod readme;
pub mod write;

pub use burn::BurnController;
pub use read::{ReadOutcome, ReadScheduler};
pub use write::{WriteOutcome, WriteScheduler};

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Where the archiver is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// More slices follow
    InProgress,
    /// This is the last slice of the archive
    Final,
}

impl FromStr for Phase {
    type Err = Error;

    /// Parse dar's `%c` context token
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "last_slice" => Ok(Phase::Final),
            "init" | "operation" | "operating" => Ok(Phase::InProgress),
            other => Err(Error::InvalidArgument(format!(
                "unknown archiver context {:?}",
                other
            ))),
        }
    }
}

/// One archiver callback: `%p %b %n %e %c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceEvent {
    /// Directory the slice lives in
    pub dir: PathBuf,
    /// Backup base name
    pub base: String,
    /// 1-based slice number; 0 asks for the last slice when reading
    pub number: u64,
    /// Slice extension
    pub extension: String,
    /// Archiver phase
    pub phase: Phase,
}

impl SliceEvent {
    /// Event from the raw hook arguments
    pub fn from_hook_args(
        dir: impl Into<PathBuf>,
        base: &str,
        number: &str,
        extension: &str,
        context: &str,
    ) -> Result<Self> {
        let number = number.trim().parse().map_err(|_| {
            Error::InvalidArgument(format!("slice number {:?} is not a number", number))
        })?;
        Ok(SliceEvent {
            dir: dir.into(),
            base: base.to_string(),
            number,
            extension: extension.to_string(),
            phase: context.parse()?,
        })
    }
}

/// Names of the regular files directly inside `dir`, sorted
pub(crate) fn file_names(dir: &Path) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Ok(name) = entry.file_name().into_string() {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_phase_tokens() {
        assert_eq!("last_slice".parse::<Phase>().unwrap(), Phase::Final);
        assert_eq!("operation".parse::<Phase>().unwrap(), Phase::InProgress);
        assert_eq!("init".parse::<Phase>().unwrap(), Phase::InProgress);
        assert!("finished".parse::<Phase>().is_err());
    }

    #[test]
    fn test_event_from_hook_args() {
        let event = SliceEvent::from_hook_args("/s", "thing", "14", "dar", "last_slice").unwrap();
        assert_eq!(event.number, 14);
        assert_eq!(event.phase, Phase::Final);
        assert_eq!(event.dir, PathBuf::from("/s"));

        let err = SliceEvent::from_hook_args("/s", "thing", "x1", "dar", "operation").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_file_names_sorted_files_only() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("b"), b"").unwrap();
        fs::write(dir.path().join("a"), b"").unwrap();
        fs::create_dir(dir.path().join("c")).unwrap();
        assert_eq!(file_names(dir.path()).unwrap(), vec!["a", "b"]);
    }
}
