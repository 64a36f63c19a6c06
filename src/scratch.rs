//! Scratch area: the staging directory shared by the archiver and discraid
//!
//! Layout while a backup runs:
//!
//! ```text
//! <scratch>/
//!   discraid          program copy the archiver hook runs
//!   discraid.json     effective configuration
//!   darrc             archiver control file
//!   <base>.NNNN.dar   slices not yet protected
//!   __disc0001/ ...   one directory per column of the current set
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry::NamingScheme;

/// Name of the program copy in the scratch area and on every disc
pub const PROGRAM_NAME: &str = env!("CARGO_PKG_NAME");

/// Name of the configuration copy in the scratch area and on every disc
pub const CONFIG_NAME: &str = "discraid.json";

/// Name of the README written to every disc
pub const README_NAME: &str = "README.txt";

const DISC_DIR_PREFIX: &str = "__disc";
const MIB: u64 = 1024 * 1024;

/// Free space on the filesystem holding `path`, in MiB
pub fn available_mib(path: &Path) -> Result<u64> {
    let stats = nix::sys::statvfs::statvfs(path).map_err(std::io::Error::from)?;
    let bytes = (stats.blocks_available() as u64).saturating_mul(stats.fragment_size() as u64);
    Ok(bytes / MIB)
}

/// The staging directory and its per-column disc directories
#[derive(Debug, Clone)]
pub struct ScratchArea {
    root: PathBuf,
    total_discs: usize,
}

impl ScratchArea {
    /// Scratch area at `root` for sets of `total_discs` discs
    pub fn new(root: impl Into<PathBuf>, total_discs: usize) -> Self {
        ScratchArea {
            root: root.into(),
            total_discs,
        }
    }

    /// Scratch area as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.scratch.dir.clone(), config.geometry.total_discs())
    }

    /// Root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory collecting the files of disc `column` (0-based)
    pub fn disc_dir(&self, column: usize) -> PathBuf {
        self.root.join(format!("{}{:04}", DISC_DIR_PREFIX, column + 1))
    }

    /// All disc directories, in column order
    pub fn disc_dirs(&self) -> Vec<PathBuf> {
        (0..self.total_discs).map(|c| self.disc_dir(c)).collect()
    }

    /// Path of the program copy
    pub fn program_path(&self) -> PathBuf {
        self.root.join(PROGRAM_NAME)
    }

    /// Path of the configuration copy
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_NAME)
    }

    /// Set up a fresh scratch area for a backup
    ///
    /// The root must not exist, or be an empty directory. `free_mib` reports
    /// the free space of the filesystem holding the root once it exists.
    pub fn prepare_backup<F>(&self, program: &Path, needed_mib: u64, free_mib: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<u64>,
    {
        if self.root.exists() {
            let empty_dir = self.root.is_dir() && fs::read_dir(&self.root)?.next().is_none();
            if !empty_dir {
                return Err(Error::ScratchConflict {
                    path: self.root.clone(),
                });
            }
        }
        fs::create_dir_all(&self.root)?;

        let available = free_mib(&self.root)?;
        if available < needed_mib {
            return Err(Error::InsufficientSpace {
                path: self.root.clone(),
                needed_mib,
                available_mib: available,
            });
        }

        for dir in self.disc_dirs() {
            fs::create_dir(&dir)?;
        }
        fs::copy(program, self.program_path())?;
        info!(
            "scratch area {:?} ready: {} disc directories, {} MiB free",
            self.root, self.total_discs, available
        );
        Ok(())
    }

    /// Set up (or reuse) the scratch area for a restore
    ///
    /// No emptiness or free-space check: the same area is reused across
    /// set transitions, and may be prepared again by a resumed restore.
    pub fn prepare_restore(&self, program: &Path) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        let target = self.program_path();
        if !same_file(program, &target) {
            fs::copy(program, &target)?;
        }
        debug!("scratch area {:?} ready for restore", self.root);
        Ok(())
    }

    /// Write the effective configuration into the scratch area
    pub fn write_config(&self, config: &Config) -> Result<()> {
        config.save(self.config_path())
    }

    /// Remove every slice, index file and parity volume of `naming`'s backup
    /// from the root, keeping the program, README, configuration and
    /// disc directories. Returns how many files were removed.
    pub fn clear_payload(&self, naming: &NamingScheme) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if name.to_str().map_or(false, |n| naming.is_payload_file(n)) {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        debug!("removed {} staged files from {:?}", removed, self.root);
        Ok(removed)
    }
}

/// Remove every file directly inside `dir`
pub fn clear_dir(dir: &Path) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use tempfile::tempdir;

    fn program(dir: &Path) -> PathBuf {
        let path = dir.join("built-program");
        fs::write(&path, b"#!/bin/true\n").unwrap();
        path
    }

    #[test]
    fn test_disc_dir_names() {
        let scratch = ScratchArea::new("/s", 3);
        assert_eq!(scratch.disc_dir(0), PathBuf::from("/s/__disc0001"));
        assert_eq!(scratch.disc_dirs().len(), 3);
        assert_eq!(scratch.program_path(), PathBuf::from("/s/discraid"));
    }

    #[test]
    fn test_prepare_backup_creates_layout() {
        let dir = tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path().join("scratch"), 5);
        scratch
            .prepare_backup(&program(dir.path()), 500, |_| Ok(1000))
            .unwrap();

        for d in scratch.disc_dirs() {
            assert!(d.is_dir());
        }
        assert_eq!(fs::read(scratch.program_path()).unwrap(), b"#!/bin/true\n");
    }

    #[test]
    fn test_prepare_backup_accepts_empty_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("scratch");
        fs::create_dir(&root).unwrap();
        let scratch = ScratchArea::new(&root, 2);
        assert!(scratch
            .prepare_backup(&program(dir.path()), 1, |_| Ok(1))
            .is_ok());
    }

    #[test]
    fn test_prepare_backup_conflicts() {
        let dir = tempdir().unwrap();
        let program = program(dir.path());

        let busy = dir.path().join("busy");
        fs::create_dir(&busy).unwrap();
        fs::write(busy.join("leftover.dar"), b"x").unwrap();
        let err = ScratchArea::new(&busy, 2)
            .prepare_backup(&program, 1, |_| Ok(10))
            .unwrap_err();
        assert!(matches!(err, Error::ScratchConflict { .. }));

        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        let err = ScratchArea::new(&file, 2)
            .prepare_backup(&program, 1, |_| Ok(10))
            .unwrap_err();
        assert!(matches!(err, Error::ScratchConflict { .. }));
    }

    #[test]
    fn test_prepare_backup_insufficient_space() {
        let dir = tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path().join("scratch"), 5);
        let err = scratch
            .prepare_backup(&program(dir.path()), 5 * 23841, |_| Ok(100))
            .unwrap_err();
        match err {
            Error::InsufficientSpace {
                needed_mib,
                available_mib,
                ..
            } => {
                assert_eq!(needed_mib, 5 * 23841);
                assert_eq!(available_mib, 100);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!scratch.disc_dir(0).exists());
    }

    #[test]
    fn test_prepare_restore_reuses_area() {
        let dir = tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path().join("scratch"), 3);
        let program = program(dir.path());
        scratch.prepare_restore(&program).unwrap();
        fs::write(scratch.root().join("thing.0001.dar"), b"x").unwrap();

        scratch.prepare_restore(&program).unwrap();
        scratch.prepare_restore(&scratch.program_path()).unwrap();
        assert!(scratch.root().join("thing.0001.dar").is_file());
        assert!(scratch.program_path().is_file());
    }

    #[test]
    fn test_clear_payload_keeps_support_files() {
        let dir = tempdir().unwrap();
        let scratch = ScratchArea::new(dir.path(), 2);
        let geometry = Geometry {
            data_discs: 1,
            parity_discs: 1,
            slices_per_disc: 2,
            digits: Some(4),
            ..Geometry::default()
        };
        let naming = NamingScheme::new("thing", "dar", &geometry).unwrap();

        for name in [
            "thing.0001.dar",
            "thing.0001-0001.par",
            "thing.0001-0001.p00",
            PROGRAM_NAME,
            CONFIG_NAME,
            README_NAME,
            "other.0001.dar",
        ] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        fs::create_dir(scratch.disc_dir(0)).unwrap();

        assert_eq!(scratch.clear_payload(&naming).unwrap(), 3);
        assert!(scratch.program_path().is_file());
        assert!(dir.path().join(README_NAME).is_file());
        assert!(dir.path().join("other.0001.dar").is_file());
        assert!(scratch.disc_dir(0).is_dir());
    }

    #[test]
    fn test_available_mib_reports_space() {
        let dir = tempdir().unwrap();
        assert!(available_mib(dir.path()).is_ok());
        assert!(available_mib(&dir.path().join("absent")).is_err());
    }
}
