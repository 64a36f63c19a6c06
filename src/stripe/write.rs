//! Write side: group slices into file-sets, protect them, stripe them
//!
//! Slices accumulate in the scratch root until a file-set of `data_discs`
//! slices is complete (or the archive ends). The file-set is then handed to
//! the parity tool, its slices are dealt round-robin over the data columns
//! and its parity volumes over the parity columns. When the data discs are
//! full, or the archive has ended, every disc of the set is flushed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry::NamingScheme;
use crate::operator::Operator;
use crate::scratch::{clear_dir, ScratchArea, README_NAME};
use crate::tools::archiver::{Archiver, CONTROL_FILE_NAME};
use crate::tools::parity::ParityFiles;
use crate::tools::{CommandRunner, ParityTool};

use super::burn::BurnController;
use super::readme::Readme;
use super::{file_names, Phase, SliceEvent};

/// What one slice callback did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Slice range protected by the parity tool, if a file-set completed
    pub protected: Option<(u64, u64)>,
    /// Titles of the discs flushed, in column order
    pub flushed: Vec<String>,
}

/// Handles slice-created callbacks for one backup
pub struct WriteScheduler<R, O> {
    naming: NamingScheme,
    scratch: ScratchArea,
    parity: ParityTool,
    burner: BurnController,
    readme: String,
    data_discs: usize,
    slices_per_disc: usize,
    slice_size_mib: u64,
    reserve_space_mib: u64,
    disc_size_mib: u64,
    runner: R,
    operator: O,
}

impl<R: CommandRunner, O: Operator> WriteScheduler<R, O> {
    /// Scheduler for the backup named by `naming`
    pub fn new(config: &Config, naming: NamingScheme, runner: R, operator: O) -> Result<Self> {
        let geometry = &config.geometry;
        let scratch = ScratchArea::from_config(config);

        let control = match fs::read_to_string(scratch.root().join(CONTROL_FILE_NAME)) {
            Ok(text) => text,
            Err(_) => Archiver::from_config(config, false)?.control_file(),
        };
        let readme = Readme::new().render(config, naming.base(), &control)?;

        Ok(WriteScheduler {
            naming,
            scratch,
            parity: ParityTool::from_config(config),
            burner: BurnController::from_config(config),
            readme,
            data_discs: geometry.data_discs,
            slices_per_disc: geometry.slices_per_disc,
            slice_size_mib: geometry.slice_size_mib()?,
            reserve_space_mib: geometry.reserve_space_mib,
            disc_size_mib: geometry.disc_size_mib,
            runner,
            operator,
        })
    }

    /// Handle the archiver finishing slice `event.number`
    pub fn on_slice_created(&mut self, event: &SliceEvent) -> Result<WriteOutcome> {
        self.check_event(event)?;
        let root = self.scratch.root().to_path_buf();
        let slices = self.pending_slices(&root)?;
        debug!(
            "slice {} created ({:?}); {} slices waiting",
            event.number,
            event.phase,
            slices.len()
        );

        let mut outcome = WriteOutcome::default();
        if slices.len() >= self.data_discs || event.phase == Phase::Final {
            outcome.protected = Some(self.protect(&root, event.number, &slices)?);
        }

        let on_disc = self.slices_on_disc(0)?;
        if self.data_discs_full(on_disc) || event.phase == Phase::Final {
            outcome.flushed = self.flush_set(event.number)?;
        }
        Ok(outcome)
    }

    fn check_event(&self, event: &SliceEvent) -> Result<()> {
        if event.number == 0 {
            return Err(Error::InvalidArgument(
                "slice numbers start at 1 when creating".to_string(),
            ));
        }
        if event.base != self.naming.base() || event.extension != self.naming.extension() {
            return Err(Error::InvalidArgument(format!(
                "slice {}.{}.{} does not belong to backup {}",
                event.base,
                event.number,
                event.extension,
                self.naming.base()
            )));
        }
        if !same_dir(&event.dir, self.scratch.root()) {
            warn!(
                "archiver reports slices in {:?}, striping from scratch area {:?}",
                event.dir,
                self.scratch.root()
            );
        }
        Ok(())
    }

    /// Slices sitting in the scratch root, by number
    fn pending_slices(&self, root: &Path) -> Result<Vec<(u64, String)>> {
        let mut slices: Vec<(u64, String)> = file_names(root)?
            .into_iter()
            .filter_map(|name| self.naming.slice_number(&name).map(|n| (n, name)))
            .collect();
        slices.sort();
        Ok(slices)
    }

    /// Run the parity tool over one file-set and stripe the result
    fn protect(&mut self, root: &Path, number: u64, slices: &[(u64, String)]) -> Result<(u64, u64)> {
        let count = slices.len() as u64;
        if count == 0 {
            return Err(Error::EmptyFileSet { number });
        }
        if slices.len() > self.data_discs || count > number {
            return Err(Error::Invariant(format!(
                "{} slices waiting when slice {} arrived; a file-set holds at most {}",
                count, number, self.data_discs
            )));
        }

        let min = number + 1 - count;
        let numbers: Vec<u64> = slices.iter().map(|(n, _)| *n).collect();
        if numbers != (min..=number).collect::<Vec<u64>>() {
            return Err(Error::Invariant(format!(
                "slices {:?} waiting in {:?} do not form the file-set {}-{}",
                numbers, root, min, number
            )));
        }

        let inputs: Vec<String> = slices.iter().map(|(_, name)| name.clone()).collect();
        let files = self
            .parity
            .encode(&mut self.runner, root, &self.naming, min, number, &inputs)?;
        self.distribute(root, &files, slices)?;
        Ok((min, number))
    }

    fn distribute(&self, root: &Path, files: &ParityFiles, slices: &[(u64, String)]) -> Result<()> {
        let index = root.join(&files.index);
        let program = self.scratch.program_path();
        let config = self.scratch.config_path();

        for dir in self.scratch.disc_dirs() {
            fs::copy(&index, dir.join(&files.index))?;
            fs::write(dir.join(README_NAME), &self.readme)?;
            for support in [&program, &config] {
                if let Some(name) = support.file_name() {
                    if support.is_file() {
                        fs::copy(support, dir.join(name))?;
                    }
                }
            }
        }
        fs::remove_file(&index)?;

        for (number, name) in slices {
            let dir = self.scratch.disc_dir(self.naming.data_column(*number));
            debug!("moving {} to {:?}", name, dir);
            fs::rename(root.join(name), dir.join(name))?;
        }
        for (position, name) in files.volumes.iter().enumerate() {
            let dir = self.scratch.disc_dir(self.naming.parity_column(position));
            debug!("moving {} to {:?}", name, dir);
            fs::rename(root.join(name), dir.join(name))?;
        }
        info!(
            "striped {} slices and {} parity volumes of {}",
            slices.len(),
            files.volumes.len(),
            files.index
        );
        Ok(())
    }

    fn slices_on_disc(&self, column: usize) -> Result<usize> {
        Ok(file_names(&self.scratch.disc_dir(column))?
            .iter()
            .filter(|name| self.naming.slice_number(name).is_some())
            .count())
    }

    /// Whether the data discs cannot take one more slice each
    fn data_discs_full(&self, on_disc: usize) -> bool {
        let next = (on_disc as u64 + 1) * self.slice_size_mib + self.reserve_space_mib;
        on_disc >= self.slices_per_disc || next > self.disc_size_mib
    }

    /// Flush and empty every disc directory of the set holding `number`
    fn flush_set(&mut self, number: u64) -> Result<Vec<String>> {
        let set = self.naming.set_index(number);
        let mut titles = Vec::new();
        for (column, dir) in self.scratch.disc_dirs().into_iter().enumerate() {
            let title = self.naming.disc_title(set, column);
            info!("burning from {:?} as {}", dir, title);
            self.burner
                .flush(&mut self.runner, &mut self.operator, &title, &dir)?;
            clear_dir(&dir)?;
            titles.push(title);
        }
        info!("redundancy set {} complete", set + 1);
        Ok(titles)
    }
}

fn same_dir(a: &Path, b: &Path) -> bool {
    let canonical = |p: &Path| fs::canonicalize(p).unwrap_or_else(|_| PathBuf::from(p));
    canonical(a) == canonical(b)
}
