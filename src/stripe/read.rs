//! Read side: stage the redundancy set holding a requested slice
//!
//! When the archiver asks for a slice that is not in the scratch area, the
//! previous set's files are cleared out and every disc of the set holding
//! the slice is copied in. Copies are made writable, since the parity tool
//! repairs damaged files in place. Slice 0 stands for the last slice of the
//! archive, whose set is found by asking for the discs of the last set.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry::NamingScheme;
use crate::operator::{DiscRequest, Operator};
use crate::scratch::ScratchArea;
use crate::tools::{CommandRunner, ParityTool, RepairOutcome};

use super::{file_names, SliceEvent};

/// What one slice request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// The slice was already in the scratch area; nothing was touched
    AlreadyStaged,
    /// A redundancy set was staged and verified
    Staged {
        /// 0-based set
        set: u64,
        /// Discs copied in
        discs_found: usize,
        /// Discs reported missing
        discs_missing: usize,
        /// File-sets the parity tool had to repair
        repaired: usize,
    },
}

/// Handles slice-requested callbacks for one restore
pub struct ReadScheduler<R, O> {
    naming: NamingScheme,
    scratch: ScratchArea,
    parity: ParityTool,
    runner: R,
    operator: O,
}

impl<R: CommandRunner, O: Operator> ReadScheduler<R, O> {
    /// Scheduler for the backup named by `naming`
    pub fn new(config: &Config, naming: NamingScheme, runner: R, operator: O) -> Self {
        ReadScheduler {
            naming,
            scratch: ScratchArea::from_config(config),
            parity: ParityTool::from_config(config),
            runner,
            operator,
        }
    }

    /// Make slice `event.number` available in the scratch area
    pub fn on_slice_requested(&mut self, event: &SliceEvent) -> Result<ReadOutcome> {
        if event.base != self.naming.base() || event.extension != self.naming.extension() {
            return Err(Error::InvalidArgument(format!(
                "slice {}.{}.{} does not belong to backup {}",
                event.base,
                event.number,
                event.extension,
                self.naming.base()
            )));
        }

        let root = self.scratch.root().to_path_buf();
        if event.number > 0 {
            let slice = self.naming.slice_file_name(event.number);
            if root.join(&slice).is_file() {
                debug!("{} already staged", slice);
                return Ok(ReadOutcome::AlreadyStaged);
            }
        }

        let removed = self.scratch.clear_payload(&self.naming)?;
        debug!("cleared {} files of the previous set", removed);

        let requests: Vec<DiscRequest> = if event.number == 0 {
            info!("looking for the last set of {}", self.naming.base());
            (0..self.naming.total_discs())
                .map(|column| DiscRequest::LastSet {
                    backup: self.naming.base().to_string(),
                    column,
                })
                .collect()
        } else {
            let set = self.naming.set_index(event.number);
            info!(
                "slice {} is in redundancy set {}",
                event.number,
                set + 1
            );
            (0..self.naming.total_discs())
                .map(|column| DiscRequest::Titled {
                    title: self.naming.disc_title(set, column),
                })
                .collect()
        };

        let mut discs_found = 0;
        let mut discs_missing = 0;
        for request in &requests {
            match self.operator.request_mount_path(request)? {
                Some(path) => {
                    let copied = self.stage_disc(&path, &root)?;
                    info!("staged {} files from {} at {:?}", copied, request, path);
                    discs_found += 1;
                }
                None => {
                    warn!("{} is missing; relying on parity", request);
                    discs_missing += 1;
                }
            }
        }

        let repaired = self.verify(&root)?;
        let set = self.check_slice(&root, event.number)?;
        Ok(ReadOutcome::Staged {
            set,
            discs_found,
            discs_missing,
            repaired,
        })
    }

    /// Copy the payload files of one disc into the scratch root
    fn stage_disc(&self, disc: &Path, root: &Path) -> Result<usize> {
        let mut copied = 0;
        for name in file_names(disc)? {
            if !self.naming.is_payload_file(&name) {
                continue;
            }
            let target = root.join(&name);
            if target.exists() {
                continue;
            }
            fs::copy(disc.join(&name), &target)?;
            let mut permissions = fs::metadata(&target)?.permissions();
            if permissions.mode() & 0o200 == 0 {
                permissions.set_mode(permissions.mode() | 0o200);
                fs::set_permissions(&target, permissions)?;
            }
            copied += 1;
        }
        Ok(copied)
    }

    /// Run the parity tool once per staged index file
    fn verify(&mut self, root: &Path) -> Result<usize> {
        let mut repaired = 0;
        let indexes: Vec<(String, u64)> = file_names(root)?
            .into_iter()
            .filter_map(|name| {
                let (min, _) = self.naming.index_range(&name)?;
                Some((name, self.naming.set_index(min)))
            })
            .collect();

        for (index, set) in indexes {
            match self.parity.repair(&mut self.runner, root, &index)? {
                RepairOutcome::Intact => debug!("{} verified", index),
                RepairOutcome::Repaired => {
                    info!("{} repaired", index);
                    repaired += 1;
                }
                RepairOutcome::Unrecoverable => {
                    return Err(Error::Unrecoverable { index, set: set + 1 });
                }
            }
        }
        Ok(repaired)
    }

    /// 0-based set of the requested slice, failing if it is still absent
    fn check_slice(&self, root: &Path, number: u64) -> Result<u64> {
        if number > 0 {
            let slice = self.naming.slice_file_name(number);
            let set = self.naming.set_index(number);
            if !root.join(&slice).is_file() {
                return Err(Error::SliceMissing { slice, set: set + 1 });
            }
            return Ok(set);
        }

        let names = file_names(root)?;
        let last = names
            .iter()
            .filter_map(|name| self.naming.slice_number(name))
            .max();
        match last {
            Some(last) => {
                info!("last slice of {} is {}", self.naming.base(), last);
                Ok(self.naming.set_index(last))
            }
            None => {
                let set = names
                    .iter()
                    .filter_map(|name| self.naming.index_range(name))
                    .map(|(_, max)| self.naming.set_index(max) + 1)
                    .max()
                    .unwrap_or(0);
                Err(Error::SliceMissing {
                    slice: format!("last slice of {}", self.naming.base()),
                    set,
                })
            }
        }
    }
}
