//! Parity tool driver
//!
//! The parity tool protects one file-set per call: it writes an index file
//! plus a number of recovery volumes that it chooses itself. The volumes
//! are found afterwards by their names, which carry the same slice range
//! as the index file.

use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::geometry::NamingScheme;

use super::{CommandRunner, ToolCommand};

/// Files written by one encoder call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParityFiles {
    /// Index file, copied to every disc of the set
    pub index: String,
    /// Recovery volumes, spread over the parity discs
    pub volumes: Vec<String>,
}

/// What a verify/repair pass found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairOutcome {
    /// Every protected file was present and correct
    Intact,
    /// Missing or damaged files were rebuilt in place
    Repaired,
    /// Too few volumes survive to rebuild the file-set
    Unrecoverable,
}

/// Drives the parity tool
#[derive(Debug, Clone)]
pub struct ParityTool {
    program: String,
    redundancy: usize,
    unrecoverable_exit_code: i32,
}

impl ParityTool {
    /// Parity tool creating `redundancy` recovery volumes per file-set
    pub fn new(program: impl Into<String>, redundancy: usize, unrecoverable_exit_code: i32) -> Self {
        ParityTool {
            program: program.into(),
            redundancy,
            unrecoverable_exit_code,
        }
    }

    /// Parity tool as configured
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.tools.parity.clone(),
            config.geometry.parity_discs,
            config.tools.unrecoverable_exit_code,
        )
    }

    /// Program name
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Protect slices `inputs`, numbered `min..=max`, all located in `cwd`
    pub fn encode<R: CommandRunner + ?Sized>(
        &self,
        runner: &mut R,
        cwd: &Path,
        naming: &NamingScheme,
        min: u64,
        max: u64,
        inputs: &[String],
    ) -> Result<ParityFiles> {
        if inputs.is_empty() {
            return Err(Error::EmptyFileSet { number: max });
        }

        let index = naming.index_file_name(min, max);
        info!(
            "protecting slices {}-{} ({} files) with {}",
            min,
            max,
            inputs.len(),
            index
        );

        let command = ToolCommand::new(self.program.clone(), cwd)
            .arg(format!("-n{}", self.redundancy))
            .arg("a")
            .arg(index.clone())
            .args(inputs.iter().cloned())
            .captured();
        runner
            .run(&command)?
            .check(&self.program, format!("protecting slices {}-{}", min, max))?;

        if !cwd.join(&index).is_file() {
            return Err(Error::Invariant(format!(
                "{} exited successfully but wrote no {}",
                self.program, index
            )));
        }

        let mut volumes: Vec<String> = fs::read_dir(cwd)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| naming.is_volume_of(&index, name))
            .collect();
        volumes.sort();

        if volumes.is_empty() {
            warn!("{} produced no recovery volumes for {}", self.program, index);
        }

        Ok(ParityFiles { index, volumes })
    }

    /// Verify the file-set described by `index` in `cwd`, repairing in place
    pub fn repair<R: CommandRunner + ?Sized>(
        &self,
        runner: &mut R,
        cwd: &Path,
        index: &str,
    ) -> Result<RepairOutcome> {
        let command = ToolCommand::new(self.program.clone(), cwd)
            .arg("r")
            .arg(index)
            .captured();
        let output = runner.run(&command)?;

        if output.status == Some(self.unrecoverable_exit_code) {
            return Ok(RepairOutcome::Unrecoverable);
        }
        let output = output.check(&self.program, format!("verifying {}", index))?;

        let text = output.stdout.to_lowercase();
        if text.contains("repaired") || text.contains("repair complete") || text.contains("restored") {
            Ok(RepairOutcome::Repaired)
        } else {
            Ok(RepairOutcome::Intact)
        }
    }
}
