//! Archiver driver
//!
//! dar is started with a generated control file. The control file fixes the
//! slice size and digit width, and installs a hook that re-invokes this
//! program once per slice, from the program copy kept in the scratch area.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::scratch::{CONFIG_NAME, PROGRAM_NAME};

use super::{CommandRunner, ToolCommand};

/// Name of the control file inside the scratch area
pub const CONTROL_FILE_NAME: &str = "darrc";

/// Which way the archiver runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveMode {
    /// Write a new archive, one slice at a time
    Create,
    /// Read an archive back, requesting slices as needed
    Extract,
}

impl ArchiveMode {
    /// Hidden subcommand the hook invokes
    pub fn hook_command(self) -> &'static str {
        match self {
            ArchiveMode::Create => "_create",
            ArchiveMode::Extract => "_extract",
        }
    }

    fn flag(self) -> &'static str {
        match self {
            ArchiveMode::Create => "-c",
            ArchiveMode::Extract => "-x",
        }
    }

    fn section(self) -> &'static str {
        match self {
            ArchiveMode::Create => "create:",
            ArchiveMode::Extract => "extract:",
        }
    }
}

/// Drives dar
#[derive(Debug, Clone)]
pub struct Archiver {
    program: String,
    scratch: PathBuf,
    digits: usize,
    slice_size_mib: u64,
    compression: bool,
    encryption: bool,
    crypto_block: u32,
    verbose: bool,
}

impl Archiver {
    /// Archiver as configured; `verbose` is passed on to the hook
    pub fn from_config(config: &Config, verbose: bool) -> Result<Self> {
        Ok(Archiver {
            program: config.tools.archiver.clone(),
            scratch: config.scratch.dir.clone(),
            digits: config.geometry.digit_width(),
            slice_size_mib: config.geometry.slice_size_mib()?,
            compression: config.archive.compression,
            encryption: config.archive.encryption,
            crypto_block: config.archive.crypto_block,
            verbose,
        })
    }

    /// Path the control file is written to
    pub fn control_file_path(&self) -> PathBuf {
        self.scratch.join(CONTROL_FILE_NAME)
    }

    /// Hook command line installed for `mode`
    pub fn hook_line(&self, mode: ArchiveMode) -> String {
        let program = self.scratch.join(PROGRAM_NAME);
        let config = self.scratch.join(CONFIG_NAME);
        format!(
            "{} --config {}{} {} %p %b %n %e %c",
            shell_quote(&program),
            shell_quote(&config),
            if self.verbose { " -v" } else { "" },
            mode.hook_command()
        )
    }

    /// Contents of the control file
    pub fn control_file(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "all:");
        let _ = writeln!(out, "--min-digits={}", self.digits);
        if self.encryption {
            // larger blocks make duplicate ciphertext less likely
            let _ = writeln!(out, "--crypto-block {}", self.crypto_block);
            // the passphrase is asked for; this file is burned on every disc
            let _ = writeln!(out, "--key aes:");
        }
        let _ = writeln!(out, "-v");
        let _ = writeln!(out, "{}", ArchiveMode::Create.section());
        if self.compression {
            let _ = writeln!(out, "--compression=bzip2");
        }
        let _ = writeln!(out, "--slice {}M", self.slice_size_mib);
        let _ = writeln!(out, "-E \"{}\"", self.hook_line(ArchiveMode::Create));
        let _ = writeln!(out, "{}", ArchiveMode::Extract.section());
        let _ = writeln!(out, "-E \"{}\"", self.hook_line(ArchiveMode::Extract));
        out
    }

    /// Write the control file into the scratch area
    pub fn write_control_file(&self) -> Result<PathBuf> {
        let path = self.control_file_path();
        let contents = self.control_file();
        info!(
            "Contents of {:?} follow:\n        {}",
            path,
            contents.trim_end().replace('\n', "\n        ")
        );
        fs::write(&path, contents)?;
        Ok(path)
    }

    /// Run dar over `root` (the tree to back up, or the restore target)
    ///
    /// dar works in the scratch area, so new slices land there and the hook
    /// runs with the scratch area as its working directory.
    pub fn run<R: CommandRunner + ?Sized>(
        &self,
        runner: &mut R,
        mode: ArchiveMode,
        base: &str,
        root: &Path,
        extra_args: &[String],
    ) -> Result<()> {
        if base.is_empty() || base.contains('/') {
            return Err(Error::InvalidArgument(format!(
                "backup name {:?} must be a plain file name",
                base
            )));
        }

        let control = self.write_control_file()?;
        let command = ToolCommand::new(self.program.clone(), &self.scratch)
            .arg(mode.flag())
            .arg(base)
            .arg("-R")
            .arg(root)
            .arg("-B")
            .arg(control)
            .args(extra_args.iter().cloned());

        let context = match mode {
            ArchiveMode::Create => format!("creating backup {}", base),
            ArchiveMode::Extract => format!("extracting backup {}", base),
        };
        runner.run(&command)?.check(&self.program, context)?;
        Ok(())
    }
}

fn shell_quote(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "/._-+".contains(c))
    {
        text.into_owned()
    } else {
        format!("'{}'", text.replace('\'', r"'\''"))
    }
}
