//! Operator interaction: blank media and mount paths
//!
//! Burning waits for a human to insert a blank disc; restoring asks where
//! each disc of a set is mounted. In a dry run the answers are derived from
//! the title folders written under the scratch area instead.

use std::fmt;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::geometry::NamingScheme;

/// A disc the restore needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscRequest {
    /// Disc with a known volume title
    Titled {
        /// Volume title written at backup time
        title: String,
    },
    /// Disc at `column` of the last set of `backup`, whose number is unknown
    LastSet {
        /// Backup base name
        backup: String,
        /// 0-based column
        column: usize,
    },
}

impl fmt::Display for DiscRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscRequest::Titled { title } => write!(f, "the disc titled {}", title),
            DiscRequest::LastSet { backup, column } => write!(
                f,
                "disc {} of the last set of backup {}",
                column + 1,
                backup
            ),
        }
    }
}

/// Answers the questions a backup or restore asks a human
pub trait Operator {
    /// Block until a blank disc for `title` is in the drive
    fn confirm_blank_media(&mut self, title: &str) -> Result<()>;

    /// Where the requested disc is mounted; `None` when it is missing
    fn request_mount_path(&mut self, request: &DiscRequest) -> Result<Option<PathBuf>>;
}

impl<O: Operator + ?Sized> Operator for &mut O {
    fn confirm_blank_media(&mut self, title: &str) -> Result<()> {
        (**self).confirm_blank_media(title)
    }

    fn request_mount_path(&mut self, request: &DiscRequest) -> Result<Option<PathBuf>> {
        (**self).request_mount_path(request)
    }
}

/// Prompts on a terminal
pub struct ConsoleOperator<R, W> {
    input: R,
    output: W,
}

impl ConsoleOperator<io::StdinLock<'static>, io::Stdout> {
    /// Operator on the process's stdin and stdout
    pub fn stdio() -> Self {
        ConsoleOperator::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> ConsoleOperator<R, W> {
    /// Operator reading replies from `input` and prompting on `output`
    pub fn new(input: R, output: W) -> Self {
        ConsoleOperator { input, output }
    }

    fn ask(&mut self, prompt: &str) -> Result<String> {
        write!(self.output, "{}", prompt)?;
        self.output.flush()?;

        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "no operator reply on standard input",
            )));
        }
        Ok(line.trim().to_string())
    }
}

impl<R: BufRead, W: Write> Operator for ConsoleOperator<R, W> {
    fn confirm_blank_media(&mut self, title: &str) -> Result<()> {
        self.ask(&format!(
            "Insert an empty disc for {} and press enter: ",
            title
        ))?;
        Ok(())
    }

    fn request_mount_path(&mut self, request: &DiscRequest) -> Result<Option<PathBuf>> {
        loop {
            let reply = self.ask(&format!(
                "Mount {} and enter its path (empty if the disc is lost): ",
                request
            ))?;
            if reply.is_empty() {
                warn!("operator reports {} as missing", request);
                return Ok(None);
            }
            let path = PathBuf::from(reply);
            if path.is_dir() {
                return Ok(Some(path));
            }
            writeln!(self.output, "{:?} is not a directory", path)?;
        }
    }
}

/// Answers from the title folders a dry-run backup left under `root`
#[derive(Debug, Clone)]
pub struct DryRunOperator {
    root: PathBuf,
    naming: NamingScheme,
}

impl DryRunOperator {
    /// Operator looking for title folders of `naming`'s backup under `root`
    pub fn new(root: impl Into<PathBuf>, naming: NamingScheme) -> Self {
        DryRunOperator {
            root: root.into(),
            naming,
        }
    }

    /// Highest 0-based set with a folder for any column
    ///
    /// A lost disc of the last set leaves its column without a folder; that
    /// column is still taken from this set, never from an earlier one.
    pub fn last_set(&self) -> Result<Option<u64>> {
        Ok(title_folders(&self.root, &self.naming)?
            .into_iter()
            .map(|(set, _)| set)
            .max())
    }
}

impl Operator for DryRunOperator {
    fn confirm_blank_media(&mut self, title: &str) -> Result<()> {
        debug!("dry run: no media needed for {}", title);
        Ok(())
    }

    fn request_mount_path(&mut self, request: &DiscRequest) -> Result<Option<PathBuf>> {
        let title = match request {
            DiscRequest::Titled { title } => title.clone(),
            DiscRequest::LastSet { column, .. } => match self.last_set()? {
                Some(set) => self.naming.disc_title(set, *column),
                None => {
                    warn!("dry run: no folder for {}", request);
                    return Ok(None);
                }
            },
        };

        let path = self.root.join(&title);
        if path.is_dir() {
            debug!("dry run: {} is {:?}", request, path);
            Ok(Some(path))
        } else {
            warn!("dry run: folder {:?} for {} is missing", path, request);
            Ok(None)
        }
    }
}

/// (set, column) of every title folder of this backup under `root`
fn title_folders(root: &Path, naming: &NamingScheme) -> Result<Vec<(u64, usize)>> {
    let mut found = Vec::new();
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        if let Some(parsed) = entry
            .file_name()
            .to_str()
            .and_then(|name| naming.parse_disc_title(name))
        {
            found.push(parsed);
        }
    }
    Ok(found)
}
