//! In-process stand-in for the external programs
//!
//! Records every invocation and simulates the parity tool and the disc
//! burner on the real filesystem, so schedulers can be exercised without
//! dar, parchive or a drive. Recovery volumes produced here hold a full
//! copy of their file-set, which lets `repair` rebuild up to one missing
//! or damaged file per surviving volume.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_UNRECOVERABLE_EXIT_CODE;
use crate::error::Result;

use super::{CommandRunner, ToolCommand, ToolOutput};

const VOLUME_LETTERS: &[u8] = b"pqrstuvwxyz";

/// One recorded invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Program name
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory
    pub cwd: PathBuf,
}

/// A disc the simulated burner wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BurnedDisc {
    /// Volume title
    pub title: String,
    /// Sorted names of the files on the disc
    pub files: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MockIndex {
    members: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MockVolume {
    contents: BTreeMap<String, Vec<u8>>,
}

/// Scripted command runner
#[derive(Debug)]
pub struct MockRunner {
    parity_program: String,
    burner_program: String,
    failing: HashSet<String>,
    calls: Vec<RecordedCall>,
    burned: Vec<BurnedDisc>,
}

impl Default for MockRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRunner {
    /// Runner simulating `parchive` and `growisofs`
    pub fn new() -> Self {
        Self::with_programs("parchive", "growisofs")
    }

    /// Runner simulating the named parity and burner programs
    pub fn with_programs(parity: &str, burner: &str) -> Self {
        MockRunner {
            parity_program: parity.to_string(),
            burner_program: burner.to_string(),
            failing: HashSet::new(),
            calls: Vec::new(),
            burned: Vec::new(),
        }
    }

    /// Make every call to `program` exit with status 1
    pub fn failing(mut self, program: &str) -> Self {
        self.failing.insert(program.to_string());
        self
    }

    /// All invocations so far
    pub fn calls(&self) -> &[RecordedCall] {
        &self.calls
    }

    /// Invocations of `program`
    pub fn calls_to(&self, program: &str) -> Vec<&RecordedCall> {
        self.calls.iter().filter(|c| c.program == program).collect()
    }

    /// Discs written by the simulated burner, in order
    pub fn burned(&self) -> &[BurnedDisc] {
        &self.burned
    }

    fn simulate_parity(&self, cwd: &Path, args: &[String]) -> Result<ToolOutput> {
        match args.first().map(String::as_str) {
            Some(flag) if flag.starts_with("-n") => {
                let count: usize = flag[2..].parse().unwrap_or(1);
                let index = args.get(2).cloned().unwrap_or_default();
                self.create_parity(cwd, &index, &args[3.min(args.len())..], count)
            }
            Some("r") => {
                let index = args.get(1).cloned().unwrap_or_default();
                self.repair_parity(cwd, &index)
            }
            _ => Ok(ToolOutput {
                status: Some(1),
                stdout: "unknown parity command".to_string(),
            }),
        }
    }

    fn create_parity(
        &self,
        cwd: &Path,
        index: &str,
        inputs: &[String],
        count: usize,
    ) -> Result<ToolOutput> {
        let mut contents = BTreeMap::new();
        for name in inputs {
            contents.insert(name.clone(), fs::read(cwd.join(name))?);
        }

        let manifest = MockIndex {
            members: inputs.to_vec(),
        };
        fs::write(cwd.join(index), to_json(&manifest))?;

        let stem = index.strip_suffix("par").unwrap_or(index);
        let volume = to_json(&MockVolume { contents });
        for i in 0..count {
            let letter = VOLUME_LETTERS[(i / 100) % VOLUME_LETTERS.len()] as char;
            let name = format!("{}{}{:02}", stem, letter, i % 100);
            fs::write(cwd.join(name), &volume)?;
        }
        Ok(ToolOutput::success(format!("created {} volumes", count)))
    }

    fn repair_parity(&self, cwd: &Path, index: &str) -> Result<ToolOutput> {
        let manifest: MockIndex = match fs::read(cwd.join(index))
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
        {
            Some(manifest) => manifest,
            None => {
                return Ok(ToolOutput {
                    status: Some(1),
                    stdout: format!("cannot read {}", index),
                })
            }
        };

        let stem = index.strip_suffix("par").unwrap_or(index);
        let mut volumes = Vec::new();
        for entry in fs::read_dir(cwd)? {
            let name = entry?.file_name().to_string_lossy().into_owned();
            if let Some(suffix) = name.strip_prefix(stem) {
                if is_volume_suffix(suffix) {
                    let parsed: Option<MockVolume> = fs::read(cwd.join(&name))
                        .ok()
                        .and_then(|bytes| serde_json::from_slice(&bytes).ok());
                    if let Some(volume) = parsed {
                        volumes.push(volume);
                    }
                }
            }
        }

        let reference = volumes.first();
        let damaged: Vec<&String> = manifest
            .members
            .iter()
            .filter(|name| match fs::read(cwd.join(name.as_str())) {
                Err(_) => true,
                Ok(bytes) => reference
                    .and_then(|v| v.contents.get(name.as_str()))
                    .map(|expected| *expected != bytes)
                    .unwrap_or(false),
            })
            .collect();

        if damaged.is_empty() {
            return Ok(ToolOutput::success("All files are correct"));
        }
        match reference {
            Some(volume) if damaged.len() <= volumes.len() => {
                for name in damaged {
                    if let Some(bytes) = volume.contents.get(name.as_str()) {
                        fs::write(cwd.join(name.as_str()), bytes)?;
                    }
                }
                Ok(ToolOutput::success("Repair complete"))
            }
            _ => Ok(ToolOutput {
                status: Some(DEFAULT_UNRECOVERABLE_EXIT_CODE),
                stdout: "Repair is not possible".to_string(),
            }),
        }
    }

    fn simulate_burn(&mut self, cwd: &Path, args: &[String]) -> Result<ToolOutput> {
        let title = args
            .iter()
            .position(|a| a == "-V")
            .and_then(|i| args.get(i + 1))
            .cloned()
            .unwrap_or_default();
        let dir = args.last().map(|d| cwd.join(d)).unwrap_or_else(|| cwd.to_path_buf());

        let mut files: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        files.sort();
        self.burned.push(BurnedDisc { title, files });
        Ok(ToolOutput::success(""))
    }
}

impl CommandRunner for MockRunner {
    fn run(&mut self, command: &ToolCommand) -> Result<ToolOutput> {
        let args = command.arg_strings();
        self.calls.push(RecordedCall {
            program: command.program.clone(),
            args: args.clone(),
            cwd: command.cwd.clone(),
        });

        if self.failing.contains(&command.program) {
            return Ok(ToolOutput {
                status: Some(1),
                stdout: String::new(),
            });
        }
        if command.program == self.parity_program {
            self.simulate_parity(&command.cwd, &args)
        } else if command.program == self.burner_program {
            self.simulate_burn(&command.cwd, &args)
        } else {
            Ok(ToolOutput::success(""))
        }
    }
}

fn is_volume_suffix(suffix: &str) -> bool {
    let bytes = suffix.as_bytes();
    bytes.len() == 3
        && VOLUME_LETTERS.contains(&bytes[0])
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
}

fn to_json<T: Serialize>(value: &T) -> Vec<u8> {
    serde_json::to_vec(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_records_unknown_programs() {
        let dir = tempdir().unwrap();
        let mut runner = MockRunner::new();
        let cmd = ToolCommand::new("dar", dir.path()).args(["-c", "thing"]);
        assert!(runner.run(&cmd).unwrap().succeeded());
        assert_eq!(runner.calls_to("dar").len(), 1);
        assert_eq!(runner.calls()[0].args, vec!["-c", "thing"]);
    }

    #[test]
    fn test_failing_program() {
        let dir = tempdir().unwrap();
        let mut runner = MockRunner::new().failing("growisofs");
        let cmd = ToolCommand::new("growisofs", dir.path());
        assert_eq!(runner.run(&cmd).unwrap().status, Some(1));
        assert!(runner.burned().is_empty());
    }

    #[test]
    fn test_burn_records_listing() {
        let dir = tempdir().unwrap();
        let disc = dir.path().join("__disc0001");
        fs::create_dir(&disc).unwrap();
        fs::write(disc.join("b.txt"), b"b").unwrap();
        fs::write(disc.join("a.txt"), b"a").unwrap();

        let mut runner = MockRunner::new();
        let cmd = ToolCommand::new("growisofs", dir.path())
            .args(["-Z", "/dev/zero", "-R", "-J", "-V", "x-0001-001"])
            .arg(disc.clone());
        runner.run(&cmd).unwrap();

        assert_eq!(
            runner.burned(),
            &[BurnedDisc {
                title: "x-0001-001".to_string(),
                files: vec!["a.txt".to_string(), "b.txt".to_string()],
            }]
        );
    }

    #[test]
    fn test_repair_rewrites_corrupted_copy() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("x.01.dar"), b"one").unwrap();
        let mut runner = MockRunner::new();
        let create = ToolCommand::new("parchive", dir.path()).args(["-n1", "a", "x.01-01.par", "x.01.dar"]);
        runner.run(&create).unwrap();
        assert!(dir.path().join("x.01-01.p00").is_file());

        fs::write(dir.path().join("x.01.dar"), b"rot").unwrap();
        let repair = ToolCommand::new("parchive", dir.path()).args(["r", "x.01-01.par"]);
        let output = runner.run(&repair).unwrap();
        assert!(output.succeeded());
        assert!(output.stdout.contains("Repair complete"));
        assert_eq!(fs::read(dir.path().join("x.01.dar")).unwrap(), b"one");
    }
}
