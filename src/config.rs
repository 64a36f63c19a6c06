//! Configuration management for discraid
//!
//! One immutable `Config` value is built at startup and handed to every
//! component. The effective configuration is also written into the scratch
//! area and onto each disc, so archiver hooks and later restores run with
//! exactly the settings the backup was made with.

use crate::error::{Error, Result};
use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default scratch directory
pub const DEFAULT_SCRATCH_DIR: &str = "/var/tmp/discraid_scratch";

/// Default dar crypto block size; larger blocks make duplicate ciphertext
/// less likely
pub const DEFAULT_CRYPTO_BLOCK: u32 = 131_072;

/// Exit status with which the parity tool reports that repair is impossible
pub const DEFAULT_UNRECOVERABLE_EXIT_CODE: i32 = 2;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Disc geometry and slice sizing
    pub geometry: Geometry,

    /// Scratch area configuration
    pub scratch: ScratchConfig,

    /// Disc burning configuration
    pub burn: BurnConfig,

    /// Archiver options written into the control file
    pub archive: ArchiveConfig,

    /// External program names
    pub tools: ToolsConfig,
}

/// Scratch area configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScratchConfig {
    /// Staging directory; must not exist (or be empty) when a backup starts,
    /// and must not be inside the tree being backed up
    pub dir: PathBuf,
}

/// Disc burning configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BurnConfig {
    /// Burn discs; when false, disc contents are moved into folders named
    /// after the disc titles instead
    pub enabled: bool,

    /// Burner device path
    pub device: PathBuf,
}

/// Archiver options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArchiveConfig {
    /// Compress the archive (bzip2)
    pub compression: bool,

    /// Encrypt the archive (AES, passphrase asked interactively)
    pub encryption: bool,

    /// Crypto block size in bytes
    pub crypto_block: u32,
}

/// External program names
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    /// Archiver producing numbered slices
    pub archiver: String,

    /// Parity tool creating and repairing recovery volumes
    pub parity: String,

    /// Disc burner
    pub burner: String,

    /// Parity tool exit status meaning "too much damage to repair"
    pub unrecoverable_exit_code: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            geometry: Geometry::default(),
            scratch: ScratchConfig::default(),
            burn: BurnConfig::default(),
            archive: ArchiveConfig::default(),
            tools: ToolsConfig::default(),
        }
    }
}

impl Default for ScratchConfig {
    fn default() -> Self {
        ScratchConfig {
            dir: PathBuf::from(DEFAULT_SCRATCH_DIR),
        }
    }
}

impl Default for BurnConfig {
    fn default() -> Self {
        BurnConfig {
            enabled: true,
            device: PathBuf::from("/dev/null"),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        ArchiveConfig {
            compression: true,
            encryption: true,
            crypto_block: DEFAULT_CRYPTO_BLOCK,
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        ToolsConfig {
            archiver: "dar".to_string(),
            parity: "parchive".to_string(),
            burner: "growisofs".to_string(),
            unrecoverable_exit_code: DEFAULT_UNRECOVERABLE_EXIT_CODE,
        }
    }
}

impl Config {
    /// Load configuration from a file, with environment variable overrides
    ///
    /// `.yaml` and `.yml` files are read as YAML, anything else as JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let mut config: Config = if is_yaml(path) {
            serde_yaml::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }
        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = std::env::var("DISCRAID_SCRATCH_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.scratch.dir = PathBuf::from(dir);
            }
        }

        if let Ok(device) = std::env::var("DISCRAID_DEVICE") {
            let device = device.trim();
            if !device.is_empty() {
                self.burn.device = PathBuf::from(device);
            }
        }

        if let Ok(dry_run) = std::env::var("DISCRAID_DRY_RUN") {
            match dry_run.trim() {
                "1" | "true" | "yes" => self.burn.enabled = false,
                "0" | "false" | "no" => self.burn.enabled = true,
                _ => {}
            }
        }
    }

    /// Save configuration to a file as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.geometry.validate()?;

        if self.scratch.dir.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Scratch directory is required".to_string(),
            ));
        }

        if self.burn.enabled && self.burn.device.as_os_str().is_empty() {
            return Err(Error::InvalidConfig(
                "Burner device is required unless burning is disabled".to_string(),
            ));
        }

        for (role, program) in [
            ("archiver", &self.tools.archiver),
            ("parity", &self.tools.parity),
            ("burner", &self.tools.burner),
        ] {
            if program.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "No program configured for the {}",
                    role
                )));
            }
        }

        if self.archive.encryption && self.archive.crypto_block == 0 {
            return Err(Error::InvalidConfig(
                "Crypto block size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether this run only simulates burning
    pub fn dry_run(&self) -> bool {
        !self.burn.enabled
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config_validates() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(!config.dry_run());
        assert_eq!(config.tools.parity, "parchive");
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("discraid.json");

        let mut config = Config::default();
        config.geometry.data_discs = 4;
        config.geometry.parity_discs = 1;
        config.geometry.slices_per_disc = 5;
        config.scratch.dir = dir.path().join("scratch");
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.geometry, config.geometry);
        assert_eq!(loaded.scratch.dir, config.scratch.dir);
    }

    #[test]
    fn test_load_yaml() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("discraid.yaml");
        let yaml = r#"
geometry:
  disc_size_mib: 4482
  reserve_space_mib: 10
  data_discs: 4
  parity_discs: 2
  slices_per_disc: 40
  digits: 5
scratch:
  dir: /tmp/discraid-yaml
burn:
  enabled: false
  device: /dev/sr0
archive:
  compression: true
  encryption: false
  crypto_block: 131072
tools:
  archiver: dar
  parity: parchive
  burner: growisofs
  unrecoverable_exit_code: 2
"#;
        std::fs::write(&path, yaml).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.geometry.parity_discs, 2);
        assert_eq!(config.geometry.digit_width(), 5);
        assert!(!config.archive.encryption);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let dir = tempdir().unwrap();
        let result = Config::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempdir().unwrap();
        let config = Config::load_or_default(dir.path().join("absent.json")).unwrap();
        assert_eq!(config.geometry, Geometry::default());
    }

    #[test]
    fn test_validate_rejects_empty_tool() {
        let mut config = Config::default();
        config.tools.parity = " ".to_string();
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_bad_geometry() {
        let mut config = Config::default();
        config.geometry.slices_per_disc = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidGeometry(_))));
    }
}
