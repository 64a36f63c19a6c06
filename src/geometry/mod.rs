//! Disc geometry, slice sizing and naming
//!
//! A backup is a sequence of redundancy sets. Each set is striped across
//! `data_discs + parity_discs` discs; every data disc carries
//! `slices_per_disc` archive slices, and the parity discs carry the
//! recovery volumes protecting them.

mod capacity;
mod naming;

pub use capacity::{decimal_digits, derived_digits, overhead_bytes, overhead_mib, slice_size_mib};
pub use naming::{disc_title, NamingScheme, MAX_TITLE_LEN};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Digit width used when neither a fixed width nor a size estimate is configured
pub const DEFAULT_DIGITS: usize = 4;

/// Physical layout of one redundancy set
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Geometry {
    /// Usable size of one disc in MiB
    pub disc_size_mib: u64,

    /// Space held back on each disc for the filesystem, README, program
    /// copy and index files (MiB)
    pub reserve_space_mib: u64,

    /// Discs per set carrying archive slices (D)
    pub data_discs: usize,

    /// Discs per set carrying recovery volumes (K)
    pub parity_discs: usize,

    /// Slices stored on each data disc (S)
    pub slices_per_disc: usize,

    /// Fixed zero-padding width for slice numbers
    #[serde(default)]
    pub digits: Option<usize>,

    /// Expected size of the whole backup, used to size `digits` when it is
    /// not fixed (MiB)
    #[serde(default)]
    pub expected_total_mib: Option<u64>,

    /// How per-file parity overhead is budgeted
    #[serde(default)]
    pub overhead: OverheadModel,
}

/// Model of the parity tool's per-file overhead
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum OverheadModel {
    /// Exponential-decay-plus-constant fit over measured parity files
    #[default]
    Empirical,
    /// Packet-header estimate from the data disc count and filename length
    HeaderEstimate {
        /// Longest slice filename expected (bytes)
        max_filename_len: usize,
    },
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            disc_size_mib: 23841, // single-layer BD-R
            reserve_space_mib: 10,
            data_discs: 3,
            parity_discs: 2,
            slices_per_disc: 500,
            digits: None,
            expected_total_mib: None,
            overhead: OverheadModel::Empirical,
        }
    }
}

impl Geometry {
    /// Discs in one redundancy set (D + K)
    pub fn total_discs(&self) -> usize {
        self.data_discs + self.parity_discs
    }

    /// Slices in one full redundancy set (S * D)
    pub fn slices_per_set(&self) -> u64 {
        (self.slices_per_disc as u64) * (self.data_discs as u64)
    }

    /// Free space the scratch area needs to stage one full set
    pub fn scratch_free_needed_mib(&self) -> u64 {
        self.total_discs() as u64 * self.disc_size_mib
    }

    /// Slice size handed to the archiver (MiB)
    pub fn slice_size_mib(&self) -> Result<u64> {
        slice_size_mib(self)
    }

    /// Zero-padding width for slice numbers
    pub fn digit_width(&self) -> usize {
        match (self.digits, self.expected_total_mib) {
            (Some(digits), _) => digits,
            (None, Some(total)) => {
                derived_digits(total, self.disc_size_mib, self.slices_per_disc)
            }
            (None, None) => DEFAULT_DIGITS,
        }
    }

    /// Reject geometries the scheduler cannot stripe over
    pub fn validate(&self) -> Result<()> {
        if self.data_discs == 0 {
            return Err(Error::InvalidGeometry(
                "at least one data disc is required".to_string(),
            ));
        }
        if self.parity_discs == 0 {
            return Err(Error::InvalidGeometry(
                "at least one parity disc is required".to_string(),
            ));
        }
        if self.digits == Some(0) {
            return Err(Error::InvalidGeometry(
                "digit width must be greater than 0".to_string(),
            ));
        }
        // Titles carry a three-digit column and a four-digit set number
        if self.total_discs() > 999 {
            return Err(Error::InvalidGeometry(format!(
                "{} discs per set do not fit a three-digit disc number",
                self.total_discs()
            )));
        }
        self.slice_size_mib().map(|_| ())
    }
}
