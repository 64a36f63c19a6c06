//! Slice sizing against the parity tool's overhead
//!
//! Every slice gets a recovery file entry with headers, checksums and
//! packet framing. That overhead is budgeted out of each slice so that
//! `slices_per_disc` slices plus the reserve always fit on one disc.

use crate::error::{Error, Result};

use super::{Geometry, OverheadModel};

const MIB: u64 = 1024 * 1024;

// Curve fitted to measured parity files over sets of 1..34 and 55 inputs of
// 1, 4, 16 and 64 MB: overhead tracked the number of files, not their size.
const EMPIRICAL_FLOOR_BYTES: f64 = 270_519.0;
const EMPIRICAL_AMPLITUDE_BYTES: f64 = 230_648.0;
const EMPIRICAL_DECAY: f64 = -0.195;

// Parity packet layout: magic, length, hash, set id, type
const PACKET_HEADER_BYTES: u64 = 8 + 8 + 16 + 16 + 16;
const MAIN_PACKET_COPIES: u64 = 10;
const CHECKSUM_BLOCKS_PER_FILE: u64 = 660;
const CREATOR: &str = "Created by par2cmdline version 0.4.";

/// Estimated parity overhead attributable to one slice, in bytes
pub fn overhead_bytes(geometry: &Geometry) -> f64 {
    match geometry.overhead {
        OverheadModel::Empirical => {
            EMPIRICAL_FLOOR_BYTES
                + EMPIRICAL_AMPLITUDE_BYTES
                    * (EMPIRICAL_DECAY * geometry.slices_per_disc as f64).exp()
        }
        OverheadModel::HeaderEstimate { max_filename_len } => {
            let files = geometry.data_discs.max(1) as u64;
            let per_set = MAIN_PACKET_COPIES * main_packet_size(files)
                + files * file_description_packet_size(max_filename_len as u64)
                + files * checksum_packet_size(CHECKSUM_BLOCKS_PER_FILE)
                + CHECKSUM_BLOCKS_PER_FILE * (PACKET_HEADER_BYTES + 4)
                + packet_size(CREATOR.len() as u64);
            per_set.div_ceil(files) as f64
        }
    }
}

/// Per-slice overhead rounded up to whole MiB
///
/// Rounding up means the real overhead never exceeds the budget; it also
/// makes the scheme wasteful on media much smaller than a CD.
pub fn overhead_mib(geometry: &Geometry) -> u64 {
    (overhead_bytes(geometry) / MIB as f64).ceil() as u64
}

/// Largest whole-MiB slice size such that S slices, their overhead and the
/// reserve fit on one disc
pub fn slice_size_mib(geometry: &Geometry) -> Result<u64> {
    if geometry.slices_per_disc == 0 {
        return Err(Error::InvalidGeometry(
            "slices per disc must be greater than 0".to_string(),
        ));
    }
    if geometry.disc_size_mib == 0 {
        return Err(Error::InvalidGeometry(
            "disc size must be greater than 0".to_string(),
        ));
    }
    if geometry.reserve_space_mib >= geometry.disc_size_mib {
        return Err(Error::InvalidGeometry(format!(
            "reserve of {} MiB leaves nothing of a {} MiB disc",
            geometry.reserve_space_mib, geometry.disc_size_mib
        )));
    }

    let raw = (geometry.disc_size_mib - geometry.reserve_space_mib)
        / geometry.slices_per_disc as u64;
    let overhead = overhead_mib(geometry);
    if raw <= overhead {
        return Err(Error::InvalidGeometry(format!(
            "{} slices of {} MiB on a {} MiB disc leave no room after {} MiB parity overhead",
            geometry.slices_per_disc, raw, geometry.disc_size_mib, overhead
        )));
    }
    Ok(raw - overhead)
}

/// Digit width sized from an estimate of the whole backup: the expected
/// slice count's decimal digits plus one spare
pub fn derived_digits(expected_total_mib: u64, disc_size_mib: u64, slices_per_disc: usize) -> usize {
    let disc = disc_size_mib.max(1) as u128;
    let slices = (expected_total_mib as u128 * slices_per_disc as u128).div_ceil(disc);
    decimal_digits(slices.min(u64::MAX as u128) as u64) + 1
}

/// Number of decimal digits needed to print `n`
pub fn decimal_digits(n: u64) -> usize {
    n.checked_ilog10().map(|d| d as usize + 1).unwrap_or(1)
}

fn pad_to_4(n: u64) -> u64 {
    n.div_ceil(4) * 4
}

fn packet_size(body: u64) -> u64 {
    PACKET_HEADER_BYTES + pad_to_4(body)
}

fn main_packet_size(files: u64) -> u64 {
    packet_size(8 + 4 + files * 16)
}

fn file_description_packet_size(filename_len: u64) -> u64 {
    packet_size(16 + 16 + 16 + 8 + pad_to_4(filename_len))
}

fn checksum_packet_size(blocks: u64) -> u64 {
    packet_size(16 + blocks * 20)
}
