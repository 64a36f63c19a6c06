//! Deterministic names for slices, parity files and disc titles
//!
//! Slices are named `<base>.<number>.<ext>` by the archiver. Each file-set
//! gets one index file `<base>.<min>-<max>.par` and parity volumes
//! `<base>.<min>-<max>.p00`, `.p01`, ... whose count only the parity tool
//! knows. Discs are titled `<base>-<set>-<column>` with 1-based numbers.

use regex::Regex;

use crate::error::{Error, Result};

use super::Geometry;

/// Longest volume identifier an ISO 9660 filesystem accepts
pub const MAX_TITLE_LEN: usize = 32;

const SET_DIGITS: usize = 4;
const COLUMN_DIGITS: usize = 3;
// Room for the set number, the column number and two dashes
const TITLE_BASE_LEN: usize = MAX_TITLE_LEN - SET_DIGITS - COLUMN_DIGITS - 2;

const INDEX_EXTENSION: &str = "par";

/// Title of one disc: truncated base name, 1-based set, 1-based column
pub fn disc_title(base: &str, set_index: u64, column: usize) -> String {
    let short: String = base.chars().take(TITLE_BASE_LEN).collect();
    format!(
        "{}-{:0sw$}-{:0cw$}",
        short,
        set_index + 1,
        column + 1,
        sw = SET_DIGITS,
        cw = COLUMN_DIGITS
    )
}

/// Naming rules for one backup
#[derive(Debug, Clone)]
pub struct NamingScheme {
    base: String,
    extension: String,
    digits: usize,
    data_discs: usize,
    parity_discs: usize,
    slices_per_set: u64,
    slice_re: Regex,
    index_re: Regex,
    volume_re: Regex,
    title_re: Regex,
}

impl NamingScheme {
    /// Build the naming rules for backup `base` whose slices end in `extension`
    pub fn new(base: &str, extension: &str, geometry: &Geometry) -> Result<Self> {
        if base.is_empty() {
            return Err(Error::InvalidArgument("backup base name is empty".to_string()));
        }
        if geometry.data_discs == 0 || geometry.parity_discs == 0 || geometry.slices_per_disc == 0
        {
            return Err(Error::InvalidGeometry(
                "naming needs at least one data disc, one parity disc and one slice per disc"
                    .to_string(),
            ));
        }

        let b = regex::escape(base);
        let e = regex::escape(extension);
        let short: String = base.chars().take(TITLE_BASE_LEN).collect();
        let compile = |pattern: String| {
            Regex::new(&pattern)
                .map_err(|err| Error::InvalidArgument(format!("bad name pattern: {}", err)))
        };

        Ok(NamingScheme {
            base: base.to_string(),
            extension: extension.to_string(),
            digits: geometry.digit_width(),
            data_discs: geometry.data_discs,
            parity_discs: geometry.parity_discs,
            slices_per_set: geometry.slices_per_set(),
            slice_re: compile(format!(r"^{}\.(\d+)\.{}$", b, e))?,
            index_re: compile(format!(r"^{}\.(\d+)-(\d+)\.{}$", b, INDEX_EXTENSION))?,
            volume_re: compile(format!(r"^{}\.(\d+)-(\d+)\.[p-z]\d\d$", b))?,
            title_re: compile(format!(
                r"^{}-(\d{{{},}})-(\d{{{}}})$",
                regex::escape(&short),
                SET_DIGITS,
                COLUMN_DIGITS
            ))?,
        })
    }

    /// Backup base name
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Slice file extension
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Zero-padding width of slice numbers
    pub fn digits(&self) -> usize {
        self.digits
    }

    /// Filename of slice `number`
    pub fn slice_file_name(&self, number: u64) -> String {
        format!(
            "{}.{:0w$}.{}",
            self.base,
            number,
            self.extension,
            w = self.digits
        )
    }

    /// Slice number encoded in `name`, if it is one of this backup's slices
    pub fn slice_number(&self, name: &str) -> Option<u64> {
        self.slice_re
            .captures(name)
            .and_then(|c| c[1].parse().ok())
    }

    /// Index file covering slices `min..=max`
    pub fn index_file_name(&self, min: u64, max: u64) -> String {
        format!(
            "{}.{:0w$}-{:0w$}.{}",
            self.base,
            min,
            max,
            INDEX_EXTENSION,
            w = self.digits
        )
    }

    /// Slice range covered by index file `name`
    pub fn index_range(&self, name: &str) -> Option<(u64, u64)> {
        let caps = self.index_re.captures(name)?;
        Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
    }

    /// Whether `name` is a parity volume of this backup
    pub fn is_volume_file(&self, name: &str) -> bool {
        self.volume_re.is_match(name)
    }

    /// Whether `name` is a parity volume produced alongside `index`
    pub fn is_volume_of(&self, index: &str, name: &str) -> bool {
        let stem = index
            .strip_suffix(INDEX_EXTENSION)
            .unwrap_or(index);
        name.starts_with(stem) && self.is_volume_file(name)
    }

    /// Whether `name` is a slice, index file or parity volume of this backup
    pub fn is_payload_file(&self, name: &str) -> bool {
        self.slice_re.is_match(name) || self.index_re.is_match(name) || self.is_volume_file(name)
    }

    /// 0-based redundancy set holding slice `number`
    pub fn set_index(&self, number: u64) -> u64 {
        number.saturating_sub(1) / self.slices_per_set
    }

    /// Data column holding slice `number`
    pub fn data_column(&self, number: u64) -> usize {
        (number.saturating_sub(1) % self.data_discs as u64) as usize
    }

    /// Parity column for the `position`-th parity volume of a file-set
    pub fn parity_column(&self, position: usize) -> usize {
        self.data_discs + position % self.parity_discs
    }

    /// Discs per redundancy set
    pub fn total_discs(&self) -> usize {
        self.data_discs + self.parity_discs
    }

    /// Title of the disc at `column` of 0-based set `set_index`
    pub fn disc_title(&self, set_index: u64, column: usize) -> String {
        disc_title(&self.base, set_index, column)
    }

    /// 0-based (set, column) encoded in a disc title of this backup
    pub fn parse_disc_title(&self, title: &str) -> Option<(u64, usize)> {
        let caps = self.title_re.captures(title)?;
        let set: u64 = caps[1].parse().ok()?;
        let column: usize = caps[2].parse().ok()?;
        if set == 0 || column == 0 {
            return None;
        }
        Some((set - 1, column - 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn geometry(data: usize, parity: usize, per_disc: usize) -> Geometry {
        Geometry {
            data_discs: data,
            parity_discs: parity,
            slices_per_disc: per_disc,
            digits: Some(4),
            ..Geometry::default()
        }
    }

    #[test]
    fn test_slice_names() {
        let naming = NamingScheme::new("thing", "dar", &geometry(4, 1, 5)).unwrap();
        assert_eq!(naming.slice_file_name(7), "thing.0007.dar");
        assert_eq!(naming.slice_number("thing.0007.dar"), Some(7));
        assert_eq!(naming.slice_number("thing.12345.dar"), Some(12345));
        assert_eq!(naming.slice_number("other.0007.dar"), None);
        assert_eq!(naming.slice_number("thing.0007.par"), None);
    }

    #[test]
    fn test_index_and_volume_names() {
        let naming = NamingScheme::new("thing", "dar", &geometry(4, 1, 5)).unwrap();
        let index = naming.index_file_name(13, 14);
        assert_eq!(index, "thing.0013-0014.par");
        assert_eq!(naming.index_range(&index), Some((13, 14)));

        assert!(naming.is_volume_file("thing.0013-0014.p00"));
        assert!(naming.is_volume_file("thing.0013-0014.q17"));
        assert!(!naming.is_volume_file("thing.0013-0014.par"));
        assert!(naming.is_volume_of(&index, "thing.0013-0014.p01"));
        assert!(!naming.is_volume_of(&index, "thing.0001-0004.p01"));

        assert!(naming.is_payload_file("thing.0013.dar"));
        assert!(naming.is_payload_file(&index));
        assert!(!naming.is_payload_file("README.txt"));
        assert!(!naming.is_payload_file("discraid"));
    }

    #[test]
    fn test_columns() {
        let naming = NamingScheme::new("thing", "dar", &geometry(4, 2, 5)).unwrap();
        assert_eq!(naming.data_column(1), 0);
        assert_eq!(naming.data_column(4), 3);
        assert_eq!(naming.data_column(5), 0);
        assert_eq!(naming.parity_column(0), 4);
        assert_eq!(naming.parity_column(1), 5);
        assert_eq!(naming.parity_column(2), 4);
    }

    #[test]
    fn test_rejects_degenerate_geometry() {
        for g in [geometry(0, 1, 5), geometry(4, 0, 5), geometry(4, 1, 0)] {
            assert!(matches!(
                NamingScheme::new("thing", "dar", &g),
                Err(Error::InvalidGeometry(_))
            ));
        }
        assert!(matches!(
            NamingScheme::new("", "dar", &geometry(4, 1, 5)),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_index() {
        let naming = NamingScheme::new("thing", "dar", &geometry(4, 1, 5)).unwrap();
        assert_eq!(naming.set_index(1), 0);
        assert_eq!(naming.set_index(20), 0);
        assert_eq!(naming.set_index(21), 1);
        assert_eq!(naming.set_index(40), 1);
    }

    #[test]
    fn test_disc_title_four_plus_one() {
        let naming = NamingScheme::new("fnord", "dar", &geometry(4, 1, 11)).unwrap();
        for (set, slice) in [(1u64, 44u64), (2, 88), (3, 100)] {
            for disc in 0..5 {
                let title = naming.disc_title(naming.set_index(slice), disc);
                assert_eq!(title, format!("fnord-{:04}-{:03}", set, disc + 1));
            }
        }
    }

    #[test]
    fn test_disc_title_three_plus_eight() {
        let naming = NamingScheme::new("fnord", "dar", &geometry(3, 8, 20)).unwrap();
        for (set, slice) in [(1u64, 60u64), (2, 98)] {
            for disc in 0..11 {
                let title = naming.disc_title(naming.set_index(slice), disc);
                assert_eq!(title, format!("fnord-{:04}-{:03}", set, disc + 1));
            }
        }
    }

    #[test]
    fn test_disc_title_unique_and_stable_across_geometries() {
        for data in [1usize, 2, 7, 19] {
            for parity in [1usize, 3, 8] {
                for per_disc in [1usize, 5, 31] {
                    let g = geometry(data, parity, per_disc);
                    let naming = NamingScheme::new("fnord", "dar", &g).unwrap();
                    let per_set = g.slices_per_set();
                    let mut seen = HashSet::new();
                    for set in 0..4u64 {
                        let last = (set + 1) * per_set;
                        for column in 0..g.total_discs() {
                            let title = naming.disc_title(naming.set_index(last), column);
                            assert_eq!(title, naming.disc_title(set, column));
                            assert!(title.len() <= MAX_TITLE_LEN);
                            assert!(seen.insert(title.clone()), "duplicate {}", title);
                            assert_eq!(naming.parse_disc_title(&title), Some((set, column)));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_disc_title_truncates_base() {
        let long = "a-backup-name-that-is-far-too-long-for-iso";
        let title = disc_title(long, 0, 0);
        assert_eq!(title.len(), MAX_TITLE_LEN);
        assert!(title.ends_with("-0001-001"));

        let naming = NamingScheme::new(long, "dar", &geometry(2, 1, 3)).unwrap();
        assert_eq!(naming.parse_disc_title(&title), Some((0, 0)));
        assert_eq!(naming.parse_disc_title("other-0001-001"), None);
        assert_eq!(naming.parse_disc_title(&format!("{}-0000-001", &title[..23])), None);
    }
}
