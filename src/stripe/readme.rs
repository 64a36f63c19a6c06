//! README burned onto every disc

use chrono::{DateTime, Local};

use crate::config::Config;
use crate::error::Result;
use crate::scratch::{CONFIG_NAME, PROGRAM_NAME};

/// Text explaining a disc to whoever finds it later
#[derive(Debug, Clone)]
pub struct Readme {
    host: String,
    created: DateTime<Local>,
}

impl Default for Readme {
    fn default() -> Self {
        Self::new()
    }
}

impl Readme {
    /// README stamped with this host and the current time
    pub fn new() -> Self {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "an unknown host".to_string());
        Self::with_origin(host, Local::now())
    }

    /// README stamped with a given host and time
    pub fn with_origin(host: impl Into<String>, created: DateTime<Local>) -> Self {
        Readme {
            host: host.into(),
            created,
        }
    }

    /// Render the README for `base`, made with `control_file`
    pub fn render(&self, config: &Config, base: &str, control_file: &str) -> Result<String> {
        let g = &config.geometry;
        let slice_size = g.slice_size_mib()?;
        Ok(format!(
            r#"
This disc is part of the backup "{base}", made by {program} on {host} at
{created}. {program} wraps the dar disk archiver and the parchive file
verification and repair tool to produce backups with redundancy, for greater
resilience against data loss due to lost or failing backup media.

The {program} program on this disc is a copy of the one used to make the
backup, and {config_name} holds the settings it ran with. dar ran with this
control file:

# ----------------
{control}
# ----------------

The backup is split into redundancy sets of {total} discs. Out of each set,
dar archive slices are striped across the {data} data disc(s); parity volumes
for the slices are striped across the {parity} parity disc(s). Every disc of a
set carries the .par index files of the set. Each disc can store {disc} MiB of
data, each data disc holds up to {per_disc} slices, and each slice is
{slice_size} MiB in size. Disc titles are <name>-<set>-<disc>, counting from 1.

Slice N is on data disc ((N - 1) mod {data}) + 1 of set ((N - 1) div {per_set}) + 1.
If some discs of a set are lost or unreadable, up to {parity} of them can be
rebuilt from the others with parchive.

To restore: make a directory with at least {scratch} MiB free, set it as
the scratch directory in {config_name}, and run
"{program} --config {config_name} extract {base} <destination>". {program}
asks for each disc of a set in turn; answer with an empty line for a disc
that is missing.
"#,
            base = base,
            program = PROGRAM_NAME,
            host = self.host,
            created = self.created.format("%Y-%m-%d %H:%M:%S %z"),
            config_name = CONFIG_NAME,
            control = control_file.trim_end(),
            total = g.total_discs(),
            data = g.data_discs,
            parity = g.parity_discs,
            disc = g.disc_size_mib,
            per_disc = g.slices_per_disc,
            per_set = g.slices_per_set(),
            slice_size = slice_size,
            scratch = g.scratch_free_needed_mib(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_describes_layout() {
        let mut config = Config::default();
        config.geometry.data_discs = 4;
        config.geometry.parity_discs = 1;
        config.geometry.slices_per_disc = 5;

        let created = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let readme = Readme::with_origin("archivist", created);
        let text = readme
            .render(&config, "photos", "--min-digits=4\n-v\n")
            .unwrap();

        assert!(text.contains("backup \"photos\""));
        assert!(text.contains("on archivist"));
        assert!(text.contains("2024-03-01 12:00:00"));
        assert!(text.contains("redundancy sets of 5 discs"));
        assert!(text.contains("--min-digits=4\n-v\n# ----"));
        assert!(text.contains(&format!(
            "each slice is\n{} MiB",
            config.geometry.slice_size_mib().unwrap()
        )));
        assert!(text.contains("set ((N - 1) div 20) + 1"));
    }

    #[test]
    fn test_new_uses_local_host() {
        let text = Readme::new()
            .render(&Config::default(), "x", "")
            .unwrap();
        assert!(text.contains("made by discraid on "));
    }
}
