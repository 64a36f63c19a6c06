//! discraid - Redundant multi-disc backups with dar and parchive
//!
//! Usage:
//!   discraid init                       - Write a default configuration
//!   discraid plan                       - Show the derived disc layout
//!   discraid create <name> <source>     - Back up a directory tree
//!   discraid extract <name> <dest>      - Restore a backup
//!
//! dar calls back into the copy of this program in the scratch area through
//! the hidden `_create` and `_extract` subcommands, once per slice.

use anyhow::Context;
use clap::{Parser, Subcommand};
use discraid::{
    config::Config,
    geometry::{overhead_mib, NamingScheme},
    operator::{ConsoleOperator, DryRunOperator, Operator},
    scratch::{available_mib, ScratchArea},
    stripe::{ReadScheduler, SliceEvent, WriteScheduler},
    tools::{ArchiveMode, Archiver, ProcessRunner},
    Error,
};
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Exit status for a restore that lost data
const EXIT_DATA_LOSS: i32 = 3;

#[derive(Parser)]
#[command(name = "discraid")]
#[command(author = "discraid Contributors")]
#[command(version)]
#[command(about = "Redundant multi-disc backups with dar and parchive")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/discraid/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Move disc contents into folders under the scratch directory instead
    /// of burning them
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show slice size, set size and scratch space for the configured discs
    Plan,

    /// Back up a directory tree
    Create {
        /// Backup name; slices are named <name>.<number>.dar
        name: String,

        /// Directory to back up
        source: PathBuf,

        /// Extra arguments passed to dar
        #[arg(last = true)]
        dar_args: Vec<String>,
    },

    /// Restore a backup
    Extract {
        /// Backup name
        name: String,

        /// Directory to restore into
        destination: PathBuf,

        /// Extra arguments passed to dar
        #[arg(last = true)]
        dar_args: Vec<String>,
    },

    /// Slice-created hook run by dar
    #[command(name = "_create", hide = true)]
    HookCreate(HookArgs),

    /// Slice-requested hook run by dar
    #[command(name = "_extract", hide = true)]
    HookExtract(HookArgs),
}

/// dar's `%p %b %n %e %c`
#[derive(clap::Args)]
struct HookArgs {
    dir: PathBuf,
    base: String,
    number: String,
    extension: String,
    context: String,
}

impl HookArgs {
    fn event(&self) -> discraid::Result<SliceEvent> {
        SliceEvent::from_hook_args(
            self.dir.clone(),
            &self.base,
            &self.number,
            &self.extension,
            &self.context,
        )
    }
}

fn main() {
    let cli = Cli::parse();

    // Setup logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {}", e);
    }

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);

    // Run the command
    if let Err(e) = run_command(cli.command, &config_path, cli.verbose, cli.dry_run) {
        error!("Error: {:#}", e);
        let data_loss = e
            .downcast_ref::<Error>()
            .map_or(false, |e| e.is_data_loss());
        std::process::exit(if data_loss { EXIT_DATA_LOSS } else { 1 });
    }
}

fn run_command(
    command: Commands,
    config_path: &Path,
    verbose: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    match command {
        Commands::Init { force } => cmd_init(config_path, force),

        Commands::Plan => cmd_plan(&load_config(config_path, dry_run)?),

        Commands::Create {
            name,
            source,
            dar_args,
        } => cmd_create(
            &load_config(config_path, dry_run)?,
            &name,
            &source,
            &dar_args,
            verbose,
        ),

        Commands::Extract {
            name,
            destination,
            dar_args,
        } => cmd_extract(
            &load_config(config_path, dry_run)?,
            &name,
            &destination,
            &dar_args,
            verbose,
        ),

        Commands::HookCreate(args) => hook_create(&load_hook_config(config_path)?, &args),

        Commands::HookExtract(args) => hook_extract(&load_hook_config(config_path)?, &args),
    }
}

fn load_config(config_path: &Path, dry_run: bool) -> anyhow::Result<Config> {
    let mut config = Config::load_or_default(config_path)
        .with_context(|| format!("loading configuration {:?}", config_path))?;
    if dry_run {
        config.burn.enabled = false;
    }
    Ok(config)
}

/// Hooks run with the configuration saved in the scratch area
fn load_hook_config(config_path: &Path) -> anyhow::Result<Config> {
    Config::load(config_path)
        .with_context(|| format!("loading hook configuration {:?}", config_path))
}

fn cmd_init(config_path: &Path, force: bool) -> anyhow::Result<()> {
    if config_path.exists() && !force {
        return Err(Error::InvalidArgument(format!(
            "{:?} already exists; use --force to overwrite it",
            config_path
        ))
        .into());
    }

    // Ensure config directory exists
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let config = Config::default();
    config.save(config_path)?;

    info!("Configuration saved to {:?}", config_path);
    info!("Scratch directory: {:?}", config.scratch.dir);
    info!("");
    info!("Next steps:");
    info!("  1. Set the disc geometry and burner device in {:?}", config_path);
    info!("  2. Run 'discraid plan' to check the layout");
    info!("  3. Run 'discraid create <name> <directory>' to make a backup");

    Ok(())
}

fn cmd_plan(config: &Config) -> anyhow::Result<()> {
    let g = &config.geometry;
    let slice_size = g.slice_size_mib()?;
    let naming = NamingScheme::new("backup", "dar", g)?;

    println!("discraid Plan");
    println!("=============");
    println!();
    println!("Disc size: {} MiB ({} MiB reserved)", g.disc_size_mib, g.reserve_space_mib);
    println!(
        "Discs per set: {} ({} data + {} parity)",
        g.total_discs(),
        g.data_discs,
        g.parity_discs
    );
    println!("Slices per data disc: {}", g.slices_per_disc);
    println!("Slices per set: {}", g.slices_per_set());
    println!("Slice size: {} MiB", slice_size);
    println!(
        "Parity overhead per slice: {} MiB",
        overhead_mib(g)
    );
    println!("Data per set: {} MiB", g.slices_per_set() * slice_size);
    println!("Slice number digits: {}", g.digit_width());
    println!("Scratch space needed: {} MiB", g.scratch_free_needed_mib());
    println!("Scratch directory: {:?}", config.scratch.dir);
    println!(
        "Burning: {}",
        if config.burn.enabled {
            format!("enabled ({:?})", config.burn.device)
        } else {
            "disabled (dry run)".to_string()
        }
    );
    println!(
        "Disc titles: {} ... {}",
        naming.disc_title(0, 0),
        naming.disc_title(0, g.total_discs() - 1)
    );

    Ok(())
}

fn cmd_create(
    config: &Config,
    name: &str,
    source: &Path,
    dar_args: &[String],
    verbose: bool,
) -> anyhow::Result<()> {
    let source = source
        .canonicalize()
        .with_context(|| format!("backup source {:?}", source))?;
    if config.scratch.dir.starts_with(&source) {
        return Err(Error::InvalidArgument(format!(
            "scratch directory {:?} is inside the backup source {:?}",
            config.scratch.dir, source
        ))
        .into());
    }

    info!("Creating backup {} of {:?}", name, source);
    let scratch = ScratchArea::from_config(config);
    let program = std::env::current_exe()?;
    scratch.prepare_backup(
        &program,
        config.geometry.scratch_free_needed_mib(),
        available_mib,
    )?;
    scratch.write_config(config)?;

    let archiver = Archiver::from_config(config, verbose)?;
    archiver.run(
        &mut ProcessRunner::new(),
        ArchiveMode::Create,
        name,
        &source,
        dar_args,
    )?;

    info!("Backup {} complete", name);
    Ok(())
}

fn cmd_extract(
    config: &Config,
    name: &str,
    destination: &Path,
    dar_args: &[String],
    verbose: bool,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(destination)?;
    info!("Restoring backup {} into {:?}", name, destination);

    let scratch = ScratchArea::from_config(config);
    let program = std::env::current_exe()?;
    scratch.prepare_restore(&program)?;
    scratch.write_config(config)?;

    let archiver = Archiver::from_config(config, verbose)?;
    archiver.run(
        &mut ProcessRunner::new(),
        ArchiveMode::Extract,
        name,
        destination,
        dar_args,
    )?;

    info!("Restore of {} complete", name);
    Ok(())
}

fn hook_create(config: &Config, args: &HookArgs) -> anyhow::Result<()> {
    let event = args.event()?;
    let naming = NamingScheme::new(&event.base, &event.extension, &config.geometry)?;
    let mut operator = operator_for(config, &naming);

    let mut scheduler =
        WriteScheduler::new(config, naming, ProcessRunner::new(), &mut *operator)?;
    let outcome = scheduler
        .on_slice_created(&event)
        .with_context(|| format!("handling new slice {} of {}", event.number, event.base))?;

    if let Some((min, max)) = outcome.protected {
        info!("slices {}-{} protected", min, max);
    }
    if let (Some(first), Some(last)) = (outcome.flushed.first(), outcome.flushed.last()) {
        info!("discs {} to {} written", first, last);
    }
    Ok(())
}

fn hook_extract(config: &Config, args: &HookArgs) -> anyhow::Result<()> {
    let event = args.event()?;
    let naming = NamingScheme::new(&event.base, &event.extension, &config.geometry)?;
    let mut operator = operator_for(config, &naming);

    let mut scheduler = ReadScheduler::new(config, naming, ProcessRunner::new(), &mut *operator);
    let outcome = scheduler
        .on_slice_requested(&event)
        .with_context(|| format!("fetching slice {} of {}", event.number, event.base))?;
    info!("slice {} of {}: {:?}", event.number, event.base, outcome);
    Ok(())
}

fn operator_for(config: &Config, naming: &NamingScheme) -> Box<dyn Operator> {
    if config.dry_run() {
        Box::new(DryRunOperator::new(config.scratch.dir.clone(), naming.clone()))
    } else {
        Box::new(ConsoleOperator::stdio())
    }
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
