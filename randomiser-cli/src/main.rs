use clap::{Parser, Subcommand};
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

use research_randomiser_core::host::files::{discover_objects, load_world, merge_installed, save_world};
use research_randomiser_core::{
    JsonFileStore, MemoryHost, Multiplier, RandomiseOptions, Randomiser, ResearchError, Result,
    Status,
};

#[derive(Debug, Parser)]
#[command(name = "research-randomiser", version, about = "Research list randomiser")]
struct Args {
    /// World file to operate on. A `.gz` suffix means gzip-compressed JSON.
    #[arg(long)]
    world: PathBuf,

    /// Directory of installed objects (`object.json` files or `.parkobj`
    /// archives) to merge into the world before running.
    #[arg(long)]
    objects: Option<PathBuf>,

    /// Persisted state file. Defaults to the user config directory.
    #[arg(long)]
    store: Option<PathBuf>,

    /// Write a research_log.txt next to the world file.
    #[arg(long, default_value_t = false)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Rebuild the object catalog and learn ride categories.
    Scan,

    /// Reshape the research collections around the level baseline.
    Randomize {
        #[arg(long)]
        multiplier: Option<f64>,

        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        cash_machine: Option<bool>,

        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        info_kiosk: Option<bool>,

        #[arg(long, num_args = 0..=1, default_missing_value = "true")]
        exclude_custom: Option<bool>,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Show baseline, catalog and scan state for the world's level.
    Status {
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Forget the catalog, metadata and every baseline.
    Clear,

    /// Strip dangling, invalid and duplicate research entries.
    Repair,

    /// Advance the daily guard, optionally running a deferred scan.
    Tick {
        #[arg(long, default_value_t = 1)]
        days: u32,

        #[arg(long, default_value_t = false)]
        scan: bool,
    },
}

fn store_path(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let mut base = dirs::config_dir()
        .or_else(dirs::data_dir)
        .ok_or_else(|| ResearchError::Config("no config directory found; pass --store".to_string()))?;
    base.push("ResearchRandomiser");
    base.push("store.json");
    Ok(base)
}

fn debug_log_path(world: &Path) -> PathBuf {
    world
        .parent()
        .map(|dir| dir.join("research_log.txt"))
        .unwrap_or_else(|| PathBuf::from("research_log.txt"))
}

fn format_timestamp(millis: Option<u64>) -> String {
    match millis {
        Some(ms) => format!("{} (unix seconds)", ms / 1000),
        None => "never".to_string(),
    }
}

fn print_status(status: &Status) {
    println!("Level: {}", status.level);
    if status.has_baseline {
        println!("Baseline: captured {}", format_timestamp(status.baseline_timestamp));
    } else {
        println!("Baseline: not captured");
    }
    if status.has_catalog {
        println!(
            "Catalog: {} entries, last scan {}",
            status.catalog_entries,
            format_timestamp(status.catalog_timestamp)
        );
        for (category, count) in status.category_summary.iter() {
            if count > 0 {
                println!("  {:<14}{:>5}", category.as_str(), count);
            }
        }
    } else {
        println!("Catalog: empty");
    }
    match (status.scan.needed, status.scan.reason.as_deref()) {
        (true, Some(reason)) => println!("Scan needed: {reason}"),
        (true, None) => println!("Scan needed"),
        (false, _) => println!("Scan: up to date"),
    }
    println!("Randomize runs on this level: {}", status.runs);
    let presets: Vec<&str> = Multiplier::presets().map(|(_, label)| label).collect();
    println!("Multiplier presets: {}", presets.join(", "));
}

fn run(args: Args) -> Result<()> {
    if !args.world.exists() {
        return Err(ResearchError::Config(format!(
            "World file does not exist: {}",
            args.world.display()
        )));
    }

    let mut world = load_world(&args.world)?;
    if let Some(dir) = args.objects.as_deref() {
        let discovered = discover_objects(dir)?;
        let found = discovered.len();
        let added = merge_installed(&mut world, discovered);
        info!(found, added, dir = %dir.display(), "merged installed objects");
    }

    let store = JsonFileStore::open(store_path(args.store.as_deref())?)?;
    let mut randomiser = Randomiser::new(MemoryHost::new(world), store);
    let mut log = String::new();

    match args.command {
        Command::Scan => {
            let report = randomiser.scan()?;
            println!(
                "Scanned {} installed objects: {} new entries, {} variants probed, {} unusable, {} unloaded",
                report.installed,
                report.new_entries,
                report.probed,
                report.newly_unusable.len(),
                report.unloaded
            );
            for failure in report.load_failures.iter().chain(&report.unload_failures) {
                println!("  failed: {failure}");
            }
            log = serde_json::to_string_pretty(&report)?;
        }
        Command::Randomize {
            multiplier,
            cash_machine,
            info_kiosk,
            exclude_custom,
            seed,
        } => {
            let seed = seed.unwrap_or_else(|| rand::thread_rng().gen());
            let mut options = RandomiseOptions::from_preferences(&randomiser.store().preferences(), seed);
            if let Some(value) = multiplier {
                options.multiplier = Multiplier::new(value)?;
            }
            if let Some(value) = cash_machine {
                options.guarantee_cash_machine = value;
            }
            if let Some(value) = info_kiosk {
                options.guarantee_info_kiosk = value;
            }
            if let Some(value) = exclude_custom {
                options.exclude_custom = value;
            }

            println!("Seed: {seed}");
            let report = randomiser.randomize(&options)?;
            randomiser.store_mut().set_preferences(&options.to_preferences())?;
            println!("{}", report.summary());
            for shortfall in &report.shortfalls {
                println!(
                    "  {}: wanted {}, only {} available",
                    shortfall.category, shortfall.wanted, shortfall.got
                );
            }
            log = report.to_log();
        }
        Command::Status { json } => {
            let status = randomiser.status();
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                print_status(&status);
            }
        }
        Command::Clear => {
            randomiser.clear_all_persisted_state()?;
            println!("Cleared catalog, metadata and baselines");
        }
        Command::Repair => {
            let report = randomiser.repair();
            if report.changed {
                println!("Removed {} invalid research entries", report.removed());
            } else {
                println!("Research collections are consistent");
            }
        }
        Command::Tick { days, scan } => {
            if scan {
                randomiser.defer_scan();
            }
            for day in 1..=days {
                let tick = randomiser.on_day_tick();
                if tick.repair.changed {
                    println!("Day {day}: removed {} invalid research entries", tick.repair.removed());
                }
                if let Some(report) = &tick.scan {
                    println!("Day {day}: deferred scan covered {} objects", report.installed);
                }
                if let Some(err) = &tick.scan_error {
                    println!("Day {day}: deferred scan failed: {err}");
                }
            }
        }
    }

    let (host, _) = randomiser.into_parts();
    save_world(&args.world, host.state())?;

    if args.debug && !log.is_empty() {
        let log_path = debug_log_path(&args.world);
        fs::write(&log_path, log)?;
        println!("Debug log written to {}", log_path.display());
    }

    Ok(())
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(Args::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_randomize_overrides() {
        let args = Args::try_parse_from([
            "research-randomiser",
            "--world",
            "park.json",
            "randomize",
            "--multiplier",
            "1.5",
            "--cash-machine",
            "--exclude-custom",
            "false",
        ])
        .unwrap();
        match args.command {
            Command::Randomize {
                multiplier,
                cash_machine,
                info_kiosk,
                exclude_custom,
                seed,
            } => {
                assert_eq!(multiplier, Some(1.5));
                assert_eq!(cash_machine, Some(true));
                assert_eq!(info_kiosk, None);
                assert_eq!(exclude_custom, Some(false));
                assert_eq!(seed, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn explicit_store_path_wins() {
        let path = store_path(Some(Path::new("/tmp/s.json"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/s.json"));
        assert_eq!(debug_log_path(Path::new("saves/park.json")), PathBuf::from("saves/research_log.txt"));
    }
}
