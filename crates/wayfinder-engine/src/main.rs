use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use wayfinder_engine::{init_tracing, run_simulator, EngineConfig, SimulatorConfig};
use wayfinder_persistence::{FileStorage, PersistenceBridge, StorageKey, StorageScope};

fn cli() -> Command {
    Command::new("wayfinder")
        .version(wayfinder_engine::VERSION)
        .about("Guided workflow engine tooling")
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug-level logging"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Drive the engine with random user actions and check its guarantees")
                .arg(
                    Arg::new("ops")
                        .long("ops")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Engine config whose focus unlock policy is simulated"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print the persisted workflow of one scope")
                .arg(
                    Arg::new("dir")
                        .long("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Storage directory"),
                )
                .arg(
                    Arg::new("scope")
                        .long("scope")
                        .required(true)
                        .help("`user:<id>` or `session:<id>`"),
                )
                .arg(
                    Arg::new("namespace")
                        .long("namespace")
                        .default_value("wayfinder")
                        .help("Storage namespace"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Show or validate engine configuration")
                .arg(
                    Arg::new("print-default")
                        .long("print-default")
                        .action(ArgAction::SetTrue)
                        .help("Print the default configuration as TOML"),
                )
                .arg(
                    Arg::new("check")
                        .long("check")
                        .value_parser(value_parser!(PathBuf))
                        .help("Validate a configuration file"),
                ),
        )
}

fn parse_scope(raw: &str) -> anyhow::Result<StorageScope> {
    match raw.split_once(':') {
        Some(("user", id)) if !id.is_empty() => Ok(StorageScope::User(id.to_string())),
        Some(("session", id)) if !id.is_empty() => Ok(StorageScope::Session(id.to_string())),
        _ => anyhow::bail!("scope must be `user:<id>` or `session:<id>`, got `{raw}`"),
    }
}

fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    init_tracing(matches.get_flag("verbose"), matches.get_flag("json-logs"))
        .map_err(|e| anyhow::anyhow!(e))
        .context("failed to initialise logging")?;

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let operations = args.get_one::<u64>("ops").copied().unwrap_or(1000);
            let seed = args.get_one::<u64>("seed").copied().unwrap_or(42);
            let engine_config = match args.get_one::<PathBuf>("config") {
                Some(path) => EngineConfig::load(path)
                    .with_context(|| format!("failed to load {}", path.display()))?,
                None => EngineConfig::default(),
            };

            println!("Running Wayfinder Simulator...");
            println!("Operations: {operations}");
            println!("Seed: {seed}");
            println!();

            let report = run_simulator(SimulatorConfig {
                seed,
                operations,
                stop_on_first_violation: args.get_flag("stop-on-violation"),
                focus_unlock: engine_config.focus_unlock,
            });
            println!("{}", report.generate_text());

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("inspect", args)) => {
            let dir = args
                .get_one::<PathBuf>("dir")
                .context("--dir is required")?;
            let scope = parse_scope(
                args.get_one::<String>("scope")
                    .context("--scope is required")?,
            )?;
            let namespace = args
                .get_one::<String>("namespace")
                .map_or("wayfinder", String::as_str);

            let storage = FileStorage::open(dir)
                .with_context(|| format!("failed to open {}", dir.display()))?;
            let bridge = PersistenceBridge::new(
                std::sync::Arc::new(storage),
                StorageKey::workflow(namespace, &scope),
            );
            match bridge.load_snapshot()? {
                Some(blob) => println!("{}", serde_json::to_string_pretty(&blob)?),
                None => println!("No persisted workflow for {scope}"),
            }
        }
        Some(("config", args)) => {
            if let Some(path) = args.get_one::<PathBuf>("check") {
                let config = EngineConfig::load(path)
                    .with_context(|| format!("invalid config {}", path.display()))?;
                println!("{} is valid", path.display());
                println!("{}", config.to_toml_string()?);
            } else {
                println!("{}", EngineConfig::default().to_toml_string()?);
            }
        }
        _ => {}
    }

    Ok(())
}
