//! Stepchain CLI Entry Point
//!
//! Runs a chain of shell steps described in a YAML definition.
//!
//! # Usage
//!
//! ```bash
//! # Execute a chain
//! stepchain chain.yaml
//!
//! # Pass run arguments ({arg0}, {arg1}, ... in commands)
//! stepchain chain.yaml input.csv 42
//!
//! # Run the chain of a specific contract
//! stepchain chain.yaml --contract nightly
//!
//! # Show the chain layout without running it
//! stepchain chain.yaml --dry-run
//!
//! # Print the per-step timeline afterwards
//! stepchain chain.yaml --timeline --working-dir /path/to/data
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use colored::Colorize;
use log::{error, info};
use serde_json::Value;

use stepchain::workflow::{load_definition, ChainDefinition, ResolvedWorkflow, StepRegistry};
use stepchain::{RunReport, Workflow, APP_NAME, VERSION};

/// Default chain file used when none is specified.
const DEFAULT_CHAIN: &str = "chain.yaml";

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    chain_path: String,
    args: Vec<String>,
    contract: Option<String>,
    dry_run: bool,
    working_dir: Option<PathBuf>,
    timeline: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chain_path: DEFAULT_CHAIN.to_string(),
            args: Vec::new(),
            contract: None,
            dry_run: false,
            working_dir: None,
            timeline: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            use std::io::Write;

            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME.bold(), VERSION);
    println!("In-Process Step Chain Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: stepchain [OPTIONS] <CHAIN_FILE> [ARGS...]");
    println!();
    println!("Arguments:");
    println!("  <CHAIN_FILE>        Path to chain definition YAML file");
    println!("  [ARGS...]           Run arguments, available as {{arg0}}, {{arg1}}, ...");
    println!();
    println!("Options:");
    println!("  --contract NAME     Run the chain registered under this contract");
    println!("  --dry-run           Show the chain layout without execution");
    println!("  --working-dir PATH  Run commands in this directory");
    println!("  --timeline          Print the step timeline after the run");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  stepchain chain.yaml");
    println!("  stepchain chain.yaml data.csv --contract nightly");
    println!("  stepchain chain.yaml --working-dir /data/import --timeline");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut chain_given = false;
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--dry-run" => {
                config.dry_run = true;
            }
            "--timeline" => {
                config.timeline = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--working-dir" => {
                i += 1;
                if i >= args.len() {
                    return Err("--working-dir requires a path argument".to_string());
                }
                config.working_dir = Some(PathBuf::from(&args[i]));
            }
            "--contract" => {
                i += 1;
                if i >= args.len() {
                    return Err("--contract requires a name argument".to_string());
                }
                config.contract = Some(args[i].clone());
            }
            "--" => {
                config.args.extend(args[i + 1..].iter().cloned());
                break;
            }
            arg if arg.starts_with("--") => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if chain_given {
                    config.args.push(arg.clone());
                } else {
                    config.chain_path = arg.clone();
                    chain_given = true;
                }
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Turns a command-line argument into a run argument.
///
/// Valid JSON (numbers, booleans, objects) is kept typed; anything else is
/// passed as a string.
fn to_run_argument(arg: &str) -> Value {
    serde_json::from_str(arg).unwrap_or_else(|_| Value::String(arg.to_string()))
}

/// Validates the working directory.
fn setup_working_directory(
    working_dir: Option<PathBuf>,
) -> Result<Option<PathBuf>, Box<dyn std::error::Error>> {
    let Some(dir) = working_dir else {
        let current = env::current_dir()?;
        info!("Working directory: {}", current.display());
        return Ok(None);
    };

    if !dir.exists() {
        return Err(format!("Working directory does not exist: {}", dir.display()).into());
    }

    if !dir.is_dir() {
        return Err(format!("Path is not a directory: {}", dir.display()).into());
    }

    let dir = dir.canonicalize()?;
    info!("Working directory: {}", dir.display());
    Ok(Some(dir))
}

/// Loads a chain file and selects the chain of `contract`.
///
/// Without a contract the file's own contract is used. A contract that no
/// step starts is rejected before anything runs.
fn prepare_chain(
    chain_path: &str,
    contract: Option<&str>,
    work_dir: Option<&Path>,
) -> Result<(ChainDefinition, ResolvedWorkflow<StepRegistry>), Box<dyn std::error::Error>> {
    info!("Loading chain: {}", chain_path);
    let definition = load_definition(chain_path).map_err(|e| {
        error!("Failed to load chain: {}", e);
        format!("Could not load chain from '{}': {}", chain_path, e)
    })?;

    let contract = definition.select_contract(contract)?;
    let registry = definition.to_registry(work_dir)?;
    registry.validate(contract.as_deref())?;
    info!(
        "Chain loaded: {} steps (contract: {})",
        registry.len(),
        contract.as_deref().unwrap_or("<default>")
    );

    let workflow = ResolvedWorkflow::new(registry, contract.as_deref());
    Ok((definition, workflow))
}

/// Prints the chain layout for a dry run.
fn print_layout(definition: &ChainDefinition, contract: Option<&str>) {
    println!(
        "Chain layout (contract: {}):",
        contract.unwrap_or("<default>")
    );
    println!();

    for step in &definition.steps {
        let own_chain = definition.contract_of(step).as_deref() == contract;
        let marker = if step.start && own_chain { "*" } else { " " };
        let tag = match (&step.contract, own_chain) {
            (Some(other), false) => format!(" [{}]", other.trim()),
            _ => String::new(),
        };
        println!("{} {:16} {}{}", marker, step.id.bold(), step.command, tag.dimmed());

        if let Some(next) = &step.next {
            println!("    {} {}", "next     ->".dimmed(), next);
        }
        if let Some(on_error) = &step.on_error {
            println!("    {} {}", "on_error ->".dimmed(), on_error);
        }
    }

    let path: Vec<&str> = definition.main_path(contract).iter().map(|s| s.id.as_str()).collect();
    println!();
    println!("Success path: {}", path.join(" -> "));
}

/// Prints the outcome of a completed run.
fn print_report(report: &RunReport, show_timeline: bool) {
    println!();
    if report.canceled {
        println!("{} after {} step(s)", "Run canceled".yellow().bold(), report.steps);
    } else {
        println!("{} ({} step(s))", "Run completed".green().bold(), report.steps);
    }

    match &report.result {
        Some(Value::String(text)) => println!("Result: {}", text),
        Some(value) => println!("Result: {}", value),
        None => println!("Result: <empty>"),
    }

    if show_timeline {
        println!();
        print!("{}", report.timeline.summary());
        print!("{}", report.timeline.gantt_chart());
    }
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    setup_logging(config.verbose);
    print_banner();

    let work_dir = setup_working_directory(config.working_dir)?;

    let (definition, workflow) = prepare_chain(
        &config.chain_path,
        config.contract.as_deref(),
        work_dir.as_deref(),
    )?;

    if config.dry_run {
        info!("Mode: DRY RUN (commands will not execute)");
        println!();
        print_layout(&definition, workflow.contract());
        return Ok(());
    }

    let run_args: Vec<Value> = config.args.iter().map(|a| to_run_argument(a)).collect();

    match workflow.run(&run_args) {
        Ok(report) => {
            print_report(&report, config.timeline);
            Ok(())
        }
        Err(e) => {
            let failures = e.step_failures();
            if !failures.is_empty() {
                eprintln!();
                eprintln!("{}", "Run failed".red().bold());
                for failure in failures {
                    eprintln!("  {} {}", "x".red(), failure);
                }
            }
            Err(e.into())
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
