//! DurableRunner CLI Entry Point
//!
//! Operator commands for the employee onboarding workflow.
//!
//! # Usage
//!
//! ```bash
//! # Fresh run (clears prior state)
//! durable-runner start
//!
//! # Simulate a crash at a step, then pick up where it died
//! durable-runner crash provisionLaptop
//! durable-runner resume
//!
//! # Show every recorded attempt of the current workflow
//! durable-runner status
//!
//! # JSON store in a custom location
//! durable-runner start --backend json --db state/engine.json
//! ```

use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info, warn};

use durable_runner::engine::{DurableContext, FaultInjector, WorkerPool};
use durable_runner::store::{DurableStore, StepStatus};
use durable_runner::workflow::onboarding::{resolve_step, STEP_NAMES};
use durable_runner::workflow::{OnboardingWorkflow, SimulatedActions, WorkflowId};
use durable_runner::{Backend, EngineConfig, APP_NAME, VERSION};

/// Operator command.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Start,
    Resume,
    Crash(String),
    Status,
}

/// Command-line configuration parsed from arguments.
#[derive(Debug, Default)]
struct Config {
    command: Option<Command>,
    config_path: Option<PathBuf>,
    db_path: Option<PathBuf>,
    backend: Option<Backend>,
    max_parallel: Option<usize>,
    verbose: bool,
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
    println!("{} v{}", APP_NAME, VERSION);
    println!("Durable Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: durable-runner [OPTIONS] <COMMAND>");
    println!();
    println!("Commands:");
    println!("  start               Clear prior state and run the workflow");
    println!("  resume              Resume the current workflow");
    println!("  crash <STEP>        Run fresh and crash at STEP (name or 1-4)");
    println!("  status              Show recorded steps of the current workflow");
    println!();
    println!("Steps:");
    for (i, name) in STEP_NAMES.iter().enumerate() {
        println!("  {}. {}", i + 1, name);
    }
    println!();
    println!("Options:");
    println!("  --config PATH       Load settings from a YAML file");
    println!("  --db PATH           Store location");
    println!("  --backend NAME      Storage backend: redb, json, memory (default: redb)");
    println!("  --parallel N        Maximum parallel steps (default: CPU count)");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  durable-runner crash 2");
    println!("  durable-runner resume");
    println!("  durable-runner status --backend json");
}

/// Returns the value following an option.
fn option_value<'a>(args: &'a [String], i: &mut usize, option: &str) -> Result<&'a str, String> {
    *i += 1;
    args.get(*i)
        .map(String::as_str)
        .ok_or_else(|| format!("{} requires an argument", option))
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
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
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--config" => {
                config.config_path = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--db" => {
                config.db_path = Some(PathBuf::from(option_value(args, &mut i, arg)?));
            }
            "--backend" => {
                let value = option_value(args, &mut i, arg)?;
                config.backend = Some(value.parse().map_err(|e| format!("{}", e))?);
            }
            "--parallel" => {
                let value = option_value(args, &mut i, arg)?;
                let parallel: usize = value
                    .parse()
                    .map_err(|_| format!("Invalid parallel value: {}", value))?;
                if parallel == 0 {
                    return Err("--parallel must be at least 1".to_string());
                }
                config.max_parallel = Some(parallel);
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if config.command.is_some() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                let command = match arg.as_str() {
                    "start" => Command::Start,
                    "resume" => Command::Resume,
                    "status" => Command::Status,
                    "crash" => {
                        let step = option_value(args, &mut i, "crash")?;
                        let name = resolve_step(step)
                            .ok_or_else(|| format!("Unknown step: {}", step))?;
                        Command::Crash(name.to_string())
                    }
                    other => return Err(format!("Unknown command: {}", other)),
                };
                config.command = Some(command);
            }
        }
        i += 1;
    }

    Ok(config)
}

/// Builds engine settings from the config file and flag overrides.
fn engine_config(config: &Config) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut engine_config = match config.config_path {
        Some(ref path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    if let Some(backend) = config.backend {
        engine_config.backend = backend;
    }
    if let Some(ref path) = config.db_path {
        engine_config.db_path = Some(path.clone());
    }
    if let Some(parallel) = config.max_parallel {
        engine_config.max_parallel = parallel;
    }

    Ok(engine_config)
}

/// Removes a file if it exists.
fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!("Deleted: {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Clears the store and workflow id so the next run starts fresh.
fn reset_state(engine_config: &EngineConfig) -> io::Result<()> {
    if engine_config.backend != Backend::Memory {
        remove_if_exists(&engine_config.store_path())?;
    }
    WorkflowId::reset(&engine_config.workflow_id_path)
}

/// Runs the onboarding workflow, optionally crashing at a step.
fn run_workflow(
    engine_config: &EngineConfig,
    store: Arc<dyn DurableStore>,
    workflow_id: &WorkflowId,
    fault: Option<FaultInjector>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut ctx = DurableContext::new(workflow_id.as_str(), store)?;
    ctx.set_retry_policy(engine_config.retry.clone());
    ctx.set_fault_injector(fault);

    let actions = SimulatedActions::default();
    let mut workflow = OnboardingWorkflow::new(&ctx, &actions);
    workflow.set_pool(WorkerPool::new(engine_config.max_parallel));

    let result = workflow.run();

    let timeline = ctx.timeline();
    println!();
    println!("{}", timeline.gantt_chart());
    println!("{}", timeline.summary());

    let employee_id = result?;
    println!();
    println!(
        "{} Employee {} onboarded (workflow {})",
        "✓".green(),
        employee_id,
        workflow_id
    );
    Ok(())
}

/// Prints every recorded attempt of the current workflow.
fn print_status(
    store: &dyn DurableStore,
    workflow_id: &WorkflowId,
) -> Result<(), Box<dyn std::error::Error>> {
    let records = store.list_steps(workflow_id.as_str())?;

    println!("Workflow: {}", workflow_id);
    println!();

    if records.is_empty() {
        println!("No steps recorded");
        return Ok(());
    }

    for record in &records {
        let status = match record.status {
            StepStatus::Completed => record.status.as_str().green(),
            StepStatus::Failed => record.status.as_str().red(),
            StepStatus::Running => record.status.as_str().yellow(),
        };
        println!(
            "  {:<24} {:<10} {}",
            record.step_key,
            status,
            record.output.as_deref().unwrap_or("-")
        );
    }

    Ok(())
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

    let Some(ref command) = config.command else {
        print_usage();
        return Err("No command given".into());
    };

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    let engine_config = engine_config(&config)?;
    engine_config.validate()?;

    info!(
        "Store: {} ({})",
        engine_config.store_path().display(),
        engine_config.backend
    );
    if engine_config.backend == Backend::Memory {
        warn!("Memory backend: nothing persists across restarts");
    }

    match command {
        Command::Start | Command::Crash(_) => {
            reset_state(&engine_config)?;

            let fault = match command {
                Command::Crash(step) => {
                    info!("Crash scheduled at step: {}", step);
                    Some(FaultInjector::exit_at(step.as_str()))
                }
                _ => None,
            };

            let store = engine_config.open_store()?;
            let workflow_id = WorkflowId::load_or_create(&engine_config.workflow_id_path)?;
            run_workflow(&engine_config, store, &workflow_id, fault)
        }
        Command::Resume => {
            let Some(workflow_id) = WorkflowId::load(&engine_config.workflow_id_path)? else {
                error!(
                    "No workflow to resume ({} not found)",
                    engine_config.workflow_id_path.display()
                );
                return Err("Nothing to resume; run 'start' first".into());
            };

            info!("Resuming workflow: {}", workflow_id);
            let store = engine_config.open_store()?;
            run_workflow(&engine_config, store, &workflow_id, None)
        }
        Command::Status => {
            let Some(workflow_id) = WorkflowId::load(&engine_config.workflow_id_path)? else {
                println!("No workflow recorded");
                return Ok(());
            };

            let store = engine_config.open_store()?;
            print_status(&*store, &workflow_id)
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

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("durable-runner")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_parse_commands() {
        let config = parse_arguments(&args(&["start"])).unwrap();
        assert_eq!(config.command, Some(Command::Start));

        let config = parse_arguments(&args(&["resume", "--verbose"])).unwrap();
        assert_eq!(config.command, Some(Command::Resume));
        assert!(config.verbose);
    }

    #[test]
    fn test_parse_crash_by_number_and_name() {
        let config = parse_arguments(&args(&["crash", "2"])).unwrap();
        assert_eq!(config.command, Some(Command::Crash("provisionLaptop".into())));

        let config = parse_arguments(&args(&["crash", "sendWelcomeEmail"])).unwrap();
        assert_eq!(config.command, Some(Command::Crash("sendWelcomeEmail".into())));

        assert!(parse_arguments(&args(&["crash", "9"])).is_err());
        assert!(parse_arguments(&args(&["crash"])).is_err());
    }

    #[test]
    fn test_parse_options() {
        let config = parse_arguments(&args(&[
            "status", "--backend", "json", "--db", "x.json", "--parallel", "3",
        ]))
        .unwrap();

        assert_eq!(config.backend, Some(Backend::Json));
        assert_eq!(config.db_path, Some(PathBuf::from("x.json")));
        assert_eq!(config.max_parallel, Some(3));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(parse_arguments(&args(&["start", "resume"])).is_err());
        assert!(parse_arguments(&args(&["launch"])).is_err());
        assert!(parse_arguments(&args(&["--parallel", "0"])).is_err());
        assert!(parse_arguments(&args(&["--backend", "sqlite"])).is_err());
        assert!(parse_arguments(&args(&["--bogus"])).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let config = parse_arguments(&args(&["start", "--backend", "memory", "--parallel", "1"]))
            .unwrap();
        let engine_config = engine_config(&config).unwrap();

        assert_eq!(engine_config.backend, Backend::Memory);
        assert_eq!(engine_config.max_parallel, 1);
    }
}
