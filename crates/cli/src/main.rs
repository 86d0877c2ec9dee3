//! `dssctl` – command-line driver for the simulation engine adapter.
//!
//! Opens one engine session per invocation, either against a real engine
//! behind a bridge process or against a YAML fixture, and runs the demo
//! walkthrough, single registry commands, scripts, or a socket daemon.

mod config;
mod demo;
mod logging;
mod serve;

use clap::{Parser, Subcommand};
use config::{AppConfig, Backend};
use dss_adapter::types::*;
use dss_adapter::{
    BridgeEngine, CircuitFixture, CommandError, CommandRegistry, CommandResult, DssEngine,
    FixtureEngine, ModelLocator, Session,
};
use std::path::{Path, PathBuf};

// ===========================================================================
// CLI definition
// ===========================================================================

#[derive(Parser)]
#[command(
    name = "dssctl",
    version,
    about = "Drive a power-system simulation engine session"
)]
struct Cli {
    /// Configuration file used instead of global_config.yaml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Model file inside the models directory (overrides config).
    #[arg(long, global = true)]
    model: Option<String>,
    /// Engine backend (overrides config).
    #[arg(long, global = true, value_enum)]
    backend: Option<Backend>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile, solve and print a tour of the circuit.
    Demo {
        #[command(flatten)]
        args: demo::DemoArgs,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Invoke a registry command by name with JSON args.
    Call {
        /// Command name (e.g. "compile", "bus", "lines").
        cmd: String,
        /// JSON args to pass to the command.
        #[arg(long, default_value = "{}")]
        args: String,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Compile and solve a snapshot at load multiplier 1.0 first.
        #[arg(long)]
        prepare: bool,
    },

    /// Run a scripted command sequence from a YAML file.
    RunScript {
        /// Path to the script YAML file.
        file: PathBuf,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Serve one session over a Unix socket.
    Serve {
        /// Path for the Unix domain socket.
        #[arg(long)]
        socket: PathBuf,
    },

    /// Check the models directory and that the engine starts.
    Doctor {
        /// Output as JSON instead of human-readable text.
        #[arg(long)]
        json: bool,
    },
}

// ===========================================================================
// Main
// ===========================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match config::load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to load configuration: {}", e);
            std::process::exit(2);
        }
    };
    if let Some(model) = cli.model {
        config.model_file = model;
    }
    if let Some(backend) = cli.backend {
        config.engine.backend = backend;
    }

    logging::init_logging(&config.logging);
    tracing::debug!(?config, "configuration loaded");

    let locator = ModelLocator::in_current_dir(&config.models_dir);

    match config.engine.backend {
        Backend::Fixture => match fixture_engine(&config, &locator) {
            Ok(engine) => run(engine, cli.command, &config, &locator).await,
            Err(e) => fail_startup(command_name(&cli.command), wants_json(&cli.command), e),
        },
        Backend::Bridge => match BridgeEngine::new(&config.engine.bridge_command) {
            Ok(engine) => run(engine, cli.command, &config, &locator).await,
            Err(e) => fail_startup(
                command_name(&cli.command),
                wants_json(&cli.command),
                e.to_string(),
            ),
        },
    }
}

/// Build the fixture backend, serving the configured fixture as the model file.
fn fixture_engine(config: &AppConfig, locator: &ModelLocator) -> Result<FixtureEngine, String> {
    let engine = FixtureEngine::new();
    let Some(ref path) = config.engine.fixture else {
        tracing::warn!("fixture backend without engine.fixture, no model will compile");
        return Ok(engine);
    };
    let path = resolve_fixture_path(path);
    let fixture = CircuitFixture::load(&path)?;
    tracing::debug!(fixture = %path.display(), circuit = %fixture.name, "fixture loaded");
    Ok(engine.with_model(locator.resolve(&config.model_file), fixture))
}

/// Relative fixture paths are tried against the working directory, then
/// against the crate directory when running under cargo.
fn resolve_fixture_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    if let Ok(cwd) = std::env::current_dir() {
        let candidate = cwd.join(path);
        if candidate.exists() {
            return candidate;
        }
    }
    match std::env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => Path::new(&dir).join(path),
        Err(_) => path.to_path_buf(),
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Demo { .. } => "demo",
        Commands::Call { .. } => "call",
        Commands::RunScript { .. } => "run-script",
        Commands::Serve { .. } => "serve",
        Commands::Doctor { .. } => "doctor",
    }
}

fn wants_json(command: &Commands) -> bool {
    match command {
        Commands::Demo { json, .. }
        | Commands::Call { json, .. }
        | Commands::RunScript { json, .. }
        | Commands::Doctor { json } => *json,
        Commands::Serve { .. } => false,
    }
}

fn fail_startup(command: &str, json: bool, message: String) {
    let r = result_err(
        command,
        "engine",
        &new_run_id(),
        0,
        ErrorCode::EngineUnavailable,
        message,
    );
    output_result(&r, json);
}

async fn run<E: DssEngine>(
    engine: E,
    command: Commands,
    config: &AppConfig,
    locator: &ModelLocator,
) {
    let registry = CommandRegistry::new();

    match command {
        Commands::Doctor { json } => {
            let result = dss_adapter::doctor::run_doctor(engine, locator, &config.model_file);
            output_result(&result, json);
        }
        Commands::Demo { args, json } => {
            if let Some(session) = open_session(engine, config, locator, "demo", json) {
                cmd_demo(session, &args, json);
            }
        }
        Commands::Call {
            cmd,
            args,
            json,
            prepare,
        } => {
            if let Some(session) = open_session(engine, config, locator, "call", json) {
                cmd_call(session, &registry, &cmd, &args, json, prepare);
            }
        }
        Commands::RunScript { file, json } => {
            if let Some(session) = open_session(engine, config, locator, "run-script", json) {
                cmd_run_script(session, &registry, &file, json);
            }
        }
        Commands::Serve { socket } => {
            if let Some(session) = open_session(engine, config, locator, "serve", false) {
                serve::run_daemon(socket, session, registry).await;
            }
        }
    }
}

/// Open the session, or report the engine as unavailable.
fn open_session<E: DssEngine>(
    engine: E,
    config: &AppConfig,
    locator: &ModelLocator,
    command: &str,
    json: bool,
) -> Option<Session<E>> {
    match Session::open(engine, locator, &config.model_file) {
        Ok(s) => Some(s),
        Err(e) => {
            fail_startup(command, json, e.to_string());
            None
        }
    }
}

// ===========================================================================
// Subcommand implementations
// ===========================================================================

/// Shut the engine down before the process may exit in `output_result`.
fn close_session<E: DssEngine>(session: Session<E>) {
    if let Err(e) = session.close() {
        tracing::warn!(error = %e, "engine shutdown failed");
    }
}

fn cmd_demo<E: DssEngine>(mut session: Session<E>, args: &demo::DemoArgs, json: bool) {
    let outcome = demo::run_demo(&mut session, args);
    close_session(session);

    match outcome {
        Ok(report) if json => {
            let j = serde_json::to_string_pretty(&report).unwrap_or_default();
            println!("{}", j);
        }
        Ok(report) => demo::print_report(&report),
        Err(e) => {
            let e = CommandError::from(e);
            let r = result_err(
                "demo",
                "session",
                &new_run_id(),
                0,
                e.error_code(),
                e.to_string(),
            );
            output_result(&r, json);
        }
    }
}

fn cmd_call<E: DssEngine>(
    mut session: Session<E>,
    registry: &CommandRegistry<E>,
    cmd: &str,
    args_str: &str,
    json: bool,
    prepare: bool,
) {
    let args: serde_json::Value = match serde_json::from_str(args_str) {
        Ok(v) => v,
        Err(e) => {
            close_session(session);
            let r = result_err(
                "call",
                cmd,
                &new_run_id(),
                0,
                ErrorCode::InvalidInput,
                format!("invalid JSON args: {}", e),
            );
            output_result(&r, json);
            return;
        }
    };

    if prepare {
        for step in ["compile", "solve_snapshot"] {
            let r = registry.execute(step, serde_json::json!({}), &mut session);
            if r.status != Status::Pass {
                close_session(session);
                output_result(&r, json);
                return;
            }
        }
    }

    let result = registry.execute(cmd, args, &mut session);
    close_session(session);
    output_result(&result, json);
}

fn cmd_run_script<E: DssEngine>(
    mut session: Session<E>,
    registry: &CommandRegistry<E>,
    file: &Path,
    json: bool,
) {
    let loaded = std::fs::read_to_string(file)
        .map_err(|e| (ErrorCode::IoError, format!("cannot read script file: {}", e)))
        .and_then(|yaml| {
            dss_adapter::script::load_script(&yaml).map_err(|e| (ErrorCode::InvalidInput, e))
        });

    let script = match loaded {
        Ok(s) => s,
        Err((code, message)) => {
            close_session(session);
            let r = result_err(
                "run-script",
                &file.display().to_string(),
                &new_run_id(),
                0,
                code,
                message,
            );
            output_result(&r, json);
            return;
        }
    };

    let script_result = dss_adapter::script::run_script(&script, &mut session, registry);
    close_session(session);

    if json {
        let j = serde_json::to_string_pretty(&script_result).unwrap_or_default();
        println!("{}", j);
    } else {
        println!(
            "Script: {}",
            script_result.name.as_deref().unwrap_or("<unnamed>")
        );
        println!("Overall: {:?}", script_result.overall_status);
        for (i, sr) in script_result.step_results.iter().enumerate() {
            println!(
                "  Step {}: {} -> {:?} ({}ms)",
                i, sr.target, sr.status, sr.timing_ms.total
            );
            if let Some(ref err) = sr.error {
                println!("    {} – {}", err.code, err.message);
            }
        }
    }

    if script_result.overall_status != Status::Pass {
        std::process::exit(1);
    }
}

// ===========================================================================
// Output helpers
// ===========================================================================

fn output_result(result: &CommandResult, json: bool) {
    if json {
        let j = serde_json::to_string_pretty(result).unwrap_or_default();
        println!("{}", j);
    } else {
        print_human(result);
    }

    // Exit with non-zero status on error/fail
    match result.status {
        Status::Pass | Status::Skip => {}
        Status::Fail => std::process::exit(1),
        Status::Error => std::process::exit(2),
    }
}

fn print_human(r: &CommandResult) {
    let status_icon = match r.status {
        Status::Pass => "PASS",
        Status::Fail => "FAIL",
        Status::Skip => "SKIP",
        Status::Error => "ERROR",
    };

    println!("[{}] {} {}", status_icon, r.command, r.target);
    println!("  run_id: {}", r.run_id);
    println!("  timing: {}ms", r.timing_ms.total);

    for (step, ms) in &r.timing_ms.steps {
        println!("    {}: {}ms", step, ms);
    }

    if let Some(ref err) = r.error {
        println!("  error:  {} – {}", err.code, err.message);
    }

    if let Some(ref data) = r.data {
        if let Ok(s) = serde_json::to_string_pretty(data) {
            for line in s.lines() {
                println!("  {}", line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "dssctl", "call", "bus", "--args", r#"{"name":"C"}"#, "--prepare", "--backend",
            "bridge", "--model", "feeder.dss",
        ])
        .unwrap();
        assert_eq!(cli.backend, Some(Backend::Bridge));
        assert_eq!(cli.model.as_deref(), Some("feeder.dss"));
        match cli.command {
            Commands::Call { cmd, prepare, .. } => {
                assert_eq!(cmd, "bus");
                assert!(prepare);
            }
            _ => panic!("expected call"),
        }
    }

    #[test]
    fn test_demo_defaults() {
        let cli = Cli::try_parse_from(["dssctl", "demo"]).unwrap();
        match cli.command {
            Commands::Demo { args, json } => {
                assert!(!json);
                assert_eq!(args.load_mult, 1.0);
                assert_eq!(args.bus, "C");
                assert_eq!(args.element, "Line.Linha1");
                assert_eq!(args.new_length, 0.4);
            }
            _ => panic!("expected demo"),
        }
    }

    #[test]
    fn test_absolute_fixture_path_kept() {
        let abs = std::env::temp_dir().join("circuit.yaml");
        assert_eq!(resolve_fixture_path(&abs), abs);
    }

    #[test]
    fn test_shipped_fixture_resolves_from_crate_dir() {
        let path = resolve_fixture_path(Path::new("fixtures/index.yaml"));
        assert!(path.is_file(), "missing {}", path.display());
    }
}
