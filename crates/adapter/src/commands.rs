//! Command registry and built-in session commands.
//!
//! Commands are registered by name and invoked with JSON input/output against
//! one [`Session`]. Commands that read a bus, element, line or transformer
//! take the target by name and go through the session's scoped cursors, so a
//! command never reads whatever an earlier command happened to leave active.

use crate::session::Session;
use crate::traits::{DssEngine, EngineError};
use crate::types::*;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Instant;

/// Signature for all registry commands.
pub type CommandHandler<E> = fn(Value, &mut Session<E>) -> Result<Value, CommandError>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl CommandError {
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CommandError::InvalidInput(_) => ErrorCode::InvalidInput,
            CommandError::Engine(e) => match e {
                EngineError::Unavailable(_) => ErrorCode::EngineUnavailable,
                EngineError::CommandFailed { .. } => ErrorCode::EngineCommandFailed,
                EngineError::InvalidRequest(_) => ErrorCode::InvalidRequest,
                EngineError::Io(_) => ErrorCode::IoError,
                EngineError::Protocol(_) => ErrorCode::ProtocolError,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

pub struct CommandRegistry<E> {
    handlers: HashMap<String, CommandHandler<E>>,
}

impl<E: DssEngine> CommandRegistry<E> {
    pub fn new() -> Self {
        let mut reg = Self {
            handlers: HashMap::new(),
        };
        reg.register("version", cmd_version::<E>);
        reg.register("compile", cmd_compile::<E>);
        reg.register("solve_snapshot", cmd_solve_snapshot::<E>);
        reg.register("show_powers", cmd_show_powers::<E>);
        reg.register("circuit", cmd_circuit::<E>);
        reg.register("bus", cmd_bus::<E>);
        reg.register("element", cmd_element::<E>);
        reg.register("line", cmd_line::<E>);
        reg.register("set_line_length", cmd_set_line_length::<E>);
        reg.register("transformer", cmd_transformer::<E>);
        reg.register("lines", cmd_lines::<E>);
        reg
    }

    pub fn register(&mut self, name: &str, handler: CommandHandler<E>) {
        self.handlers.insert(name.to_string(), handler);
    }

    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }

    /// Execute a command by name and return a full CommandResult.
    pub fn execute(&self, name: &str, args: Value, session: &mut Session<E>) -> CommandResult {
        let run_id = new_run_id();
        let start = Instant::now();

        let handler = match self.handlers.get(name) {
            Some(h) => h,
            None => {
                return result_err(
                    "call",
                    name,
                    &run_id,
                    start.elapsed().as_millis() as u64,
                    ErrorCode::InvalidInput,
                    format!("unknown command: {}", name),
                );
            }
        };

        match handler(args, session) {
            Ok(data) => {
                let mut r = result_ok("call", name, &run_id, start.elapsed().as_millis() as u64);
                r.data = Some(data);
                r
            }
            Err(e) => {
                tracing::debug!(command = name, error = %e, "command failed");
                result_err(
                    "call",
                    name,
                    &run_id,
                    start.elapsed().as_millis() as u64,
                    e.error_code(),
                    e.to_string(),
                )
            }
        }
    }
}

impl<E: DssEngine> Default for CommandRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Argument helpers
// ---------------------------------------------------------------------------

fn str_arg<'a>(args: &'a Value, key: &str) -> Result<&'a str, CommandError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| CommandError::InvalidInput(format!("missing '{}' string field", key)))
}

fn f64_arg(args: &Value, key: &str) -> Result<f64, CommandError> {
    args.get(key)
        .and_then(|v| v.as_f64())
        .ok_or_else(|| CommandError::InvalidInput(format!("missing '{}' number field", key)))
}

fn to_json<T: serde::Serialize>(value: T) -> Result<Value, CommandError> {
    serde_json::to_value(value)
        .map_err(|e| CommandError::InvalidInput(format!("cannot encode result: {}", e)))
}

// ===========================================================================
// Built-in commands
// ===========================================================================

/// `version` – returns `{ "version": "..." }`.
fn cmd_version<E: DssEngine>(_args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    Ok(json!({ "version": s.engine_version()? }))
}

/// `compile` – clear the session and compile its model.
fn cmd_compile<E: DssEngine>(_args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    s.compile()?;
    Ok(json!({ "model": s.model_path().display().to_string() }))
}

/// `solve_snapshot` – Args: `{ "load_mult": 1.0 }` (defaults to 1.0).
fn cmd_solve_snapshot<E: DssEngine>(
    args: Value,
    s: &mut Session<E>,
) -> Result<Value, CommandError> {
    let load_mult = match args.get("load_mult") {
        None | Some(Value::Null) => 1.0,
        Some(_) => f64_arg(&args, "load_mult")?,
    };
    s.solve_snapshot(load_mult)?;
    Ok(json!({ "load_mult": load_mult }))
}

fn cmd_show_powers<E: DssEngine>(_args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    Ok(json!({ "report": s.show_powers()? }))
}

/// `circuit` – name and total power (delivered into the circuit is positive).
fn cmd_circuit<E: DssEngine>(_args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    let name = s.circuit_name()?;
    let power = s.circuit_total_power()?;
    Ok(json!({ "name": name, "total_power": to_json(power)? }))
}

/// `bus` – Args: `{ "name": "C" }`.
fn cmd_bus<E: DssEngine>(args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    let mut bus = s.bus(str_arg(&args, "name")?)?;
    Ok(json!({
        "name": bus.name(),
        "distance": bus.distance()?,
        "kv_base": bus.base_kv()?,
        "voltages": to_json(bus.voltage_mag_angle()?)?,
    }))
}

/// `element` – Args: `{ "name": "Line.Linha1" }`.
fn cmd_element<E: DssEngine>(args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    let mut el = s.element(str_arg(&args, "name")?)?;
    let name = el.name().to_string();
    let buses = el.buses()?;
    let voltages = el.voltage_mag_angle()?;
    let powers = el.powers()?;
    Ok(json!({
        "name": name,
        "buses": to_json(buses)?,
        "voltages": to_json(voltages)?,
        "powers": to_json(powers)?,
    }))
}

/// `line` – Args: `{ "name": "linha1" }`.
fn cmd_line<E: DssEngine>(args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    let mut line = s.line(str_arg(&args, "name")?)?;
    Ok(json!({ "name": line.name(), "length": line.length()? }))
}

/// `set_line_length` – Args: `{ "name": "linha1", "length": 0.4 }`.
fn cmd_set_line_length<E: DssEngine>(
    args: Value,
    s: &mut Session<E>,
) -> Result<Value, CommandError> {
    let length = f64_arg(&args, "length")?;
    let mut line = s.line(str_arg(&args, "name")?)?;
    line.set_length(length)?;
    Ok(json!({ "name": line.name(), "length": line.length()? }))
}

/// `transformer` – Args: `{ "name": "trafo", "windings": [1, 2] }`.
///
/// `windings` defaults to `[1, 2]`.
fn cmd_transformer<E: DssEngine>(args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    let windings: Vec<u32> = match args.get("windings") {
        None | Some(Value::Null) => vec![1, 2],
        Some(v) => serde_json::from_value(v.clone()).map_err(|_| {
            CommandError::InvalidInput("'windings' must be a list of winding numbers".into())
        })?,
    };
    let mut xf = s.transformer(str_arg(&args, "name")?)?;
    let mut kv = Vec::with_capacity(windings.len());
    for w in &windings {
        kv.push(json!({ "winding": w, "kv": xf.terminal_voltage(*w)? }));
    }
    Ok(json!({ "name": xf.name(), "windings": kv }))
}

/// `lines` – every line name and length in iteration order.
fn cmd_lines<E: DssEngine>(_args: Value, s: &mut Session<E>) -> Result<Value, CommandError> {
    to_json(s.enumerate_lines()?)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::FixtureEngine;
    use crate::session::tests::open_session;

    fn compiled() -> (CommandRegistry<FixtureEngine>, Session<FixtureEngine>) {
        let reg = CommandRegistry::new();
        let mut s = open_session();
        let r = reg.execute("compile", json!({}), &mut s);
        assert_eq!(r.status, Status::Pass);
        (reg, s)
    }

    #[test]
    fn test_unknown_command() {
        let (reg, mut s) = compiled();
        let result = reg.execute("nonexistent", json!({}), &mut s);
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_circuit_command_negates_power() {
        let (reg, mut s) = compiled();
        let r = reg.execute("circuit", json!({}), &mut s);
        assert_eq!(r.status, Status::Pass);
        let data = r.data.unwrap();
        assert_eq!(data["name"], "exemplo");
        assert_eq!(data["total_power"]["p_kw"], -100.0);
        assert_eq!(data["total_power"]["q_kvar"], -50.0);
    }

    #[test]
    fn test_bus_command_reads_requested_bus() {
        let (reg, mut s) = compiled();
        reg.execute("bus", json!({ "name": "A" }), &mut s);
        let r = reg.execute("bus", json!({ "name": "C" }), &mut s);
        let data = r.data.unwrap();
        assert_eq!(data["name"], "C");
        assert_eq!(data["kv_base"], 0.127);
    }

    #[test]
    fn test_missing_argument() {
        let (reg, mut s) = compiled();
        let r = reg.execute("bus", json!({}), &mut s);
        assert_eq!(r.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_engine_failure_maps_to_error_code() {
        let (reg, mut s) = compiled();
        let r = reg.execute("bus", json!({ "name": "Z" }), &mut s);
        assert_eq!(r.status, Status::Error);
        assert_eq!(r.error.unwrap().code, ErrorCode::EngineCommandFailed);
    }

    #[test]
    fn test_set_line_length_then_lines() {
        let (reg, mut s) = compiled();
        let r = reg.execute(
            "set_line_length",
            json!({ "name": "linha3", "length": 0.4 }),
            &mut s,
        );
        assert_eq!(r.data.unwrap()["length"], 0.4);

        let lines = reg.execute("lines", json!({}), &mut s).data.unwrap();
        assert_eq!(lines["names"].as_array().unwrap().len(), 3);
        assert_eq!(lines["lengths"][2], 0.4);
    }

    #[test]
    fn test_transformer_default_windings() {
        let (reg, mut s) = compiled();
        let data = reg
            .execute("transformer", json!({ "name": "trafo" }), &mut s)
            .data
            .unwrap();
        assert_eq!(data["windings"][0]["kv"], 13.8);
        assert_eq!(data["windings"][1]["kv"], 0.22);
    }

    #[test]
    fn test_solve_snapshot_default_mult() {
        let (reg, mut s) = compiled();
        let r = reg.execute("solve_snapshot", json!({}), &mut s);
        assert_eq!(r.data.unwrap()["load_mult"], 1.0);
        assert_eq!(s.engine().solve_count(), 1);
    }

    #[test]
    fn test_list_commands() {
        let reg: CommandRegistry<FixtureEngine> = CommandRegistry::new();
        let names = reg.list();
        assert!(names.contains(&"compile"));
        assert!(names.contains(&"lines"));
        assert!(names.contains(&"transformer"));
    }
}
