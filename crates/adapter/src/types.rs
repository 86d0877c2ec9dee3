use crate::traits::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Circuit values returned by the session
// ---------------------------------------------------------------------------

/// Active and reactive power, in kW and kvar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerPair {
    pub p_kw: f64,
    pub q_kvar: f64,
}

impl PowerPair {
    pub fn new(p_kw: f64, q_kvar: f64) -> Self {
        Self { p_kw, q_kvar }
    }

    /// Pair up a flattened `[p0, q0, p1, q1, ...]` array.
    pub fn from_flat(values: &[f64]) -> EngineResult<Vec<Self>> {
        flat_pairs(values, "power").map(|it| it.map(|(p, q)| Self::new(p, q)).collect())
    }
}

/// A phasor as magnitude and angle in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagAngle {
    pub magnitude: f64,
    pub angle_deg: f64,
}

impl MagAngle {
    pub fn new(magnitude: f64, angle_deg: f64) -> Self {
        Self {
            magnitude,
            angle_deg,
        }
    }

    /// Pair up a flattened `[mag0, ang0, mag1, ang1, ...]` array.
    pub fn from_flat(values: &[f64]) -> EngineResult<Vec<Self>> {
        flat_pairs(values, "voltage").map(|it| it.map(|(m, a)| Self::new(m, a)).collect())
    }
}

/// Odd-length arrays are a malformed engine reply, not something to trim.
fn flat_pairs<'a>(
    values: &'a [f64],
    what: &str,
) -> EngineResult<impl Iterator<Item = (f64, f64)> + 'a> {
    if values.len() % 2 != 0 {
        return Err(EngineError::Protocol(format!(
            "{} array has odd length {}",
            what,
            values.len()
        )));
    }
    Ok(values.chunks_exact(2).map(|c| (c[0], c[1])))
}

/// The two buses a two-terminal element connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusPair {
    pub bus1: String,
    pub bus2: String,
}

/// Every line in the circuit, in the engine's iteration order.
///
/// `names[i]` and `lengths[i]` describe the same line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineTable {
    pub names: Vec<String>,
    pub lengths: Vec<f64>,
}

impl LineTable {
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn push(&mut self, name: String, length: f64) {
        self.names.push(name);
        self.lengths.push(length);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.lengths.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Solve settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolveMode {
    Snapshot,
}

impl fmt::Display for SolveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolveMode::Snapshot => f.write_str("snapshot"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    Static,
}

impl fmt::Display for ControlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMode::Static => f.write_str("static"),
        }
    }
}

// ---------------------------------------------------------------------------
// Final result JSON – the stable output contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub run_id: String,
    pub command: String,
    pub target: String,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    pub timing_ms: TimingInfo,
    /// Command-specific payload returned on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pass,
    Fail,
    Skip,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidInput,
    EngineUnavailable,
    EngineCommandFailed,
    InvalidRequest,
    IoError,
    ProtocolError,
    InternalError,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = serde_json::to_value(self)
            .ok()
            .and_then(|v| v.as_str().map(String::from))
            .unwrap_or_else(|| format!("{:?}", self));
        f.write_str(&s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimingInfo {
    pub total: u64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub steps: HashMap<String, u64>,
}

// ---------------------------------------------------------------------------
// Doctor report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorReport {
    pub models_dir: String,
    pub models_dir_exists: bool,
    pub model_path: String,
    pub model_exists: bool,
    pub engine_started: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_error: Option<String>,
}

// ---------------------------------------------------------------------------
// Script types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Script {
    #[serde(default)]
    pub name: Option<String>,
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptStep {
    pub call: String,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default = "default_expect_status")]
    pub expect_status: Status,
}

fn default_expect_status() -> Status {
    Status::Pass
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptResult {
    pub name: Option<String>,
    pub overall_status: Status,
    pub step_results: Vec<CommandResult>,
}

// ---------------------------------------------------------------------------
// Serve / daemon protocol
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CommandResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Generate a new run ID (UUIDv4).
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Build a successful CommandResult shell (caller fills in data).
pub fn result_ok(command: &str, target: &str, run_id: &str, total_ms: u64) -> CommandResult {
    CommandResult {
        run_id: run_id.to_string(),
        command: command.to_string(),
        target: target.to_string(),
        status: Status::Pass,
        error: None,
        timing_ms: TimingInfo {
            total: total_ms,
            steps: HashMap::new(),
        },
        data: None,
    }
}

/// Build an error CommandResult.
pub fn result_err(
    command: &str,
    target: &str,
    run_id: &str,
    total_ms: u64,
    code: ErrorCode,
    message: impl Into<String>,
) -> CommandResult {
    CommandResult {
        run_id: run_id.to_string(),
        command: command.to_string(),
        target: target.to_string(),
        status: Status::Error,
        error: Some(ErrorInfo {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
        }),
        timing_ms: TimingInfo {
            total: total_ms,
            steps: HashMap::new(),
        },
        data: None,
    }
}
