//! Engine backend that talks to an external bridge process.
//!
//! The real engine is only reachable through its host automation layer (a COM
//! server on Windows, for instance), so the adapter does not link it. Instead
//! a small bridge program owns the engine object and answers requests on
//! stdin/stdout, one JSON object per line:
//!
//! ```text
//! -> {"id":1,"method":"circuit.total_power","params":{}}
//! <- {"id":1,"result":[-120.4,-38.9]}
//! -> {"id":2,"method":"circuit.set_active_bus","params":{"name":"C"}}
//! <- {"id":2,"error":"bus not found: C"}
//! ```
//!
//! Method names follow the engine's property groups: `engine.*`, `text.*`,
//! `circuit.*`, `solution.*`, `bus.*`, `element.*`, `lines.*`,
//! `transformers.*`. Every reply carries the `id` of the request it answers.
//! A reply that cannot be read, or answers some other request, means the
//! stream is out of step: the bridge is killed and later calls fail with
//! [`EngineError::Unavailable`].

use crate::traits::*;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

#[derive(Serialize)]
struct BridgeRequest<'a> {
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct BridgeReply {
    id: u64,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

struct BridgeProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

pub struct BridgeEngine {
    program: String,
    args: Vec<String>,
    process: Option<BridgeProcess>,
    next_id: u64,
}

impl BridgeEngine {
    /// `command` is the bridge program followed by its arguments. The process
    /// is spawned by `start`.
    pub fn new(command: &[String]) -> EngineResult<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| EngineError::InvalidRequest("empty bridge command".into()))?;
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
            process: None,
            next_id: 1,
        })
    }

    pub fn is_running(&self) -> bool {
        self.process.is_some()
    }

    fn spawn(&mut self) -> EngineResult<()> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| {
                EngineError::Unavailable(format!("cannot spawn bridge {}: {}", self.program, e))
            })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EngineError::Protocol("bridge stdin not captured".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::Protocol("bridge stdout not captured".into()))?;
        tracing::debug!(program = %self.program, pid = child.id(), "bridge spawned");
        self.process = Some(BridgeProcess {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        });
        Ok(())
    }

    fn call(&mut self, method: &str, params: Value) -> EngineResult<Value> {
        let res = self.exchange(method, params);
        if let Err(e @ (EngineError::Protocol(_) | EngineError::Io(_))) = &res {
            tracing::warn!(%method, error = %e, "bridge stream out of step, stopping bridge");
            self.kill();
        }
        res
    }

    fn kill(&mut self) {
        if let Some(mut proc) = self.process.take() {
            let _ = proc.child.kill();
            let _ = proc.child.wait();
        }
    }

    fn exchange(&mut self, method: &str, params: Value) -> EngineResult<Value> {
        let id = self.next_id;
        self.next_id += 1;
        let proc = self
            .process
            .as_mut()
            .ok_or_else(|| EngineError::Unavailable("bridge not started".into()))?;

        let mut line = serde_json::to_string(&BridgeRequest { id, method, params })
            .map_err(|e| EngineError::Protocol(format!("cannot encode request: {}", e)))?;
        line.push('\n');
        tracing::trace!(%method, id, "bridge request");
        proc.stdin.write_all(line.as_bytes())?;
        proc.stdin.flush()?;

        let mut reply = String::new();
        if proc.stdout.read_line(&mut reply)? == 0 {
            return Err(EngineError::Protocol(format!(
                "bridge closed its output while answering {}",
                method
            )));
        }
        let reply: BridgeReply = serde_json::from_str(reply.trim_end())
            .map_err(|e| EngineError::Protocol(format!("malformed reply to {}: {}", method, e)))?;
        if reply.id != id {
            return Err(EngineError::Protocol(format!(
                "reply id {} does not match request id {}",
                reply.id, id
            )));
        }
        match reply.error {
            Some(message) => Err(EngineError::CommandFailed { message }),
            None => Ok(reply.result.unwrap_or(Value::Null)),
        }
    }

    fn call_as<T: DeserializeOwned>(&mut self, method: &str, params: Value) -> EngineResult<T> {
        let value = self.call(method, params)?;
        serde_json::from_value(value)
            .map_err(|e| EngineError::Protocol(format!("unexpected result for {}: {}", method, e)))
    }

    fn call_unit(&mut self, method: &str, params: Value) -> EngineResult<()> {
        self.call(method, params).map(|_| ())
    }
}

impl Drop for BridgeEngine {
    fn drop(&mut self) {
        self.kill();
    }
}

impl EngineControl for BridgeEngine {
    fn start(&mut self) -> EngineResult<bool> {
        if self.process.is_none() {
            self.spawn()?;
        }
        self.call_as("engine.start", json!({}))
    }

    fn version(&mut self) -> EngineResult<String> {
        self.call_as("engine.version", json!({}))
    }

    fn clear_all(&mut self) -> EngineResult<()> {
        self.call_unit("engine.clear_all", json!({}))
    }

    fn command(&mut self, text: &str) -> EngineResult<String> {
        match self.call("text.command", json!({ "command": text }))? {
            Value::String(reply) => Ok(reply),
            Value::Null => Ok(String::new()),
            other => Err(EngineError::Protocol(format!(
                "text.command reply is not a string: {}",
                other
            ))),
        }
    }

    fn shutdown(&mut self) -> EngineResult<()> {
        if self.process.is_none() {
            return Ok(());
        }
        let res = self.call_unit("engine.shutdown", json!({}));
        if let Some(proc) = self.process.take() {
            let BridgeProcess {
                mut child, stdin, ..
            } = proc;
            drop(stdin);
            let status = child.wait()?;
            tracing::debug!(%status, "bridge exited");
        }
        res
    }
}

/// JSON has no NaN or infinity, so such values could not reach the engine intact.
fn finite(what: &str, value: f64) -> EngineResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::InvalidRequest(format!(
            "{} must be finite, got {}",
            what, value
        )))
    }
}

impl CircuitOps for BridgeEngine {
    fn circuit_name(&mut self) -> EngineResult<String> {
        self.call_as("circuit.name", json!({}))
    }

    fn circuit_total_power(&mut self) -> EngineResult<(f64, f64)> {
        let raw: Vec<f64> = self.call_as("circuit.total_power", json!({}))?;
        match raw.as_slice() {
            [p, q, ..] => Ok((*p, *q)),
            _ => Err(EngineError::Protocol(format!(
                "total power needs two values, got {}",
                raw.len()
            ))),
        }
    }

    fn set_active_bus(&mut self, name: &str) -> EngineResult<()> {
        self.call_unit("circuit.set_active_bus", json!({ "name": name }))
    }

    fn set_active_element(&mut self, full_name: &str) -> EngineResult<()> {
        self.call_unit("circuit.set_active_element", json!({ "name": full_name }))
    }
}

impl SolutionOps for BridgeEngine {
    fn set_load_mult(&mut self, mult: f64) -> EngineResult<()> {
        let mult = finite("load multiplier", mult)?;
        self.call_unit("solution.set_load_mult", json!({ "value": mult }))
    }

    fn solve(&mut self) -> EngineResult<()> {
        self.call_unit("solution.solve", json!({}))
    }
}

impl BusOps for BridgeEngine {
    fn bus_name(&mut self) -> EngineResult<String> {
        self.call_as("bus.name", json!({}))
    }

    fn bus_distance(&mut self) -> EngineResult<f64> {
        self.call_as("bus.distance", json!({}))
    }

    fn bus_kv_base(&mut self) -> EngineResult<f64> {
        self.call_as("bus.kv_base", json!({}))
    }

    fn bus_vmag_angle(&mut self) -> EngineResult<Vec<f64>> {
        self.call_as("bus.vmag_angle", json!({}))
    }
}

impl ElementOps for BridgeEngine {
    fn element_name(&mut self) -> EngineResult<String> {
        self.call_as("element.name", json!({}))
    }

    fn element_bus_names(&mut self) -> EngineResult<Vec<String>> {
        self.call_as("element.bus_names", json!({}))
    }

    fn element_voltages_mag_ang(&mut self) -> EngineResult<Vec<f64>> {
        self.call_as("element.voltages_mag_ang", json!({}))
    }

    fn element_powers(&mut self) -> EngineResult<Vec<f64>> {
        self.call_as("element.powers", json!({}))
    }
}

impl LineOps for BridgeEngine {
    fn set_line_name(&mut self, name: &str) -> EngineResult<()> {
        self.call_unit("lines.set_name", json!({ "name": name }))
    }

    fn line_name(&mut self) -> EngineResult<String> {
        self.call_as("lines.name", json!({}))
    }

    fn line_length(&mut self) -> EngineResult<f64> {
        self.call_as("lines.length", json!({}))
    }

    fn set_line_length(&mut self, length: f64) -> EngineResult<()> {
        let length = finite("line length", length)?;
        self.call_unit("lines.set_length", json!({ "value": length }))
    }

    fn lines_first(&mut self) -> EngineResult<i32> {
        self.call_as("lines.first", json!({}))
    }

    fn lines_next(&mut self) -> EngineResult<i32> {
        self.call_as("lines.next", json!({}))
    }

    fn lines_count(&mut self) -> EngineResult<usize> {
        self.call_as("lines.count", json!({}))
    }
}

impl TransformerOps for BridgeEngine {
    fn set_transformer_name(&mut self, name: &str) -> EngineResult<()> {
        self.call_unit("transformers.set_name", json!({ "name": name }))
    }

    fn transformer_name(&mut self) -> EngineResult<String> {
        self.call_as("transformers.name", json!({}))
    }

    fn set_transformer_winding(&mut self, winding: u32) -> EngineResult<()> {
        self.call_unit("transformers.set_wdg", json!({ "value": winding }))
    }

    fn transformer_kv(&mut self) -> EngineResult<f64> {
        self.call_as("transformers.kv", json!({}))
    }
}
