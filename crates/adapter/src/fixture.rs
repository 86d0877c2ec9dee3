//! In-memory engine serving pre-solved circuits from YAML fixtures.
//!
//! [`FixtureEngine`] behaves like the real engine's automation surface as far
//! as cursor handling goes, but fails where the real engine
//! would hand back stale data: reading a cursor family that was never
//! activated fails with `no active <family>`, and any query before a compile
//! fails with `no active circuit`.
//!
//! Fixtures are keyed by model path, so `compile` only succeeds for paths
//! registered with [`FixtureEngine::with_model`].

use crate::traits::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Fixture description
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitFixture {
    pub name: String,
    /// Raw engine total power (kW, kvar), before any sign convention.
    #[serde(default)]
    pub total_power: (f64, f64),
    #[serde(default)]
    pub buses: Vec<BusFixture>,
    #[serde(default)]
    pub elements: Vec<ElementFixture>,
    #[serde(default)]
    pub lines: Vec<LineFixture>,
    #[serde(default)]
    pub transformers: Vec<TransformerFixture>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusFixture {
    pub name: String,
    #[serde(default)]
    pub distance: f64,
    pub kv_base: f64,
    #[serde(default)]
    pub vmag_angle: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementFixture {
    /// Full `Type.Name` identifier.
    pub name: String,
    #[serde(default)]
    pub buses: Vec<String>,
    #[serde(default)]
    pub voltages_mag_ang: Vec<f64>,
    #[serde(default)]
    pub powers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineFixture {
    pub name: String,
    pub length: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformerFixture {
    pub name: String,
    /// Rated kV per winding, winding 1 first.
    pub windings_kv: Vec<f64>,
}

impl CircuitFixture {
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("failed to parse circuit fixture: {}", e))
    }

    pub fn load(path: &Path) -> Result<Self, String> {
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| format!("cannot read fixture {}: {}", path.display(), e))?;
        Self::from_yaml(&yaml)
    }
}

fn find_by_name<T>(items: &[T], name: &str, key: impl Fn(&T) -> &str) -> Option<usize> {
    items.iter().position(|it| key(it).eq_ignore_ascii_case(name))
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct FixtureEngine {
    models: HashMap<PathBuf, CircuitFixture>,
    startable: bool,
    version: String,
    started: bool,
    circuit: Option<CircuitFixture>,
    bus: Option<usize>,
    element: Option<usize>,
    line: Option<usize>,
    transformer: Option<usize>,
    winding: u32,
    load_mult: f64,
    solve_mode: Option<String>,
    control_mode: Option<String>,
    solve_count: usize,
    clear_count: usize,
    commands: Vec<String>,
}

impl FixtureEngine {
    pub fn new() -> Self {
        Self {
            models: HashMap::new(),
            startable: true,
            version: format!("FixtureEngine {}", env!("CARGO_PKG_VERSION")),
            started: false,
            circuit: None,
            bus: None,
            element: None,
            line: None,
            transformer: None,
            winding: 1,
            load_mult: 1.0,
            solve_mode: None,
            control_mode: None,
            solve_count: 0,
            clear_count: 0,
            commands: Vec::new(),
        }
    }

    /// An engine whose `start` reports failure.
    pub fn unavailable() -> Self {
        Self {
            startable: false,
            ..Self::new()
        }
    }

    /// Serve `fixture` whenever `path` is compiled.
    pub fn with_model(mut self, path: impl Into<PathBuf>, fixture: CircuitFixture) -> Self {
        self.models.insert(path.into(), fixture);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Every free-text command received, in order.
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    pub fn load_mult(&self) -> f64 {
        self.load_mult
    }

    pub fn solve_count(&self) -> usize {
        self.solve_count
    }

    pub fn clear_count(&self) -> usize {
        self.clear_count
    }

    pub fn solve_mode(&self) -> Option<&str> {
        self.solve_mode.as_deref()
    }

    pub fn control_mode(&self) -> Option<&str> {
        self.control_mode.as_deref()
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    fn reset_cursors(&mut self) {
        self.bus = None;
        self.element = None;
        self.line = None;
        self.transformer = None;
        self.winding = 1;
    }

    fn circuit(&self) -> EngineResult<&CircuitFixture> {
        self.circuit
            .as_ref()
            .ok_or_else(|| EngineError::command_failed("no active circuit"))
    }

    fn circuit_mut(&mut self) -> EngineResult<&mut CircuitFixture> {
        self.circuit
            .as_mut()
            .ok_or_else(|| EngineError::command_failed("no active circuit"))
    }

    fn active_bus(&self) -> EngineResult<&BusFixture> {
        let idx = self
            .bus
            .ok_or_else(|| EngineError::command_failed("no active bus"))?;
        Ok(&self.circuit()?.buses[idx])
    }

    fn active_element(&self) -> EngineResult<&ElementFixture> {
        let idx = self
            .element
            .ok_or_else(|| EngineError::command_failed("no active element"))?;
        Ok(&self.circuit()?.elements[idx])
    }

    fn active_line_index(&self) -> EngineResult<usize> {
        self.line
            .ok_or_else(|| EngineError::command_failed("no active line"))
    }

    fn active_transformer(&self) -> EngineResult<&TransformerFixture> {
        let idx = self
            .transformer
            .ok_or_else(|| EngineError::command_failed("no active transformer"))?;
        Ok(&self.circuit()?.transformers[idx])
    }

    fn compile(&mut self, arg: &str) -> EngineResult<String> {
        let path = PathBuf::from(arg.trim().trim_matches('"'));
        let fixture = self.models.get(&path).cloned().ok_or_else(|| {
            EngineError::command_failed(format!("cannot open model file {}", path.display()))
        })?;
        self.circuit = Some(fixture);
        self.reset_cursors();
        Ok(String::new())
    }

    fn set(&mut self, arg: &str) -> EngineResult<String> {
        let (key, value) = arg
            .split_once('=')
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_ascii_lowercase()))
            .ok_or_else(|| EngineError::command_failed(format!("malformed set: {}", arg)))?;
        match key.as_str() {
            "mode" => self.solve_mode = Some(value),
            "controlmode" => self.control_mode = Some(value),
            other => {
                return Err(EngineError::command_failed(format!(
                    "unknown option: {}",
                    other
                )))
            }
        }
        Ok(String::new())
    }
}

impl Default for FixtureEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineControl for FixtureEngine {
    fn start(&mut self) -> EngineResult<bool> {
        self.started = self.startable;
        Ok(self.started)
    }

    fn version(&mut self) -> EngineResult<String> {
        Ok(self.version.clone())
    }

    fn clear_all(&mut self) -> EngineResult<()> {
        self.clear_count += 1;
        self.circuit = None;
        self.reset_cursors();
        Ok(())
    }

    fn command(&mut self, text: &str) -> EngineResult<String> {
        self.commands.push(text.to_string());
        let text = text.trim();
        let (verb, rest) = text.split_once(' ').unwrap_or((text, ""));
        match verb.to_ascii_lowercase().as_str() {
            "compile" => self.compile(rest),
            "set" => self.set(rest),
            "show" => self.circuit().map(|_| String::new()),
            _ => Err(EngineError::command_failed(format!(
                "unknown command: {}",
                verb
            ))),
        }
    }

    fn shutdown(&mut self) -> EngineResult<()> {
        self.started = false;
        Ok(())
    }
}

impl CircuitOps for FixtureEngine {
    fn circuit_name(&mut self) -> EngineResult<String> {
        Ok(self.circuit()?.name.clone())
    }

    fn circuit_total_power(&mut self) -> EngineResult<(f64, f64)> {
        Ok(self.circuit()?.total_power)
    }

    fn set_active_bus(&mut self, name: &str) -> EngineResult<()> {
        let idx = find_by_name(&self.circuit()?.buses, name, |b| b.name.as_str())
            .ok_or_else(|| EngineError::command_failed(format!("bus not found: {}", name)))?;
        self.bus = Some(idx);
        Ok(())
    }

    fn set_active_element(&mut self, full_name: &str) -> EngineResult<()> {
        let idx = find_by_name(&self.circuit()?.elements, full_name, |e| e.name.as_str())
            .ok_or_else(|| EngineError::command_failed(format!("element not found: {}", full_name)))?;
        self.element = Some(idx);
        Ok(())
    }
}

impl SolutionOps for FixtureEngine {
    fn set_load_mult(&mut self, mult: f64) -> EngineResult<()> {
        self.circuit()?;
        self.load_mult = mult;
        Ok(())
    }

    fn solve(&mut self) -> EngineResult<()> {
        self.circuit()?;
        self.solve_count += 1;
        Ok(())
    }
}

impl BusOps for FixtureEngine {
    fn bus_name(&mut self) -> EngineResult<String> {
        Ok(self.active_bus()?.name.clone())
    }

    fn bus_distance(&mut self) -> EngineResult<f64> {
        Ok(self.active_bus()?.distance)
    }

    fn bus_kv_base(&mut self) -> EngineResult<f64> {
        Ok(self.active_bus()?.kv_base)
    }

    fn bus_vmag_angle(&mut self) -> EngineResult<Vec<f64>> {
        Ok(self.active_bus()?.vmag_angle.clone())
    }
}

impl ElementOps for FixtureEngine {
    fn element_name(&mut self) -> EngineResult<String> {
        Ok(self.active_element()?.name.clone())
    }

    fn element_bus_names(&mut self) -> EngineResult<Vec<String>> {
        Ok(self.active_element()?.buses.clone())
    }

    fn element_voltages_mag_ang(&mut self) -> EngineResult<Vec<f64>> {
        Ok(self.active_element()?.voltages_mag_ang.clone())
    }

    fn element_powers(&mut self) -> EngineResult<Vec<f64>> {
        Ok(self.active_element()?.powers.clone())
    }
}

impl LineOps for FixtureEngine {
    fn set_line_name(&mut self, name: &str) -> EngineResult<()> {
        let idx = find_by_name(&self.circuit()?.lines, name, |l| l.name.as_str())
            .ok_or_else(|| EngineError::command_failed(format!("line not found: {}", name)))?;
        self.line = Some(idx);
        Ok(())
    }

    fn line_name(&mut self) -> EngineResult<String> {
        let idx = self.active_line_index()?;
        Ok(self.circuit()?.lines[idx].name.clone())
    }

    fn line_length(&mut self) -> EngineResult<f64> {
        let idx = self.active_line_index()?;
        Ok(self.circuit()?.lines[idx].length)
    }

    fn set_line_length(&mut self, length: f64) -> EngineResult<()> {
        let idx = self.active_line_index()?;
        self.circuit_mut()?.lines[idx].length = length;
        Ok(())
    }

    fn lines_first(&mut self) -> EngineResult<i32> {
        if self.circuit()?.lines.is_empty() {
            self.line = None;
            return Ok(0);
        }
        self.line = Some(0);
        Ok(1)
    }

    fn lines_next(&mut self) -> EngineResult<i32> {
        let count = self.circuit()?.lines.len();
        match self.line {
            Some(idx) if idx + 1 < count => {
                self.line = Some(idx + 1);
                Ok(idx as i32 + 2)
            }
            _ => Ok(0),
        }
    }

    fn lines_count(&mut self) -> EngineResult<usize> {
        Ok(self.circuit()?.lines.len())
    }
}

impl TransformerOps for FixtureEngine {
    fn set_transformer_name(&mut self, name: &str) -> EngineResult<()> {
        let idx = find_by_name(&self.circuit()?.transformers, name, |t| t.name.as_str())
            .ok_or_else(|| EngineError::command_failed(format!("transformer not found: {}", name)))?;
        self.transformer = Some(idx);
        self.winding = 1;
        Ok(())
    }

    fn transformer_name(&mut self) -> EngineResult<String> {
        Ok(self.active_transformer()?.name.clone())
    }

    fn set_transformer_winding(&mut self, winding: u32) -> EngineResult<()> {
        let xf = self.active_transformer()?;
        let count = xf.windings_kv.len();
        if winding == 0 || winding as usize > count {
            return Err(EngineError::command_failed(format!(
                "winding {} out of range: transformer {} has {} windings",
                winding, xf.name, count
            )));
        }
        self.winding = winding;
        Ok(())
    }

    fn transformer_kv(&mut self) -> EngineResult<f64> {
        let winding = self.winding;
        let xf = self.active_transformer()?;
        xf.windings_kv
            .get(winding as usize - 1)
            .copied()
            .ok_or_else(|| {
                EngineError::command_failed(format!("transformer {} has no windings", xf.name))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) const SAMPLE: &str = r#"
name: sample
total_power: [100.0, 50.0]
buses:
  - name: A
    kv_base: 7.967
  - name: B
    kv_base: 0.127
lines:
  - name: L1
    length: 0.2
  - name: L2
    length: 0.5
transformers:
  - name: T1
    windings_kv: [13.8, 0.22]
"#;

    fn compiled() -> FixtureEngine {
        let fixture = CircuitFixture::from_yaml(SAMPLE).unwrap();
        let mut eng = FixtureEngine::new().with_model("/m/sample.dss", fixture);
        eng.start().unwrap();
        eng.command("compile \"/m/sample.dss\"").unwrap();
        eng
    }

    #[test]
    fn test_compile_unknown_path_fails() {
        let mut eng = FixtureEngine::new();
        eng.start().unwrap();
        let err = eng.command("compile \"/nowhere.dss\"").unwrap_err();
        assert!(err.to_string().contains("cannot open model file"));
        assert_eq!(eng.commands().len(), 1);
    }

    #[test]
    fn test_queries_before_compile_fail() {
        let mut eng = FixtureEngine::new();
        eng.start().unwrap();
        assert!(eng.circuit_name().unwrap_err().to_string().contains("no active circuit"));
    }

    #[test]
    fn test_bus_lookup_is_case_insensitive() {
        let mut eng = compiled();
        eng.set_active_bus("b").unwrap();
        assert_eq!(eng.bus_name().unwrap(), "B");
    }

    #[test]
    fn test_lines_cursor_walks_in_order() {
        let mut eng = compiled();
        assert_eq!(eng.lines_first().unwrap(), 1);
        assert_eq!(eng.line_name().unwrap(), "L1");
        assert_eq!(eng.lines_next().unwrap(), 2);
        assert_eq!(eng.line_name().unwrap(), "L2");
        assert_eq!(eng.lines_next().unwrap(), 0);
    }

    #[test]
    fn test_winding_out_of_range() {
        let mut eng = compiled();
        eng.set_transformer_name("T1").unwrap();
        assert!(eng.set_transformer_winding(3).is_err());
        assert!(eng.set_transformer_winding(0).is_err());
        eng.set_transformer_winding(2).unwrap();
        assert_eq!(eng.transformer_kv().unwrap(), 0.22);
    }

    #[test]
    fn test_clear_all_drops_circuit() {
        let mut eng = compiled();
        eng.set_active_bus("A").unwrap();
        eng.clear_all().unwrap();
        assert_eq!(eng.clear_count(), 1);
        assert!(eng.bus_kv_base().is_err());
    }

    #[test]
    fn test_unknown_set_option() {
        let mut eng = compiled();
        assert!(eng.command("set frobnicate=yes").is_err());
        eng.command("set Mode=SnapShot").unwrap();
        assert_eq!(eng.solve_mode(), Some("snapshot"));
    }
}
