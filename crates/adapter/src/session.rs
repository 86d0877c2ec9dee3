//! The engine adapter: one live session with one engine.
//!
//! Most engine queries read an implicit cursor (active bus, active element,
//! line, transformer) that an earlier call selected. The raw methods on
//! [`Session`] forward to those cursors exactly as the engine does and leave
//! ordering to the caller. The scoped methods ([`Session::bus`],
//! [`Session::element`], [`Session::line`], [`Session::transformer`]) activate
//! a target and hand back a view that mutably borrows the session, so nothing
//! can move the cursor between the activation and the reads made through it.
//!
//! A `Session` is `!Send` and `!Sync`: the engine session is a single mutable
//! resource and stays on the thread that opened it.

use crate::cursors::{BusCursor, Cursors, ElementCursor, LineCursor, TransformerCursor};
use crate::models::ModelLocator;
use crate::request::Request;
use crate::traits::*;
use crate::types::*;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

/// One live engine session.
///
/// Confined to the thread that opened it:
///
/// ```compile_fail
/// use dss_adapter::{FixtureEngine, ModelLocator, Session};
///
/// fn assert_send<T: Send>(_: T) {}
///
/// let locator = ModelLocator::new("/models");
/// let session = Session::open(FixtureEngine::new(), &locator, "index.dss").unwrap();
/// assert_send(session);
/// ```
///
/// ```compile_fail
/// use dss_adapter::{FixtureEngine, ModelLocator, Session};
///
/// fn assert_sync<T: Sync>(_: &T) {}
///
/// let locator = ModelLocator::new("/models");
/// let session = Session::open(FixtureEngine::new(), &locator, "index.dss").unwrap();
/// assert_sync(&session);
/// ```
pub struct Session<E> {
    engine: E,
    model_path: PathBuf,
    cursors: Cursors,
    _not_send: PhantomData<*const ()>,
}

impl<E: DssEngine> Session<E> {
    /// Start `engine` and bind the session to `model_file` inside the models
    /// directory. Nothing is compiled yet.
    pub fn open(
        mut engine: E,
        locator: &ModelLocator,
        model_file: impl AsRef<Path>,
    ) -> Result<Self, EngineUnavailable> {
        let model_path = locator.resolve(model_file);
        match engine.start() {
            Ok(true) => {}
            Ok(false) => {
                return Err(EngineUnavailable {
                    reason: "engine reported start failure".into(),
                })
            }
            Err(e) => {
                return Err(EngineUnavailable {
                    reason: e.to_string(),
                })
            }
        }
        tracing::info!(model = %model_path.display(), "engine session opened");
        Ok(Self {
            engine,
            model_path,
            cursors: Cursors::default(),
            _not_send: PhantomData,
        })
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    /// What this session last activated in each cursor family.
    pub fn cursors(&self) -> &Cursors {
        &self.cursors
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Shut the engine down and end the session.
    pub fn close(mut self) -> EngineResult<()> {
        tracing::info!(model = %self.model_path.display(), "closing engine session");
        self.engine.shutdown()
    }

    fn send(&mut self, request: Request) -> EngineResult<String> {
        let text = request.render()?;
        tracing::debug!(command = %text, "engine request");
        self.engine.command(&text)
    }

    // -----------------------------------------------------------------------
    // Engine and circuit
    // -----------------------------------------------------------------------

    pub fn engine_version(&mut self) -> EngineResult<String> {
        self.engine.version()
    }

    /// Clear every piece of prior session state, then compile the model.
    pub fn compile(&mut self) -> EngineResult<()> {
        self.engine.clear_all()?;
        self.cursors = Cursors::default();
        self.send(Request::Compile(self.model_path.clone()))?;
        tracing::info!(model = %self.model_path.display(), "model compiled");
        Ok(())
    }

    /// Snapshot power flow with every load scaled by `load_mult`. Blocks until
    /// the engine has solved.
    pub fn solve_snapshot(&mut self, load_mult: f64) -> EngineResult<()> {
        self.send(Request::SetMode(SolveMode::Snapshot))?;
        self.send(Request::SetControlMode(ControlMode::Static))?;
        self.engine.set_load_mult(load_mult)?;
        self.engine.solve()?;
        tracing::info!(load_mult, "snapshot solved");
        Ok(())
    }

    /// Ask the engine for its element power report (kVA units).
    pub fn show_powers(&mut self) -> EngineResult<String> {
        self.send(Request::ShowPowers)
    }

    pub fn circuit_name(&mut self) -> EngineResult<String> {
        self.engine.circuit_name()
    }

    /// Total circuit power with power delivered into the circuit counted as
    /// positive, i.e. the engine's raw total negated.
    pub fn circuit_total_power(&mut self) -> EngineResult<PowerPair> {
        let (p, q) = self.engine.circuit_total_power()?;
        Ok(PowerPair::new(-p, -q))
    }

    // -----------------------------------------------------------------------
    // Bus cursor
    // -----------------------------------------------------------------------

    /// Move the bus cursor and return the name the engine confirms.
    pub fn activate_bus(&mut self, name: &str) -> EngineResult<String> {
        self.engine.set_active_bus(name)?;
        let confirmed = self.engine.bus_name()?;
        self.cursors.bus = Some(confirmed.clone());
        Ok(confirmed)
    }

    pub fn bus_distance(&mut self) -> EngineResult<f64> {
        self.engine.bus_distance()
    }

    pub fn bus_base_kv(&mut self) -> EngineResult<f64> {
        self.engine.bus_kv_base()
    }

    pub fn bus_voltage_mag_angle(&mut self) -> EngineResult<Vec<MagAngle>> {
        MagAngle::from_flat(&self.engine.bus_vmag_angle()?)
    }

    pub fn bus(&mut self, name: &str) -> EngineResult<BusCursor<'_, E>> {
        let confirmed = self.activate_bus(name)?;
        Ok(BusCursor::new(self, confirmed))
    }

    // -----------------------------------------------------------------------
    // Element cursor
    // -----------------------------------------------------------------------

    /// Move the element cursor to a `Type.Name` element.
    pub fn activate_element(&mut self, full_name: &str) -> EngineResult<String> {
        self.engine.set_active_element(full_name)?;
        let confirmed = self.engine.element_name()?;
        self.cursors.element = Some(confirmed.clone());
        Ok(confirmed)
    }

    /// The buses on the first two terminals of the active element.
    pub fn element_buses(&mut self) -> EngineResult<BusPair> {
        let mut buses = self.engine.element_bus_names()?.into_iter();
        match (buses.next(), buses.next()) {
            (Some(bus1), Some(bus2)) => Ok(BusPair { bus1, bus2 }),
            _ => Err(EngineError::command_failed(
                "active element has fewer than two terminals",
            )),
        }
    }

    pub fn element_voltage_mag_angle(&mut self) -> EngineResult<Vec<MagAngle>> {
        MagAngle::from_flat(&self.engine.element_voltages_mag_ang()?)
    }

    pub fn element_powers(&mut self) -> EngineResult<Vec<PowerPair>> {
        PowerPair::from_flat(&self.engine.element_powers()?)
    }

    pub fn element(&mut self, full_name: &str) -> EngineResult<ElementCursor<'_, E>> {
        let confirmed = self.activate_element(full_name)?;
        Ok(ElementCursor::new(self, confirmed))
    }

    // -----------------------------------------------------------------------
    // Line cursor
    // -----------------------------------------------------------------------

    pub fn activate_line(&mut self, name: &str) -> EngineResult<String> {
        self.engine.set_line_name(name)?;
        let confirmed = self.engine.line_name()?;
        self.cursors.line = Some(confirmed.clone());
        Ok(confirmed)
    }

    pub fn line_name(&mut self) -> EngineResult<String> {
        self.engine.line_name()
    }

    pub fn line_length(&mut self) -> EngineResult<f64> {
        self.engine.line_length()
    }

    pub fn set_line_length(&mut self, length: f64) -> EngineResult<()> {
        self.engine.set_line_length(length)
    }

    pub fn line(&mut self, name: &str) -> EngineResult<LineCursor<'_, E>> {
        let confirmed = self.activate_line(name)?;
        Ok(LineCursor::new(self, confirmed))
    }

    /// Walk the engine's line collection from first to last.
    ///
    /// Uses the line cursor, which is left on the last line visited. The
    /// collection must not change while this runs.
    pub fn enumerate_lines(&mut self) -> EngineResult<LineTable> {
        let mut table = LineTable::default();
        self.engine.lines_first()?;
        let count = self.engine.lines_count()?;
        for _ in 0..count {
            let name = self.engine.line_name()?;
            let length = self.engine.line_length()?;
            table.push(name, length);
            self.engine.lines_next()?;
        }
        self.cursors.line = table.names.last().cloned();
        Ok(table)
    }

    // -----------------------------------------------------------------------
    // Transformer cursor
    // -----------------------------------------------------------------------

    pub fn activate_transformer(&mut self, name: &str) -> EngineResult<String> {
        self.engine.set_transformer_name(name)?;
        let confirmed = self.engine.transformer_name()?;
        self.cursors.transformer = Some(confirmed.clone());
        Ok(confirmed)
    }

    pub fn transformer_name(&mut self) -> EngineResult<String> {
        self.engine.transformer_name()
    }

    /// Rated kV of a winding (1-based) on the active transformer.
    pub fn terminal_voltage(&mut self, winding: u32) -> EngineResult<f64> {
        self.engine.set_transformer_winding(winding)?;
        self.engine.transformer_kv()
    }

    pub fn transformer(&mut self, name: &str) -> EngineResult<TransformerCursor<'_, E>> {
        let confirmed = self.activate_transformer(name)?;
        Ok(TransformerCursor::new(self, confirmed))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::fixture::{CircuitFixture, FixtureEngine};

    pub(crate) const CIRCUIT: &str = r#"
name: exemplo
total_power: [100.0, 50.0]
buses:
  - name: A
    distance: 0.0
    kv_base: 7.967
    vmag_angle: [7.9, 0.0, 7.9, -120.0, 7.9, 120.0]
  - name: B
    distance: 0.2
    kv_base: 7.967
  - name: C
    distance: 0.5
    kv_base: 0.127
    vmag_angle: [0.126, -30.5]
elements:
  - name: Line.Linha1
    buses: [A, B]
    voltages_mag_ang: [7.9, 0.0, 7.88, -0.1]
    powers: [120.0, 40.0, -119.5, -39.8]
  - name: Load.Carga
    buses: [C]
lines:
  - name: linha1
    length: 0.2
  - name: linha2
    length: 0.3
  - name: linha3
    length: 0.1
transformers:
  - name: trafo
    windings_kv: [13.8, 0.22]
"#;

    pub(crate) fn open_session() -> Session<FixtureEngine> {
        let locator = ModelLocator::new("/models");
        let fixture = CircuitFixture::from_yaml(CIRCUIT).unwrap();
        let engine = FixtureEngine::new().with_model(locator.resolve("index.dss"), fixture);
        Session::open(engine, &locator, "index.dss").unwrap()
    }

    fn solved_session() -> Session<FixtureEngine> {
        let mut s = open_session();
        s.compile().unwrap();
        s.solve_snapshot(1.0).unwrap();
        s
    }

    #[test]
    fn test_open_unavailable_engine() {
        let locator = ModelLocator::new("/models");
        let err = Session::open(FixtureEngine::unavailable(), &locator, "index.dss")
            .err()
            .expect("open should fail");
        assert!(err.reason.contains("start failure"));
        assert!(matches!(EngineError::from(err), EngineError::Unavailable(_)));
    }

    #[test]
    fn test_compile_then_solve_reports_circuit_name() {
        let mut s = solved_session();
        assert_eq!(s.circuit_name().unwrap(), "exemplo");
        assert_eq!(s.engine().solve_count(), 1);
        assert_eq!(s.engine().load_mult(), 1.0);
    }

    #[test]
    fn test_compile_clears_before_compiling() {
        let mut s = open_session();
        s.compile().unwrap();
        s.activate_bus("A").unwrap();
        s.compile().unwrap();
        assert_eq!(s.engine().clear_count(), 2);
        assert_eq!(s.cursors(), &Cursors::default());
        assert_eq!(
            s.engine().commands().last().map(String::as_str),
            Some("compile \"/models/index.dss\"")
        );
    }

    #[test]
    fn test_solve_snapshot_issues_settings_in_order() {
        let mut s = open_session();
        s.compile().unwrap();
        s.solve_snapshot(0.75).unwrap();
        let cmds = s.engine().commands();
        assert_eq!(cmds[1], "set mode=snapshot");
        assert_eq!(cmds[2], "set controlmode=static");
        assert_eq!(s.engine().load_mult(), 0.75);
        assert_eq!(s.engine().control_mode(), Some("static"));
    }

    #[test]
    fn test_total_power_is_negated() {
        let mut s = solved_session();
        assert_eq!(s.circuit_total_power().unwrap(), PowerPair::new(-100.0, -50.0));
    }

    #[test]
    fn test_activate_bus_targets_that_bus() {
        let mut s = solved_session();
        s.activate_bus("A").unwrap();
        assert_eq!(s.activate_bus("C").unwrap(), "C");
        assert_eq!(s.bus_base_kv().unwrap(), 0.127);
        assert_eq!(s.bus_distance().unwrap(), 0.5);
        assert_eq!(
            s.bus_voltage_mag_angle().unwrap(),
            vec![MagAngle::new(0.126, -30.5)]
        );
    }

    #[test]
    fn test_query_before_activation_fails_explicitly() {
        let mut s = solved_session();
        match s.bus_base_kv() {
            Err(EngineError::CommandFailed { message }) => assert_eq!(message, "no active bus"),
            other => panic!("expected CommandFailed, got {:?}", other),
        }
        assert!(s.element_powers().is_err());
        assert!(s.line_length().is_err());
        assert!(s.transformer_name().is_err());
    }

    #[test]
    fn test_element_buses_and_powers() {
        let mut s = solved_session();
        assert_eq!(s.activate_element("line.linha1").unwrap(), "Line.Linha1");
        assert_eq!(
            s.element_buses().unwrap(),
            BusPair {
                bus1: "A".into(),
                bus2: "B".into()
            }
        );
        let powers = s.element_powers().unwrap();
        assert_eq!(powers.len(), 2);
        assert_eq!(powers[0], PowerPair::new(120.0, 40.0));
        assert_eq!(s.element_voltage_mag_angle().unwrap().len(), 2);
    }

    #[test]
    fn test_single_terminal_element_has_no_bus_pair() {
        let mut s = solved_session();
        s.activate_element("Load.Carga").unwrap();
        assert!(matches!(
            s.element_buses(),
            Err(EngineError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_set_line_length_round_trips() {
        let mut s = solved_session();
        s.activate_line("linha1").unwrap();
        s.set_line_length(0.4).unwrap();
        assert_eq!(s.line_length().unwrap(), 0.4);
    }

    #[test]
    fn test_line_cursor_independent_of_element_cursor() {
        let mut s = solved_session();
        s.activate_line("linha2").unwrap();
        s.activate_element("Line.Linha1").unwrap();
        assert_eq!(s.line_name().unwrap(), "linha2");
        assert_eq!(s.cursors().element.as_deref(), Some("Line.Linha1"));
        assert_eq!(s.cursors().line.as_deref(), Some("linha2"));
    }

    #[test]
    fn test_enumerate_lines_visits_each_once() {
        let mut s = solved_session();
        let table = s.enumerate_lines().unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.names, vec!["linha1", "linha2", "linha3"]);
        assert_eq!(table.lengths, vec![0.2, 0.3, 0.1]);
        assert_eq!(s.cursors().line.as_deref(), Some("linha3"));
    }

    #[test]
    fn test_terminal_voltage_per_winding() {
        let mut s = solved_session();
        assert_eq!(s.activate_transformer("Trafo").unwrap(), "trafo");
        assert_eq!(s.terminal_voltage(1).unwrap(), 13.8);
        assert_eq!(s.terminal_voltage(2).unwrap(), 0.22);
        assert!(s.terminal_voltage(3).is_err());
    }

    #[test]
    fn test_show_powers_requires_circuit() {
        let mut s = open_session();
        assert!(s.show_powers().is_err());
        s.compile().unwrap();
        s.show_powers().unwrap();
        assert_eq!(
            s.engine().commands().last().map(String::as_str),
            Some("show powers kva elements")
        );
    }

    #[test]
    fn test_compile_unknown_model_surfaces_engine_failure() {
        let locator = ModelLocator::new("/models");
        let mut s = Session::open(FixtureEngine::new(), &locator, "missing.dss").unwrap();
        assert!(matches!(
            s.compile(),
            Err(EngineError::CommandFailed { .. })
        ));
    }

    #[test]
    fn test_odd_length_engine_array_is_protocol_error() {
        let locator = ModelLocator::new("/models");
        let fixture = CircuitFixture::from_yaml(
            "name: odd\nbuses:\n  - name: A\n    kv_base: 7.2\n    vmag_angle: [7.2, 0.0, 7.1]\n",
        )
        .unwrap();
        let engine = FixtureEngine::new().with_model(locator.resolve("index.dss"), fixture);
        let mut s = Session::open(engine, &locator, "index.dss").unwrap();
        s.compile().unwrap();
        s.activate_bus("A").unwrap();
        assert!(matches!(
            s.bus_voltage_mag_angle(),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_close_shuts_engine_down() {
        let s = open_session();
        assert!(s.engine().is_started());
        s.close().unwrap();
    }
}
