//! Cursor bookkeeping and scoped cursor views.

use crate::session::Session;
use crate::traits::{DssEngine, EngineResult};
use crate::types::{BusPair, MagAngle, PowerPair};

/// The target a session last activated in each cursor family.
///
/// Families are independent: activating an element leaves the line and
/// transformer cursors where they were. `compile` resets all of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cursors {
    pub bus: Option<String>,
    pub element: Option<String>,
    pub line: Option<String>,
    pub transformer: Option<String>,
}

impl Cursors {
    pub fn is_empty(&self) -> bool {
        self.bus.is_none()
            && self.element.is_none()
            && self.line.is_none()
            && self.transformer.is_none()
    }
}

/// A bus that has just been activated. Reads go to that bus.
pub struct BusCursor<'s, E> {
    session: &'s mut Session<E>,
    name: String,
}

impl<'s, E: DssEngine> BusCursor<'s, E> {
    pub(crate) fn new(session: &'s mut Session<E>, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Distance from the energy meter.
    pub fn distance(&mut self) -> EngineResult<f64> {
        self.session.bus_distance()
    }

    pub fn base_kv(&mut self) -> EngineResult<f64> {
        self.session.bus_base_kv()
    }

    pub fn voltage_mag_angle(&mut self) -> EngineResult<Vec<MagAngle>> {
        self.session.bus_voltage_mag_angle()
    }
}

/// A circuit element that has just been activated.
pub struct ElementCursor<'s, E> {
    session: &'s mut Session<E>,
    name: String,
}

impl<'s, E: DssEngine> ElementCursor<'s, E> {
    pub(crate) fn new(session: &'s mut Session<E>, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn buses(&mut self) -> EngineResult<BusPair> {
        self.session.element_buses()
    }

    pub fn voltage_mag_angle(&mut self) -> EngineResult<Vec<MagAngle>> {
        self.session.element_voltage_mag_angle()
    }

    pub fn powers(&mut self) -> EngineResult<Vec<PowerPair>> {
        self.session.element_powers()
    }
}

/// A line that has just been activated.
pub struct LineCursor<'s, E> {
    session: &'s mut Session<E>,
    name: String,
}

impl<'s, E: DssEngine> LineCursor<'s, E> {
    pub(crate) fn new(session: &'s mut Session<E>, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn length(&mut self) -> EngineResult<f64> {
        self.session.line_length()
    }

    /// No bounds checks: the engine takes whatever it is given.
    pub fn set_length(&mut self, length: f64) -> EngineResult<()> {
        self.session.set_line_length(length)
    }
}

/// A transformer that has just been activated.
pub struct TransformerCursor<'s, E> {
    session: &'s mut Session<E>,
    name: String,
}

impl<'s, E: DssEngine> TransformerCursor<'s, E> {
    pub(crate) fn new(session: &'s mut Session<E>, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rated kV of a winding (1-based).
    pub fn terminal_voltage(&mut self, winding: u32) -> EngineResult<f64> {
        self.session.terminal_voltage(winding)
    }
}
