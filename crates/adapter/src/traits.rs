//! Engine collaborator interface.
//!
//! The external engine exposes a start operation, a free-text command channel
//! and a hierarchy of property groups. Each group is its own trait so a
//! backend reads like the engine's automation surface; [`DssEngine`] ties them
//! together and is what [`crate::Session`] is generic over.

/// Result type for every engine call.
pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("engine unavailable: {0}")]
    Unavailable(String),

    #[error("engine command failed: {message}")]
    CommandFailed { message: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    pub fn command_failed(message: impl Into<String>) -> Self {
        EngineError::CommandFailed {
            message: message.into(),
        }
    }
}

/// The engine could not be started. The session is unusable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("engine unavailable: {reason}")]
pub struct EngineUnavailable {
    pub reason: String,
}

impl From<EngineUnavailable> for EngineError {
    fn from(e: EngineUnavailable) -> Self {
        EngineError::Unavailable(e.reason)
    }
}

// ---------------------------------------------------------------------------
// Engine lifecycle and the text command channel
// ---------------------------------------------------------------------------

pub trait EngineControl {
    /// Initialise the engine. `Ok(false)` means the engine refused to start.
    fn start(&mut self) -> EngineResult<bool>;
    fn version(&mut self) -> EngineResult<String>;
    /// Drop every compiled circuit and all cursor state.
    fn clear_all(&mut self) -> EngineResult<()>;
    /// Send one free-text command and return whatever the engine replies.
    fn command(&mut self, text: &str) -> EngineResult<String>;

    /// Release engine resources. Backends without any are free to ignore it.
    fn shutdown(&mut self) -> EngineResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Circuit
// ---------------------------------------------------------------------------

pub trait CircuitOps {
    fn circuit_name(&mut self) -> EngineResult<String>;
    /// Raw total power as reported by the engine: (kW, kvar).
    fn circuit_total_power(&mut self) -> EngineResult<(f64, f64)>;
    fn set_active_bus(&mut self, name: &str) -> EngineResult<()>;
    fn set_active_element(&mut self, full_name: &str) -> EngineResult<()>;
}

// ---------------------------------------------------------------------------
// Solution
// ---------------------------------------------------------------------------

pub trait SolutionOps {
    fn set_load_mult(&mut self, mult: f64) -> EngineResult<()>;
    fn solve(&mut self) -> EngineResult<()>;
}

// ---------------------------------------------------------------------------
// Active bus
// ---------------------------------------------------------------------------

pub trait BusOps {
    fn bus_name(&mut self) -> EngineResult<String>;
    fn bus_distance(&mut self) -> EngineResult<f64>;
    fn bus_kv_base(&mut self) -> EngineResult<f64>;
    /// Flattened magnitude/angle pairs, one pair per node.
    fn bus_vmag_angle(&mut self) -> EngineResult<Vec<f64>>;
}

// ---------------------------------------------------------------------------
// Active circuit element
// ---------------------------------------------------------------------------

pub trait ElementOps {
    fn element_name(&mut self) -> EngineResult<String>;
    fn element_bus_names(&mut self) -> EngineResult<Vec<String>>;
    fn element_voltages_mag_ang(&mut self) -> EngineResult<Vec<f64>>;
    /// Flattened (kW, kvar) pairs, one pair per conductor.
    fn element_powers(&mut self) -> EngineResult<Vec<f64>>;
}

// ---------------------------------------------------------------------------
// Lines collection
// ---------------------------------------------------------------------------

pub trait LineOps {
    fn set_line_name(&mut self, name: &str) -> EngineResult<()>;
    fn line_name(&mut self) -> EngineResult<String>;
    fn line_length(&mut self) -> EngineResult<f64>;
    fn set_line_length(&mut self, length: f64) -> EngineResult<()>;
    /// Position the line cursor on the first line. Returns 0 when there is none.
    fn lines_first(&mut self) -> EngineResult<i32>;
    /// Advance the line cursor. Returns 0 past the last line.
    fn lines_next(&mut self) -> EngineResult<i32>;
    fn lines_count(&mut self) -> EngineResult<usize>;
}

// ---------------------------------------------------------------------------
// Transformers collection
// ---------------------------------------------------------------------------

pub trait TransformerOps {
    fn set_transformer_name(&mut self, name: &str) -> EngineResult<()>;
    fn transformer_name(&mut self) -> EngineResult<String>;
    /// Select the winding (1-based) subsequent reads apply to.
    fn set_transformer_winding(&mut self, winding: u32) -> EngineResult<()>;
    fn transformer_kv(&mut self) -> EngineResult<f64>;
}

/// Everything a session needs from an engine backend.
pub trait DssEngine:
    EngineControl + CircuitOps + SolutionOps + BusOps + ElementOps + LineOps + TransformerOps
{
}

impl<T> DssEngine for T where
    T: EngineControl + CircuitOps + SolutionOps + BusOps + ElementOps + LineOps + TransformerOps
{
}
