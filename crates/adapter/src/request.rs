//! Typed builders for the engine's free-text command channel.
//!
//! Nothing else in the crate formats command text by hand. Every request is
//! validated before it is rendered, so a model path can never smuggle a
//! second command onto the wire.

use crate::traits::{EngineError, EngineResult};
use crate::types::{ControlMode, SolveMode};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Parse and build the circuit described by a model file.
    ///
    /// Wire: `compile "<path>"`
    Compile(PathBuf),
    /// Wire: `set mode=<mode>`
    SetMode(SolveMode),
    /// Wire: `set controlmode=<mode>`
    SetControlMode(ControlMode),
    /// Power report for every element, in kVA units.
    ///
    /// Wire: `show powers kva elements`
    ShowPowers,
}

impl Request {
    pub fn validate(&self) -> EngineResult<()> {
        match self {
            Request::Compile(path) => {
                let text = path.to_str().ok_or_else(|| {
                    EngineError::InvalidRequest(format!(
                        "model path is not valid UTF-8: {}",
                        path.display()
                    ))
                })?;
                if text.is_empty() {
                    return Err(EngineError::InvalidRequest("empty model path".into()));
                }
                if let Some(c) = text.chars().find(|c| matches!(c, '"' | '\n' | '\r')) {
                    return Err(EngineError::InvalidRequest(format!(
                        "model path contains forbidden character {:?}: {}",
                        c, text
                    )));
                }
                Ok(())
            }
            Request::SetMode(_) | Request::SetControlMode(_) | Request::ShowPowers => Ok(()),
        }
    }

    /// Validate and render the request in one step.
    pub fn render(&self) -> EngineResult<String> {
        self.validate()?;
        Ok(self.to_string())
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Compile(path) => write!(f, "compile \"{}\"", path.display()),
            Request::SetMode(mode) => write!(f, "set mode={}", mode),
            Request::SetControlMode(mode) => write!(f, "set controlmode={}", mode),
            Request::ShowPowers => f.write_str("show powers kva elements"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_solve_settings() {
        assert_eq!(
            Request::SetMode(SolveMode::Snapshot).render().unwrap(),
            "set mode=snapshot"
        );
        assert_eq!(
            Request::SetControlMode(ControlMode::Static).render().unwrap(),
            "set controlmode=static"
        );
        assert_eq!(
            Request::ShowPowers.render().unwrap(),
            "show powers kva elements"
        );
    }

    #[test]
    fn test_compile_path_is_quoted() {
        let req = Request::Compile(PathBuf::from("/work/DSS/my model.dss"));
        assert_eq!(req.render().unwrap(), "compile \"/work/DSS/my model.dss\"");
    }

    #[test]
    fn test_compile_rejects_injection() {
        let req = Request::Compile(PathBuf::from("index.dss\"\nclear"));
        match req.render() {
            Err(EngineError::InvalidRequest(msg)) => assert!(msg.contains("forbidden")),
            other => panic!("expected InvalidRequest, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_rejects_empty_path() {
        assert!(matches!(
            Request::Compile(PathBuf::new()).validate(),
            Err(EngineError::InvalidRequest(_))
        ));
    }
}
