//! Doctor – check that the models directory and the engine are usable.

use crate::models::ModelLocator;
use crate::session::Session;
use crate::traits::DssEngine;
use crate::types::*;
use std::path::Path;
use std::time::Instant;

/// Try to open a session on `engine` and report what worked.
///
/// Status is `pass` only if the engine starts and the model file exists. The
/// engine is shut down again before returning.
pub fn run_doctor<E: DssEngine>(
    engine: E,
    locator: &ModelLocator,
    model_file: impl AsRef<Path>,
) -> CommandResult {
    let run_id = new_run_id();
    let start = Instant::now();
    let model_file = model_file.as_ref();
    let model_path = locator.resolve(model_file);

    let mut report = DoctorReport {
        models_dir: locator.dir().display().to_string(),
        models_dir_exists: locator.dir().is_dir(),
        model_path: model_path.display().to_string(),
        model_exists: model_path.is_file(),
        engine_started: false,
        engine_version: None,
        engine_error: None,
    };

    let t0 = Instant::now();
    match Session::open(engine, locator, model_file) {
        Ok(mut session) => {
            report.engine_started = true;
            match session.engine_version() {
                Ok(v) => report.engine_version = Some(v),
                Err(e) => report.engine_error = Some(e.to_string()),
            }
            if let Err(e) = session.close() {
                tracing::warn!(error = %e, "engine shutdown failed");
            }
        }
        Err(e) => report.engine_error = Some(e.to_string()),
    }
    let engine_ms = t0.elapsed().as_millis() as u64;

    let total_ms = start.elapsed().as_millis() as u64;
    let mut r = if report.engine_started && report.model_exists {
        result_ok("doctor", "engine", &run_id, total_ms)
    } else if !report.engine_started {
        result_err(
            "doctor",
            "engine",
            &run_id,
            total_ms,
            ErrorCode::EngineUnavailable,
            report.engine_error.clone().unwrap_or_default(),
        )
    } else {
        let mut r = result_ok("doctor", "engine", &run_id, total_ms);
        r.status = Status::Fail;
        r
    };
    r.timing_ms.steps.insert("engine".into(), engine_ms);
    r.data = Some(serde_json::to_value(&report).unwrap_or_default());
    r
}
