//! Script runner – execute scripted command sequences from YAML files.

use crate::commands::CommandRegistry;
use crate::session::Session;
use crate::traits::DssEngine;
use crate::types::*;

/// Load a script from a YAML string.
pub fn load_script(yaml: &str) -> Result<Script, String> {
    serde_yaml::from_str(yaml).map_err(|e| format!("failed to parse script YAML: {}", e))
}

/// Run every step against one session, in order. Steps keep running after a
/// mismatch so the result shows the whole sequence.
pub fn run_script<E: DssEngine>(
    script: &Script,
    session: &mut Session<E>,
    registry: &CommandRegistry<E>,
) -> ScriptResult {
    let mut step_results = Vec::with_capacity(script.steps.len());
    let mut overall = Status::Pass;

    for (i, step) in script.steps.iter().enumerate() {
        let r = registry.execute(&step.call, step.args.clone(), session);
        if r.status != step.expect_status {
            tracing::warn!(
                step = i,
                call = %step.call,
                expected = ?step.expect_status,
                actual = ?r.status,
                "script step status mismatch"
            );
            overall = Status::Fail;
        }
        step_results.push(r);
    }

    ScriptResult {
        name: script.name.clone(),
        overall_status: overall,
        step_results,
    }
}
