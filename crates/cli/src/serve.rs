//! Daemon mode – one session served over a Unix socket, JSON per line.
//!
//! The session never leaves the main task. Connections are accepted and
//! served one after another, so requests from different clients can't
//! interleave on the engine's cursors.

use dss_adapter::types::*;
use dss_adapter::{CommandRegistry, DssEngine, Session};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;

pub async fn run_daemon<E: DssEngine>(
    socket_path: PathBuf,
    mut session: Session<E>,
    registry: CommandRegistry<E>,
) {
    // Remove stale socket if it exists
    let _ = std::fs::remove_file(&socket_path);

    let listener = match UnixListener::bind(&socket_path) {
        Ok(l) => l,
        Err(e) => {
            eprintln!("error: cannot bind socket {}: {}", socket_path.display(), e);
            std::process::exit(2);
        }
    };

    tracing::info!(socket = %socket_path.display(), "dssctl daemon listening");

    loop {
        match listener.accept().await {
            Ok((stream, _addr)) => {
                let (reader, mut writer) = stream.into_split();
                let mut lines = BufReader::new(reader).lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    let response = handle_request(&line, &mut session, &registry);
                    let mut resp_json =
                        serde_json::to_string(&response).unwrap_or_else(|_| "{}".into());
                    resp_json.push('\n');
                    if writer.write_all(resp_json.as_bytes()).await.is_err() {
                        break;
                    }
                }
                tracing::debug!("client disconnected");
            }
            Err(e) => {
                tracing::warn!(error = %e, "accept error");
            }
        }
    }
}

fn invalid(id: String, message: String) -> DaemonResponse {
    DaemonResponse {
        id,
        result: None,
        error: Some(ErrorInfo {
            code: ErrorCode::InvalidInput,
            message,
            details: serde_json::Value::Null,
        }),
    }
}

pub fn handle_request<E: DssEngine>(
    line: &str,
    session: &mut Session<E>,
    registry: &CommandRegistry<E>,
) -> DaemonResponse {
    let req: DaemonRequest = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return invalid("unknown".into(), format!("invalid JSON request: {}", e)),
    };

    let result = match req.method.as_str() {
        "call" => {
            let cmd_name = req.params.get("cmd").and_then(|v| v.as_str()).unwrap_or("");
            let args = req
                .params
                .get("args")
                .cloned()
                .unwrap_or(serde_json::Value::Object(Default::default()));
            registry.execute(cmd_name, args, session)
        }
        "list" => {
            let mut r = result_ok("list", "commands", &new_run_id(), 0);
            r.data = Some(serde_json::json!({ "commands": registry.list() }));
            r
        }
        other => return invalid(req.id, format!("unknown method: {}", other)),
    };

    DaemonResponse {
        id: req.id,
        result: Some(result),
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dss_adapter::{CircuitFixture, FixtureEngine, ModelLocator};

    fn session() -> Session<FixtureEngine> {
        let locator = ModelLocator::new("/models");
        let fixture = CircuitFixture::from_yaml(
            "name: served\ntotal_power: [10.0, 2.0]\nbuses:\n  - name: A\n    kv_base: 7.2\n",
        )
        .unwrap();
        let engine = FixtureEngine::new().with_model(locator.resolve("index.dss"), fixture);
        Session::open(engine, &locator, "index.dss").unwrap()
    }

    #[test]
    fn test_call_requests_share_one_session() {
        let mut s = session();
        let reg = CommandRegistry::new();

        let r = handle_request(
            r#"{"id":"1","method":"call","params":{"cmd":"compile"}}"#,
            &mut s,
            &reg,
        );
        assert_eq!(r.id, "1");
        assert_eq!(r.result.unwrap().status, Status::Pass);

        let r = handle_request(
            r#"{"id":"2","method":"call","params":{"cmd":"circuit"}}"#,
            &mut s,
            &reg,
        );
        let data = r.result.unwrap().data.unwrap();
        assert_eq!(data["name"], "served");
        assert_eq!(data["total_power"]["p_kw"], -10.0);
    }

    #[test]
    fn test_invalid_json_request() {
        let mut s = session();
        let reg = CommandRegistry::new();
        let r = handle_request("not json", &mut s, &reg);
        assert_eq!(r.id, "unknown");
        assert_eq!(r.error.unwrap().code, ErrorCode::InvalidInput);
    }

    #[test]
    fn test_unknown_method() {
        let mut s = session();
        let reg = CommandRegistry::new();
        let r = handle_request(r#"{"id":"7","method":"subscribe"}"#, &mut s, &reg);
        assert_eq!(r.id, "7");
        assert!(r.result.is_none());
        assert!(r.error.unwrap().message.contains("unknown method"));
    }

    #[test]
    fn test_list_method() {
        let mut s = session();
        let reg = CommandRegistry::new();
        let r = handle_request(r#"{"id":"3","method":"list"}"#, &mut s, &reg);
        let data = r.result.unwrap().data.unwrap();
        assert!(data["commands"]
            .as_array()
            .unwrap()
            .iter()
            .any(|c| c == "lines"));
    }
}
