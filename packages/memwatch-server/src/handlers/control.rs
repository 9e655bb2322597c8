use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use tracing::info;

use crate::events::TelemetryEvent;
use crate::state::AppState;

/// `POST /api/start`: apply any valid overrides, then enable supervision.
/// A no-op when the tester is already running, apart from the overrides.
pub async fn start(State(state): State<AppState>, body: Option<Json<Value>>) -> Json<Value> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let runtime = state.apply_overrides(field_f64(&body, "fraction"), field_u32(&body, "iters"));
    state.supervisor().enable();

    info!(
        fraction = runtime.fraction,
        iters = runtime.chunk_iters,
        "start requested"
    );
    Json(json!({
        "ok": true,
        "msg": "tester start requested",
        "running": state.supervisor().run_enabled(),
        "fraction": runtime.fraction,
        "iters": runtime.chunk_iters,
    }))
}

/// `POST /api/stop`: disable supervision and terminate any live process.
pub async fn stop(State(state): State<AppState>) -> Json<Value> {
    state.supervisor().disable();
    state.supervisor().terminate_current().await;

    info!("stop requested");
    Json(json!({"ok": true, "msg": "tester stop requested"}))
}

/// `POST /api/restart`: clear statistics and history together, apply any
/// valid overrides, re-enable supervision, and terminate the live process
/// so it comes back with the new parameters.
pub async fn restart(State(state): State<AppState>, body: Option<Json<Value>>) -> Json<Value> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let runtime = state.apply_overrides(field_f64(&body, "fraction"), field_u32(&body, "iters"));
    state.store().clear_all();
    state.supervisor().enable();
    state.supervisor().terminate_current().await;

    info!(
        fraction = runtime.fraction,
        iters = runtime.chunk_iters,
        "restart requested"
    );
    Json(json!({
        "ok": true,
        "msg": "restarting tester",
        "fraction": runtime.fraction,
        "iters": runtime.chunk_iters,
    }))
}

/// `POST /api/set_mem`: apply a memory-clock selector through the
/// configured clock control. The selector field follows the mode: `level`
/// in profile mode, `offset` in template mode. On success the statistics
/// windows are cleared (history stays) and subscribers are notified;
/// precondition failures map to 400, while a failing command is a 200 with
/// `ok: false`.
pub async fn set_mem(
    State(state): State<AppState>,
    body: Option<Json<Value>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    let key = if state.config().profile_mode {
        "level"
    } else {
        "offset"
    };
    let selector = body.get(key).and_then(Value::as_i64).unwrap_or(0);

    match state.clock().apply(selector).await {
        Ok(outcome) => {
            if outcome.ok {
                state.store().reset_stats();
                state.hub().publish(&TelemetryEvent::status_text(format!(
                    "{} applied; stats cleared",
                    outcome.description
                )));
                info!(applied = %outcome.description, "clock selector applied");
            }
            Ok(Json(json!({
                "ok": outcome.ok,
                "cmd": outcome.command,
                "out": outcome.output,
            })))
        }
        Err(e) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"ok": false, "msg": e.to_string()})),
        )),
    }
}

/// `GET /api/config`: effective runtime parameters and dashboard bounds.
pub async fn config(State(state): State<AppState>) -> Json<Value> {
    let runtime = state.runtime();
    Json(json!({
        "fraction": runtime.fraction,
        "iters": runtime.chunk_iters,
        "window_capacity": state.config().window_capacity,
        "ring_capacity": state.config().ring_capacity,
        "profile_mode": state.config().profile_mode,
        "slider": state.config().slider_bounds(),
        "running": state.supervisor().run_enabled(),
        "state": state.supervisor().state(),
    }))
}

/// Lenient field extraction: wrong-typed or absent override fields are
/// treated as not supplied.
fn field_f64(body: &Value, key: &str) -> Option<f64> {
    body.get(key).and_then(Value::as_f64)
}

fn field_u32(body: &Value, key: &str) -> Option<u32> {
    body.get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn field_extraction_ignores_wrong_types() {
        let body = json!({"fraction": "0.5", "iters": -3});
        assert_eq!(field_f64(&body, "fraction"), None);
        assert_eq!(field_u32(&body, "iters"), None);

        let body = json!({"fraction": 0.5, "iters": 50});
        assert_eq!(field_f64(&body, "fraction"), Some(0.5));
        assert_eq!(field_u32(&body, "iters"), Some(50));

        assert_eq!(field_f64(&Value::Null, "fraction"), None);
    }
}
