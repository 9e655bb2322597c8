#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::Duration;

use memwatch_server::{AppState, ServerConfig, TelemetryEvent};
use memwatch_telemetry::RuntimeConfig;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

fn write_script(dir: &TempDir, body: &str) -> PathBuf {
    let path = dir.path().join("fake_tester.sh");
    std::fs::write(&path, body).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn config_for(tester_path: PathBuf, autostart: bool) -> ServerConfig {
    ServerConfig {
        port: 0,
        bind_addr: "127.0.0.1".to_string(),
        tester_path,
        runtime: RuntimeConfig::new(0.8, 100).unwrap(),
        window_capacity: 60,
        ring_capacity: 800,
        autostart,
        profile_mode: true,
        afterburner_exe: PathBuf::from("/does/not/exist/MSIAfterburner.exe"),
        offset_cmd_template: None,
    }
}

async fn next_event(rx: &mut mpsc::Receiver<TelemetryEvent>) -> TelemetryEvent {
    timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

fn status_text(event: &TelemetryEvent) -> Option<&str> {
    match event {
        TelemetryEvent::Status { text: Some(t), .. } => Some(t.as_str()),
        _ => None,
    }
}

fn status_error(event: &TelemetryEvent) -> Option<&str> {
    match event {
        TelemetryEvent::Status { error: Some(e), .. } => Some(e.as_str()),
        _ => None,
    }
}

#[tokio::test]
async fn full_run_reports_start_samples_fault_and_exit() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"#!/bin/sh
echo "GDDR7 tester starting (fraction=$1 iters=$2)"
echo "[Chunk 1 | Mode 1] Time: 2.50 ms | Bandwidth: 601.20 GB/s | New errors: 0 | Total errors: 0"
echo "[Chunk 2 | Mode 1] Time: 2.60 ms | Bandwidth: 598.00 GB/s | New errors: 1 | Total errors: 1"
echo "NVIDIA CUDA error: device lost" 1>&2
exit 0
"#,
    );
    let state = AppState::new(config_for(script.clone(), false));
    let (_id, mut rx) = state.attach_subscriber();
    state.supervisor().enable();

    let mut events = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        let exited = status_text(&event).is_some_and(|t| t.starts_with("tester exited"));
        events.push(event);
        if exited {
            break;
        }
    }
    state.supervisor().disable();

    // The spawn announcement is always first and carries the command line.
    let started = status_text(&events[0]).expect("first event should be a status");
    assert!(started.starts_with("tester started: "), "{started}");
    assert!(started.contains("0.80 100"), "{started}");

    // Samples from one pipe stay in order; the second carries the pair's
    // deviation.
    let samples: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            TelemetryEvent::Sample { sample, stats } => Some((sample, stats)),
            _ => None,
        })
        .collect();
    assert_eq!(samples.len(), 2);
    assert_eq!(samples[0].0.chunk, 1);
    assert_eq!(samples[1].0.chunk, 2);
    assert!(samples[0].1.per_mode_std.is_empty());
    let sigma = samples[1].1.per_mode_std[&1];
    assert!((sigma - 1.6).abs() < 1e-9, "sigma was {sigma}");

    // The stderr fault line surfaced verbatim as a status error.
    assert!(events
        .iter()
        .any(|e| status_error(e) == Some("NVIDIA CUDA error: device lost")));

    // The exit report is last and shows a clean code.
    let exited = status_text(events.last().unwrap()).unwrap();
    assert_eq!(exited, "tester exited with code 0");

    assert_eq!(state.store().history_len(), 2);
}

#[tokio::test]
async fn binary_noise_between_samples_does_not_end_the_stream() {
    let dir = TempDir::new().unwrap();
    // A non-UTF-8 banner between two valid sample lines must read as noise,
    // not end the pipe.
    let script = write_script(
        &dir,
        r#"#!/bin/sh
echo "[Chunk 1 | Mode 1] Time: 2.50 ms | Bandwidth: 601.20 GB/s | New errors: 0 | Total errors: 0"
printf '\377\376 binary banner noise\n'
echo "[Chunk 2 | Mode 1] Time: 2.60 ms | Bandwidth: 598.00 GB/s | New errors: 0 | Total errors: 1"
exit 0
"#,
    );
    let state = AppState::new(config_for(script, false));
    let (_id, mut rx) = state.attach_subscriber();
    state.supervisor().enable();

    let mut chunks = Vec::new();
    loop {
        let event = next_event(&mut rx).await;
        if let TelemetryEvent::Sample { sample, .. } = &event {
            chunks.push(sample.chunk);
        }
        if status_text(&event).is_some_and(|t| t.starts_with("tester exited")) {
            break;
        }
    }
    state.supervisor().disable();

    assert_eq!(chunks, vec![1, 2]);
    assert_eq!(state.store().history_len(), 2);
}

#[tokio::test]
async fn missing_tester_reports_error_and_keeps_retrying_quietly() {
    let state = AppState::new(config_for(PathBuf::from("/does/not/exist/tester"), false));
    let (_id, mut rx) = state.attach_subscriber();
    state.supervisor().enable();

    let event = next_event(&mut rx).await;
    assert_eq!(
        status_error(&event),
        Some("Tester not found: /does/not/exist/tester")
    );
    state.supervisor().disable();
    assert_eq!(state.store().history_len(), 0);
}

#[tokio::test]
async fn stop_terminates_a_long_running_tester() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"#!/bin/sh
echo "[Chunk 1 | Mode 2] Time: 2.00 ms | Bandwidth: 555.00 GB/s | New errors: 0 | Total errors: 0"
exec sleep 30
"#,
    );
    let state = AppState::new(config_for(script, false));
    let (_id, mut rx) = state.attach_subscriber();
    state.supervisor().enable();

    // Wait for the run to be underway.
    loop {
        let event = next_event(&mut rx).await;
        if matches!(event, TelemetryEvent::Sample { .. }) {
            break;
        }
    }

    state.supervisor().disable();
    state.supervisor().terminate_current().await;

    let exited = loop {
        let event = next_event(&mut rx).await;
        if let Some(text) = status_text(&event) {
            if text.starts_with("tester exited") {
                break text.to_string();
            }
        }
    };
    // SIGTERM shows up as the negated signal number.
    assert_eq!(exited, "tester exited with code -15");

    // With the run flag down the loop settles in idle, with no respawn.
    timeout(Duration::from_secs(5), async {
        while state.supervisor().state() != memwatch_server::SupervisorState::Idle {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("supervisor never settled idle");
    assert_eq!(state.store().history_len(), 1);
}

#[tokio::test]
async fn restart_respawns_with_new_parameters_and_cleared_state() {
    let dir = TempDir::new().unwrap();
    // The script echoes its fraction argument back as the bandwidth so the
    // effective parameters are observable in the samples.
    let script = write_script(
        &dir,
        r#"#!/bin/sh
echo "[Chunk 1 | Mode 1] Time: 1.00 ms | Bandwidth: $1 GB/s | New errors: 0 | Total errors: 0"
exec sleep 30
"#,
    );
    let state = AppState::new(config_for(script, false));
    let (_id, mut rx) = state.attach_subscriber();
    state.supervisor().enable();

    let first_gbps = loop {
        if let TelemetryEvent::Sample { sample, .. } = next_event(&mut rx).await {
            break sample.bandwidth_gbps;
        }
    };
    assert!((first_gbps - 0.8).abs() < 1e-9);

    // Restart with a new fraction, as the control surface does.
    state.apply_overrides(Some(0.5), None);
    state.store().clear_all();
    state.supervisor().enable();
    state.supervisor().terminate_current().await;

    let second_gbps = loop {
        if let TelemetryEvent::Sample { sample, .. } = next_event(&mut rx).await {
            break sample.bandwidth_gbps;
        }
    };
    assert!((second_gbps - 0.5).abs() < 1e-9, "got {second_gbps}");
    assert_eq!(state.store().history_len(), 1);

    state.supervisor().disable();
    state.supervisor().terminate_current().await;
}

#[tokio::test]
async fn autostart_runs_without_a_start_command() {
    let dir = TempDir::new().unwrap();
    let script = write_script(
        &dir,
        r#"#!/bin/sh
echo "[Chunk 1 | Mode 3] Time: 1.50 ms | Bandwidth: 640.00 GB/s | New errors: 0 | Total errors: 0"
exec sleep 30
"#,
    );
    let state = AppState::new(config_for(script, true));

    timeout(Duration::from_secs(10), async {
        while state.store().history_len() == 0 {
            sleep(Duration::from_millis(25)).await;
        }
    })
    .await
    .expect("autostarted tester never produced samples");

    state.supervisor().disable();
    state.supervisor().terminate_current().await;
}
