use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use crate::config::LogLevel;
use tracing::{info, subscriber::set_global_default};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::{EnvFilter, Registry, fmt, layer::SubscriberExt};

static WORKER_GUARD: Mutex<Option<WorkerGuard>> = Mutex::new(None);

fn filter(level: LogLevel) -> EnvFilter {
  EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_filter()))
}

/// Initialize structured logging.
///
/// With `logs_path` set, events are appended as JSON lines to that file
/// through a non-blocking writer; otherwise a compact formatter writes to
/// stderr. `RUST_LOG` takes precedence over `level`. Subsequent calls are
/// no-ops (the error from `set_global_default` is ignored).
pub fn init(logs_path: Option<&Path>, level: LogLevel) -> std::io::Result<()> {
  let Some(logs_path) = logs_path else {
    let layer = fmt::layer()
      .compact()
      .with_target(false)
      .with_writer(std::io::stderr);
    let _ = set_global_default(Registry::default().with(filter(level)).with(layer));
    return Ok(());
  };

  if let Some(parent) = logs_path.parent() {
    fs::create_dir_all(parent)?;
  }
  let file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(logs_path)?;

  // Keep the guard alive until `shutdown` so buffered lines flush.
  let (nb_writer, guard) = tracing_appender::non_blocking(file);
  if let Ok(mut slot) = WORKER_GUARD.lock() {
    slot.get_or_insert(guard);
  }

  let json_layer = fmt::layer()
    .with_timer(ChronoUtc::rfc_3339())
    .json()
    .with_current_span(true)
    .with_span_list(true)
    .with_level(true)
    .with_target(false)
    .with_thread_ids(false)
    .with_thread_names(false)
    .with_writer(move || nb_writer.clone());

  let _ = set_global_default(Registry::default().with(filter(level)).with(json_layer));

  info!(
    event = "logging_initialized",
    logs_path = %logs_path.display(),
    level = ?level,
    "logging initialized"
  );
  Ok(())
}

/// Flush buffered file logs. Call before `std::process::exit`, which skips
/// destructors. Events after this are dropped.
pub fn shutdown() {
  let guard = WORKER_GUARD.lock().ok().and_then(|mut slot| slot.take());
  drop(guard);
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;
  use std::{fs, thread, time::Duration};
  use tracing::info;

  #[test]
  fn writes_json_logs() {
    let td = tempfile::tempdir().unwrap();
    let log = td.path().join("logs").join("coproc.jsonl");

    init(Some(&log), LogLevel::Info).unwrap();
    info!(answer = 42, "hello world");

    // Allow background worker to flush
    thread::sleep(Duration::from_millis(50));

    let s = fs::read_to_string(&log).expect("read logs");
    let mut saw_init = false;
    let mut saw_event = false;
    for line in s.lines() {
      if let Ok(v) = serde_json::from_str::<Value>(line) {
        assert!(v.get("timestamp").is_some());
        assert!(v.get("level").is_some());
        let fields = v.get("fields");
        if fields.and_then(|f| f.get("event")).and_then(Value::as_str)
          == Some("logging_initialized")
        {
          saw_init = true;
        }
        if fields.and_then(|f| f.get("message")).and_then(Value::as_str) == Some("hello world") {
          saw_event = true;
        }
      }
    }
    assert!(saw_init, "missing logging_initialized event");
    assert!(saw_event, "missing hello world event");
  }
}
