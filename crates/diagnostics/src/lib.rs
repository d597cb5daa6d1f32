//! Lightweight structured logging shared by all swanlake crates.
//!
//! Controlled by the `SWANLAKE_LOG` environment variable:
//! - `off` (default) - no logs
//! - `info` - per-run materialization summaries
//! - `debug` - per-key and per-batch detail

use std::sync::Once;

// Re-export emit so macros can use it
pub use emit;

static INIT: Once = Once::new();

/// Initialize diagnostics based on the SWANLAKE_LOG environment variable.
///
/// Call once at startup. Safe to call repeatedly; later calls are ignored.
pub fn init_diagnostics() {
    INIT.call_once(|| {
        let log_level = std::env::var("SWANLAKE_LOG").unwrap_or_else(|_| "off".to_string());

        let level = match log_level.as_str() {
            "off" => return,
            "debug" => emit::Level::Debug,
            "info" => emit::Level::Info,
            "warn" => emit::Level::Warn,
            "error" => emit::Level::Error,
            _ => {
                eprintln!(
                    "Warning: Unknown SWANLAKE_LOG value '{}', using 'info'",
                    log_level
                );
                emit::Level::Info
            }
        };

        let rt = emit::setup()
            .emit_to(emit_term::stderr())
            .emit_when(emit::level::min_filter(level))
            .init();

        // The runtime must outlive every logging call site.
        std::mem::forget(rt);
    });
}

// Re-export emit's logging macros directly so that implicit template capture
// (e.g. `debug!("flushed {rows}")` referencing a local `rows`) resolves at the
// call site. Wrapping them in local `macro_rules!` forwarders breaks macro
// hygiene and the captured identifiers fail to resolve.
//
// - `info`: basic operations (cohort registration, materialization runs, inserts).
// - `debug`: detailed diagnostics (batch sizes, per-key row counts, dropped rows).
// - `warn`: recoverable issues (empty key domains, unparsable config values).
// - `error`: failures that abort a materialization call.
pub use emit::{debug, error, info, warn};

pub use init_diagnostics as init;
