//! Stack trace capture for wrapped errors.

use std::fmt::Write;

/// Frames belonging to the capture machinery and the wrap entry points.
/// Leading frames matching these are dropped so the trace starts at the
/// code that asked for the error to be wrapped.
const INTERNAL_FRAMES: &[&str] = &[
    "backtrace::",
    "error_id::stack::capture",
    "error_id::handler::Handler::wrap",
    "error_id::handler::Handler>::wrap",
    "error_id::facade::wrap",
    "error_id::context::WithErrorId",
    "core::result::Result",
];

/// Captures the current call stack, starting at the caller of the wrap.
pub(crate) fn capture() -> String {
    let trace = backtrace::Backtrace::new();
    let mut out = String::new();
    let mut skipping = true;

    for frame in trace.frames() {
        for symbol in frame.symbols() {
            let name = symbol
                .name()
                .map(|n| format!("{:#}", n))
                .unwrap_or_else(|| "<unknown>".to_string());

            if skipping && is_internal(&name) {
                continue;
            }
            skipping = false;

            let _ = writeln!(out, "{}", name);
            if let (Some(file), Some(line)) = (symbol.filename(), symbol.lineno()) {
                let _ = writeln!(out, "    at {}:{}", file.display(), line);
            }
        }
    }

    out
}

fn is_internal(name: &str) -> bool {
    INTERNAL_FRAMES.iter().any(|prefix| name.contains(prefix))
}
