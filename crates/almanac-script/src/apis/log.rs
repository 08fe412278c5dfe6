//! `log` capability set: script logging routed through `tracing`.

use crate::capability::{CapabilitySet, ParamType};
use crate::error::RuntimeResult;
use crate::value::NativeValue;

/// Log level for script logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    const ALL: [(&'static str, LogLevel); 5] = [
        ("trace", LogLevel::Trace),
        ("debug", LogLevel::Debug),
        ("info", LogLevel::Info),
        ("warn", LogLevel::Warn),
        ("error", LogLevel::Error),
    ];

    fn emit(self, message: &str) {
        match self {
            LogLevel::Trace => tracing::trace!(target: "script", "{}", message),
            LogLevel::Debug => tracing::debug!(target: "script", "{}", message),
            LogLevel::Info => tracing::info!(target: "script", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "script", "{}", message),
            LogLevel::Error => tracing::error!(target: "script", "{}", message),
        }
    }
}

/// Join variadic arguments the way Lua's `print` does.
fn render(args: &[NativeValue]) -> String {
    let parts = args
        .first()
        .and_then(NativeValue::as_sequence)
        .unwrap_or_default();
    parts
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Build the `log` capability set.
///
/// `log.trace/debug/info/warn/error(...)` log their arguments separated by
/// spaces. `log.nowMillis()` returns the current epoch time in milliseconds.
pub fn log_api() -> RuntimeResult<CapabilitySet> {
    let mut builder = CapabilitySet::builder("log");
    for (name, level) in LogLevel::ALL {
        builder = builder.function(name, [ParamType::Rest], move |args| {
            level.emit(&render(&args));
            Ok(NativeValue::Absent)
        });
    }
    builder
        .function("nowMillis", [], |_| {
            Ok(NativeValue::Integer(chrono::Utc::now().timestamp_millis()))
        })
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_joins_arguments() {
        let args = vec![NativeValue::Sequence(vec![
            "count".into(),
            3.into(),
            true.into(),
        ])];
        assert_eq!(render(&args), "count 3 true");
    }

    #[test]
    fn test_levels_accept_anything() {
        let api = log_api().unwrap();
        for (name, _) in LogLevel::ALL {
            assert_eq!(api.call(name, vec!["msg".into(), 1.into()]).unwrap(), NativeValue::Absent);
            assert_eq!(api.call(name, vec![]).unwrap(), NativeValue::Absent);
        }
    }

    #[test]
    fn test_now_millis() {
        let api = log_api().unwrap();
        let now = api.call("nowMillis", vec![]).unwrap();
        assert!(now.as_i64().unwrap() > 0);
    }
}
