//! Raw IPC frame tracing
//!
//! `EDITOR_PRESENCE_DEBUG=1` prints every frame the IPC client sends and
//! receives to stderr, separate from the `log` output. The variable is read
//! once per process.

use std::sync::OnceLock;

const DEBUG_ENV: &str = "EDITOR_PRESENCE_DEBUG";

static DEBUG_ENABLED: OnceLock<bool> = OnceLock::new();

#[doc(hidden)]
pub fn is_debug_enabled() -> bool {
    *DEBUG_ENABLED.get_or_init(|| flag_enabled(std::env::var(DEBUG_ENV).ok().as_deref()))
}

fn flag_enabled(value: Option<&str>) -> bool {
    matches!(value.map(str::trim), Some("1") | Some("true"))
}

/// Trace one line of IPC traffic when frame tracing is on
#[macro_export]
macro_rules! debug_println {
    ($($arg:tt)*) => {
        if $crate::macros::is_debug_enabled() {
            eprintln!("[editor-presence ipc] {}", format_args!($($arg)*));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::flag_enabled;

    #[test]
    fn tracing_flag_values() {
        assert!(flag_enabled(Some("1")));
        assert!(flag_enabled(Some("true")));
        assert!(flag_enabled(Some(" 1\n")));
        assert!(!flag_enabled(Some("0")));
        assert!(!flag_enabled(Some("")));
        assert!(!flag_enabled(None));
    }
}
