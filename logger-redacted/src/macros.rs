// Logging macros

/// Log free text at info level as a `preview` field shaped by a
/// [`LoggerConfig`](crate::LoggerConfig): redacted when `redaction_enabled`,
/// cut to `preview_chars` either way.
///
/// Remaining arguments are the usual `tracing` fields and message.
#[macro_export]
macro_rules! redacted_info {
    ($config:expr, $text:expr, $($arg:tt)*) => {
        $crate::tracing::info!(preview = %$crate::LoggerConfig::preview(&$config, $text), $($arg)*)
    };
}

#[macro_export]
macro_rules! redacted_debug {
    ($config:expr, $text:expr, $($arg:tt)*) => {
        $crate::tracing::debug!(preview = %$crate::LoggerConfig::preview(&$config, $text), $($arg)*)
    };
}
