//! Structured logging utilities for the XR overlay layer.
//!
//! Provides consistent logging with component prefixes and structured fields.
//!
//! # Usage
//!
//! ```ignore
//! use xrov_config::{log_rpc_error, log_handle_warn};
//!
//! log_rpc_error!("Main process did not answer", request = "CreateSwapchain");
//! log_handle_warn!("Destroy called twice", handle = 0x1234u64);
//! ```

use std::str::FromStr;

/// Component identifiers for log filtering
pub struct Component;

impl Component {
    pub const LAYER: &'static str = "LAYER";
    pub const RPC: &'static str = "RPC";
    pub const CHAIN: &'static str = "CHAIN";
    pub const HANDLE: &'static str = "HANDLE";
    pub const IPC: &'static str = "IPC";
    pub const HOST: &'static str = "HOST";
}

/// Log levels for runtime configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// === LAYER logging macros (trampolines) ===

#[macro_export]
macro_rules! log_layer_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "LAYER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_layer_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "LAYER", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_layer_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "LAYER", $($key = $value,)* $msg)
    };
}

// === RPC logging macros ===

#[macro_export]
macro_rules! log_rpc_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "RPC", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_rpc_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "RPC", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_rpc_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "RPC", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_rpc_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "RPC", $($key = $value,)* $msg)
    };
}

// === CHAIN logging macros (copy, free, marshal, substitute) ===

#[macro_export]
macro_rules! log_chain_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "CHAIN", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_chain_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "CHAIN", $($key = $value,)* $msg)
    };
}

// === HANDLE logging macros ===

#[macro_export]
macro_rules! log_handle_error {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::error!(component = "HANDLE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_handle_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "HANDLE", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_handle_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "HANDLE", $($key = $value,)* $msg)
    };
}

// === IPC logging macros ===

#[macro_export]
macro_rules! log_ipc_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "IPC", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_ipc_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "IPC", $($key = $value,)* $msg)
    };
}

// === HOST logging macros (main process serving overlays) ===

#[macro_export]
macro_rules! log_host_warn {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::warn!(component = "HOST", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_host_info {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::info!(component = "HOST", $($key = $value,)* $msg)
    };
}

#[macro_export]
macro_rules! log_host_debug {
    ($msg:literal $(, $key:ident = $value:expr)* $(,)?) => {
        tracing::debug!(component = "HOST", $($key = $value,)* $msg)
    };
}

/// Initialize logging with the given level filter.
/// Call this once at application startup.
pub fn init_logging(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = match level {
        LogLevel::Error => "error",
        LogLevel::Warn => "warn",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
        LogLevel::Trace => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // A host application may already own the global subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

/// Initialize logging from the `[logging]` section of the loaded config.
pub fn init_from_config(config: &crate::Config) {
    init_logging(config.logging.level.parse().unwrap_or(LogLevel::Info));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_constants() {
        assert_eq!(Component::LAYER, "LAYER");
        assert_eq!(Component::RPC, "RPC");
        assert_eq!(Component::HANDLE, "HANDLE");
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("warn".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!("TRACE".parse::<LogLevel>(), Ok(LogLevel::Trace));
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
