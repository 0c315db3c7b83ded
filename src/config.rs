//! Dual connection configuration
//!
//! JSON file, every field optional:
//!
//! ```json
//! {
//!   "replay_pending_on_rebind": false,
//!   "trace_decisions": false,
//!   "isolated_circuit_breaker": false,
//!   "log_level": "warn"
//! }
//! ```
//!
//! Without `log_level` the process-wide log level is left alone.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{DualConnectionError, DualResult};
use crate::internal::StatementRouting;
use crate::observability::{log_event_with_fields, Event, Severity};

/// Routing and logging settings of a dual connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DualConnectionConfig {
    /// Re-apply flushed statement settings when a statement moves from its
    /// read-path to its write-path physical statement (default: false)
    #[serde(default)]
    pub replay_pending_on_rebind: bool,

    /// Log every route decision at TRACE (default: false)
    #[serde(default)]
    pub trace_decisions: bool,

    /// Give the connection its own circuit breaker instead of the
    /// process-wide one (default: false)
    #[serde(default)]
    pub isolated_circuit_breaker: bool,

    /// Process-wide minimum log severity: trace, info, warn or error
    /// (default: unset, keep the current level)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

impl Default for DualConnectionConfig {
    fn default() -> Self {
        Self {
            replay_pending_on_rebind: false,
            trace_decisions: false,
            isolated_circuit_breaker: false,
            log_level: None,
        }
    }
}

impl DualConnectionConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> DualResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| DualConnectionError::config(format!("Failed to read config: {}", e)))?;

        let config = Self::from_json(&content)?;

        let display = path.display().to_string();
        log_event_with_fields(
            Event::ConfigLoaded,
            &[
                ("path", display.as_str()),
                ("log_level", config.log_level.as_deref().unwrap_or("unset")),
            ],
        );

        Ok(config)
    }

    /// Parse and validate configuration from a JSON string
    pub fn from_json(content: &str) -> DualResult<Self> {
        let config: DualConnectionConfig = serde_json::from_str(content)
            .map_err(|e| DualConnectionError::config(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> DualResult<()> {
        if let Some(level) = &self.log_level {
            if Severity::parse(level).is_none() {
                return Err(DualConnectionError::config(format!(
                    "Invalid log_level: '{}'. Expected trace, info, warn or error.",
                    level
                )));
            }
        }
        Ok(())
    }

    /// Configured minimum severity, if a valid level is set.
    pub fn severity(&self) -> Option<Severity> {
        self.log_level.as_deref().and_then(Severity::parse)
    }

    pub(crate) fn statement_routing(&self) -> StatementRouting {
        StatementRouting {
            replay_on_rebind: self.replay_pending_on_rebind,
            trace_decisions: self.trace_decisions,
        }
    }
}
