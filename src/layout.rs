//! Tracer event layout
//!
//! Many kernel concepts are exported under different names depending on the
//! tracer (and its version). The layout tells the analysis which event names
//! and fields to look for.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Event and field names of one tracer
///
/// # Example TOML
/// ```toml
/// syscall_entry_prefix = "syscall_entry_"
/// syscall_exit_prefix = "syscall_exit_"
/// field_syscall_ret = "ret"
/// field_tid = "tid"
/// context_tid = "tid"
/// statedump_file_descriptor = "lttng_statedump_file_descriptor"
/// statedump_process_state = "lttng_statedump_process_state"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLayout {
    /// Prefix of syscall entry events (`syscall_entry_read`)
    pub syscall_entry_prefix: String,

    /// Prefix of syscall exit events (`syscall_exit_read`)
    pub syscall_exit_prefix: String,

    /// Field holding the syscall return value on exit events
    pub field_syscall_ret: String,

    /// Payload field naming the thread in process-state statedump events
    pub field_tid: String,

    /// Context field holding the thread that emitted the event
    #[serde(default = "default_context_tid")]
    pub context_tid: String,

    /// Statedump event describing an fd already open at trace start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statedump_file_descriptor: Option<String>,

    /// Statedump event describing a thread alive at trace start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statedump_process_state: Option<String>,
}

fn default_context_tid() -> String {
    "tid".to_string()
}

impl Default for EventLayout {
    fn default() -> Self {
        Self::lttng()
    }
}

impl EventLayout {
    /// Built-in LTTng kernel layout (lttng-modules 2.6 and later)
    pub fn lttng() -> Self {
        EventLayout {
            syscall_entry_prefix: "syscall_entry_".to_string(),
            syscall_exit_prefix: "syscall_exit_".to_string(),
            field_syscall_ret: "ret".to_string(),
            field_tid: "tid".to_string(),
            context_tid: default_context_tid(),
            statedump_file_descriptor: Some("lttng_statedump_file_descriptor".to_string()),
            statedump_process_state: Some("lttng_statedump_process_state".to_string()),
        }
    }

    /// Load a layout from a TOML file
    ///
    /// # Errors
    /// Returns error if the file cannot be read or is not a valid layout.
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read layout file: {}", path.as_ref().display())
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let layout: EventLayout =
            toml::from_str(content).context("Failed to parse TOML event layout")?;
        if layout.syscall_entry_prefix == layout.syscall_exit_prefix {
            anyhow::bail!(
                "Syscall entry and exit prefixes must differ (both are '{}')",
                layout.syscall_entry_prefix
            );
        }
        Ok(layout)
    }

    pub fn syscall_entry(&self, syscall: &str) -> String {
        format!("{}{}", self.syscall_entry_prefix, syscall)
    }

    pub fn syscall_exit(&self, syscall: &str) -> String {
        format!("{}{}", self.syscall_exit_prefix, syscall)
    }
}
