//! Kernel trace events and trace file loading
//!
//! A trace is a JSON-lines file, one event per line:
//!
//! ```text
//! {"name":"syscall_entry_read","timestamp":1200,"context":{"tid":42},"fields":{"fd":5,"count":100}}
//! ```
//!
//! Blank lines and lines starting with `#` are ignored.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Value of an event payload or context field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Integer(i64),
    /// Values above `i64::MAX`, e.g. kernel addresses
    Unsigned(u64),
    Text(String),
    Array(Vec<i64>),
}

/// One trace event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Full event name, including any syscall entry/exit prefix
    pub name: String,
    /// Timestamp in nanoseconds
    pub timestamp: i64,
    /// Per-event context (tid, cpu, procname...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, FieldValue>,
    /// Event payload
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, FieldValue>,
}

impl TraceEvent {
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        TraceEvent {
            name: name.into(),
            timestamp,
            context: BTreeMap::new(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder helper: add a payload field
    pub fn with_field(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Builder helper: add a context field
    pub fn with_context(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.context.insert(name.to_string(), value.into());
        self
    }

    /// Parse a single JSON line
    pub fn from_json_line(line: &str) -> Result<Self> {
        serde_json::from_str(line).context("Failed to parse trace event")
    }

    /// Signed integer payload field
    pub fn field_long(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_long)
    }

    /// Unsigned payload field, for addresses
    pub fn field_unsigned(&self, name: &str) -> Option<u64> {
        self.fields.get(name).and_then(FieldValue::as_unsigned)
    }

    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(FieldValue::as_str)
    }

    pub fn field_array(&self, name: &str) -> Option<&[i64]> {
        self.fields.get(name).and_then(FieldValue::as_array)
    }

    /// Signed integer context field
    pub fn context_long(&self, name: &str) -> Option<i64> {
        self.context.get(name).and_then(FieldValue::as_long)
    }
}

impl FieldValue {
    pub fn as_long(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(v) => Some(*v),
            // Same bit pattern: kernel code stores these as long too
            FieldValue::Unsigned(v) => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            FieldValue::Integer(v) => Some(*v as u64),
            FieldValue::Unsigned(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[i64]> {
        match self {
            FieldValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Integer(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Integer(i64::from(v))
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        i64::try_from(v).map_or(FieldValue::Unsigned(v), FieldValue::Integer)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(values: Vec<i64>) -> Self {
        FieldValue::Array(values)
    }
}

/// Resolves the thread responsible for an event
///
/// Different tracers expose the acting thread differently; returning `None`
/// makes the event a no-op for the analysis.
pub trait TidAspect {
    fn resolve(&self, event: &TraceEvent) -> Option<i32>;
}

/// Reads the tid from a context field (`context._tid` in LTTng)
#[derive(Debug, Clone)]
pub struct ContextTidAspect {
    field: String,
}

impl ContextTidAspect {
    pub fn new(field: impl Into<String>) -> Self {
        ContextTidAspect {
            field: field.into(),
        }
    }
}

impl TidAspect for ContextTidAspect {
    fn resolve(&self, event: &TraceEvent) -> Option<i32> {
        event
            .context_long(&self.field)
            .and_then(|tid| i32::try_from(tid).ok())
    }
}

/// Load every event of a JSON-lines trace file, in file order
pub fn read_trace<P: AsRef<Path>>(path: P) -> Result<Vec<TraceEvent>> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open trace file: {}", path.display()))?;
    parse_trace(BufReader::new(file))
        .with_context(|| format!("Failed to read trace file: {}", path.display()))
}

/// Parse JSON-lines events from any buffered reader
pub fn parse_trace<R: BufRead>(reader: R) -> Result<Vec<TraceEvent>> {
    let mut events = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = TraceEvent::from_json_line(line)
            .with_context(|| format!("Invalid event at line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_event_line() {
        let event = TraceEvent::from_json_line(
            r#"{"name":"syscall_entry_openat","timestamp":100,"context":{"tid":42},"fields":{"filename":"/tmp/a","flags":0}}"#,
        )
        .unwrap();
        assert_eq!(event.name, "syscall_entry_openat");
        assert_eq!(event.timestamp, 100);
        assert_eq!(event.field_str("filename"), Some("/tmp/a"));
        assert_eq!(event.field_long("flags"), Some(0));
        assert_eq!(event.context_long("tid"), Some(42));
        assert_eq!(event.field_long("missing"), None);
    }

    #[test]
    fn test_fields_are_optional() {
        let event = TraceEvent::from_json_line(r#"{"name":"sched_switch","timestamp":5}"#).unwrap();
        assert!(event.fields.is_empty());
        assert!(event.context.is_empty());
    }

    #[test]
    fn test_kernel_address_field() {
        let event = TraceEvent::from_json_line(
            r#"{"name":"x","timestamp":1,"fields":{"file_table_address":18446612688467237888}}"#,
        )
        .unwrap();
        assert_eq!(
            event.field_unsigned("file_table_address"),
            Some(18446612688467237888)
        );
    }

    #[test]
    fn test_array_field() {
        let event = TraceEvent::new("x", 1).with_field("v4addr", vec![127i64, 0, 0, 1]);
        assert_eq!(event.field_array("v4addr"), Some(&[127, 0, 0, 1][..]));
        assert_eq!(event.field_long("v4addr"), None);
    }

    #[test]
    fn test_context_tid_aspect() {
        let aspect = ContextTidAspect::new("tid");
        let event = TraceEvent::new("x", 1).with_context("tid", 7i64);
        assert_eq!(aspect.resolve(&event), Some(7));
        assert_eq!(aspect.resolve(&TraceEvent::new("x", 1)), None);

        let too_big = TraceEvent::new("x", 1).with_context("tid", i64::MAX);
        assert_eq!(aspect.resolve(&too_big), None);
    }

    #[test]
    fn test_parse_trace_skips_comments_and_blanks() {
        let input = "# header\n\n{\"name\":\"a\",\"timestamp\":1}\n{\"name\":\"b\",\"timestamp\":2}\n";
        let events = parse_trace(input.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].name, "b");
    }

    #[test]
    fn test_parse_trace_reports_line_number() {
        let input = "{\"name\":\"a\",\"timestamp\":1}\nnot json\n";
        let err = parse_trace(input.as_bytes()).unwrap_err();
        assert!(format!("{:#}", err).contains("line 2"));
    }
}
