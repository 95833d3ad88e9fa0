//! Per-thread summary of a replayed trace
//!
//! `--format json` and the default text output both render a [`Report`].

use serde::{Deserialize, Serialize};
use std::fmt::Write;

use crate::io::ProviderStats;
use crate::query;
use crate::state_system::{StateSystem, StateSystemBuilder};

/// An fd bound at report time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenFd {
    pub fd: i64,
    pub name: String,
}

/// One thread's state at report time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadReport {
    pub tid: i32,
    /// fd table in use, absent before the thread's first fd operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fd_table: Option<i32>,
    pub read_bytes: i64,
    pub write_bytes: i64,
    pub open_fds: Vec<OpenFd>,
}

/// Replay statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    pub events: u64,
    pub handled: u64,
    pub ignored: u64,
    pub unresolved_tid: u64,
    pub errors: u64,
    pub attributes: usize,
}

/// Root report structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Format version identifier
    pub version: String,
    /// Format name
    pub format: String,
    /// Time the report describes (ns)
    pub time: i64,
    pub threads: Vec<ThreadReport>,
    pub stats: ReportStats,
}

impl Report {
    /// Summarize every thread of `ss` at `time`
    pub fn build(ss: &StateSystem, stats: &ProviderStats, time: i64) -> Self {
        let threads = query::threads(ss)
            .into_iter()
            .map(|tid| ThreadReport {
                tid,
                fd_table: query::fd_table_at(ss, tid, time),
                read_bytes: query::bytes_read_at(ss, tid, time),
                write_bytes: query::bytes_written_at(ss, tid, time),
                open_fds: query::open_fds_at(ss, tid, time)
                    .into_iter()
                    .map(|(fd, name)| OpenFd { fd, name })
                    .collect(),
            })
            .collect();

        Report {
            version: env!("CARGO_PKG_VERSION").to_string(),
            format: "fdtrail-json-v1".to_string(),
            time,
            threads,
            stats: ReportStats {
                events: stats.events,
                handled: stats.handled,
                ignored: stats.ignored,
                unresolved_tid: stats.unresolved_tid,
                errors: stats.errors,
                attributes: ss.attribute_count(),
            },
        }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Human-readable rendering
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "State at {} ns", self.time);

        for thread in &self.threads {
            let table = thread
                .fd_table
                .map_or_else(|| "-".to_string(), |id| id.to_string());
            let _ = writeln!(
                out,
                "\ntid {:<8} fd table {:<4} read {:>12} B  written {:>12} B",
                thread.tid, table, thread.read_bytes, thread.write_bytes
            );
            for open in &thread.open_fds {
                let _ = writeln!(out, "  {:>5}  {}", open.fd, open.name);
            }
        }

        let _ = writeln!(
            out,
            "\n{} events, {} handled, {} ignored, {} without thread, {} errors",
            self.stats.events,
            self.stats.handled,
            self.stats.ignored,
            self.stats.unresolved_tid,
            self.stats.errors
        );
        out
    }
}

/// Every attribute with a non-null value at `time`, one `path = value` per
/// line, in creation order
pub fn dump_state(ss: &StateSystem, time: i64) -> String {
    let mut out = String::new();
    for quark in ss.quarks() {
        let value = ss.query_value(time, quark);
        if value.is_null() {
            continue;
        }
        let _ = writeln!(out, "{} = {}", ss.full_attribute_path(quark), value);
    }
    out
}
