//! Syscall filtering for -e trace= expressions
//!
//! Restricts which syscalls get handlers registered. Supports:
//! - Individual syscalls: -e trace=openat,read,close
//! - Syscall classes: -e trace=fd, -e trace=network, -e trace=io,
//!   -e trace=process, -e trace=sync

use anyhow::{bail, Result};
use std::collections::HashSet;

use crate::io::SyscallCategory;

/// Syscall filter that determines which syscalls to handle
#[derive(Debug, Clone, Default)]
pub struct SyscallFilter {
    /// Set of syscall names to include (None = all syscalls)
    include: Option<HashSet<String>>,
}

/// Categories making up a `trace=` class name
fn class_categories(class: &str) -> Option<&'static [SyscallCategory]> {
    match class {
        "fd" => Some(&[
            SyscallCategory::OpenFromDisk,
            SyscallCategory::Duplicate,
            SyscallCategory::Close,
        ]),
        "network" => Some(&[SyscallCategory::OpenFromNet]),
        "io" => Some(&[
            SyscallCategory::Read,
            SyscallCategory::Write,
            SyscallCategory::ReadWrite,
        ]),
        "process" => Some(&[SyscallCategory::Clone]),
        "sync" => Some(&[SyscallCategory::Sync]),
        _ => None,
    }
}

impl SyscallFilter {
    /// Create a filter that includes all syscalls
    pub fn all() -> Self {
        Self { include: None }
    }

    /// Parse a filter expression like "trace=openat,read" or "trace=io"
    pub fn from_expr(expr: &str) -> Result<Self> {
        if let Some(trace_spec) = expr.strip_prefix("trace=") {
            Self::from_trace_spec(trace_spec)
        } else {
            bail!(
                "Invalid filter expression: {}. Expected format: trace=SPEC",
                expr
            );
        }
    }

    /// Parse a trace specification (the part after "trace=")
    fn from_trace_spec(spec: &str) -> Result<Self> {
        let mut syscalls = HashSet::new();

        for part in spec.split(',') {
            let part = part.trim();
            if part.is_empty() {
                bail!("Empty syscall name in filter: trace={}", spec);
            }

            match class_categories(part) {
                Some(categories) => syscalls.extend(
                    categories
                        .iter()
                        .flat_map(|c| c.syscalls())
                        .map(|s| s.to_string()),
                ),
                // Individual syscall name
                None => {
                    syscalls.insert(part.to_string());
                }
            }
        }

        Ok(Self {
            include: Some(syscalls),
        })
    }

    /// Check if a syscall should be handled
    pub fn should_trace(&self, syscall_name: &str) -> bool {
        match &self.include {
            None => true,
            Some(set) => set.contains(syscall_name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_all_traces_everything() {
        let filter = SyscallFilter::all();
        assert!(filter.should_trace("openat"));
        assert!(filter.should_trace("write"));
        assert!(filter.should_trace("anything"));
        assert!(SyscallFilter::default().should_trace("clone"));
    }

    #[test]
    fn test_filter_individual_syscalls() {
        let filter = SyscallFilter::from_expr("trace=open,read,write").unwrap();
        assert!(filter.should_trace("open"));
        assert!(filter.should_trace("read"));
        assert!(filter.should_trace("write"));
        assert!(!filter.should_trace("close"));
    }

    #[test]
    fn test_filter_fd_class() {
        let filter = SyscallFilter::from_expr("trace=fd").unwrap();
        assert!(filter.should_trace("openat"));
        assert!(filter.should_trace("dup2"));
        assert!(filter.should_trace("fcntl"));
        assert!(filter.should_trace("close"));
        assert!(!filter.should_trace("read"));
        assert!(!filter.should_trace("socket"));
    }

    #[test]
    fn test_filter_network_class() {
        let filter = SyscallFilter::from_expr("trace=network").unwrap();
        assert!(filter.should_trace("socket"));
        assert!(filter.should_trace("connect"));
        assert!(filter.should_trace("accept4"));
        assert!(!filter.should_trace("open"));
    }

    #[test]
    fn test_filter_io_class() {
        let filter = SyscallFilter::from_expr("trace=io").unwrap();
        assert!(filter.should_trace("pread64"));
        assert!(filter.should_trace("sendmsg"));
        assert!(filter.should_trace("splice"));
        assert!(!filter.should_trace("fsync"));
    }

    #[test]
    fn test_filter_mixed() {
        let filter = SyscallFilter::from_expr("trace=fd, process,recvfrom").unwrap();
        assert!(filter.should_trace("open"));
        assert!(filter.should_trace("clone"));
        assert!(filter.should_trace("recvfrom"));
        assert!(!filter.should_trace("write"));
    }

    #[test]
    fn test_filter_sync_class() {
        let filter = SyscallFilter::from_expr("trace=sync").unwrap();
        assert!(filter.should_trace("fdatasync"));
        assert!(filter.should_trace("sync_file_range"));
        assert!(!filter.should_trace("close"));
    }

    #[test]
    fn test_invalid_expression() {
        assert!(SyscallFilter::from_expr("invalid").is_err());
        assert!(SyscallFilter::from_expr("trace=").is_err());
        assert!(SyscallFilter::from_expr("trace=read,,write").is_err());
    }
}
