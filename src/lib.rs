//! fdtrail - file descriptor and I/O history from kernel traces
//!
//! Replays syscall and statedump events from a kernel trace into a
//! time-indexed attribute store, then answers questions such as "which file
//! did thread T have on fd 7 at time X" or "how many bytes had T read by X".
//!
//! ```
//! use fdtrail::event::TraceEvent;
//! use fdtrail::query;
//! use fdtrail::replay::{replay_events, ReplayConfig};
//!
//! let events = vec![
//!     TraceEvent::new("syscall_entry_openat", 10)
//!         .with_context("tid", 42i64)
//!         .with_field("filename", "/tmp/a"),
//!     TraceEvent::new("syscall_exit_openat", 11)
//!         .with_context("tid", 42i64)
//!         .with_field("ret", 5i64),
//! ];
//! let outcome = replay_events(&events, &ReplayConfig::default());
//! assert_eq!(query::file_at(&outcome.state, 42, 5, 11).as_deref(), Some("/tmp/a"));
//! ```

pub mod cli;
pub mod event;
pub mod filter;
pub mod io;
pub mod layout;
pub mod query;
pub mod replay;
pub mod report;
pub mod socket_family;
pub mod state_system;
