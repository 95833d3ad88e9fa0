//! I/O state provider: per-thread file descriptor tables and read/write history
//!
//! Replays syscall entry/exit, clone and statedump events in trace order and
//! records the result in a [`StateSystemBuilder`](crate::state_system::StateSystemBuilder)
//! under three root attributes:
//!
//! ```text
//! TID
//!  | - <tid>
//!       | - FDTBL     -> id of the fd table used by the thread (int)
//!       | - READ      -> bytes read so far by the thread
//!             | - CURRENT  -> bytes requested by the request in flight
//!             | - FD       -> fd of the request in flight
//!       | - WRITE     -> bytes written so far by the thread
//!             | - CURRENT
//!             | - FD
//! FDTBL
//!  | - <table id>
//!       | - <fd>      -> resource name
//!             | - READ     -> bytes read through this fd
//!                  | - <pool slot> -> bytes of one request in flight
//!             | - WRITE    -> bytes written through this fd
//!                  | - <pool slot>
//! RES
//!  | - <resource name>
//!       | - <tid>     -> fd the thread has the resource open on
//!             | - OPERATION -> "READ" or "WRITE" while a request is in flight
//! ```
//!
//! fd tables live under their own root because threads created with
//! `CLONE_FILES` share one table: each thread only holds a link to it.
//!
//! A resource opened twice by the same thread on two fds has a single entry
//! under `RES/<name>/<tid>`; the entry follows the latest open/close.

mod accounting;
mod fd_table;
mod handlers;
mod pending;
mod provider;
mod statedump;

pub use accounting::Direction;
pub use fd_table::FdTable;
pub use handlers::{Handler, Phase, SyscallCategory};
pub use provider::{IoStateProvider, ProviderStats, CLONE_FILES};

/// Per-thread root attribute
pub const ATTRIBUTE_TID: &str = "TID";
/// Resources root attribute
pub const ATTRIBUTE_RESOURCES: &str = "RES";
/// fd table root attribute, and the per-thread link to it
pub const ATTRIBUTE_FDTBL: &str = "FDTBL";
/// Read totals
pub const ATTRIBUTE_READ: &str = "READ";
/// Write totals
pub const ATTRIBUTE_WRITE: &str = "WRITE";
/// Amount of data of the request in flight
pub const ATTRIBUTE_CURRENT: &str = "CURRENT";
/// fd of the request in flight
pub const ATTRIBUTE_FD: &str = "FD";
/// Operation in flight on a resource
pub const ATTRIBUTE_OPERATION: &str = "OPERATION";

/// Name bound to an fd whose target is not known
pub const UNKNOWN_FILE: &str = "<unknown>";
