use fnv::FnvHashMap;
use serde::Serialize;

use super::accounting::Direction;
use super::fd_table::FdTable;
use super::handlers::{build_handler_table, Handler, Phase, SyscallCategory};
use super::pending::ThreadPending;
use super::{ATTRIBUTE_RESOURCES, UNKNOWN_FILE};
use crate::event::{ContextTidAspect, TidAspect, TraceEvent};
use crate::filter::SyscallFilter;
use crate::layout::EventLayout;
use crate::socket_family::socket_family;
use crate::state_system::{
    AttributePool, PoolStats, Quark, StateSystemBuilder, StateSystemError, StateValue,
};

/// `clone` flag: parent and child share one fd table
pub const CLONE_FILES: i64 = 0x400;

/// `fcntl` commands that duplicate the fd
const F_DUPFD: i64 = 0;
const F_DUPFD_CLOEXEC: i64 = 1030;

pub(super) const FIELD_FILENAME: &str = "filename";
pub(super) const FIELD_PID: &str = "pid";
pub(super) const FIELD_FD: &str = "fd";
pub(super) const FIELD_FILE_TABLE_ADDRESS: &str = "file_table_address";
const FIELD_OLDFD: &str = "oldfd";
const FIELD_FILDES: &str = "fildes";
const FIELD_CMD: &str = "cmd";
const FIELD_FD_IN: &str = "fd_in";
const FIELD_FD_OUT: &str = "fd_out";
const FIELD_IN_FD: &str = "in_fd";
const FIELD_OUT_FD: &str = "out_fd";
const FIELD_COUNT: &str = "count";
const FIELD_LEN: &str = "len";
const FIELD_SIZE: &str = "size";
const FIELD_CLONE_FLAGS: &str = "clone_flags";
const FIELD_V4ADDR: &str = "v4addr";
const FIELD_V6ADDR: &str = "v6addr";
const FIELD_FAMILY: &str = "family";

/// Name bound to fds returned by `socket`
const SOCKET_NAME: &str = "Socket";

/// Dispatch counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderStats {
    /// Events offered to the provider
    pub events: u64,
    /// Events dispatched to a handler
    pub handled: u64,
    /// Events with no registered handler
    pub ignored: u64,
    /// Events whose thread could not be resolved
    pub unresolved_tid: u64,
    /// Handlers that stopped on a store error
    pub errors: u64,
}

/// Turns kernel trace events into fd table and I/O history
///
/// Feed events in trace order through [`handle_event`](Self::handle_event).
/// Handler failures are logged and counted, they never interrupt the replay.
pub struct IoStateProvider {
    pub(super) layout: EventLayout,
    tid_aspect: Box<dyn TidAspect>,
    handlers: FnvHashMap<String, Handler>,
    pending: FnvHashMap<i32, ThreadPending>,
    /// Request slot pools, keyed by their `FDTBL/<id>/<fd>/<READ|WRITE>` base
    pub(super) pools: FnvHashMap<Quark, AttributePool>,
    /// Kernel file table address → table, learned from the statedump
    pub(super) fd_tbl_addresses: FnvHashMap<u64, FdTable>,
    /// Threads announced on each file table address
    pub(super) table_owners: FnvHashMap<u64, Vec<i32>>,
    pub(super) next_table_id: i32,
    stats: ProviderStats,
}

impl std::fmt::Debug for IoStateProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IoStateProvider")
            .field("handlers", &self.handlers.len())
            .field("tables", &self.next_table_id)
            .field("stats", &self.stats)
            .finish()
    }
}

impl IoStateProvider {
    /// Provider for `layout`, handling the syscalls accepted by `filter`
    pub fn new(layout: EventLayout, filter: &SyscallFilter) -> Self {
        let handlers = build_handler_table(&layout, filter);
        let tid_aspect = Box::new(ContextTidAspect::new(layout.context_tid.clone()));
        tracing::debug!("Registered {} event handlers", handlers.len());

        IoStateProvider {
            layout,
            tid_aspect,
            handlers,
            pending: FnvHashMap::default(),
            pools: FnvHashMap::default(),
            fd_tbl_addresses: FnvHashMap::default(),
            table_owners: FnvHashMap::default(),
            next_table_id: 0,
            stats: ProviderStats::default(),
        }
    }

    /// Replace the way the acting thread is resolved
    pub fn with_tid_aspect(mut self, aspect: Box<dyn TidAspect>) -> Self {
        self.tid_aspect = aspect;
        self
    }

    pub fn layout(&self) -> &EventLayout {
        &self.layout
    }

    /// Handler registered for an event name
    pub fn handler_for(&self, event_name: &str) -> Option<Handler> {
        self.handlers.get(event_name).copied()
    }

    pub fn stats(&self) -> &ProviderStats {
        &self.stats
    }

    /// Number of fd tables created so far
    pub fn table_count(&self) -> i32 {
        self.next_table_id
    }

    /// Reads and writes started but not yet settled
    pub fn requests_in_flight(&self) -> usize {
        self.pending
            .values()
            .map(|p| usize::from(p.read.is_some()) + usize::from(p.write.is_some()))
            .sum()
    }

    /// Combined statistics of every request slot pool
    pub fn pool_stats(&self) -> PoolStats {
        self.pools.values().map(AttributePool::stats).fold(
            PoolStats {
                slots: 0,
                available: 0,
                acquired: 0,
            },
            |total, stats| PoolStats {
                slots: total.slots + stats.slots,
                available: total.available + stats.available,
                acquired: total.acquired + stats.acquired,
            },
        )
    }

    /// Apply one event to the store
    pub fn handle_event(&mut self, ssb: &mut dyn StateSystemBuilder, event: &TraceEvent) {
        self.stats.events += 1;

        let Some(handler) = self.handler_for(&event.name) else {
            self.stats.ignored += 1;
            return;
        };
        let Some(tid) = self.tid_aspect.resolve(event) else {
            self.stats.unresolved_tid += 1;
            tracing::trace!("No thread for {} at {}", event.name, event.timestamp);
            return;
        };
        self.stats.handled += 1;

        let result = match handler {
            Handler::Syscall {
                category,
                syscall,
                phase,
            } => self.handle_syscall(ssb, event, tid, category, syscall, phase),
            Handler::StatedumpFileDescriptor => self.statedump_file_descriptor(ssb, event),
            Handler::StatedumpProcessState => self.statedump_process_state(ssb, event),
        };

        if let Err(e) = result {
            self.stats.errors += 1;
            tracing::error!(
                "{} (tid {}) at {}: {}",
                event.name,
                tid,
                event.timestamp,
                e
            );
        }
    }

    fn handle_syscall(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
        category: SyscallCategory,
        syscall: &'static str,
        phase: Phase,
    ) -> Result<(), StateSystemError> {
        match (category, phase) {
            (SyscallCategory::OpenFromDisk, Phase::Entry) => self.open_begin(ssb, event, tid),
            (SyscallCategory::OpenFromDisk, Phase::Exit) => self.open_end(ssb, event, tid),
            (SyscallCategory::OpenFromNet, Phase::Entry) => {
                self.net_begin(event, tid, syscall);
                Ok(())
            }
            (SyscallCategory::OpenFromNet, Phase::Exit) => {
                self.net_end(ssb, event, tid, syscall)
            }
            (SyscallCategory::Duplicate, Phase::Entry) => self.dup_begin(ssb, event, tid),
            (SyscallCategory::Duplicate, Phase::Exit) => self.dup_end(ssb, event, tid, syscall),
            // Flushes move no data the fd accounting can see
            (SyscallCategory::Sync, _) => Ok(()),
            (SyscallCategory::Read, Phase::Entry) => {
                self.rw_begin(ssb, event, tid, Direction::Read)
            }
            (SyscallCategory::Read, Phase::Exit) => self.rw_end(ssb, event, tid, Direction::Read),
            (SyscallCategory::Write, Phase::Entry) => {
                self.rw_begin(ssb, event, tid, Direction::Write)
            }
            (SyscallCategory::Write, Phase::Exit) => {
                self.rw_end(ssb, event, tid, Direction::Write)
            }
            (SyscallCategory::ReadWrite, Phase::Entry) => self.transfer_begin(ssb, event, tid),
            (SyscallCategory::ReadWrite, Phase::Exit) => self.transfer_end(ssb, event, tid),
            (SyscallCategory::Close, Phase::Entry) => self.close_begin(ssb, event, tid),
            (SyscallCategory::Close, Phase::Exit) => self.close_end(ssb, event, tid),
            (SyscallCategory::Clone, Phase::Entry) => {
                self.clone_begin(event, tid);
                Ok(())
            }
            (SyscallCategory::Clone, Phase::Exit) => self.clone_end(ssb, event, tid),
        }
    }

    pub(super) fn pending_mut(&mut self, tid: i32) -> &mut ThreadPending {
        self.pending.entry(tid).or_default()
    }

    /// Take one piece of pending state, dropping the thread entry once empty
    pub(super) fn take_pending<T>(
        &mut self,
        tid: i32,
        take: impl FnOnce(&mut ThreadPending) -> Option<T>,
    ) -> Option<T> {
        let pending = self.pending.get_mut(&tid)?;
        let value = take(pending);
        if pending.is_empty() {
            self.pending.remove(&tid);
        }
        value
    }

    fn syscall_ret(&self, event: &TraceEvent) -> Option<i64> {
        event.field_long(&self.layout.field_syscall_ret)
    }

    fn open_begin(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let filename = event.field_str(FIELD_FILENAME);
        self.pending_mut(tid).opening = Some(filename.unwrap_or(UNKNOWN_FILE).to_string());

        if let Some(filename) = filename {
            // Placeholder until the exit tells which fd the thread got
            let res =
                ssb.quark_absolute_and_add(&[ATTRIBUTE_RESOURCES, filename, &tid.to_string()]);
            ssb.modify_attribute(event.timestamp, StateValue::Long(0), res)?;
        }
        Ok(())
    }

    fn open_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let filename = self
            .take_pending(tid, |p| p.opening.take())
            .filter(|name| name != UNKNOWN_FILE);
        let Some(ret) = self.syscall_ret(event) else {
            return Ok(());
        };
        let time = event.timestamp;

        let Some(filename) = filename else {
            return if ret >= 0 {
                self.open_file(ssb, time, tid, ret, None)
            } else {
                Ok(())
            };
        };

        let res = ssb.quark_absolute_and_add(&[ATTRIBUTE_RESOURCES, &filename, &tid.to_string()]);
        if ret >= 0 {
            // The placeholder never was a real fd: the binding starts at `time`
            ssb.update_ongoing_state(StateValue::Null, res)?;
            return self.open_file(ssb, time, tid, ret, Some(&filename));
        }
        // Failed open: keep the error code on the placeholder, then clear it
        ssb.update_ongoing_state(StateValue::Long(ret), res)?;
        ssb.remove_attribute(time, res)
    }

    fn net_begin(&mut self, event: &TraceEvent, tid: i32, syscall: &str) {
        if syscall != "connect" {
            return;
        }
        let Some(fd) = event.field_long(FIELD_FD) else {
            return;
        };
        let address = socket_address(event);
        let pending = self.pending_mut(tid);
        pending.opening = Some(address);
        pending.connecting = Some(fd);
    }

    fn net_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
        syscall: &str,
    ) -> Result<(), StateSystemError> {
        let connection = if syscall == "connect" {
            self.take_pending(tid, |p| p.connecting.take().zip(p.opening.take()))
        } else {
            None
        };
        let Some(ret) = self.syscall_ret(event).filter(|ret| *ret >= 0) else {
            return Ok(());
        };
        let time = event.timestamp;

        match syscall {
            "socket" => self.open_file(ssb, time, tid, ret, Some(SOCKET_NAME)),
            "connect" => match connection {
                Some((fd, address)) => self.open_file(ssb, time, tid, fd, Some(&address)),
                None => Ok(()),
            },
            _ => {
                let address = socket_address(event);
                self.open_file(ssb, time, tid, ret, Some(&address))
            }
        }
    }

    fn dup_begin(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let old_fd = event
            .field_long(FIELD_OLDFD)
            .or_else(|| event.field_long(FIELD_FILDES))
            .or_else(|| {
                let cmd = event.field_long(FIELD_CMD)?;
                let fd = event.field_long(FIELD_FD)?;
                matches!(cmd, F_DUPFD | F_DUPFD_CLOEXEC).then_some(fd)
            });
        let Some(old_fd) = old_fd else {
            // Not a dup: drop whatever an earlier unfinished syscall left
            self.take_pending(tid, |p| p.opening.take());
            return Ok(());
        };

        let table = self.resolve_table(ssb, event.timestamp, tid)?;
        let name = ssb
            .opt_quark_relative(table.quark, &old_fd.to_string())
            .and_then(|quark| ssb.query_ongoing(quark).as_str().map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_FILE.to_string());
        self.pending_mut(tid).opening = Some(name);
        Ok(())
    }

    fn dup_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
        syscall: &str,
    ) -> Result<(), StateSystemError> {
        let filename = self.take_pending(tid, |p| p.opening.take());
        let Some(new_fd) = self.syscall_ret(event).filter(|ret| *ret >= 0) else {
            return Ok(());
        };
        // Any other fcntl command returns a non-fd value
        if syscall == "fcntl" && filename.is_none() {
            return Ok(());
        }

        let time = event.timestamp;
        self.close_file(ssb, time, tid, new_fd)?;
        let filename = filename.filter(|name| name != UNKNOWN_FILE);
        self.open_file(ssb, time, tid, new_fd, filename.as_deref())
    }

    fn rw_begin(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
        direction: Direction,
    ) -> Result<(), StateSystemError> {
        let Some(fd) = event.field_long(FIELD_FD) else {
            return Ok(());
        };
        let count = event
            .field_long(FIELD_COUNT)
            .or_else(|| event.field_long(FIELD_LEN))
            .or_else(|| event.field_long(FIELD_SIZE))
            .unwrap_or(0);
        self.start_rw_fd(ssb, event.timestamp, tid, fd, count, direction)
    }

    fn rw_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
        direction: Direction,
    ) -> Result<(), StateSystemError> {
        let count = self.syscall_ret(event).unwrap_or(0);
        self.settle_rw_fd(ssb, event.timestamp, tid, count, direction)
    }

    fn transfer_begin(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let fd_in = event
            .field_long(FIELD_FD_IN)
            .or_else(|| event.field_long(FIELD_IN_FD));
        let fd_out = event
            .field_long(FIELD_FD_OUT)
            .or_else(|| event.field_long(FIELD_OUT_FD));
        let (Some(fd_in), Some(fd_out)) = (fd_in, fd_out) else {
            return Ok(());
        };

        let time = event.timestamp;
        self.start_rw_fd(ssb, time, tid, fd_in, 0, Direction::Read)?;
        self.start_rw_fd(ssb, time, tid, fd_out, 0, Direction::Write)
    }

    fn transfer_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let count = self.syscall_ret(event).unwrap_or(0);
        let time = event.timestamp;
        let read = self.settle_rw_fd(ssb, time, tid, count, Direction::Read);
        let write = self.settle_rw_fd(ssb, time, tid, count, Direction::Write);
        read.and(write)
    }

    fn close_begin(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let Some(fd) = event.field_long(FIELD_FD) else {
            return Ok(());
        };
        if self.is_valid_fd(ssb, event.timestamp, tid, fd)? {
            self.pending_mut(tid).closing = Some(fd);
        }
        Ok(())
    }

    fn close_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let fd = self.take_pending(tid, |p| p.closing.take());
        match (fd, self.syscall_ret(event)) {
            (Some(fd), Some(ret)) if ret >= 0 => self.close_file(ssb, event.timestamp, tid, fd),
            _ => Ok(()),
        }
    }

    fn clone_begin(&mut self, event: &TraceEvent, tid: i32) {
        if let Some(flags) = event.field_long(FIELD_CLONE_FLAGS) {
            self.pending_mut(tid).cloning = Some(flags & CLONE_FILES != 0);
        }
    }

    fn clone_end(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
        tid: i32,
    ) -> Result<(), StateSystemError> {
        let share = self.take_pending(tid, |p| p.cloning.take());
        let (Some(share), Some(ret)) = (share, self.syscall_ret(event)) else {
            return Ok(());
        };
        // 0 in the child, negative on failure
        let Some(child) = i32::try_from(ret).ok().filter(|child| *child > 0) else {
            return Ok(());
        };

        let time = event.timestamp;
        let parent_table = self.resolve_table(ssb, time, tid)?;
        if share {
            return self.link_table(ssb, time, child, parent_table);
        }

        let child_table = self.resolve_table(ssb, time, child)?;
        for fd_quark in ssb.sub_attributes(parent_table.quark) {
            let value = ssb.query_ongoing(fd_quark);
            if value.is_null() {
                continue;
            }
            let fd = ssb.attribute_name(fd_quark).to_string();
            let child_fd = ssb.quark_relative_and_add(child_table.quark, &fd);
            ssb.modify_attribute(time, value, child_fd)?;
        }
        Ok(())
    }
}

/// `"<address>: <family>"` description of a socket endpoint
///
/// IPv4 addresses are dot-separated, IPv6 groups colon-separated in hex.
fn socket_address(event: &TraceEvent) -> String {
    let join = |values: &[i64], separator: &str, hex: bool| {
        values
            .iter()
            .map(|v| if hex { format!("{:x}", v) } else { v.to_string() })
            .collect::<Vec<_>>()
            .join(separator)
    };

    let address = match (
        event.field_array(FIELD_V4ADDR).filter(|a| !a.is_empty()),
        event.field_array(FIELD_V6ADDR).filter(|a| !a.is_empty()),
    ) {
        (Some(v4), _) => join(v4, ".", false),
        (None, Some(v6)) => join(v6, ":", true),
        (None, None) => UNKNOWN_FILE.to_string(),
    };
    let family = event.field_long(FIELD_FAMILY).unwrap_or(-1);
    format!("{}: {}", address, socket_family(family))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_address_v4() {
        let event = TraceEvent::new("syscall_entry_connect", 1)
            .with_field(FIELD_V4ADDR, vec![127i64, 0, 0, 1])
            .with_field(FIELD_FAMILY, 2i64);
        assert_eq!(socket_address(&event), "127.0.0.1: AF_INET");
    }

    #[test]
    fn test_socket_address_v6() {
        let event = TraceEvent::new("syscall_exit_accept", 1)
            .with_field(FIELD_V6ADDR, vec![0xfe80i64, 0, 0, 0, 0, 0, 0, 1])
            .with_field(FIELD_FAMILY, 10i64);
        assert_eq!(socket_address(&event), "fe80:0:0:0:0:0:0:1: AF_INET6");
    }

    #[test]
    fn test_socket_address_without_address() {
        let event = TraceEvent::new("syscall_exit_accept", 1).with_field(FIELD_FAMILY, 1i64);
        assert_eq!(socket_address(&event), "<unknown>: AF_UNIX");

        let event = TraceEvent::new("syscall_exit_accept", 1);
        assert_eq!(socket_address(&event), "<unknown>: unknown");
    }
}
