use crate::filter::SyscallFilter;
use crate::layout::EventLayout;
use fnv::FnvHashMap;

/// Group of syscalls sharing one pair of entry/exit handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyscallCategory {
    /// Files opened by path
    OpenFromDisk,
    /// Sockets created, accepted or connected
    OpenFromNet,
    /// fd duplication
    Duplicate,
    /// Flushes; not accounted
    Sync,
    Read,
    Write,
    /// One fd read, another written, in a single call
    ReadWrite,
    Close,
    Clone,
}

impl SyscallCategory {
    pub const ALL: [SyscallCategory; 9] = [
        SyscallCategory::OpenFromDisk,
        SyscallCategory::OpenFromNet,
        SyscallCategory::Duplicate,
        SyscallCategory::Sync,
        SyscallCategory::Read,
        SyscallCategory::Write,
        SyscallCategory::ReadWrite,
        SyscallCategory::Close,
        SyscallCategory::Clone,
    ];

    /// Syscall names (without tracer prefix) handled by this category
    pub fn syscalls(self) -> &'static [&'static str] {
        match self {
            SyscallCategory::OpenFromDisk => &["open", "openat"],
            SyscallCategory::OpenFromNet => &["socket", "accept", "accept4", "connect"],
            SyscallCategory::Duplicate => &["fcntl", "dup", "dup2", "dup3"],
            SyscallCategory::Sync => &["sync", "sync_file_range", "fsync", "fdatasync"],
            SyscallCategory::Read => &[
                "read", "recvmsg", "recvfrom", "readv", "pread", "pread64", "preadv",
            ],
            SyscallCategory::Write => &[
                "write", "sendmsg", "sendto", "writev", "pwrite", "pwrite64", "pwritev",
            ],
            SyscallCategory::ReadWrite => &["splice", "sendfile64"],
            SyscallCategory::Close => &["close"],
            SyscallCategory::Clone => &["clone"],
        }
    }
}

/// Syscall half an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Entry,
    Exit,
}

/// What to do with an event, resolved once from its name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handler {
    Syscall {
        category: SyscallCategory,
        /// Syscall name without prefix, some categories behave per syscall
        syscall: &'static str,
        phase: Phase,
    },
    StatedumpFileDescriptor,
    StatedumpProcessState,
}

/// Build the event name → handler table for a layout
///
/// Every syscall accepted by `filter` gets an entry and an exit handler; the
/// statedump handlers are registered when the layout names their events.
pub(super) fn build_handler_table(
    layout: &EventLayout,
    filter: &SyscallFilter,
) -> FnvHashMap<String, Handler> {
    let mut handlers = FnvHashMap::default();

    for category in SyscallCategory::ALL {
        for &syscall in category.syscalls() {
            if !filter.should_trace(syscall) {
                continue;
            }
            handlers.insert(
                layout.syscall_entry(syscall),
                Handler::Syscall {
                    category,
                    syscall,
                    phase: Phase::Entry,
                },
            );
            handlers.insert(
                layout.syscall_exit(syscall),
                Handler::Syscall {
                    category,
                    syscall,
                    phase: Phase::Exit,
                },
            );
        }
    }

    if let Some(name) = &layout.statedump_file_descriptor {
        handlers.insert(name.clone(), Handler::StatedumpFileDescriptor);
    }
    if let Some(name) = &layout.statedump_process_state {
        handlers.insert(name.clone(), Handler::StatedumpProcessState);
    }

    handlers
}
