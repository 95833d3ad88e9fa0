use super::accounting::Direction;
use crate::state_system::Quark;

/// A read or write started on entry, waiting for its exit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct FdRequest {
    pub fd: i64,
    /// Base attribute of the pool the slot was taken from
    pub pool: Quark,
    pub slot: Quark,
}

/// Syscall state carried from an entry event to the matching exit event
///
/// A thread runs one syscall at a time, so each field holds at most one
/// value; an entry whose exit is lost is overwritten by the next entry.
#[derive(Debug, Default)]
pub(super) struct ThreadPending {
    /// Name of the resource being opened or duplicated
    pub opening: Option<String>,
    /// fd passed to a close that targets a known fd
    pub closing: Option<i64>,
    /// fd passed to connect
    pub connecting: Option<i64>,
    /// Whether the clone in flight shares the fd table
    pub cloning: Option<bool>,
    pub read: Option<FdRequest>,
    pub write: Option<FdRequest>,
}

impl ThreadPending {
    pub fn request_mut(&mut self, direction: Direction) -> &mut Option<FdRequest> {
        match direction {
            Direction::Read => &mut self.read,
            Direction::Write => &mut self.write,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.opening.is_none()
            && self.closing.is_none()
            && self.connecting.is_none()
            && self.cloning.is_none()
            && self.read.is_none()
            && self.write.is_none()
    }
}
