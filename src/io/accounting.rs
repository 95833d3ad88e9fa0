use super::pending::FdRequest;
use super::provider::IoStateProvider;
use super::{
    ATTRIBUTE_CURRENT, ATTRIBUTE_FD, ATTRIBUTE_OPERATION, ATTRIBUTE_READ, ATTRIBUTE_RESOURCES,
    ATTRIBUTE_TID, ATTRIBUTE_WRITE,
};
use crate::state_system::{AttributePool, StateSystemBuilder, StateSystemError, StateValue};

/// Direction of a data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    /// Attribute holding the totals for this direction
    pub fn attribute(self) -> &'static str {
        match self {
            Direction::Read => ATTRIBUTE_READ,
            Direction::Write => ATTRIBUTE_WRITE,
        }
    }
}

impl IoStateProvider {
    /// Record a request of `count` bytes on `fd` as in flight
    pub(super) fn start_rw_fd(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        fd: i64,
        count: i64,
        direction: Direction,
    ) -> Result<(), StateSystemError> {
        let table = self.resolve_table(ssb, time, tid)?;
        let fd_quark = ssb.quark_relative_and_add(table.quark, &fd.to_string());
        let base = ssb.quark_relative_and_add(fd_quark, direction.attribute());
        let slot = self
            .pools
            .entry(base)
            .or_insert_with(|| AttributePool::new(base))
            .get_available(ssb);

        // Kept before any write so the slot is recycled even if one fails
        let request = FdRequest {
            fd,
            pool: base,
            slot,
        };
        if let Some(dropped) = self.pending_mut(tid).request_mut(direction).replace(request) {
            tracing::debug!(
                "Thread {} started a {:?} on fd {} before fd {} settled",
                tid,
                direction,
                fd,
                dropped.fd
            );
        }

        ssb.modify_attribute(time, StateValue::Long(count), slot)?;

        let tid_str = tid.to_string();
        let current = ssb.quark_absolute_and_add(&[
            ATTRIBUTE_TID,
            &tid_str,
            direction.attribute(),
            ATTRIBUTE_CURRENT,
        ]);
        ssb.modify_attribute(time, StateValue::Long(count), current)?;
        let current_fd = ssb.quark_absolute_and_add(&[
            ATTRIBUTE_TID,
            &tid_str,
            direction.attribute(),
            ATTRIBUTE_FD,
        ]);
        ssb.modify_attribute(time, StateValue::Long(fd), current_fd)?;

        if let Some(name) = self.filename(ssb, table, fd) {
            let operation = ssb.quark_absolute_and_add(&[
                ATTRIBUTE_RESOURCES,
                &name,
                &tid_str,
                ATTRIBUTE_OPERATION,
            ]);
            ssb.modify_attribute(time, StateValue::from(direction.attribute()), operation)?;
        }
        Ok(())
    }

    /// Settle the thread's request in flight with the `count` bytes the
    /// kernel actually moved
    ///
    /// A request that moved nothing leaves no trace: its in-flight intervals
    /// are rewritten to null. An exit with no matching entry is ignored.
    pub(super) fn settle_rw_fd(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        count: i64,
        direction: Direction,
    ) -> Result<(), StateSystemError> {
        let Some(request) = self.take_pending(tid, |p| p.request_mut(direction).take()) else {
            tracing::trace!("Thread {} ended a {:?} it never started", tid, direction);
            return Ok(());
        };
        let settled = if count > 0 {
            StateValue::Long(count)
        } else {
            StateValue::Null
        };

        // The slot goes back to the pool even if a write on it fails
        let slot_written = ssb.update_ongoing_state(settled.clone(), request.slot);
        if let Some(pool) = self.pools.get_mut(&request.pool) {
            pool.recycle(ssb, request.slot, time)?;
        }
        slot_written?;
        let was_valid = self.is_valid_fd(ssb, time, tid, request.fd)?;

        let tid_str = tid.to_string();
        let thread_total =
            ssb.quark_absolute_and_add(&[ATTRIBUTE_TID, &tid_str, direction.attribute()]);
        let current = ssb.quark_relative_and_add(thread_total, ATTRIBUTE_CURRENT);
        ssb.update_ongoing_state(settled, current)?;
        ssb.remove_attribute(time, current)?;

        let table = self.resolve_table(ssb, time, tid)?;
        if let Some(name) = self.filename(ssb, table, request.fd) {
            let operation = ssb.quark_absolute_and_add(&[
                ATTRIBUTE_RESOURCES,
                &name,
                &tid_str,
                ATTRIBUTE_OPERATION,
            ]);
            if count <= 0 {
                ssb.update_ongoing_state(StateValue::Null, operation)?;
            } else {
                ssb.remove_attribute(time, operation)?;
            }
        }

        let current_fd = ssb.quark_relative_and_add(thread_total, ATTRIBUTE_FD);
        if count <= 0 {
            ssb.update_ongoing_state(StateValue::Null, current_fd)?;
            return ssb.remove_attribute(time, current_fd);
        }
        ssb.remove_attribute(time, current_fd)?;

        // Data moved on an fd opened before the trace started
        if !was_valid {
            self.open_file(ssb, time, tid, request.fd, None)?;
        }

        let fd_quark = ssb.quark_relative_and_add(table.quark, &request.fd.to_string());
        let fd_total = ssb.quark_relative_and_add(fd_quark, direction.attribute());
        if let Err(e) = ssb.increment_attribute_long(time, fd_total, count) {
            tracing::error!("Failed to account {} bytes on fd {}: {}", count, request.fd, e);
        }
        if let Err(e) = ssb.increment_attribute_long(time, thread_total, count) {
            tracing::error!("Failed to account {} bytes for thread {}: {}", count, tid, e);
        }
        Ok(())
    }
}
