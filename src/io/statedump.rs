//! Bootstrap from the tracer's statedump
//!
//! The statedump lists, at trace start, every thread with the address of its
//! kernel file table, and every fd open in each table. The two lists may be
//! interleaved in any order relative to the syscall stream; state they
//! describe is written as initial values rather than as changes.

use super::provider::{
    IoStateProvider, FIELD_FD, FIELD_FILENAME, FIELD_FILE_TABLE_ADDRESS, FIELD_PID,
};
use super::{ATTRIBUTE_FDTBL, ATTRIBUTE_TID};
use crate::event::TraceEvent;
use crate::state_system::{StateSystemBuilder, StateSystemError, StateValue};

/// Time passed to the fd table helpers for state that predates the trace
const BEFORE_TRACE: i64 = -1;

impl IoStateProvider {
    /// An fd open at trace start
    ///
    /// Older tracers name the owning process (`pid`); newer ones name the
    /// kernel file table, shared by every thread using it.
    pub(super) fn statedump_file_descriptor(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
    ) -> Result<(), StateSystemError> {
        let (Some(fd), Some(filename)) = (
            event.field_long(FIELD_FD),
            event.field_str(FIELD_FILENAME),
        ) else {
            return Ok(());
        };

        if let Some(pid) = event.field_long(FIELD_PID) {
            let Ok(pid) = i32::try_from(pid) else {
                return Ok(());
            };
            return self.open_file(ssb, BEFORE_TRACE, pid, fd, Some(filename));
        }

        let Some(address) = event.field_unsigned(FIELD_FILE_TABLE_ADDRESS) else {
            return Ok(());
        };
        let Some(table) = self.fd_tbl_addresses.get(&address).copied() else {
            tracing::warn!(
                "fd {} ({}) belongs to unknown file table {:#x}, discarded",
                fd,
                filename,
                address
            );
            return Ok(());
        };

        let fd_quark = ssb.quark_relative_and_add(table.quark, &fd.to_string());
        ssb.update_ongoing_state(StateValue::from(filename), fd_quark)?;

        let owners = self.table_owners.get(&address).cloned().unwrap_or_default();
        for tid in owners {
            self.bind_resource(ssb, BEFORE_TRACE, tid, fd, filename)?;
        }
        Ok(())
    }

    /// A thread alive at trace start, and the file table it uses
    pub(super) fn statedump_process_state(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        event: &TraceEvent,
    ) -> Result<(), StateSystemError> {
        let address = event.field_unsigned(FIELD_FILE_TABLE_ADDRESS);
        let tid = event
            .field_long(&self.layout.field_tid)
            .and_then(|tid| i32::try_from(tid).ok());
        let (Some(address), Some(tid)) = (address, tid) else {
            return Ok(());
        };

        let table = match self.fd_tbl_addresses.get(&address) {
            Some(table) => *table,
            None => {
                let table = self.new_table(ssb);
                self.fd_tbl_addresses.insert(address, table);
                tracing::trace!("File table {:#x} is fd table {}", address, table.id);
                table
            }
        };
        let owners = self.table_owners.entry(address).or_default();
        if !owners.contains(&tid) {
            owners.push(tid);
            // fds of the table may have been dumped before this thread
            let view: &dyn StateSystemBuilder = &*ssb;
            let known: Vec<(i64, String)> = view
                .sub_attributes(table.quark)
                .into_iter()
                .filter_map(|quark| {
                    let fd = view.attribute_name(quark).parse().ok()?;
                    Some((fd, self.filename(view, table, fd)?))
                })
                .collect();
            for (fd, name) in known {
                self.bind_resource(ssb, BEFORE_TRACE, tid, fd, &name)?;
            }
        }

        let link = ssb.quark_absolute_and_add(&[ATTRIBUTE_TID, &tid.to_string(), ATTRIBUTE_FDTBL]);
        if ssb.query_ongoing(link).is_null() {
            ssb.update_ongoing_state(StateValue::Int(table.id), link)
        } else {
            // The thread already made syscalls: switch tables from here on
            ssb.modify_attribute(event.timestamp, StateValue::Int(table.id), link)
        }
    }
}
