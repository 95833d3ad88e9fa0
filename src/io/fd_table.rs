use super::provider::IoStateProvider;
use super::{ATTRIBUTE_FDTBL, ATTRIBUTE_RESOURCES, ATTRIBUTE_TID, UNKNOWN_FILE};
use crate::state_system::{Quark, StateSystemBuilder, StateSystemError, StateValue};

/// An fd table: its numeric id and its `FDTBL/<id>` attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdTable {
    pub id: i32,
    pub quark: Quark,
}

/// Write `value` at `time`, or as the initial value when `time` is negative
///
/// Negative times come from the statedump, which describes state that
/// existed before the trace started.
fn set_state(
    ssb: &mut dyn StateSystemBuilder,
    time: i64,
    value: StateValue,
    quark: Quark,
) -> Result<(), StateSystemError> {
    if time < 0 {
        ssb.update_ongoing_state(value, quark)
    } else {
        ssb.modify_attribute(time, value, quark)
    }
}

impl IoStateProvider {
    /// Table the thread currently uses, creating and linking a new one if
    /// the thread has none
    pub(super) fn resolve_table(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
    ) -> Result<FdTable, StateSystemError> {
        let link = ssb.quark_absolute_and_add(&[ATTRIBUTE_TID, &tid.to_string(), ATTRIBUTE_FDTBL]);
        if let Some(id) = ssb.query_ongoing(link).as_int() {
            let quark = ssb.quark_absolute_and_add(&[ATTRIBUTE_FDTBL, &id.to_string()]);
            return Ok(FdTable { id, quark });
        }

        let table = self.new_table(ssb);
        tracing::trace!("Thread {} gets fd table {}", tid, table.id);
        set_state(ssb, time, StateValue::Int(table.id), link)?;
        Ok(table)
    }

    /// Allocate the next table id and its attribute
    pub(super) fn new_table(&mut self, ssb: &mut dyn StateSystemBuilder) -> FdTable {
        let id = self.next_table_id;
        self.next_table_id += 1;
        let quark = ssb.quark_absolute_and_add(&[ATTRIBUTE_FDTBL, &id.to_string()]);
        FdTable { id, quark }
    }

    /// Point the thread at `table`
    pub(super) fn link_table(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        table: FdTable,
    ) -> Result<(), StateSystemError> {
        let link = ssb.quark_absolute_and_add(&[ATTRIBUTE_TID, &tid.to_string(), ATTRIBUTE_FDTBL]);
        set_state(ssb, time, StateValue::Int(table.id), link)
    }

    /// Bind `fd` to `name` in the thread's table
    ///
    /// Without a name the fd is bound to `<unknown>` and no resource entry is
    /// written.
    pub(super) fn open_file(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        fd: i64,
        name: Option<&str>,
    ) -> Result<(), StateSystemError> {
        let table = self.resolve_table(ssb, time, tid)?;
        let fd_quark = ssb.quark_relative_and_add(table.quark, &fd.to_string());
        if time < 0 {
            ssb.update_ongoing_state(StateValue::from(name), fd_quark)?;
        } else {
            ssb.modify_attribute(time, StateValue::from(name.unwrap_or(UNKNOWN_FILE)), fd_quark)?;
        }

        match name {
            Some(name) => self.bind_resource(ssb, time, tid, fd, name),
            None => Ok(()),
        }
    }

    /// Record that `tid` has `name` open on `fd`
    pub(super) fn bind_resource(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        fd: i64,
        name: &str,
    ) -> Result<(), StateSystemError> {
        let res = ssb.quark_absolute_and_add(&[ATTRIBUTE_RESOURCES, name, &tid.to_string()]);
        set_state(ssb, time, StateValue::Long(fd), res)
    }

    /// Unbind `fd` and everything under it, and the matching resource entry
    pub(super) fn close_file(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        fd: i64,
    ) -> Result<(), StateSystemError> {
        let table = self.resolve_table(ssb, time, tid)?;
        let name = self.filename(ssb, table, fd);
        let fd_quark = ssb.quark_relative_and_add(table.quark, &fd.to_string());
        ssb.remove_attribute(time, fd_quark)?;

        if let Some(name) = name {
            if let Some(res) =
                ssb.opt_quark_absolute(&[ATTRIBUTE_RESOURCES, &name, &tid.to_string()])
            {
                ssb.remove_attribute(time, res)?;
            }
        }
        Ok(())
    }

    /// Known name bound to `fd`; `<unknown>` and unbound fds give `None`
    pub(super) fn filename(
        &self,
        ssb: &dyn StateSystemBuilder,
        table: FdTable,
        fd: i64,
    ) -> Option<String> {
        let quark = ssb.opt_quark_relative(table.quark, &fd.to_string())?;
        ssb.query_ongoing(quark)
            .as_str()
            .filter(|name| *name != UNKNOWN_FILE)
            .map(str::to_string)
    }

    /// Whether `fd` is bound to anything, `<unknown>` included
    pub(super) fn is_valid_fd(
        &mut self,
        ssb: &mut dyn StateSystemBuilder,
        time: i64,
        tid: i32,
        fd: i64,
    ) -> Result<bool, StateSystemError> {
        let table = self.resolve_table(ssb, time, tid)?;
        Ok(ssb
            .opt_quark_relative(table.quark, &fd.to_string())
            .is_some_and(|quark| !ssb.query_ongoing(quark).is_null()))
    }
}
