//! Point queries over a replayed store
//!
//! Read-only helpers that follow the `TID` / `FDTBL` / `RES` layout written
//! by [`IoStateProvider`](crate::io::IoStateProvider).

use crate::io::{
    Direction, ATTRIBUTE_FDTBL, ATTRIBUTE_OPERATION, ATTRIBUTE_RESOURCES, ATTRIBUTE_TID,
};
use crate::state_system::{StateSystem, StateSystemBuilder};

/// Every thread that appears in the store, ascending
pub fn threads(ss: &StateSystem) -> Vec<i32> {
    let Some(root) = ss.opt_quark_absolute(&[ATTRIBUTE_TID]) else {
        return Vec::new();
    };
    let mut tids: Vec<i32> = ss
        .sub_attributes(root)
        .into_iter()
        .filter_map(|quark| ss.attribute_name(quark).parse().ok())
        .collect();
    tids.sort_unstable();
    tids
}

/// Id of the fd table the thread used at `time`
pub fn fd_table_at(ss: &StateSystem, tid: i32, time: i64) -> Option<i32> {
    let link = ss.opt_quark_absolute(&[ATTRIBUTE_TID, &tid.to_string(), ATTRIBUTE_FDTBL])?;
    ss.query_value(time, link).as_int()
}

/// Name bound to `fd` in the thread's table at `time`
pub fn file_at(ss: &StateSystem, tid: i32, fd: i64, time: i64) -> Option<String> {
    let table = fd_table_at(ss, tid, time)?;
    let quark =
        ss.opt_quark_absolute(&[ATTRIBUTE_FDTBL, &table.to_string(), &fd.to_string()])?;
    ss.query_value(time, quark).as_str().map(str::to_string)
}

/// Every bound fd of the thread's table at `time`, ascending by fd
pub fn open_fds_at(ss: &StateSystem, tid: i32, time: i64) -> Vec<(i64, String)> {
    let Some(table) = fd_table_at(ss, tid, time) else {
        return Vec::new();
    };
    let Some(table_quark) = ss.opt_quark_absolute(&[ATTRIBUTE_FDTBL, &table.to_string()]) else {
        return Vec::new();
    };

    let mut fds: Vec<(i64, String)> = ss
        .sub_attributes(table_quark)
        .into_iter()
        .filter_map(|quark| {
            let fd = ss.attribute_name(quark).parse().ok()?;
            let name = ss.query_value(time, quark).as_str()?.to_string();
            Some((fd, name))
        })
        .collect();
    fds.sort_unstable_by_key(|(fd, _)| *fd);
    fds
}

/// Bytes the thread had transferred in `direction` by `time`
pub fn thread_bytes_at(ss: &StateSystem, tid: i32, direction: Direction, time: i64) -> i64 {
    ss.opt_quark_absolute(&[ATTRIBUTE_TID, &tid.to_string(), direction.attribute()])
        .and_then(|quark| ss.query_value(time, quark).as_long())
        .unwrap_or(0)
}

pub fn bytes_read_at(ss: &StateSystem, tid: i32, time: i64) -> i64 {
    thread_bytes_at(ss, tid, Direction::Read, time)
}

pub fn bytes_written_at(ss: &StateSystem, tid: i32, time: i64) -> i64 {
    thread_bytes_at(ss, tid, Direction::Write, time)
}

/// Bytes transferred in `direction` through `fd` of the thread's table by
/// `time`
pub fn fd_bytes_at(ss: &StateSystem, tid: i32, fd: i64, direction: Direction, time: i64) -> i64 {
    let Some(table) = fd_table_at(ss, tid, time) else {
        return 0;
    };
    ss.opt_quark_absolute(&[
        ATTRIBUTE_FDTBL,
        &table.to_string(),
        &fd.to_string(),
        direction.attribute(),
    ])
    .and_then(|quark| ss.query_value(time, quark).as_long())
    .unwrap_or(0)
}

/// Threads holding `resource` open at `time`, with the fd each uses
pub fn threads_using(ss: &StateSystem, resource: &str, time: i64) -> Vec<(i32, i64)> {
    let Some(res) = ss.opt_quark_absolute(&[ATTRIBUTE_RESOURCES, resource]) else {
        return Vec::new();
    };
    let mut users: Vec<(i32, i64)> = ss
        .sub_attributes(res)
        .into_iter()
        .filter_map(|quark| {
            let tid = ss.attribute_name(quark).parse().ok()?;
            let fd = ss.query_value(time, quark).as_long()?;
            Some((tid, fd))
        })
        .collect();
    users.sort_unstable();
    users
}

/// Operation ("READ"/"WRITE") the thread has in flight on `resource`
pub fn operation_at(ss: &StateSystem, resource: &str, tid: i32, time: i64) -> Option<String> {
    let quark = ss.opt_quark_absolute(&[
        ATTRIBUTE_RESOURCES,
        resource,
        &tid.to_string(),
        ATTRIBUTE_OPERATION,
    ])?;
    ss.query_value(time, quark).as_str().map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_system::StateValue;

    /// Thread 7 on table 0 with fd 3 → /etc/passwd from 10 to 20, 64 bytes
    /// read at 15
    fn sample_store() -> StateSystem {
        let mut ss = StateSystem::new(0);
        let link = ss.quark_absolute_and_add(&["TID", "7", "FDTBL"]);
        ss.modify_attribute(10, StateValue::Int(0), link).unwrap();
        let fd = ss.quark_absolute_and_add(&["FDTBL", "0", "3"]);
        ss.modify_attribute(10, StateValue::from("/etc/passwd"), fd)
            .unwrap();
        let res = ss.quark_absolute_and_add(&["RES", "/etc/passwd", "7"]);
        ss.modify_attribute(10, StateValue::Long(3), res).unwrap();

        let fd_read = ss.quark_relative_and_add(fd, "READ");
        ss.modify_attribute(15, StateValue::Long(64), fd_read).unwrap();
        let read = ss.quark_absolute_and_add(&["TID", "7", "READ"]);
        ss.modify_attribute(15, StateValue::Long(64), read).unwrap();

        ss.remove_attribute(20, fd).unwrap();
        ss.remove_attribute(20, res).unwrap();
        ss.close_history(30);
        ss
    }

    #[test]
    fn test_file_at() {
        let ss = sample_store();
        assert_eq!(file_at(&ss, 7, 3, 5), None);
        assert_eq!(file_at(&ss, 7, 3, 10).as_deref(), Some("/etc/passwd"));
        assert_eq!(file_at(&ss, 7, 3, 19).as_deref(), Some("/etc/passwd"));
        assert_eq!(file_at(&ss, 7, 3, 20), None);
        assert_eq!(file_at(&ss, 8, 3, 15), None);
    }

    #[test]
    fn test_byte_totals() {
        let ss = sample_store();
        assert_eq!(bytes_read_at(&ss, 7, 14), 0);
        assert_eq!(bytes_read_at(&ss, 7, 15), 64);
        assert_eq!(bytes_written_at(&ss, 7, 15), 0);
        assert_eq!(fd_bytes_at(&ss, 7, 3, Direction::Read, 16), 64);
        // Closing the fd clears its counters
        assert_eq!(fd_bytes_at(&ss, 7, 3, Direction::Read, 25), 0);
        // Thread totals survive the close
        assert_eq!(bytes_read_at(&ss, 7, 25), 64);
    }

    #[test]
    fn test_open_fds_and_users() {
        let ss = sample_store();
        assert_eq!(open_fds_at(&ss, 7, 12), vec![(3, "/etc/passwd".to_string())]);
        assert!(open_fds_at(&ss, 7, 25).is_empty());
        assert_eq!(threads_using(&ss, "/etc/passwd", 12), vec![(7, 3)]);
        assert!(threads_using(&ss, "/etc/passwd", 21).is_empty());
        assert!(threads_using(&ss, "/nope", 12).is_empty());
        assert_eq!(threads(&ss), vec![7]);
    }
}
