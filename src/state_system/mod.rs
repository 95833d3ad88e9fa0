//! Hierarchical, time-indexed attribute store
//!
//! Attributes form a tree addressed by path segments (`["TID", "42", "READ"]`).
//! Each attribute holds one value at a time; every change closes the previous
//! value into an immutable `[start, end]` interval, so the full history can be
//! queried after the trace has been replayed.
//!
//! [`StateSystemBuilder`] is the write-side contract the I/O analysis uses;
//! [`StateSystem`] is the in-memory implementation that also answers point
//! queries once the history is built.

mod history;
mod pool;
mod value;

pub use history::StateSystem;
pub use pool::{AttributePool, PoolStats};
pub use value::{StateInterval, StateValue, StateValueType};

use thiserror::Error;

/// Stable handle of an attribute in the tree
pub type Quark = usize;

/// Invisible parent of all top-level attributes
pub const ROOT_ATTRIBUTE: Quark = 0;

/// Errors raised by attribute mutations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateSystemError {
    #[error("Type mismatch on {attribute}: holds {expected} values, got {found}")]
    TypeMismatch {
        attribute: String,
        expected: StateValueType,
        found: StateValueType,
    },

    #[error("Time {time} is before the start ({start}) of the ongoing state of {attribute}")]
    TimeOrder {
        attribute: String,
        time: i64,
        start: i64,
    },

    #[error("Cannot increment {attribute}: ongoing value {value} is not a long")]
    NotANumber { attribute: String, value: String },

    #[error("Incrementing {attribute} ({value}) by {delta} overflows")]
    Overflow {
        attribute: String,
        value: i64,
        delta: i64,
    },
}

/// Write side of the attribute store, as seen by event handlers
///
/// Handlers only ever look at the *ongoing* state: the replay is sequential
/// and in trace order, so the latest value is always the one in effect.
pub trait StateSystemBuilder {
    /// Resolve an absolute path, creating any missing attribute along the way
    fn quark_absolute_and_add(&mut self, path: &[&str]) -> Quark;

    /// Resolve (or create) a direct child of `parent`
    fn quark_relative_and_add(&mut self, parent: Quark, name: &str) -> Quark;

    fn opt_quark_absolute(&self, path: &[&str]) -> Option<Quark>;

    fn opt_quark_relative(&self, parent: Quark, name: &str) -> Option<Quark>;

    /// Value currently in effect for the attribute
    fn query_ongoing(&self, quark: Quark) -> StateValue;

    /// Close the ongoing interval at `time - 1` and start `value` at `time`
    fn modify_attribute(
        &mut self,
        time: i64,
        value: StateValue,
        quark: Quark,
    ) -> Result<(), StateSystemError>;

    /// Replace the ongoing value without closing an interval
    fn update_ongoing_state(
        &mut self,
        value: StateValue,
        quark: Quark,
    ) -> Result<(), StateSystemError>;

    /// Set the attribute and all of its descendants to null from `time`
    fn remove_attribute(&mut self, time: i64, quark: Quark) -> Result<(), StateSystemError>;

    /// Direct children, in creation order
    fn sub_attributes(&self, quark: Quark) -> Vec<Quark>;

    fn attribute_name(&self, quark: Quark) -> &str;

    fn parent_attribute(&self, quark: Quark) -> Option<Quark>;

    /// Add `delta` to a long attribute; a null attribute counts as 0
    fn increment_attribute_long(
        &mut self,
        time: i64,
        quark: Quark,
        delta: i64,
    ) -> Result<(), StateSystemError> {
        let current = match self.query_ongoing(quark) {
            StateValue::Null => 0,
            StateValue::Long(v) => v,
            other => {
                return Err(StateSystemError::NotANumber {
                    attribute: self.full_attribute_path(quark),
                    value: other.to_string(),
                })
            }
        };
        let Some(total) = current.checked_add(delta) else {
            return Err(StateSystemError::Overflow {
                attribute: self.full_attribute_path(quark),
                value: current,
                delta,
            });
        };
        self.modify_attribute(time, StateValue::Long(total), quark)
    }

    /// Slash-joined path of the attribute, for diagnostics
    fn full_attribute_path(&self, quark: Quark) -> String {
        let mut segments = Vec::new();
        let mut current = Some(quark);
        while let Some(q) = current {
            if q == ROOT_ATTRIBUTE {
                break;
            }
            segments.push(self.attribute_name(q).to_string());
            current = self.parent_attribute(q);
        }
        segments.reverse();
        segments.join("/")
    }
}

#[cfg(test)]
mod tests;
