use fnv::FnvHashMap;
use std::mem;

use super::{
    Quark, StateInterval, StateSystemBuilder, StateSystemError, StateValue, StateValueType,
    ROOT_ATTRIBUTE,
};

#[derive(Debug)]
struct Attribute {
    name: String,
    parent: Option<Quark>,
    children: Vec<Quark>,
    child_index: FnvHashMap<String, Quark>,
    value_type: Option<StateValueType>,
    ongoing: StateValue,
    ongoing_start: i64,
    intervals: Vec<StateInterval>,
}

impl Attribute {
    fn new(name: String, parent: Option<Quark>, start: i64) -> Self {
        Attribute {
            name,
            parent,
            children: Vec::new(),
            child_index: FnvHashMap::default(),
            value_type: None,
            ongoing: StateValue::Null,
            ongoing_start: start,
            intervals: Vec::new(),
        }
    }
}

/// In-memory attribute store with full interval history
///
/// # Example
/// ```
/// use fdtrail::state_system::{StateSystem, StateSystemBuilder, StateValue};
///
/// let mut ss = StateSystem::new(0);
/// let quark = ss.quark_absolute_and_add(&["FDTBL", "0", "5"]);
/// ss.modify_attribute(10, StateValue::from("/tmp/a"), quark)?;
/// ss.remove_attribute(20, quark)?;
///
/// assert_eq!(ss.query_value(15, quark), StateValue::from("/tmp/a"));
/// assert_eq!(ss.query_value(25, quark), StateValue::Null);
/// # Ok::<(), fdtrail::state_system::StateSystemError>(())
/// ```
#[derive(Debug)]
pub struct StateSystem {
    attributes: Vec<Attribute>,
    start_time: i64,
    end_time: i64,
}

impl StateSystem {
    /// Create an empty store whose history begins at `start_time`
    pub fn new(start_time: i64) -> Self {
        StateSystem {
            attributes: vec![Attribute::new(String::new(), None, start_time)],
            start_time,
            end_time: start_time,
        }
    }

    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Latest time the store has been written at or sealed to
    pub fn current_end_time(&self) -> i64 {
        self.end_time
    }

    /// Number of attributes, excluding the invisible root
    pub fn attribute_count(&self) -> usize {
        self.attributes.len() - 1
    }

    /// All attribute handles in creation order
    pub fn quarks(&self) -> impl Iterator<Item = Quark> + '_ {
        1..self.attributes.len()
    }

    /// Extend every ongoing value up to `end`
    ///
    /// Called once the last event has been replayed so that queries at the
    /// final timestamp see the values still in effect.
    pub fn close_history(&mut self, end: i64) {
        self.end_time = self.end_time.max(end);
    }

    /// Interval covering `time` for the attribute, ongoing or historical
    pub fn query_single_state(&self, time: i64, quark: Quark) -> Option<StateInterval> {
        let attr = self.attributes.get(quark)?;
        if time < self.start_time || time > self.end_time {
            return None;
        }
        if time >= attr.ongoing_start {
            return Some(StateInterval {
                start: attr.ongoing_start,
                end: self.end_time.max(attr.ongoing_start),
                value: attr.ongoing.clone(),
            });
        }
        let idx = attr.intervals.partition_point(|interval| interval.end < time);
        attr.intervals
            .get(idx)
            .filter(|interval| interval.contains(time))
            .cloned()
    }

    /// Value in effect at `time`, null when outside the recorded range
    pub fn query_value(&self, time: i64, quark: Quark) -> StateValue {
        self.query_single_state(time, quark)
            .map(|interval| interval.value)
            .unwrap_or_default()
    }

    /// Every interval of the attribute, the ongoing one last
    pub fn history(&self, quark: Quark) -> Vec<StateInterval> {
        let Some(attr) = self.attributes.get(quark) else {
            return Vec::new();
        };
        let mut intervals = attr.intervals.clone();
        intervals.push(StateInterval {
            start: attr.ongoing_start,
            end: self.end_time.max(attr.ongoing_start),
            value: attr.ongoing.clone(),
        });
        intervals
    }

    fn add_child(&mut self, parent: Quark, name: &str) -> Quark {
        let quark = self.attributes.len();
        self.attributes
            .push(Attribute::new(name.to_string(), Some(parent), self.start_time));
        let parent_attr = &mut self.attributes[parent];
        parent_attr.children.push(quark);
        parent_attr.child_index.insert(name.to_string(), quark);
        quark
    }

    fn check_type(&self, quark: Quark, value: &StateValue) -> Result<(), StateSystemError> {
        match (self.attributes[quark].value_type, value.value_type()) {
            (Some(expected), Some(found)) if expected != found => {
                Err(StateSystemError::TypeMismatch {
                    attribute: self.full_attribute_path(quark),
                    expected,
                    found,
                })
            }
            _ => Ok(()),
        }
    }
}

impl StateSystemBuilder for StateSystem {
    fn quark_absolute_and_add(&mut self, path: &[&str]) -> Quark {
        path.iter()
            .fold(ROOT_ATTRIBUTE, |parent, name| self.quark_relative_and_add(parent, name))
    }

    fn quark_relative_and_add(&mut self, parent: Quark, name: &str) -> Quark {
        match self.opt_quark_relative(parent, name) {
            Some(quark) => quark,
            None => self.add_child(parent, name),
        }
    }

    fn opt_quark_absolute(&self, path: &[&str]) -> Option<Quark> {
        path.iter().try_fold(ROOT_ATTRIBUTE, |parent, name| {
            self.opt_quark_relative(parent, name)
        })
    }

    fn opt_quark_relative(&self, parent: Quark, name: &str) -> Option<Quark> {
        self.attributes.get(parent)?.child_index.get(name).copied()
    }

    fn query_ongoing(&self, quark: Quark) -> StateValue {
        self.attributes
            .get(quark)
            .map(|attr| attr.ongoing.clone())
            .unwrap_or_default()
    }

    fn modify_attribute(
        &mut self,
        time: i64,
        value: StateValue,
        quark: Quark,
    ) -> Result<(), StateSystemError> {
        self.check_type(quark, &value)?;
        let attr = &self.attributes[quark];
        if attr.ongoing == value {
            return Ok(());
        }
        if time < attr.ongoing_start {
            return Err(StateSystemError::TimeOrder {
                attribute: self.full_attribute_path(quark),
                time,
                start: attr.ongoing_start,
            });
        }

        let attr = &mut self.attributes[quark];
        if attr.value_type.is_none() {
            attr.value_type = value.value_type();
        }
        if time > attr.ongoing_start {
            let previous = mem::replace(&mut attr.ongoing, value);
            attr.intervals.push(StateInterval {
                start: attr.ongoing_start,
                end: time - 1,
                value: previous,
            });
            attr.ongoing_start = time;
        } else {
            // Same timestamp: the earlier value never became visible
            attr.ongoing = value;
        }
        self.end_time = self.end_time.max(time);
        Ok(())
    }

    fn update_ongoing_state(
        &mut self,
        value: StateValue,
        quark: Quark,
    ) -> Result<(), StateSystemError> {
        self.check_type(quark, &value)?;
        let attr = &mut self.attributes[quark];
        if attr.value_type.is_none() {
            attr.value_type = value.value_type();
        }
        attr.ongoing = value;
        Ok(())
    }

    fn remove_attribute(&mut self, time: i64, quark: Quark) -> Result<(), StateSystemError> {
        let mut pending = vec![quark];
        while let Some(current) = pending.pop() {
            pending.extend(self.attributes[current].children.iter().copied());
            self.modify_attribute(time, StateValue::Null, current)?;
        }
        Ok(())
    }

    fn sub_attributes(&self, quark: Quark) -> Vec<Quark> {
        self.attributes
            .get(quark)
            .map(|attr| attr.children.clone())
            .unwrap_or_default()
    }

    fn attribute_name(&self, quark: Quark) -> &str {
        self.attributes
            .get(quark)
            .map(|attr| attr.name.as_str())
            .unwrap_or("")
    }

    fn parent_attribute(&self, quark: Quark) -> Option<Quark> {
        self.attributes.get(quark)?.parent
    }
}
