use serde::Serialize;
use std::fmt;

/// Value held by an attribute over one interval
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(untagged)]
pub enum StateValue {
    /// No value (fd closed, request settled, attribute never written)
    #[default]
    Null,
    /// 32-bit integer, used for file descriptor table ids
    Int(i32),
    /// 64-bit integer: fds, byte counts, return codes
    Long(i64),
    /// Resource names and operation markers
    Str(String),
}

/// Type tag of a non-null [`StateValue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateValueType {
    Int,
    Long,
    Str,
}

impl fmt::Display for StateValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StateValueType::Int => "int",
            StateValueType::Long => "long",
            StateValueType::Str => "string",
        };
        f.write_str(name)
    }
}

impl StateValue {
    /// Type tag, or `None` for [`StateValue::Null`]
    pub fn value_type(&self) -> Option<StateValueType> {
        match self {
            StateValue::Null => None,
            StateValue::Int(_) => Some(StateValueType::Int),
            StateValue::Long(_) => Some(StateValueType::Long),
            StateValue::Str(_) => Some(StateValueType::Str),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, StateValue::Null)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            StateValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            StateValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StateValue::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateValue::Null => f.write_str("null"),
            StateValue::Int(v) => write!(f, "{}", v),
            StateValue::Long(v) => write!(f, "{}", v),
            StateValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i32> for StateValue {
    fn from(v: i32) -> Self {
        StateValue::Int(v)
    }
}

impl From<i64> for StateValue {
    fn from(v: i64) -> Self {
        StateValue::Long(v)
    }
}

impl From<&str> for StateValue {
    fn from(s: &str) -> Self {
        StateValue::Str(s.to_string())
    }
}

impl From<String> for StateValue {
    fn from(s: String) -> Self {
        StateValue::Str(s)
    }
}

impl<T: Into<StateValue>> From<Option<T>> for StateValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(StateValue::Null, Into::into)
    }
}

/// Closed time range `[start, end]` over which an attribute held one value
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateInterval {
    pub start: i64,
    pub end: i64,
    pub value: StateValue,
}

impl StateInterval {
    pub fn contains(&self, time: i64) -> bool {
        self.start <= time && time <= self.end
    }
}
