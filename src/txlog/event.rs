//! Transaction log event definitions
//!
//! Defines the structure of individual mutation records.

use std::fmt;

/// A single mutation recorded in the transaction log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Sequence number, assigned by the log store at write time
    pub sequence: u64,

    /// Put or Delete
    pub event_type: EventType,

    /// The mutated key (never empty)
    pub key: String,

    /// New value for Put, empty for Delete
    pub value: String,
}

/// Kind of mutation. The discriminants are the on-disk codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EventType {
    Delete = 1,
    Put = 2,
}

impl Event {
    /// A Put event that has not been sequenced yet
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            event_type: EventType::Put,
            key: key.into(),
            value: value.into(),
        }
    }

    /// A Delete event that has not been sequenced yet
    pub fn delete(key: impl Into<String>) -> Self {
        Self {
            sequence: 0,
            event_type: EventType::Delete,
            key: key.into(),
            value: String::new(),
        }
    }

    /// Same event stamped with a sequence number
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}

impl EventType {
    /// The numeric code stored on disk
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Inverse of [`EventType::code`]
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(EventType::Delete),
            2 => Some(EventType::Put),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Delete => f.write_str("DELETE"),
            EventType::Put => f.write_str("PUT"),
        }
    }
}
