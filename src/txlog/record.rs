//! File record codec
//!
//! ## Record Format
//! ```text
//! <sequence>\t<event_type>\t<key>\t<value>\n
//! ```
//!
//! `event_type` is 1 for Delete and 2 for Put; `value` is empty for Delete.
//! Backslash, tab, CR and LF inside keys and values are escaped as
//! `\\`, `\t`, `\r`, `\n` so a record always occupies exactly one line.

use std::fmt::Write as _;

use crate::error::{Result, TxLogError};

use super::{Event, EventType};

/// Field separator within a record
pub const FIELD_SEPARATOR: char = '\t';

/// Record terminator
pub const RECORD_SEPARATOR: char = '\n';

/// Format an event as one newline-terminated record
pub fn encode_record(event: &Event) -> String {
    let mut line = String::with_capacity(24 + event.key.len() + event.value.len());
    // Writing into a String cannot fail
    let _ = write!(
        line,
        "{}{}{}{}",
        event.sequence,
        FIELD_SEPARATOR,
        event.event_type.code(),
        FIELD_SEPARATOR
    );
    escape_into(&mut line, &event.key);
    line.push(FIELD_SEPARATOR);
    escape_into(&mut line, &event.value);
    line.push(RECORD_SEPARATOR);
    line
}

/// Parse one record (without its terminator)
///
/// `line_no` is 1-based and only used for error context.
pub fn decode_record(line: &str, line_no: u64) -> Result<Event> {
    let parse_err = |reason: String| TxLogError::RecordParse {
        line: line_no,
        reason,
    };

    let line = line.strip_suffix('\r').unwrap_or(line);
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).collect();
    if fields.len() != 4 {
        return Err(parse_err(format!(
            "expected 4 tab-separated fields, found {}",
            fields.len()
        )));
    }

    let sequence = fields[0]
        .parse::<u64>()
        .map_err(|e| parse_err(format!("bad sequence {:?}: {}", fields[0], e)))?;

    let event_type = fields[1]
        .parse::<i64>()
        .ok()
        .and_then(EventType::from_code)
        .ok_or_else(|| parse_err(format!("bad event type {:?}", fields[1])))?;

    let key = unescape(fields[2]).map_err(&parse_err)?;
    if key.is_empty() {
        return Err(parse_err("empty key".to_string()));
    }

    let value = unescape(fields[3]).map_err(&parse_err)?;

    Ok(Event {
        sequence,
        event_type,
        key,
        value,
    })
}

fn escape_into(out: &mut String, raw: &str) {
    for c in raw.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            c => out.push(c),
        }
    }
}

fn unescape(field: &str) -> std::result::Result<String, String> {
    let mut out = String::with_capacity(field.len());
    let mut chars = field.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => return Err(format!("unknown escape \\{}", other)),
            None => return Err("dangling escape at end of field".to_string()),
        }
    }

    Ok(out)
}
