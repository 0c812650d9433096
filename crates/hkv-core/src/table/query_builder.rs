//! Key ranges and filters for row-oriented requests.
//!
//! Row bounds become composite-key bounds by filling the qualifier and
//! timestamp slots with MIN/MAX markers:
//!
//! | bound           | composite key      |
//! |-----------------|--------------------|
//! | inclusive start | `(row, MIN, MIN)`  |
//! | exclusive start | `(row, MAX, MAX)`  |
//! | inclusive end   | `(row, MAX, MAX)`  |
//! | exclusive end   | `(row, MIN, MIN)`  |
//! | no end          | `(MAX, MAX, MAX)`  |

use crate::model::{Scan, TimeRange};
use crate::rpc::types::{HTableFilter, KeyRange, RowKey, TableQuery, ALL_COLUMNS, PRIMARY_INDEX};
use crate::{Error, Result};

/// Build the filter descriptor for one family.
///
/// A `None` qualifier selects the bare column and is sent as a zero-length
/// selector. No qualifiers at all selects every column of the family.
pub fn build_filter<'a, I>(
    filter_string: Option<&str>,
    time_range: Option<&TimeRange>,
    max_versions: i32,
    qualifiers: I,
) -> HTableFilter
where
    I: IntoIterator<Item = Option<&'a [u8]>>,
{
    HTableFilter {
        filter_string: filter_string.map(str::to_string),
        min_stamp: time_range.map(TimeRange::min),
        max_stamp: time_range.map(TimeRange::max),
        max_versions,
        select_column_qualifiers: qualifiers
            .into_iter()
            .map(|q| q.map(<[u8]>::to_vec).unwrap_or_default())
            .collect(),
    }
}

/// Build the composite-key range for a row interval.
///
/// An empty `stop` means the range is unbounded above.
pub fn build_range(start: &[u8], include_start: bool, stop: &[u8], include_stop: bool) -> KeyRange {
    let start = if include_start {
        RowKey::row_min(start)
    } else {
        RowKey::row_max(start)
    };

    let end = if stop.is_empty() {
        RowKey::max()
    } else if include_stop {
        RowKey::row_max(stop)
    } else {
        RowKey::row_min(stop)
    };

    KeyRange { start, end }
}

/// Wrap a filter and optional range into a primary-index query over all columns.
pub fn build_query(filter: HTableFilter, range: Option<KeyRange>, batch_size: Option<u32>) -> TableQuery {
    TableQuery {
        index_name: PRIMARY_INDEX.to_string(),
        key_ranges: range.into_iter().collect(),
        select_columns: ALL_COLUMNS.iter().map(|c| c.to_string()).collect(),
        filter,
        batch_size: batch_size.filter(|size| *size > 0),
    }
}

/// Query over exactly one row.
pub fn point_query(row: &[u8], filter: HTableFilter) -> Result<TableQuery> {
    if row.is_empty() {
        return Err(Error::IllegalArgument("row is empty".into()));
    }
    Ok(build_query(filter, Some(build_range(row, true, row, true)), None))
}

/// Query over the row interval of a scan; no range when both bounds are empty.
pub fn scan_query(scan: &Scan, filter: HTableFilter) -> TableQuery {
    let range = if scan.start_row().is_empty() && scan.stop_row().is_empty() {
        None
    } else {
        Some(build_range(
            scan.start_row(),
            scan.include_start_row(),
            scan.stop_row(),
            scan.include_stop_row(),
        ))
    };
    build_query(filter, range, scan.batch())
}

/// Render the check predicate of a conditional mutation.
///
/// An absent expected value checks that the column does not exist. Family,
/// qualifier and value are written with [`to_string_binary`].
pub fn check_and_mutate_filter(family: &[u8], qualifier: &[u8], value: Option<&[u8]>) -> String {
    let family = to_string_binary(family);
    let qualifier = to_string_binary(qualifier);
    match value {
        Some(value) => format!(
            "CheckAndMutateFilter(=, 'binary:{}', '{}', '{}', false)",
            to_string_binary(value),
            family,
            qualifier
        ),
        None => format!("CheckAndMutateFilter(=, 'binary:', '{family}', '{qualifier}', true)"),
    }
}

const PRINTABLE_PUNCTUATION: &[u8] = b" `~!@#$%^&*()-_=+[]{}|;:'\",.<>/?";

/// Render bytes for a filter string.
///
/// Alphanumerics and common punctuation are kept; every other byte, including
/// `\`, becomes `\xNN`. [`to_bytes_binary`] reverses it exactly.
pub fn to_string_binary(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if byte.is_ascii_alphanumeric() || PRINTABLE_PUNCTUATION.contains(&byte) {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("\\x{byte:02X}"));
        }
    }
    out
}

/// Parse bytes rendered by [`to_string_binary`].
///
/// A `\x` not followed by two hex digits is kept literally.
pub fn to_bytes_binary(text: &str) -> Vec<u8> {
    let input = text.as_bytes();
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'\\' && input.get(i + 1) == Some(&b'x') {
            let escaped = input
                .get(i + 2..i + 4)
                .and_then(|hex| std::str::from_utf8(hex).ok())
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = escaped {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}
