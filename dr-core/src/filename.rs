//! Data-file naming convention: `kplr<timestamp>_<type suffix>`.
//!
//! The timestamp is fixed width, so lexicographic order of timestamps is
//! chronological order, and so is lexicographic order of whole filenames.

use serde::{Deserialize, Serialize};

pub const FILENAME_PREFIX: &str = "kplr";
pub const FILENAME_SEPARATOR: char = '_';

/// Split `kplr2009123456_lcs-targ.fits` into `("2009123456", "_lcs-targ.fits")`.
///
/// Returns `None` when the name lacks the prefix, the separator, or a timestamp.
pub fn timestamp_and_suffix(file_name: &str) -> Option<(&str, &str)> {
    let rest = file_name.strip_prefix(FILENAME_PREFIX)?;
    let split = rest.find(FILENAME_SEPARATOR)?;
    if split == 0 {
        return None;
    }
    Some(rest.split_at(split))
}

/// Batch prefix shared by all files of one originating delivery: everything before
/// the first separator, or the whole name when there is none.
pub fn batch_prefix(file_name: &str) -> &str {
    match file_name.find(FILENAME_SEPARATOR) {
        Some(idx) => &file_name[..idx],
        None => file_name,
    }
}

/// Insert `tag` before the message suffix: `kplr2009_sdnm.xml` + `split001`
/// becomes `kplr2009-split001_sdnm.xml`.
pub fn tagged_name(file_name: &str, tag: &str) -> String {
    let split = file_name
        .find(FILENAME_SEPARATOR)
        .or_else(|| file_name.rfind('.'))
        .unwrap_or(file_name.len());
    let (stem, suffix) = file_name.split_at(split);
    format!("{stem}-{tag}{suffix}")
}

/// `true` for a plain file name with no directory components.
pub fn is_bare_file_name(file_name: &str) -> bool {
    !file_name.is_empty()
        && file_name != "."
        && file_name != ".."
        && !file_name.contains(['/', '\\'])
}

/// Earliest and latest embedded timestamps seen across a message's files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampRange {
    pub first: String,
    pub last: String,
}

impl TimestampRange {
    /// Widen `range` to include `timestamp`, starting it if empty.
    pub fn include(range: &mut Option<TimestampRange>, timestamp: &str) {
        match range {
            None => {
                *range = Some(TimestampRange {
                    first: timestamp.to_owned(),
                    last: timestamp.to_owned(),
                })
            }
            Some(r) => {
                if timestamp < r.first.as_str() {
                    r.first = timestamp.to_owned();
                }
                if timestamp > r.last.as_str() {
                    r.last = timestamp.to_owned();
                }
            }
        }
    }
}
