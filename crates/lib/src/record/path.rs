//! Index paths for addressing nodes inside a record tree.
//!
//! An index path is a sequence of segments, each either a field name or an
//! integer position inside a [`Values`](super::Values) or
//! [`Records`](super::Records) list. Paths can be written as flat field-name
//! strings, in which case the segments are recovered by the codec in this
//! module.
//!
//! # String grammar
//!
//! - An explicit separator (`/`) always splits. Each separated chunk that
//!   consists only of ASCII digits is an index, anything else is a name.
//!   Leading, trailing and doubled separators are ignored.
//! - Without a separator, a run of digits splits the name implicitly, unless
//!   the digits sit within the last two characters of the string. This keeps
//!   short numeric suffixes such as `NAME-1` or `CD_ADD11` intact.
//!
//! ```rust
//! use sysdata::record::{IdxPath, IdxSeg};
//!
//! let path: IdxPath = "Rooms0Name".parse().unwrap();
//! assert_eq!(path.segments(), &[IdxSeg::from("Rooms"), IdxSeg::from(0), IdxSeg::from("Name")]);
//!
//! let path: IdxPath = "Rooms/1/Name".parse().unwrap();
//! assert_eq!(path.to_string(), "Rooms/1/Name");
//! assert_eq!(path.to_field_name(false), "Rooms1Name");
//!
//! // Short numeric suffixes stay part of the name.
//! let path: IdxPath = "CD_ADD11".parse().unwrap();
//! assert_eq!(path.len(), 1);
//! ```

use std::{convert::Infallible, fmt, ops::Deref, str::FromStr};

/// Separator between segments of a flat index-path string.
pub const IDX_PATH_SEP: char = '/';

/// One segment of an [`IdxPath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdxSeg {
    /// Field name inside a [`Record`](super::Record).
    Name(String),
    /// Position inside a sequence.
    Index(usize),
}

impl IdxSeg {
    pub fn as_name(&self) -> Option<&str> {
        match self {
            IdxSeg::Name(name) => Some(name),
            IdxSeg::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<usize> {
        match self {
            IdxSeg::Index(idx) => Some(*idx),
            IdxSeg::Name(_) => None,
        }
    }

    pub fn is_name(&self) -> bool {
        matches!(self, IdxSeg::Name(_))
    }

    pub fn is_index(&self) -> bool {
        matches!(self, IdxSeg::Index(_))
    }

    fn from_digits(digits: &str) -> Self {
        // Runs too long for usize are kept as names.
        digits
            .parse()
            .map(IdxSeg::Index)
            .unwrap_or_else(|_| IdxSeg::Name(digits.to_string()))
    }
}

impl From<&str> for IdxSeg {
    fn from(name: &str) -> Self {
        IdxSeg::Name(name.to_string())
    }
}

impl From<String> for IdxSeg {
    fn from(name: String) -> Self {
        IdxSeg::Name(name)
    }
}

impl From<&String> for IdxSeg {
    fn from(name: &String) -> Self {
        IdxSeg::Name(name.clone())
    }
}

impl From<usize> for IdxSeg {
    fn from(idx: usize) -> Self {
        IdxSeg::Index(idx)
    }
}

impl fmt::Display for IdxSeg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdxSeg::Name(name) => f.write_str(name),
            IdxSeg::Index(idx) => write!(f, "{idx}"),
        }
    }
}

/// An owned index path.
///
/// `Display` writes the separated form (`B/0/X`), which always decodes back to
/// the same path. [`IdxPath::to_field_name`] writes the compact form used for
/// flat field names (`B0X`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdxPath(Vec<IdxSeg>);

impl IdxPath {
    /// Creates an empty path.
    pub fn new() -> Self {
        IdxPath(Vec::new())
    }

    /// Splits a flat field name into segments.
    ///
    /// Returns an empty path when the name holds no split point, so callers can
    /// tell a plain root field name from a nested path. Use [`IdxPath::parse`]
    /// to always get at least one segment.
    pub fn parse_field_name(field_name: &str) -> Self {
        if field_name.contains(IDX_PATH_SEP) {
            return IdxPath(
                field_name
                    .split(IDX_PATH_SEP)
                    .filter(|chunk| !chunk.is_empty())
                    .map(|chunk| {
                        if chunk.bytes().all(|b| b.is_ascii_digit()) {
                            IdxSeg::from_digits(chunk)
                        } else {
                            IdxSeg::Name(chunk.to_string())
                        }
                    })
                    .collect(),
            );
        }

        let chars: Vec<char> = field_name.chars().collect();
        let last_i = chars.len().saturating_sub(2);
        let mut segments = Vec::new();
        let mut run = String::new();
        let mut in_digits = false;
        for (ch_i, ch) in chars.iter().enumerate() {
            let is_digit = ch.is_ascii_digit() && ch_i < last_i;
            if ch_i > 0 && is_digit != in_digits {
                segments.push(Self::run_segment(&run, in_digits));
                run.clear();
            }
            in_digits = is_digit;
            run.push(*ch);
        }
        if !segments.is_empty() {
            segments.push(Self::run_segment(&run, in_digits));
        }
        IdxPath(segments)
    }

    fn run_segment(run: &str, digits: bool) -> IdxSeg {
        if digits {
            IdxSeg::from_digits(run)
        } else {
            IdxSeg::Name(run.to_string())
        }
    }

    /// Splits a flat field name, returning a single-name path for root fields.
    pub fn parse(field_name: &str) -> Self {
        let path = Self::parse_field_name(field_name);
        if path.is_empty() && !field_name.is_empty() {
            IdxPath(vec![IdxSeg::Name(field_name.to_string())])
        } else {
            path
        }
    }

    /// Encodes the path as a flat field name.
    ///
    /// With `add_sep` every segment is separated; otherwise a separator is only
    /// written between two consecutive names. A path starting with an index
    /// is always written separated, with a leading separator.
    pub fn to_field_name(&self, add_sep: bool) -> String {
        let leading_index = self.0.first().is_some_and(|seg| !seg.is_name());
        let add_sep = add_sep || leading_index;
        let mut field_name = String::new();
        let mut last_was_name = false;
        for (i, seg) in self.0.iter().enumerate() {
            if (i > 0 || leading_index) && (add_sep || (last_was_name && seg.is_name())) {
                field_name.push(IDX_PATH_SEP);
            }
            field_name.push_str(&seg.to_string());
            last_was_name = seg.is_name();
        }
        field_name
    }

    pub fn segments(&self) -> &[IdxSeg] {
        &self.0
    }

    /// Appends a segment, consuming and returning the path.
    pub fn push(mut self, seg: impl Into<IdxSeg>) -> Self {
        self.0.push(seg.into());
        self
    }

    /// Returns a new path with `seg` appended.
    pub fn join(&self, seg: impl Into<IdxSeg>) -> Self {
        self.clone().push(seg)
    }

    /// Returns a new path with the segments of `other` appended.
    pub fn concat(&self, other: &[IdxSeg]) -> Self {
        let mut segments = self.0.clone();
        segments.extend_from_slice(other);
        IdxPath(segments)
    }

    /// Path without its last segment.
    pub fn parent(&self) -> IdxPath {
        match self.0.split_last() {
            Some((_, rest)) => IdxPath(rest.to_vec()),
            None => IdxPath::new(),
        }
    }

    /// Returns a copy with the last segment replaced.
    pub fn with_last(&self, seg: impl Into<IdxSeg>) -> Self {
        self.parent().push(seg)
    }

    /// Last name segment, if the path ends in a name.
    pub fn leaf_name(&self) -> Option<&str> {
        self.0.last().and_then(IdxSeg::as_name)
    }

    /// Whether a schema row addressed by this path applies to every element
    /// of a record sequence.
    ///
    /// Paths shorter than two segments are templates only outside of a
    /// sub-record; longer paths are templates when they contain index `0`.
    pub fn is_template(&self, is_sub_rec: bool) -> bool {
        if self.0.len() < 2 {
            return !is_sub_rec;
        }
        self.0.iter().any(|seg| seg.as_index() == Some(0))
    }

    pub fn into_segments(self) -> Vec<IdxSeg> {
        self.0
    }
}

impl Deref for IdxPath {
    type Target = [IdxSeg];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl FromStr for IdxPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(IdxPath::parse(s))
    }
}

impl fmt::Display for IdxPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_field_name(true))
    }
}

impl From<&str> for IdxPath {
    fn from(field_name: &str) -> Self {
        IdxPath::parse(field_name)
    }
}

impl From<String> for IdxPath {
    fn from(field_name: String) -> Self {
        IdxPath::parse(&field_name)
    }
}

impl From<&IdxPath> for IdxPath {
    fn from(path: &IdxPath) -> Self {
        path.clone()
    }
}

impl From<Vec<IdxSeg>> for IdxPath {
    fn from(segments: Vec<IdxSeg>) -> Self {
        IdxPath(segments)
    }
}

impl From<&[IdxSeg]> for IdxPath {
    fn from(segments: &[IdxSeg]) -> Self {
        IdxPath(segments.to_vec())
    }
}

impl FromIterator<IdxSeg> for IdxPath {
    fn from_iter<I: IntoIterator<Item = IdxSeg>>(iter: I) -> Self {
        IdxPath(iter.into_iter().collect())
    }
}

/// Builds an [`IdxPath`] from names and indexes.
///
/// ```rust
/// use sysdata::idx_path;
///
/// let path = idx_path!["Rooms", 2, "Name"];
/// assert_eq!(path.to_string(), "Rooms/2/Name");
/// ```
#[macro_export]
macro_rules! idx_path {
    () => {
        $crate::record::IdxPath::new()
    };
    ($($seg:expr),+ $(,)?) => {
        $crate::record::IdxPath::from(vec![$($crate::record::IdxSeg::from($seg)),+])
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::idx_path;

    #[test]
    fn test_parse_implicit_boundaries() {
        assert_eq!(
            IdxPath::parse("Rooms0Name"),
            idx_path!["Rooms", 0, "Name"]
        );
        assert_eq!(
            IdxPath::parse("Rooms12Pers3Name"),
            idx_path!["Rooms", 12, "Pers", 3, "Name"]
        );
        assert_eq!(IdxPath::parse("12AB"), idx_path![12, "AB"]);
    }

    #[test]
    fn test_parse_keeps_short_suffixes() {
        assert!(IdxPath::parse_field_name("NAME-1").is_empty());
        assert!(IdxPath::parse_field_name("CD_ADD11").is_empty());
        assert!(IdxPath::parse_field_name("B0X").is_empty());
        assert_eq!(IdxPath::parse("CD_ADD11"), idx_path!["CD_ADD11"]);
    }

    #[test]
    fn test_parse_explicit_separator() {
        assert_eq!(IdxPath::parse("B/0/X"), idx_path!["B", 0, "X"]);
        assert_eq!(IdxPath::parse("/A//B/"), idx_path!["A", "B"]);
        assert_eq!(IdxPath::parse("A/1"), idx_path!["A", 1]);
        assert_eq!(IdxPath::parse("Room/CD_ADD11"), idx_path!["Room", "CD_ADD11"]);
    }

    #[test]
    fn test_parse_empty() {
        assert!(IdxPath::parse("").is_empty());
        assert!(IdxPath::parse("///").is_empty());
    }

    #[test]
    fn test_field_name_encoding() {
        let path = idx_path!["A", "B", 0, "C"];
        assert_eq!(path.to_field_name(false), "A/B0C");
        assert_eq!(path.to_field_name(true), "A/B/0/C");
        assert_eq!(path.to_string(), "A/B/0/C");
        assert_eq!(idx_path![3].to_string(), "/3");
        assert_eq!(idx_path![3, "X"].to_field_name(false), "/3/X");
    }

    #[test]
    fn test_encoded_paths_decode_back() {
        let paths = [
            idx_path!["A"],
            idx_path!["A", "B", 0, "C"],
            idx_path!["Rooms", 12, "Size"],
            idx_path![3],
            idx_path![3, "X"],
            idx_path![0, "X", 1],
            idx_path!["B", 0, "X"],
            idx_path!["CD_ADD11"],
            idx_path!["Tags", 1],
        ];
        for path in paths {
            let encoded = path.to_string();
            assert_eq!(encoded.parse::<IdxPath>().unwrap(), path, "decoding {encoded}");
        }
        // The compact form splits again wherever its digit runs are long
        // enough to be read as indexes.
        let compact = idx_path!["Rooms", 0, "Size"].to_field_name(false);
        assert_eq!(IdxPath::parse(&compact), idx_path!["Rooms", 0, "Size"]);
        assert_eq!(IdxPath::parse(&idx_path![3].to_field_name(false)), idx_path![3]);
    }

    #[test]
    fn test_display_round_trip() {
        let paths = [
            idx_path!["A"],
            idx_path!["A", 1],
            idx_path!["B", 0, "X"],
            idx_path!["Rooms", 10, "Pers", 2, "CD_ADD11"],
            idx_path![7, "Name"],
        ];
        for path in paths {
            let decoded: IdxPath = path.to_string().parse().unwrap();
            assert_eq!(decoded, path);
        }
    }

    #[test]
    fn test_template_detection() {
        assert!(idx_path!["A"].is_template(false));
        assert!(!idx_path!["A"].is_template(true));
        assert!(idx_path!["B", 0, "X"].is_template(true));
        assert!(!idx_path!["B", 1, "X"].is_template(true));
    }

    #[test]
    fn test_path_helpers() {
        let path = idx_path!["B", 0, "X"];
        assert_eq!(path.parent(), idx_path!["B", 0]);
        assert_eq!(path.with_last("Y"), idx_path!["B", 0, "Y"]);
        assert_eq!(path.leaf_name(), Some("X"));
        assert_eq!(path.join(2).len(), 4);
        assert_eq!(idx_path!["B"].concat(&path[1..]), path);
    }
}
