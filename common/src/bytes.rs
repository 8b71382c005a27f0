//! Key ranges over byte sequences.

use bytes::{Bytes, BytesMut};
use std::ops::Bound;
use std::ops::Bound::{Excluded, Included, Unbounded};

/// Returns the smallest byte sequence strictly greater than every sequence
/// starting with `data`, or `None` when `data` is empty or all `0xFF`.
///
/// `[0x61, 0xFF]` becomes `[0x62]`; `[0xFF]` has no successor.
pub(crate) fn lex_increment(data: &[u8]) -> Option<Bytes> {
    let mut result = BytesMut::from(data);
    while let Some(last) = result.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(result.freeze());
        }
        result.truncate(result.len() - 1);
    }
    None
}

/// A range of keys with independent start and end bounds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BytesRange {
    pub start: Bound<Bytes>,
    pub end: Bound<Bytes>,
}

impl BytesRange {
    pub fn new(start: Bound<Bytes>, end: Bound<Bytes>) -> Self {
        Self { start, end }
    }

    /// The range `[start, limit)`.
    pub fn half_open(start: Bytes, limit: Bytes) -> Self {
        Self::new(Included(start), Excluded(limit))
    }

    /// Every key that starts with `prefix`.
    pub fn prefix(prefix: Bytes) -> Self {
        if prefix.is_empty() {
            return Self::new(Unbounded, Unbounded);
        }
        let end = match lex_increment(&prefix) {
            Some(end) => Excluded(end),
            None => Unbounded,
        };
        Self::new(Included(prefix), end)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        let above_start = match &self.start {
            Included(s) => key >= &s[..],
            Excluded(s) => key > &s[..],
            Unbounded => true,
        };
        let below_end = match &self.end {
            Included(e) => key <= &e[..],
            Excluded(e) => key < &e[..],
            Unbounded => true,
        };
        above_start && below_end
    }

    /// Whether no key can fall inside the range.
    ///
    /// An inverted range is empty rather than invalid. Check this before
    /// handing the bounds to `BTreeMap::range`, which panics on them.
    pub fn is_empty(&self) -> bool {
        match (&self.start, &self.end) {
            (Unbounded, _) | (_, Unbounded) => false,
            (Included(s), Included(e)) => s > e,
            (Included(s), Excluded(e)) | (Excluded(s), Included(e)) => s >= e,
            // (s, s ++ [0x00]) holds nothing either.
            (Excluded(s), Excluded(e)) => {
                s >= e || (e.len() == s.len() + 1 && e.starts_with(s) && e[s.len()] == 0x00)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn should_contain_every_extension_of_prefix(prefix: Vec<u8>, suffix: Vec<u8>) {
            let range = BytesRange::prefix(Bytes::from(prefix.clone()));

            let mut extended = prefix.clone();
            extended.extend(&suffix);
            prop_assert!(range.contains(&prefix));
            prop_assert!(range.contains(&extended));
        }

        #[test]
        fn should_increment_past_every_extension(data: Vec<u8>, suffix: Vec<u8>) {
            if let Some(next) = lex_increment(&data) {
                let mut extended = data.clone();
                extended.extend(&suffix);
                prop_assert!(next.as_ref() > extended.as_slice());
            }
        }
    }

    #[test]
    fn should_increment_last_incrementable_byte() {
        assert_eq!(lex_increment(b"a").unwrap().as_ref(), b"b");
        assert_eq!(lex_increment(&[0x61, 0xFF, 0xFF]).unwrap().as_ref(), &[0x62]);
        assert!(lex_increment(&[]).is_none());
        assert!(lex_increment(&[0xFF, 0xFF]).is_none());
    }

    #[test]
    fn should_exclude_neighbours_of_prefix() {
        let range = BytesRange::prefix(Bytes::from("user:"));

        assert!(range.contains(b"user:"));
        assert!(range.contains(b"user:\xFF"));
        assert!(!range.contains(b"user"));
        assert!(!range.contains(b"user;"));
    }

    #[test]
    fn should_leave_all_ff_prefix_unbounded() {
        let range = BytesRange::prefix(Bytes::from_static(&[0xFF, 0xFF]));

        assert_eq!(range.end, Unbounded);
        assert!(range.contains(&[0xFF, 0xFF, 0xFF]));
        assert!(!range.contains(&[0xFE, 0xFF]));
    }

    #[test]
    fn should_cover_everything_with_empty_prefix() {
        let range = BytesRange::prefix(Bytes::new());

        assert!(range.contains(b""));
        assert!(range.contains(&[0xFF; 4]));
        assert!(!range.is_empty());
    }

    #[test]
    fn should_treat_inverted_and_degenerate_ranges_as_empty() {
        let inverted = BytesRange::half_open(Bytes::from("z"), Bytes::from("a"));
        let degenerate = BytesRange::half_open(Bytes::from("m"), Bytes::from("m"));
        let open_gap = BytesRange::new(
            Excluded(Bytes::from("a")),
            Excluded(Bytes::from_static(b"a\x00")),
        );
        let point = BytesRange::new(Included(Bytes::from("m")), Included(Bytes::from("m")));

        assert!(inverted.is_empty());
        assert!(degenerate.is_empty());
        assert!(open_gap.is_empty());
        assert!(!point.is_empty());
        assert!(!BytesRange::half_open(Bytes::from("a"), Bytes::from("b")).is_empty());
    }
}
