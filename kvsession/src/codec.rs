//! Normalization of caller keys and values to canonical bytes.
//!
//! Callers hand in text or raw bytes; the engine only ever sees [`Bytes`].
//! Reads decode back into whichever representation the caller asked for.

use bytes::Bytes;
use common::BytesRange;

use crate::error::{Error, Result};

/// A key or value as the caller supplies or receives it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Data {
    /// Raw bytes, passed through untouched.
    Bytes(Bytes),
    /// UTF-8 text, stored as its bytes.
    Text(String),
}

impl Data {
    /// Decodes stored bytes, as raw bytes when `return_bytes` is set and as
    /// UTF-8 text otherwise.
    pub(crate) fn decode(bytes: Bytes, return_bytes: bool) -> Result<Data> {
        if return_bytes {
            return Ok(Data::Bytes(bytes));
        }
        match String::from_utf8(bytes.to_vec()) {
            Ok(text) => Ok(Data::Text(text)),
            Err(e) => Err(Error::Encoding(format!(
                "stored bytes are not valid UTF-8: {}",
                e.utf8_error()
            ))),
        }
    }

    /// The canonical bytes of this key or value.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Data::Bytes(bytes) => bytes,
            Data::Text(text) => text.as_bytes(),
        }
    }

    /// Converts into canonical bytes.
    pub fn into_bytes(self) -> Bytes {
        match self {
            Data::Bytes(bytes) => bytes,
            Data::Text(text) => Bytes::from(text),
        }
    }

    /// The text, if this was decoded or supplied as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Data::Text(text) => Some(text),
            Data::Bytes(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_bytes().is_empty()
    }
}

impl From<Bytes> for Data {
    fn from(bytes: Bytes) -> Self {
        Data::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Data {
    fn from(bytes: Vec<u8>) -> Self {
        Data::Bytes(Bytes::from(bytes))
    }
}

impl From<&[u8]> for Data {
    fn from(bytes: &[u8]) -> Self {
        Data::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl<const N: usize> From<&[u8; N]> for Data {
    fn from(bytes: &[u8; N]) -> Self {
        Data::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<String> for Data {
    fn from(text: String) -> Self {
        Data::Text(text)
    }
}

impl From<&str> for Data {
    fn from(text: &str) -> Self {
        Data::Text(text.to_string())
    }
}

impl From<&String> for Data {
    fn from(text: &String) -> Self {
        Data::Text(text.clone())
    }
}

impl PartialEq<str> for Data {
    fn eq(&self, other: &str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<&str> for Data {
    fn eq(&self, other: &&str) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl PartialEq<[u8]> for Data {
    fn eq(&self, other: &[u8]) -> bool {
        self.as_bytes() == other
    }
}

/// Normalizes a key or value to canonical bytes.
pub fn encode(data: impl Into<Data>) -> Bytes {
    data.into().into_bytes()
}

/// A `[start, limit)` key range used for size estimation.
///
/// No ordering is enforced between `start` and `limit`; an inverted range
/// simply covers nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Bytes,
    pub limit: Bytes,
}

impl KeyRange {
    pub fn new(start: impl Into<Data>, limit: impl Into<Data>) -> Self {
        Self {
            start: encode(start),
            limit: encode(limit),
        }
    }

    /// Pairs up a flat `[start0, limit0, start1, limit1, ...]` sequence.
    ///
    /// Fails with [`Error::InvalidInput`] when the sequence has odd length.
    pub fn from_flat<I, D>(bounds: I) -> Result<Vec<KeyRange>>
    where
        I: IntoIterator<Item = D>,
        D: Into<Data>,
    {
        let bounds: Vec<Bytes> = bounds.into_iter().map(encode).collect();
        if bounds.len() % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "flat range list must hold start/limit pairs, got {} bounds",
                bounds.len()
            )));
        }
        Ok(bounds
            .chunks_exact(2)
            .map(|pair| KeyRange {
                start: pair[0].clone(),
                limit: pair[1].clone(),
            })
            .collect())
    }

    pub(crate) fn to_bytes_range(&self) -> BytesRange {
        BytesRange::half_open(self.start.clone(), self.limit.clone())
    }
}

impl<A, B> From<(A, B)> for KeyRange
where
    A: Into<Data>,
    B: Into<Data>,
{
    fn from((start, limit): (A, B)) -> Self {
        KeyRange::new(start, limit)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    proptest! {
        #[test]
        fn should_decode_bytes_exactly_as_encoded(data: Vec<u8>) {
            let encoded = encode(data.clone());
            let decoded = Data::decode(encoded, true).unwrap();
            prop_assert_eq!(decoded.as_bytes(), data.as_slice());
        }

        #[test]
        fn should_decode_text_exactly_as_encoded(text: String) {
            let encoded = encode(text.as_str());
            let decoded = Data::decode(encoded, false).unwrap();
            prop_assert_eq!(decoded.as_str(), Some(text.as_str()));
        }
    }

    #[test]
    fn should_encode_text_and_bytes_to_same_canonical_form() {
        assert_eq!(encode("abc"), encode(b"abc"));
        assert_eq!(encode(String::from("abc")), encode(vec![b'a', b'b', b'c']));
        assert_eq!(encode(Bytes::from_static(b"abc")), Bytes::from("abc"));
    }

    #[test]
    fn should_accept_empty_keys() {
        let encoded = encode("");
        assert!(encoded.is_empty());
        assert_eq!(Data::decode(encoded, false).unwrap(), "");
    }

    #[test]
    fn should_fail_text_decode_of_invalid_utf8() {
        // given
        let bytes = Bytes::from_static(&[0xFF, 0xFE]);

        // when
        let result = Data::decode(bytes.clone(), false);

        // then
        assert!(matches!(result, Err(Error::Encoding(_))));
        assert_eq!(Data::decode(bytes, true).unwrap(), Data::Bytes(Bytes::from_static(&[0xFF, 0xFE])));
    }

    #[test]
    fn should_pair_flat_bounds() {
        // when
        let ranges = KeyRange::from_flat(["a", "c", "x", "z"]).unwrap();

        // then
        assert_eq!(ranges, vec![KeyRange::new("a", "c"), KeyRange::new("x", "z")]);
    }

    #[test]
    fn should_reject_odd_flat_bounds() {
        let result = KeyRange::from_flat(["a", "c", "x"]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn should_build_range_from_tuple() {
        let range: KeyRange = ("a", b"z").into();
        assert_eq!(range.start, Bytes::from("a"));
        assert_eq!(range.limit, Bytes::from("z"));
    }
}
