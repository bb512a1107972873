//! Extension traits for parsing wire payloads into typed structures.

use error_stack::ResultExt;
use serde::Deserialize;

use crate::errors::{CustomResult, ParsingError};

/// Parse a `[u8]` slice into `T` using `serde::Deserialize`.
pub trait ByteSliceExt {
    /// Deserialize `self` as JSON, naming `type_name` in the error trail.
    fn parse_struct<'de, T>(&'de self, type_name: &str) -> CustomResult<T, ParsingError>
    where
        T: Deserialize<'de>;
}

impl ByteSliceExt for [u8] {
    fn parse_struct<'de, T>(&'de self, type_name: &str) -> CustomResult<T, ParsingError>
    where
        T: Deserialize<'de>,
    {
        serde_json::from_slice(self)
            .change_context(ParsingError)
            .attach_printable_lazy(|| format!("Unable to parse {type_name} from bytes"))
    }
}

/// Parse `bytes::Bytes` into `T` using `serde::Deserialize`.
pub trait BytesExt {
    /// Deserialize `self` as JSON, naming `type_name` in the error trail.
    fn parse_struct<'de, T>(&'de self, type_name: &str) -> CustomResult<T, ParsingError>
    where
        T: Deserialize<'de>;
}

impl BytesExt for bytes::Bytes {
    fn parse_struct<'de, T>(&'de self, type_name: &str) -> CustomResult<T, ParsingError>
    where
        T: Deserialize<'de>,
    {
        serde_json::from_slice(self)
            .change_context(ParsingError)
            .attach_printable_lazy(|| format!("Unable to parse {type_name} from bytes"))
    }
}

/// Parse a `serde_json::Value` into `T`.
pub trait ValueExt {
    /// Convert `self` into `T`, naming `type_name` in the error trail.
    fn parse_value<T>(self, type_name: &str) -> CustomResult<T, ParsingError>
    where
        T: serde::de::DeserializeOwned;
}

impl ValueExt for serde_json::Value {
    fn parse_value<T>(self, type_name: &str) -> CustomResult<T, ParsingError>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_value(self)
            .change_context(ParsingError)
            .attach_printable_lazy(|| format!("Unable to parse {type_name} from value"))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Payload {
        id: String,
    }

    #[test]
    fn parse_struct_from_slice() {
        let body: &[u8] = br#"{"id":"evt_42"}"#;
        let parsed: Payload = body.parse_struct("Payload").unwrap();
        assert_eq!(parsed.id, "evt_42");
    }

    #[test]
    fn parse_struct_reports_type_name() {
        let body: &[u8] = b"not json";
        let err = ByteSliceExt::parse_struct::<Payload>(body, "Payload").unwrap_err();
        assert!(format!("{err:?}").contains("Payload"));
    }
}
