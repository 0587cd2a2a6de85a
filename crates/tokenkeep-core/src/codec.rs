//! Conversion between records and the text blobs a backend stores.
//!
//! Decoding never fails outright: a blob either yields a value, is missing, or
//! is malformed. Callers decide what a malformed blob means for them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

use crate::error::StoreError;

/// Outcome of decoding an optional blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded<T> {
    Present(T),
    Absent,
    /// The blob existed but could not be parsed; carries the parser message.
    Malformed(String),
}

pub fn encode<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(blob: Option<&str>) -> Decoded<T> {
    match blob {
        None => Decoded::Absent,
        Some(text) => match serde_json::from_str(text) {
            Ok(value) => Decoded::Present(value),
            Err(err) => Decoded::Malformed(err.to_string()),
        },
    }
}

/// Timestamps are stored as a quoted RFC 3339 instant.
pub fn encode_timestamp(at: DateTime<Utc>) -> String {
    format!("\"{}\"", at.to_rfc3339())
}

pub fn decode_timestamp(blob: Option<&str>) -> Decoded<DateTime<Utc>> {
    decode(blob)
}

pub fn encode_index(handles: &BTreeSet<String>) -> Result<String, StoreError> {
    serde_json::to_string(handles).map_err(|e| StoreError::Serialization(e.to_string()))
}

pub fn decode_index(blob: Option<&str>) -> Decoded<BTreeSet<String>> {
    decode(blob)
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::records::TokenRecord;

    #[test]
    fn malformed_blob_is_reported_not_raised() {
        let decoded: Decoded<TokenRecord> = decode(Some("{ not json"));
        assert!(matches!(decoded, Decoded::Malformed(_)));
    }

    #[test]
    fn missing_blob_is_absent() {
        let decoded: Decoded<TokenRecord> = decode(None);
        assert_eq!(decoded, Decoded::Absent);
    }

    #[test]
    fn timestamp_is_textual_instant() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let blob = encode_timestamp(at);
        assert_eq!(blob, "\"2024-03-01T12:30:00+00:00\"");
        assert_eq!(decode_timestamp(Some(blob.as_str())), Decoded::Present(at));
    }

    #[test]
    fn index_is_a_text_encoded_set() {
        let handles: BTreeSet<String> = ["b".to_string(), "a".to_string()].into();
        let blob = encode_index(&handles).expect("encode");
        assert_eq!(blob, r#"["a","b"]"#);
        assert_eq!(decode_index(Some(blob.as_str())), Decoded::Present(handles));
        assert!(matches!(
            decode_index(Some("a b c")),
            Decoded::Malformed(_)
        ));
    }

    #[test]
    fn record_fields_survive_encoding() {
        let record = TokenRecord::new("AT1", "RT1");
        let blob = encode(&record).expect("encode");
        assert!(blob.contains("\"access_token\": \"AT1\""));
        assert_eq!(
            decode::<TokenRecord>(Some(blob.as_str())),
            Decoded::Present(record)
        );
    }
}
