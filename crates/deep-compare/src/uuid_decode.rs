//! Rewriting of Base64-encoded UUID strings in reports.
//!
//! Some applications store UUIDs as the Base64 encoding of their hyphenated
//! text form. Decoding them in the output makes the values searchable in
//! either database.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::compare::{ComparisonResult, ForeignKeyReference, RowDifference};
use crate::core::{Row, SqlValue};
use crate::references::ReferenceReport;

/// Decodes Base64-encoded UUID text values when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidDecoder {
    enabled: bool,
}

impl UuidDecoder {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Decode `value` if it is 44 to 52 Base64 characters that decode to a
    /// hyphenated 36-character UUID string.
    pub fn decode_str(&self, value: &str) -> Option<String> {
        if !self.enabled || !(44..=52).contains(&value.len()) {
            return None;
        }
        if !value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
        {
            return None;
        }
        let decoded = STANDARD.decode(value).ok()?;
        let text = String::from_utf8(decoded).ok()?;
        looks_like_uuid(&text).then_some(text)
    }

    /// Decode a single value. Bytes are turned into text first.
    pub fn decode_value(&self, value: &SqlValue) -> SqlValue {
        if !self.enabled {
            return value.clone();
        }
        match value.normalized() {
            SqlValue::Text(s) => match self.decode_str(&s) {
                Some(decoded) => SqlValue::Text(decoded),
                None => SqlValue::Text(s),
            },
            other => other,
        }
    }

    fn decode_in_place(&self, value: &mut SqlValue) {
        if let SqlValue::Text(s) = value {
            if let Some(decoded) = self.decode_str(s) {
                *s = decoded;
            }
        }
    }

    pub fn process_row(&self, row: &mut Row) {
        if !self.enabled {
            return;
        }
        for value in row.values_mut() {
            self.decode_in_place(value);
        }
    }

    fn process_difference(&self, diff: &mut RowDifference) {
        self.process_row(&mut diff.db1_row);
        self.process_row(&mut diff.db2_row);
        for col in &mut diff.column_differences {
            self.decode_in_place(&mut col.db1_value);
            self.decode_in_place(&mut col.db2_value);
            if let Some(reference) = col.foreign_key_reference.as_mut() {
                self.process_reference(reference);
            }
        }
    }

    fn process_reference(&self, reference: &mut ForeignKeyReference) {
        if let Some(row) = reference.db1_referenced.as_mut() {
            self.process_row(row);
        }
        if let Some(row) = reference.db2_referenced.as_mut() {
            self.process_row(row);
        }
    }

    /// Decode every text value of a comparison result, including nested
    /// foreign key results.
    pub fn process_comparison(&self, result: &mut ComparisonResult) {
        if !self.enabled {
            return;
        }
        for diff in &mut result.differences {
            self.process_difference(diff);
        }
        for row in result
            .only_in_db1
            .iter_mut()
            .chain(result.only_in_db2.iter_mut())
        {
            self.process_row(row);
        }
        for fk_result in &mut result.foreign_key_results {
            self.process_comparison(&mut fk_result.comparison_result);
            for reference in &mut fk_result.fk_references {
                self.process_reference(reference);
            }
        }
    }

    /// Decode the value lists of a reference report.
    pub fn process_reference_report(&self, report: &mut ReferenceReport) {
        if !self.enabled {
            return;
        }
        for reference in &mut report.references {
            for list in [
                &mut reference.db1_references,
                &mut reference.db2_references,
                &mut reference.common_references,
                &mut reference.only_in_db1,
                &mut reference.only_in_db2,
            ] {
                for value in list.iter_mut() {
                    *value = self.decode_value(value);
                }
            }
        }
    }
}

impl Default for UuidDecoder {
    fn default() -> Self {
        Self::new(true)
    }
}

fn looks_like_uuid(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 36 && b[8] == b'-' && b[13] == b'-' && b[18] == b'-' && b[23] == b'-'
}

#[cfg(test)]
mod tests {
    use super::*;

    const UUID: &str = "3f2504e0-4f89-11d3-9a0c-0305e82c3301";

    fn encoded() -> String {
        STANDARD.encode(UUID)
    }

    #[test]
    fn test_decodes_base64_uuid() {
        let decoder = UuidDecoder::new(true);
        assert_eq!(encoded().len(), 48);
        assert_eq!(decoder.decode_str(&encoded()).as_deref(), Some(UUID));
    }

    #[test]
    fn test_leaves_other_strings() {
        let decoder = UuidDecoder::new(true);
        assert!(decoder.decode_str("hello").is_none());
        assert!(decoder.decode_str(UUID).is_none());
        // Right length, valid Base64, but not a UUID once decoded.
        let not_uuid = STANDARD.encode("x".repeat(36));
        assert!(decoder.decode_str(&not_uuid).is_none());
    }

    #[test]
    fn test_disabled_is_identity() {
        let decoder = UuidDecoder::new(false);
        assert!(decoder.decode_str(&encoded()).is_none());
        let value = SqlValue::Text(encoded());
        assert_eq!(decoder.decode_value(&value), value);
    }

    #[test]
    fn test_bytes_become_text() {
        let decoder = UuidDecoder::new(true);
        let value = SqlValue::Bytes(encoded().into_bytes());
        assert_eq!(decoder.decode_value(&value), SqlValue::Text(UUID.into()));
    }

    #[test]
    fn test_process_comparison_rows() {
        let decoder = UuidDecoder::new(true);
        let mut result = ComparisonResult::new("public", "users");
        result.only_in_db1.push(Row::new().with("ref", encoded()).with("n", 1));
        decoder.process_comparison(&mut result);
        assert_eq!(
            result.only_in_db1[0].get("ref"),
            Some(&SqlValue::Text(UUID.into()))
        );
        assert_eq!(result.only_in_db1[0].get("n"), Some(&SqlValue::Int(1)));
    }
}
