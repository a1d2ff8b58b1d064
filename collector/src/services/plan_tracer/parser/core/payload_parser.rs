//! Payload parser for `key:value,key:value` probe payloads

use crate::services::plan_tracer::parser::core::ValueParser;
use crate::services::plan_tracer::parser::error::ParseError;
use std::collections::HashMap;

/// Decoded value plus the field-level errors hit while decoding it.
///
/// Failed fields are left at their zero value; the errors are kept so the
/// caller can log them.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub field_errors: Vec<ParseError>,
}

impl<T> Decoded<T> {
    pub fn is_clean(&self) -> bool {
        self.field_errors.is_empty()
    }
}

/// Raw `key -> value` pairs of one payload
#[derive(Debug, Clone, Default)]
pub struct PayloadFields {
    fields: HashMap<String, String>,
    errors: Vec<ParseError>,
}

impl PayloadFields {
    /// Split a payload into fields. Malformed fields are skipped and recorded.
    pub fn parse(payload: &str) -> Self {
        let mut parsed = Self::default();
        for field in payload.split(',') {
            let field = field.trim();
            if field.is_empty() {
                continue;
            }
            match field.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => {
                    parsed.fields.insert(key.trim().to_string(), value.trim().to_string());
                },
                _ => parsed.errors.push(ParseError::MalformedField(field.to_string())),
            }
        }
        parsed
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Errors recorded while splitting the payload
    pub fn errors(&self) -> &[ParseError] {
        &self.errors
    }

    /// Decode `key` as u64, recording a failure in `errors`
    pub fn u64_field(&self, key: &str, errors: &mut Vec<ParseError>) -> Option<u64> {
        self.decode(key, errors, ValueParser::parse_u64)
    }

    pub fn i32_field(&self, key: &str, errors: &mut Vec<ParseError>) -> Option<i32> {
        self.decode(key, errors, ValueParser::parse_i32)
    }

    pub fn hex_double_field(&self, key: &str, errors: &mut Vec<ParseError>) -> Option<f64> {
        self.decode(key, errors, ValueParser::parse_hex_double)
    }

    pub fn bool_field(&self, key: &str, errors: &mut Vec<ParseError>) -> Option<bool> {
        self.decode(key, errors, ValueParser::parse_bool)
    }

    fn decode<T>(
        &self,
        key: &str,
        errors: &mut Vec<ParseError>,
        parse: fn(&str, &str) -> Result<T, ParseError>,
    ) -> Option<T> {
        let raw = self.get(key)?;
        match parse(key, raw) {
            Ok(value) => Some(value),
            Err(e) => {
                errors.push(e);
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_payload_fields() {
        let fields = PayloadFields::parse("plantype:117,addr:0x1ae4630,left:0x0,right:0x0");
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.get("plantype"), Some("117"));
        assert_eq!(fields.get("addr"), Some("0x1ae4630"));
        assert!(fields.errors().is_empty());
    }

    #[test]
    fn test_malformed_fields_are_skipped() {
        let fields = PayloadFields::parse("plantype:117,garbage,:0x1,plan:0x10");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.errors().len(), 2);
        assert_eq!(fields.get("plan"), Some("0x10"));
    }

    #[test]
    fn test_empty_payload() {
        let fields = PayloadFields::parse("");
        assert!(fields.is_empty());
        assert!(fields.errors().is_empty());
    }

    #[test]
    fn test_value_keeps_extra_colons() {
        let fields = PayloadFields::parse("note:a:b");
        assert_eq!(fields.get("note"), Some("a:b"));
    }

    #[test]
    fn test_typed_field_failure_is_recorded() {
        let fields = PayloadFields::parse("plan:0xnothex,plantype:109");
        let mut errors = Vec::new();
        assert_eq!(fields.u64_field("plan", &mut errors), None);
        assert_eq!(fields.i32_field("plantype", &mut errors), Some(109));
        assert_eq!(fields.u64_field("absent", &mut errors), None);
        assert_eq!(errors.len(), 1);
    }
}
