//! Value decoders for probe payload fields
//!
//! Integers arrive either as decimal or `0x`-prefixed hex. Floating point values
//! never cross the wire as text: the probe prints the raw IEEE-754 bit pattern as
//! a hex word, which is reinterpreted here bit-for-bit.

use crate::services::plan_tracer::parser::error::{ParseError, ParseResult};

/// Decoder for single payload values
pub struct ValueParser;

impl ValueParser {
    /// Parse an unsigned 64-bit value, hex when `0x`-prefixed, decimal otherwise
    pub fn parse_u64(key: &str, value: &str) -> ParseResult<u64> {
        let trimmed = value.trim();
        let parsed = match Self::strip_hex_prefix(trimmed) {
            Some(digits) => u64::from_str_radix(digits, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed.map_err(|e| ParseError::invalid_field(key, value, e.to_string()))
    }

    /// Parse a decimal signed 32-bit value
    pub fn parse_i32(key: &str, value: &str) -> ParseResult<i32> {
        value
            .trim()
            .parse::<i32>()
            .map_err(|e| ParseError::invalid_field(key, value, e.to_string()))
    }

    /// Decode a `0x`-prefixed hex word into the double with the same bit pattern
    pub fn parse_hex_double(key: &str, value: &str) -> ParseResult<f64> {
        let trimmed = value.trim();
        let digits = Self::strip_hex_prefix(trimmed)
            .ok_or_else(|| ParseError::invalid_field(key, value, "missing 0x prefix"))?;
        if digits.is_empty() || digits.len() > 16 {
            return Err(ParseError::invalid_field(key, value, "expected 1 to 16 hex digits"));
        }
        let bits = u64::from_str_radix(digits, 16)
            .map_err(|e| ParseError::invalid_field(key, value, e.to_string()))?;
        Ok(f64::from_bits(bits))
    }

    /// Parse a boolean flag.
    ///
    /// Accepts `true/false/t/f/1/0` and raw hex words; a word is true when its
    /// low byte is non-zero, since probes read the flag out of a wider word.
    pub fn parse_bool(key: &str, value: &str) -> ParseResult<bool> {
        let trimmed = value.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => return Ok(true),
            "false" | "f" | "0" => return Ok(false),
            _ => {},
        }
        match Self::strip_hex_prefix(trimmed) {
            Some(digits) => u64::from_str_radix(digits, 16)
                .map(|word| word & 0xff != 0)
                .map_err(|e| ParseError::invalid_field(key, value, e.to_string())),
            None => Err(ParseError::invalid_field(key, value, "not a boolean")),
        }
    }

    /// Encode a double as the hex word the probes emit
    pub fn encode_hex_double(value: f64) -> String {
        format!("0x{:016x}", value.to_bits())
    }

    /// Format an address the way probes print them
    pub fn format_address(address: u64) -> String {
        format!("0x{:x}", address)
    }

    fn strip_hex_prefix(value: &str) -> Option<&str> {
        value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))
    }
}
