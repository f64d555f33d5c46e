//! Hex byte-string decoding.

use crate::error::{Error, Result};

/// Decode a hex string such as `"90 90 E8"` or `"0x9090e8"` into bytes.
///
/// Digits may be upper or lower case and ASCII whitespace is ignored. An
/// optional `0x`/`0X` prefix is accepted.
///
/// # Examples
///
/// ```
/// use pagesafe_core::hex;
///
/// assert_eq!(hex::decode("0x9090E8").unwrap(), vec![0x90, 0x90, 0xE8]);
/// assert_eq!(hex::decode("de ad be ef").unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
/// ```
pub fn decode(input: &str) -> Result<Vec<u8>> {
    let trimmed = input.trim_start();
    let body = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let mut digits = Vec::with_capacity(body.len());
    for c in body.chars() {
        if c.is_ascii_whitespace() {
            continue;
        }
        let digit = c
            .to_digit(16)
            .ok_or_else(|| Error::InvalidHex(format!("'{}' is not a hex digit", c)))?;
        digits.push(digit as u8);
    }

    if digits.is_empty() {
        return Err(Error::InvalidHex("no hex digits".to_string()));
    }
    if digits.len() % 2 != 0 {
        return Err(Error::InvalidHex(format!(
            "odd number of hex digits ({})",
            digits.len()
        )));
    }

    Ok(digits.chunks(2).map(|pair| pair[0] << 4 | pair[1]).collect())
}

/// Encode bytes as space-separated upper-case hex.
pub fn encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
