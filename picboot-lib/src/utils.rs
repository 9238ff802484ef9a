use crate::device::AddressRange;
use crate::{Error, Result};
use std::num::ParseIntError;

pub struct Utils;
impl Utils {
    /// Parse a number written in decimal, `0x` hex, `0b` binary or `0o` octal, with an optional
    /// `k`/`K` (x1024) suffix.
    pub fn str_to_u32(s: &str) -> std::result::Result<u32, ParseIntError> {
        let s = s.trim();

        let (num_str, multiplier) = match s.chars().last() {
            Some('k') | Some('K') if !s.starts_with("0x") && !s.starts_with("0X") => {
                (&s[..s.len() - 1], 1024u32)
            }
            _ => (s, 1),
        };

        let unsigned: u32 = if let Some(hex) = num_str
            .strip_prefix("0x")
            .or_else(|| num_str.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16)?
        } else if let Some(bin) = num_str.strip_prefix("0b") {
            u32::from_str_radix(bin, 2)?
        } else if let Some(oct) = num_str.strip_prefix("0o") {
            u32::from_str_radix(oct, 8)?
        } else {
            num_str.parse()?
        };

        Ok(unsigned.saturating_mul(multiplier))
    }

    /// Parse `first:last` (inclusive) into an address range.
    pub fn parse_range(s: &str) -> Result<AddressRange> {
        let (first, last) = s
            .split_once(':')
            .ok_or_else(|| Error::parameter(format!("Expected FIRST:LAST, got '{}'", s)))?;
        let parse = |part: &str| {
            Self::str_to_u32(part)
                .map_err(|e| Error::parameter(format!("Invalid address '{}': {}", part.trim(), e)))
        };
        let range = AddressRange::new(parse(first)?, parse(last)?);
        if !range.is_valid() {
            return Err(Error::parameter(format!("Bad memory region: {}", range)));
        }
        Ok(range)
    }
}
