//! Textual addresses: `0x7f001000`, `libc.so.6+0x1a0` or `libc.so.6`.

use std::fmt;
use std::str::FromStr;

use crate::backend::Address;
use crate::error::{Error, Result};
use crate::module;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressExpr {
    /// A plain hex address
    Absolute(Address),
    /// An offset from the base of a loaded module
    ModuleOffset { module: String, offset: usize },
}

impl AddressExpr {
    /// Parse an address expression.
    ///
    /// A string that parses as hex is an absolute address. Otherwise it is
    /// split at the last `+` into a module name and a hex offset; a string
    /// without `+` names a module base.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::InvalidAddress("empty address".to_string()));
        }
        if let Some(address) = parse_hex(input) {
            return Ok(Self::Absolute(address));
        }

        let (module, offset) = match input.rsplit_once('+') {
            Some((module, offset)) => {
                let offset = parse_hex(offset.trim()).ok_or_else(|| {
                    Error::InvalidAddress(format!("invalid hex offset in '{}'", input))
                })?;
                (module.trim(), offset)
            }
            None => (input, 0),
        };
        if module.is_empty() {
            return Err(Error::InvalidAddress(format!(
                "missing module name in '{}'",
                input
            )));
        }
        Ok(Self::ModuleOffset {
            module: module.to_string(),
            offset,
        })
    }

    /// Resolve to an address in the current process.
    pub fn resolve(&self) -> Result<Address> {
        match self {
            Self::Absolute(address) => Ok(*address),
            Self::ModuleOffset { module, offset } => {
                let base = module::base_address(module)?;
                base.checked_add(*offset).ok_or_else(|| {
                    Error::InvalidAddress(format!("{} overflows the address space", self))
                })
            }
        }
    }
}

impl FromStr for AddressExpr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for AddressExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(address) => write!(f, "0x{:X}", address),
            Self::ModuleOffset { module, offset: 0 } => write!(f, "{}", module),
            Self::ModuleOffset { module, offset } => write!(f, "{}+0x{:X}", module, offset),
        }
    }
}

fn parse_hex(s: &str) -> Option<Address> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return None;
    }
    Address::from_str_radix(digits, 16).ok()
}
