//! Conversions between on-chain encodings and the strings the view shows.

use ethers::{
    types::{
        Address,
        U256,
    },
    utils::{
        self,
        ConversionError,
    },
};
use std::str::FromStr;
use thiserror::Error;

pub const ETHER_DECIMALS: usize = 18;
const NAME_BYTES: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UnitsError {
    #[error("value is empty")]
    Empty,
    #[error("'{0}' is not a positive decimal number")]
    NotDecimal(String),
    #[error("at most {} decimal places are supported", ETHER_DECIMALS)]
    TooPrecise,
    #[error("amount does not fit in 256 bits of wei")]
    TooLarge,
    #[error("name must be at most {} bytes", NAME_BYTES - 1)]
    NameTooLong,
    #[error("name is not valid UTF-8")]
    NameNotUtf8,
    #[error("'{0}' is not a 0x-prefixed 20 byte address")]
    NotAddress(String),
    #[error("{0}")]
    Conversion(String),
}

impl From<ConversionError> for UnitsError {
    fn from(err: ConversionError) -> Self {
        UnitsError::Conversion(err.to_string())
    }
}

/// Formats base units as ether, keeping at least one fractional digit.
pub fn format_ether(amount: U256) -> String {
    let one_ether = U256::exp10(ETHER_DECIMALS);
    let whole = amount / one_ether;
    let fractional = amount % one_ether;
    let digits = format!("{:0>width$}", fractional.to_string(), width = ETHER_DECIMALS);
    let trimmed = digits.trim_end_matches('0');
    if trimmed.is_empty() {
        format!("{whole}.0")
    } else {
        format!("{whole}.{trimmed}")
    }
}

pub fn parse_ether(input: &str) -> Result<U256, UnitsError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(UnitsError::Empty);
    }
    let (whole, fractional) = value.split_once('.').unwrap_or((value, ""));
    let is_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if (whole.is_empty() && fractional.is_empty())
        || !is_digits(whole)
        || !is_digits(fractional)
    {
        return Err(UnitsError::NotDecimal(value.to_string()));
    }
    if fractional.len() > ETHER_DECIMALS {
        return Err(UnitsError::TooPrecise);
    }
    let whole_wei = match whole {
        "" => U256::zero(),
        digits => U256::from_dec_str(digits)
            .ok()
            .and_then(|w| w.checked_mul(U256::exp10(ETHER_DECIMALS)))
            .ok_or(UnitsError::TooLarge)?,
    };
    let fractional_wei = match fractional {
        "" => U256::zero(),
        digits => U256::from_dec_str(&format!("{digits:0<width$}", width = ETHER_DECIMALS))
            .map_err(|e| UnitsError::Conversion(e.to_string()))?,
    };
    whole_wei
        .checked_add(fractional_wei)
        .ok_or(UnitsError::TooLarge)
}

pub fn encode_name(name: &str) -> Result<[u8; NAME_BYTES], UnitsError> {
    if name.is_empty() {
        return Err(UnitsError::Empty);
    }
    if name.len() >= NAME_BYTES {
        return Err(UnitsError::NameTooLong);
    }
    Ok(utils::format_bytes32_string(name)?)
}

pub fn decode_name(raw: &[u8; NAME_BYTES]) -> Result<String, UnitsError> {
    let end = raw.iter().position(|b| *b == 0).unwrap_or(NAME_BYTES);
    std::str::from_utf8(&raw[..end])
        .map(str::to_owned)
        .map_err(|_| UnitsError::NameNotUtf8)
}

pub fn parse_address(input: &str) -> Result<Address, UnitsError> {
    let value = input.trim();
    if value.is_empty() {
        return Err(UnitsError::Empty);
    }
    let hex_part = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| UnitsError::NotAddress(value.to_string()))?;
    if hex_part.len() != 40 {
        return Err(UnitsError::NotAddress(value.to_string()));
    }
    Address::from_str(hex_part).map_err(|_| UnitsError::NotAddress(value.to_string()))
}

pub fn display_address(address: &Address) -> String {
    utils::to_checksum(address, None)
}
