//! Phone and tax-id (CNPJ) normalization.
//!
//! The canonical phone is the session key: digits only, "55"-prefixed, and with the
//! mobile "9" restored for legacy 8-digit numbers. Tax ids are stored and looked up
//! in their punctuated form `XX.XXX.XXX/XXXX-XX`.

use thiserror::Error;

/// Country prefix prepended when missing.
const COUNTRY_PREFIX: &str = "55";

/// Length of a country-prefixed number that still lacks the mobile "9".
const LEGACY_MOBILE_LEN: usize = 12;

/// Position (0-based) of the mobile prefix digit: after country (2) and area (2) codes.
const MOBILE_DIGIT_POS: usize = 4;

pub const TAX_ID_LEN: usize = 14;

/// Suffix of an individual chat address.
pub const INDIVIDUAL_SUFFIX: &str = "@s.whatsapp.net";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tax id must have {TAX_ID_LEN} digits, got {0}")]
pub struct TaxIdError(pub usize);

/// Keep only ASCII digits.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Strip the individual chat suffix from a chat address, leaving the sender part.
pub fn address_from_jid(remote_jid: &str) -> &str {
    remote_jid
        .strip_suffix(INDIVIDUAL_SUFFIX)
        .unwrap_or(remote_jid)
}

/// Canonical phone: digits only, country prefix, mobile "9" inserted for 12-digit numbers.
pub fn normalize_phone(raw: &str) -> String {
    let mut cleaned = digits(raw);
    if !cleaned.starts_with(COUNTRY_PREFIX) {
        cleaned.insert_str(0, COUNTRY_PREFIX);
    }
    if cleaned.len() == LEGACY_MOBILE_LEN && cleaned.as_bytes()[MOBILE_DIGIT_POS] != b'9' {
        cleaned.insert(MOBILE_DIGIT_POS, '9');
    }
    cleaned
}

/// Format exactly 14 digits as `XX.XXX.XXX/XXXX-XX`.
pub fn format_tax_id(digits14: &str) -> Result<String, TaxIdError> {
    if digits14.len() != TAX_ID_LEN || !digits14.bytes().all(|b| b.is_ascii_digit()) {
        return Err(TaxIdError(digits(digits14).len()));
    }
    let d = digits14;
    Ok(format!(
        "{}.{}.{}/{}-{}",
        &d[0..2],
        &d[2..5],
        &d[5..8],
        &d[8..12],
        &d[12..14]
    ))
}

/// True iff stripping non-digits leaves exactly 14 characters.
pub fn is_valid_tax_id(raw: &str) -> bool {
    digits(raw).len() == TAX_ID_LEN
}
