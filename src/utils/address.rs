//! Wallet address helpers shared by the sync engine and the CLI tools.

/// Check for `0x` followed by exactly 40 hex characters, the only address
/// shape the registry contract accepts.
pub fn is_valid_address(addr: &str) -> bool {
    match addr.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.bytes().all(|b| b.is_ascii_hexdigit()),
        None => false,
    }
}

/// Lowercase an address so cache keys and ownership comparisons line up
/// regardless of checksum casing.
pub fn normalize(addr: &str) -> String {
    addr.to_ascii_lowercase()
}

/// Shorten an address for log lines: `0x1234…abcd`.
pub fn shorten(addr: &str) -> String {
    if addr.len() <= 12 {
        return addr.to_string();
    }
    format!("{}…{}", &addr[..6], &addr[addr.len() - 4..])
}
