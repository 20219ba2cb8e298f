use serde::{Deserialize, Serialize};

/// Decoded `DataMinted` event as read from the registry contract's logs.
///
/// An event only proves historical minting; current ownership must be
/// re-checked against the oracle before showing the token to a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintEvent {
    /// Decimal token id (uint256 on chain).
    pub token_id: String,
    /// Minting wallet, lowercased `0x` address.
    pub creator: String,
    /// Content hash recorded at mint time, `0x`-prefixed 32-byte hex.
    pub content_hash: String,
    /// Transaction that emitted the event.
    pub transaction_hash: String,
    /// Block the event landed in.
    pub block_number: u64,
}
