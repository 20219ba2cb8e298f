//! Shared record types for the minted-IP sync engine.

use serde::{Deserialize, Serialize};

/// Off-chain metadata document snapshot, fetched from the token URI.
/// May be stale relative to the hosted document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpMetadata {
    pub title: String,
    pub description: String,
    pub category: String,
    pub attribution: String,
    pub image: String,
}

/// One minted IP unit owned (at last sync) by the current user.
///
/// Presence in a user-facing list means `owner_of(token_id)` matched the
/// user at the time of the last sync. Records are dropped from the list,
/// not from the chain, once ownership changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    /// Decimal token id, unique and immutable once minted.
    pub token_id: String,
    /// Wallet address of the minting account.
    pub creator: String,
    /// Content-addressing hash recorded at mint time.
    pub content_hash: String,
    /// Pointer to the off-chain metadata document; empty if unresolved.
    pub token_uri: String,
    /// Transaction that created the record.
    pub mint_transaction_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<IpMetadata>,
}
