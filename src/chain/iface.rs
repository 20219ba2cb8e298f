use async_trait::async_trait;

use crate::chain::types::MintEvent;

/// Chunk-scoped failure talking to the ledger RPC. The sync loop logs these
/// and moves on to the next block range instead of aborting the whole scan.
#[derive(Debug, thiserror::Error)]
pub enum ChainQueryError {
    #[error("RPC transport failure: {0}")]
    Transport(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed RPC response: {0}")]
    BadResponse(String),
}

/// Token-scoped failure from the ownership oracle. A nonexistent or deleted
/// token maps here; the affected token is excluded from results.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("token {0} does not exist or has been deleted")]
    TokenUnavailable(String),

    #[error("ownership lookup failed for token {token_id}: {reason}")]
    LookupFailed { token_id: String, reason: String },
}

/// Read access to chain state: head height, historical mint logs and
/// per-token contract reads.
#[async_trait]
pub trait LedgerClient: Send + Sync + 'static {
    /// Current chain head height.
    async fn get_chain_head(&self) -> Result<u64, ChainQueryError>;

    /// Mint events attributable to `creator` within the inclusive block
    /// range `[from_block, to_block]`.
    async fn get_mint_events(
        &self,
        creator: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MintEvent>, ChainQueryError>;

    /// `tokenURI(uint256)` contract read; empty string when the contract
    /// has no URI recorded.
    async fn token_uri(&self, token_id: &str) -> Result<String, ChainQueryError>;

    /// `dataStatus(uint256)` contract read. What the returned code means is
    /// the caller's business (see `Settings::deleted_status_code`).
    async fn data_status(&self, token_id: &str) -> Result<u8, ChainQueryError>;
}

/// Current-owner lookups, exposed by the wallet/IP SDK on the real network.
#[async_trait]
pub trait OwnershipOracle: Send + Sync + 'static {
    /// Current owner of `token_id`, lowercased `0x` address.
    async fn owner_of(&self, token_id: &str) -> Result<String, OracleError>;
}
