//! Ledger boundary: trait contracts plus the JSON-RPC implementation.

pub mod abi;
pub mod iface;
pub mod rpc;
pub mod types;

pub use iface::{ChainQueryError, LedgerClient, OracleError, OwnershipOracle};
pub use rpc::HttpLedgerClient;
pub use types::MintEvent;
