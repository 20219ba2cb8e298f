//! JSON-RPC ledger access over HTTP.
//!
//! Implements both boundary traits against a standard EVM endpoint:
//! `eth_blockNumber` for the head, `eth_getLogs` for historical mint events
//! and `eth_call` for per-token contract reads. A fallback endpoint, when
//! configured, is retried once on transport failure of the primary.

use async_trait::async_trait;
use log::warn;
use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};

use crate::chain::abi;
use crate::chain::iface::{ChainQueryError, LedgerClient, OracleError, OwnershipOracle};
use crate::chain::types::MintEvent;
use crate::config::settings::Settings;

/// Signature of the registry's mint event.
const DATA_MINTED_SIG: &str = "DataMinted(uint256,address,bytes32)";

static DATA_MINTED_TOPIC: Lazy<String> = Lazy::new(|| abi::event_topic(DATA_MINTED_SIG));
static OWNER_OF_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| abi::selector("ownerOf(uint256)"));
static TOKEN_URI_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| abi::selector("tokenURI(uint256)"));
static DATA_STATUS_SELECTOR: Lazy<[u8; 4]> = Lazy::new(|| abi::selector("dataStatus(uint256)"));

pub struct HttpLedgerClient {
    client: Client,
    rpc_url: String,
    fallback_rpc_url: Option<String>,
    contract_address: String,
}

impl HttpLedgerClient {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(settings.rpc_timeout_secs))
            .build()?;
        let fallback_rpc_url = if settings.fallback_rpc_url.is_empty() {
            None
        } else {
            Some(settings.fallback_rpc_url.clone())
        };
        Ok(Self {
            client,
            rpc_url: settings.rpc_url.clone(),
            fallback_rpc_url,
            contract_address: settings.contract_address.clone(),
        })
    }

    async fn post_rpc(&self, url: &str, payload: &Value) -> Result<Value, ChainQueryError> {
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| ChainQueryError::Transport(e.to_string()))?;
        response
            .json::<Value>()
            .await
            .map_err(|e| ChainQueryError::Transport(e.to_string()))
    }

    /// One JSON-RPC round trip, falling back to the secondary endpoint when
    /// the primary transport fails.
    async fn rpc_call(&self, method: &str, params: Value) -> Result<Value, ChainQueryError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let body = match self.post_rpc(&self.rpc_url, &payload).await {
            Ok(body) => body,
            Err(primary_err) => match &self.fallback_rpc_url {
                Some(fallback) => {
                    warn!(
                        "⚠️ [CHAIN] Primary RPC failed for {}: {} - retrying fallback",
                        method, primary_err
                    );
                    self.post_rpc(fallback, &payload).await?
                }
                None => return Err(primary_err),
            },
        };

        if let Some(err) = body.get("error") {
            let code = err.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown RPC error")
                .to_string();
            return Err(ChainQueryError::Rpc { code, message });
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ChainQueryError::BadResponse(format!("{method}: no result field")))
    }

    async fn eth_call(&self, data: String) -> Result<String, ChainQueryError> {
        let result = self
            .rpc_call(
                "eth_call",
                json!([{ "to": self.contract_address, "data": data }, "latest"]),
            )
            .await?;
        result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| ChainQueryError::BadResponse("eth_call: result not a string".into()))
    }
}

/// Decode one `eth_getLogs` entry into a `MintEvent`.
fn decode_log(log: &Value) -> Result<MintEvent, ChainQueryError> {
    let topics = log
        .get("topics")
        .and_then(Value::as_array)
        .ok_or_else(|| ChainQueryError::BadResponse("log without topics".into()))?;
    if topics.len() < 3 {
        return Err(ChainQueryError::BadResponse(format!(
            "mint log has {} topics, expected 3",
            topics.len()
        )));
    }
    let topic_str = |idx: usize| -> Result<&str, ChainQueryError> {
        topics[idx]
            .as_str()
            .ok_or_else(|| ChainQueryError::BadResponse(format!("topic {idx} not a string")))
    };

    let token_id = abi::topic_to_decimal(topic_str(1)?)?;
    let creator = abi::word_to_address(topic_str(2)?)?;

    // contentHash is the only non-indexed field: first 32 bytes of data.
    let data = log.get("data").and_then(Value::as_str).unwrap_or("0x");
    let data_bytes = abi::decode_hex(data)?;
    let content_hash = if data_bytes.len() >= 32 {
        format!("0x{}", hex::encode(&data_bytes[..32]))
    } else {
        data.to_string()
    };

    let transaction_hash = log
        .get("transactionHash")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let block_number = match log.get("blockNumber").and_then(Value::as_str) {
        Some(quantity) => abi::hex_to_u64(quantity)?,
        None => 0,
    };

    Ok(MintEvent {
        token_id,
        creator,
        content_hash,
        transaction_hash,
        block_number,
    })
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn get_chain_head(&self) -> Result<u64, ChainQueryError> {
        let result = self.rpc_call("eth_blockNumber", json!([])).await?;
        let quantity = result.as_str().ok_or_else(|| {
            ChainQueryError::BadResponse("eth_blockNumber: result not a string".into())
        })?;
        abi::hex_to_u64(quantity)
    }

    async fn get_mint_events(
        &self,
        creator: &str,
        from_block: u64,
        to_block: u64,
    ) -> Result<Vec<MintEvent>, ChainQueryError> {
        let filter = json!([{
            "address": self.contract_address,
            "topics": [&*DATA_MINTED_TOPIC, Value::Null, abi::address_topic(creator)?],
            "fromBlock": format!("{:#x}", from_block),
            "toBlock": format!("{:#x}", to_block),
        }]);
        let result = self.rpc_call("eth_getLogs", filter).await?;
        let logs = result
            .as_array()
            .ok_or_else(|| ChainQueryError::BadResponse("eth_getLogs: result not an array".into()))?;

        let mut events = Vec::with_capacity(logs.len());
        for log in logs {
            match decode_log(log) {
                Ok(event) => events.push(event),
                Err(e) => warn!("⚠️ [CHAIN] Skipping undecodable mint log: {}", e),
            }
        }
        Ok(events)
    }

    async fn token_uri(&self, token_id: &str) -> Result<String, ChainQueryError> {
        let data = abi::call_data(*TOKEN_URI_SELECTOR, &[abi::encode_uint256(token_id)?]);
        let ret = self.eth_call(data).await?;
        abi::decode_string(&ret)
    }

    async fn data_status(&self, token_id: &str) -> Result<u8, ChainQueryError> {
        let data = abi::call_data(*DATA_STATUS_SELECTOR, &[abi::encode_uint256(token_id)?]);
        let ret = self.eth_call(data).await?;
        abi::decode_uint8(&ret)
    }
}

#[async_trait]
impl OwnershipOracle for HttpLedgerClient {
    async fn owner_of(&self, token_id: &str) -> Result<String, OracleError> {
        let data = abi::call_data(
            *OWNER_OF_SELECTOR,
            &[abi::encode_uint256(token_id).map_err(|e| OracleError::LookupFailed {
                token_id: token_id.to_string(),
                reason: e.to_string(),
            })?],
        );
        match self.eth_call(data).await {
            // A revert on ownerOf means the token was never minted or has
            // been burned/deleted.
            Err(ChainQueryError::Rpc { .. }) => {
                Err(OracleError::TokenUnavailable(token_id.to_string()))
            }
            Err(e) => Err(OracleError::LookupFailed {
                token_id: token_id.to_string(),
                reason: e.to_string(),
            }),
            Ok(ret) => abi::word_to_address(&ret).map_err(|e| OracleError::LookupFailed {
                token_id: token_id.to_string(),
                reason: e.to_string(),
            }),
        }
    }
}
