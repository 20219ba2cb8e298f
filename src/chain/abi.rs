//! Hand-rolled subset of the contract ABI.
//!
//! The registry surface we touch is tiny (one event, three view functions),
//! so calldata and return words are built and decoded by hand instead of
//! pulling in a full ABI machinery crate.

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};

use crate::chain::iface::ChainQueryError;

/// First four bytes of the Keccak-256 hash of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Full Keccak-256 hash of an event signature, as a `0x` topic string.
pub fn event_topic(signature: &str) -> String {
    let digest = Keccak256::digest(signature.as_bytes());
    format!("0x{}", hex::encode(digest))
}

/// Left-pad an address to a 32-byte log topic.
pub fn address_topic(addr: &str) -> Result<String, ChainQueryError> {
    let body = addr.strip_prefix("0x").unwrap_or(addr);
    let bytes = hex::decode(body)
        .map_err(|e| ChainQueryError::BadResponse(format!("bad address {addr}: {e}")))?;
    if bytes.len() != 20 {
        return Err(ChainQueryError::BadResponse(format!(
            "address {addr} is {} bytes, expected 20",
            bytes.len()
        )));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Ok(format!("0x{}", hex::encode(word)))
}

/// Encode a decimal uint256 (token id) as a 32-byte ABI word.
pub fn encode_uint256(decimal: &str) -> Result<[u8; 32], ChainQueryError> {
    let value = BigUint::parse_bytes(decimal.as_bytes(), 10)
        .ok_or_else(|| ChainQueryError::BadResponse(format!("bad uint256 `{decimal}`")))?;
    let bytes = value.to_bytes_be();
    if bytes.len() > 32 {
        return Err(ChainQueryError::BadResponse(format!(
            "uint256 `{decimal}` overflows 32 bytes"
        )));
    }
    let mut word = [0u8; 32];
    word[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(word)
}

/// Build `0x`-prefixed calldata from a selector and 32-byte argument words.
pub fn call_data(selector: [u8; 4], args: &[[u8; 32]]) -> String {
    let mut data = Vec::with_capacity(4 + args.len() * 32);
    data.extend_from_slice(&selector);
    for arg in args {
        data.extend_from_slice(arg);
    }
    format!("0x{}", hex::encode(data))
}

/// Strip `0x` and decode the hex payload of an RPC quantity or data field.
pub fn decode_hex(payload: &str) -> Result<Vec<u8>, ChainQueryError> {
    let body = payload.strip_prefix("0x").unwrap_or(payload);
    // Quantities come back with odd nibble counts ("0x1a2"); pad them.
    let padded;
    let body = if body.len() % 2 == 1 {
        padded = format!("0{body}");
        &padded
    } else {
        body
    };
    hex::decode(body).map_err(|e| ChainQueryError::BadResponse(format!("bad hex payload: {e}")))
}

/// Parse an RPC hex quantity (`"0x3d0900"`) into a u64.
pub fn hex_to_u64(quantity: &str) -> Result<u64, ChainQueryError> {
    let body = quantity.strip_prefix("0x").unwrap_or(quantity);
    u64::from_str_radix(body, 16)
        .map_err(|e| ChainQueryError::BadResponse(format!("bad quantity `{quantity}`: {e}")))
}

/// Convert a 32-byte topic (hex) into a decimal uint256 string.
pub fn topic_to_decimal(topic: &str) -> Result<String, ChainQueryError> {
    let bytes = decode_hex(topic)?;
    Ok(BigUint::from_bytes_be(&bytes).to_str_radix(10))
}

/// Last 20 bytes of a 32-byte topic or return word, as a lowercased address.
pub fn word_to_address(word_hex: &str) -> Result<String, ChainQueryError> {
    let bytes = decode_hex(word_hex)?;
    if bytes.len() < 20 {
        return Err(ChainQueryError::BadResponse(format!(
            "word `{word_hex}` too short for an address"
        )));
    }
    Ok(format!("0x{}", hex::encode(&bytes[bytes.len() - 20..])))
}

/// Decode a `uint8` return value (last byte of the single return word).
pub fn decode_uint8(ret: &str) -> Result<u8, ChainQueryError> {
    let bytes = decode_hex(ret)?;
    bytes
        .last()
        .copied()
        .ok_or_else(|| ChainQueryError::BadResponse("empty uint8 return".into()))
}

/// Decode an ABI-encoded dynamic `string` return value.
///
/// Layout: word 0 = offset to the data area, then a length word followed by
/// the UTF-8 bytes, right-padded to a 32-byte boundary.
pub fn decode_string(ret: &str) -> Result<String, ChainQueryError> {
    let bytes = decode_hex(ret)?;
    if bytes.is_empty() {
        return Ok(String::new());
    }
    if bytes.len() < 64 {
        return Err(ChainQueryError::BadResponse(
            "string return shorter than head words".into(),
        ));
    }
    let offset = BigUint::from_bytes_be(&bytes[..32]);
    let offset = usize::try_from(&offset)
        .map_err(|_| ChainQueryError::BadResponse("string offset overflows usize".into()))?;
    if bytes.len() < offset + 32 {
        return Err(ChainQueryError::BadResponse(
            "string offset past end of return data".into(),
        ));
    }
    let len = BigUint::from_bytes_be(&bytes[offset..offset + 32]);
    let len = usize::try_from(&len)
        .map_err(|_| ChainQueryError::BadResponse("string length overflows usize".into()))?;
    let start = offset + 32;
    if bytes.len() < start + len {
        return Err(ChainQueryError::BadResponse(
            "string length past end of return data".into(),
        ));
    }
    String::from_utf8(bytes[start..start + len].to_vec())
        .map_err(|e| ChainQueryError::BadResponse(format!("string not UTF-8: {e}")))
}
