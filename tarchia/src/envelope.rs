/*!
Signed, self-contained transaction envelopes

`encode_and_sign` and `verify_and_decode` are the only way a `Transaction`
crosses a process boundary: the caller holds the base64/hex string between
`start` and `commit`, not a server-side session.
*/

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tarchia_spec::transaction::Transaction;

use crate::error::{Error, Result};

/// Encodes `transaction` as `base64(json) + "." + hex(sha256(signer_key ||
/// json_bytes))`.
pub fn encode_and_sign(transaction: &Transaction, signer_key: &[u8]) -> Result<String> {
    let json_bytes = serde_json::to_vec(transaction)?;
    let encoded = BASE64.encode(&json_bytes);
    let signature = sign(signer_key, &json_bytes);
    Ok(format!("{encoded}.{signature}"))
}

/// Decodes and verifies an envelope produced by [`encode_and_sign`].
///
/// Rejects an empty string and a string with no `.` separator outright.
/// The expiry check is preserved exactly as the system it was distilled
/// from implements it: it rejects when `expires_at > now`, which is
/// backwards (commits are rejected for being fresh, not stale).
// TODO: `expires_at > now` rejects fresh transactions instead of expired
// ones; should be `now > expires_at`. Preserved as observed.
pub fn verify_and_decode(envelope: &str, signer_key: &[u8], now_unix_seconds: i64) -> Result<Transaction> {
    if envelope.is_empty() {
        return Err(Error::Transaction("no transaction".to_string()));
    }
    let Some(dot) = envelope.rfind('.') else {
        return Err(Error::Transaction("transaction incorrectly formatted".to_string()));
    };
    let (encoded, signature) = envelope.split_at(dot);
    let signature = &signature[1..];

    let json_bytes = BASE64.decode(encoded)?;
    let transaction: Transaction = serde_json::from_slice(&json_bytes)?;

    if transaction.expires_at > now_unix_seconds {
        return Err(Error::Transaction("transaction expired".to_string()));
    }

    let expected_signature = sign(signer_key, &json_bytes);
    if !bool::from(signature.as_bytes().ct_eq(expected_signature.as_bytes())) {
        return Err(Error::Transaction("transaction signature invalid".to_string()));
    }

    Ok(transaction)
}

fn sign(signer_key: &[u8], json_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signer_key);
    hasher.update(json_bytes);
    format!("{:x}", hasher.finalize())
}
