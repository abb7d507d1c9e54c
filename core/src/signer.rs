//! Signer (component C2): ECDSA sign / recover-from-signature / address
//! derivation over secp256k1.
//!
//! `v` mixes the replay-protection `chain_id` into the recovery id using
//! the same scheme as EIP-155 (`v' = recovery_id + 2*chain_id + 35`); this
//! is part of the wire contract and must not change independently of the
//! chain-wide protocol version.

use crate::block::Transaction;
use crate::codec::keccak256;
use crate::{Address, Error, Result};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};

/// Offset added to `2*chain_id + recovery_id` to form the wire `v` value.
const V_OFFSET: u64 = 35;

/// Signs `tx` with `private_key`, filling in `v, r, s`. `tx.chain_id` must
/// already be set; it is mixed both into the signing digest and into `v`.
pub fn sign(tx: &Transaction, private_key: &[u8; 32]) -> Result<Transaction> {
    let signing_key =
        SigningKey::from_bytes(private_key.into()).map_err(|_| Error::InvalidSignature)?;
    let digest = tx.signing_hash();
    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| Error::InvalidSignature)?;

    let mut signed = tx.clone();
    signed.r.copy_from_slice(&signature.r().to_bytes());
    signed.s.copy_from_slice(&signature.s().to_bytes());
    signed.v = recovery_id.to_byte() as u64 + 2 * tx.chain_id as u64 + V_OFFSET;
    Ok(signed)
}

/// Signs an arbitrary 32-byte digest (used for block header signatures,
/// which are not transactions and so don't carry a chain-mixed `v`).
/// Returns the 65-byte `r || s || recovery_id` signature.
pub fn sign_hash(hash: &crate::Hash, private_key: &[u8; 32]) -> Result<Vec<u8>> {
    let signing_key =
        SigningKey::from_bytes(private_key.into()).map_err(|_| Error::InvalidSignature)?;
    let (signature, recovery_id): (Signature, RecoveryId) = signing_key
        .sign_prehash_recoverable(hash)
        .map_err(|_| Error::InvalidSignature)?;
    let mut out = Vec::with_capacity(65);
    out.extend_from_slice(&signature.r().to_bytes());
    out.extend_from_slice(&signature.s().to_bytes());
    out.push(recovery_id.to_byte());
    Ok(out)
}

/// Recovers the sender address from `tx`'s signature. Fails with
/// [`Error::InvalidSignature`] if `r == 0`, `s == 0`, `v` is out of range,
/// or the recovered public key is the zero key.
pub fn sender(tx: &Transaction) -> Result<Address> {
    if tx.r == [0u8; 32] || tx.s == [0u8; 32] {
        return Err(Error::InvalidSignature);
    }
    if tx.v < V_OFFSET {
        return Err(Error::InvalidSignature);
    }
    let v_base = tx.v - V_OFFSET;
    let recovery_byte = (v_base % 2) as u8;
    let recovered_chain_id = v_base / 2;
    if recovered_chain_id != tx.chain_id as u64 {
        return Err(Error::InvalidSignature);
    }

    let recovery_id = RecoveryId::from_byte(recovery_byte).ok_or(Error::InvalidSignature)?;
    let signature =
        Signature::from_scalars(tx.r, tx.s).map_err(|_| Error::InvalidSignature)?;
    let digest = tx.signing_hash();
    let verifying_key = VerifyingKey::recover_from_prehash(&digest, &signature, recovery_id)
        .map_err(|_| Error::InvalidSignature)?;

    let encoded = verifying_key.to_encoded_point(false);
    let pubkey_bytes = encoded.as_bytes(); // 0x04 || X(32) || Y(32)
    let digest = keccak256(&pubkey_bytes[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    if address == crate::ZERO_ADDRESS {
        return Err(Error::InvalidSignature);
    }
    Ok(address)
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn unsigned_tx(chain_id: u16) -> Transaction {
        Transaction {
            to: Some([0x10u8; 20]),
            value: BigUint::from(1u32),
            gas_limit: 21_000,
            gas_price: BigUint::from(1u32),
            data: vec![],
            chain_id,
            expiration: 4_000_000_000,
            note: String::new(),
            label: String::new(),
            v: 0,
            r: [0u8; 32],
            s: [0u8; 32],
        }
    }

    #[test]
    fn sign_then_recover_roundtrips() {
        let priv_key = [0x42u8; 32];
        let tx = unsigned_tx(200);
        let signed = sign(&tx, &priv_key).unwrap();
        assert_ne!(signed.r, [0u8; 32]);
        assert_ne!(signed.s, [0u8; 32]);
        let recovered = sender(&signed).unwrap();

        let signing_key = SigningKey::from_bytes((&priv_key).into()).unwrap();
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let expected_digest = keccak256(&encoded.as_bytes()[1..]);
        let mut expected = [0u8; 20];
        expected.copy_from_slice(&expected_digest[12..]);
        assert_eq!(recovered, expected);
    }

    #[test]
    fn zero_r_is_rejected() {
        let tx = unsigned_tx(1);
        assert_eq!(sender(&tx), Err(Error::InvalidSignature));
    }

    #[test]
    fn tampered_v_is_rejected() {
        let priv_key = [0x7au8; 32];
        let tx = unsigned_tx(1);
        let mut signed = sign(&tx, &priv_key).unwrap();
        signed.v += 2; // flips chain id recovered from v
        assert_eq!(sender(&signed), Err(Error::InvalidSignature));
    }

    #[test]
    fn sign_hash_produces_a_65_byte_signature() {
        let priv_key = [0x55u8; 32];
        let hash = [0x01u8; 32];
        let sig = sign_hash(&hash, &priv_key).unwrap();
        assert_eq!(sig.len(), 65);
    }
}
