//! Keypair generation/import and transaction signing built atop
//! [`obscura_core::signer`]. Holds a secp256k1 private key and exposes the
//! address it derives to, plus a thin `sign` wrapper so callers never touch
//! raw key bytes directly.

use k256::ecdsa::SigningKey;
use obscura_core::block::Transaction;
use obscura_core::{signer, Address, Result};
use rand::rngs::OsRng;

/// A secp256k1 keypair and the address it derives to.
pub struct Wallet {
    private_key: [u8; 32],
    address: Address,
}

impl Wallet {
    /// Generates a fresh keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut OsRng);
        Self::from_private_key(signing_key.to_bytes().into())
    }

    /// Imports a keypair from a raw 32-byte secp256k1 private key.
    pub fn from_private_key(private_key: [u8; 32]) -> Self {
        let address = address_from_private_key(&private_key);
        Self { private_key, address }
    }

    /// Imports a keypair from a hex-encoded private key, with or without a
    /// leading `0x`.
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim_start_matches("0x"))
            .map_err(|_| obscura_core::Error::InvalidSignature)?;
        if bytes.len() != 32 {
            return Err(obscura_core::Error::InvalidSignature);
        }
        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(&bytes);
        Ok(Self::from_private_key(private_key))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key)
    }

    /// Signs `tx`, filling in `v, r, s` for this wallet's key.
    pub fn sign(&self, tx: &Transaction) -> Result<Transaction> {
        signer::sign(tx, &self.private_key)
    }
}

/// Derives the address a private key signs as, without keeping the key
/// around: `keccak256(uncompressed_pubkey[1..])[12..]`.
fn address_from_private_key(private_key: &[u8; 32]) -> Address {
    let signing_key = SigningKey::from_bytes(private_key.into()).expect("32-byte scalar");
    let verifying_key = k256::ecdsa::VerifyingKey::from(&signing_key);
    let encoded = verifying_key.to_encoded_point(false);
    let digest = obscura_core::codec::keccak256(&encoded.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_bigint::BigUint;

    fn sample_tx(chain_id: u16) -> Transaction {
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
    fn generated_wallet_signs_and_recovers_to_its_own_address() {
        let wallet = Wallet::generate();
        let signed = wallet.sign(&sample_tx(200)).unwrap();
        assert_eq!(signer::sender(&signed).unwrap(), wallet.address());
    }

    #[test]
    fn importing_from_hex_roundtrips_the_private_key() {
        let wallet = Wallet::from_private_key([0x42u8; 32]);
        let imported = Wallet::from_hex(&wallet.private_key_hex()).unwrap();
        assert_eq!(imported.address(), wallet.address());
    }

    #[test]
    fn from_hex_rejects_wrong_length_key() {
        assert!(Wallet::from_hex("abcd").is_err());
    }
}
