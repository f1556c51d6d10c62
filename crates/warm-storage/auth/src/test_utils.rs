//! Deterministic signers for tests

use alloy_primitives::{Address, B256, Bytes};
use alloy_sol_types::SolStruct;
use k256::ecdsa::SigningKey;

use crate::PayerAuthenticator;

/// Secp256k1 key producing `r || s || v` signatures with `v` in {27, 28}
#[derive(Debug, Clone)]
pub struct TestSigner {
    key: SigningKey,
}

impl TestSigner {
    /// Signer whose private key is `seed` repeated
    ///
    /// # Panics
    ///
    /// Panics if `seed` is zero.
    pub fn from_seed(seed: u8) -> Self {
        let key = SigningKey::from_slice(&[seed; 32]).expect("non-zero seed is a valid key");
        Self { key }
    }

    /// Ethereum address of the key
    pub fn address(&self) -> Address {
        Address::from_private_key(&self.key)
    }

    /// Sign a prehashed digest
    ///
    /// # Panics
    ///
    /// Panics if k256 fails to sign, which does not happen for valid keys.
    pub fn sign_hash(&self, hash: B256) -> Bytes {
        let (signature, recovery_id) =
            self.key.sign_prehash_recoverable(hash.as_slice()).expect("signing succeeds");
        let mut raw = signature.to_bytes().to_vec();
        raw.push(recovery_id.to_byte() + 27);
        raw.into()
    }

    /// Sign typed data under the authenticator's domain
    pub fn sign_typed<T: SolStruct>(&self, auth: &PayerAuthenticator, message: &T) -> Bytes {
        self.sign_hash(auth.signing_hash(message))
    }
}
