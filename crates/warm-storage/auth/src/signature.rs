//! Raw `r || s || v` signature handling

use alloy_primitives::{Address, B256, Signature, U256, uint};

use crate::AuthError;

/// Length of a raw recoverable signature
pub const SIGNATURE_LENGTH: usize = 65;

/// Half the secp256k1 group order, the largest canonical `s`
pub const SECP256K1_HALF_ORDER: U256 =
    uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

/// Parse a 65 byte `r || s || v` signature
///
/// `v` may be given either as a parity bit (0, 1) or in the legacy 27/28
/// form. Only the low-`s` form of a signature is accepted.
pub fn parse_signature(bytes: &[u8]) -> Result<Signature, AuthError> {
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(AuthError::InvalidSignatureLength(bytes.len()));
    }

    let y_parity = match bytes[64] {
        0 | 27 => false,
        1 | 28 => true,
        other => return Err(AuthError::UnsupportedRecoveryId(other)),
    };
    let r = U256::from_be_slice(&bytes[..32]);
    let s = U256::from_be_slice(&bytes[32..64]);
    if s > SECP256K1_HALF_ORDER {
        return Err(AuthError::NonCanonicalSignature);
    }

    Ok(Signature::new(r, s, y_parity))
}

/// Recover the address that signed `hash`
pub fn recover_signer(hash: B256, bytes: &[u8]) -> Result<Address, AuthError> {
    parse_signature(bytes)?
        .recover_address_from_prehash(&hash)
        .map_err(|err| AuthError::RecoveryFailed(err.to_string()))
}
