//! ECDSA P-256 signing/verification and address derivation.
//!
//! This module wraps the `p256`/`ecdsa` crates behind the domain types in
//! [`crate::types`] so the rest of the chain never has to reach for raw
//! curve types. `sign` is total (it cannot fail for a well-formed key);
//! `verify` fails closed on any tampering, truncation, or malformed
//! signature.

use ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature as P256Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;

use crate::types::{Address, PublicKey, Signature};

/// Errors that can occur while signing or verifying.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("malformed public key bytes")]
    MalformedPublicKey,
    #[error("malformed signature bytes")]
    MalformedSignature,
}

/// A P-256 keypair, used by wallets and the miner to sign transactions
/// and blocks.
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    /// Generates a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand_core::OsRng);
        Self { signing_key }
    }

    /// Reconstructs a keypair from a raw 32-byte scalar.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_slice(bytes).map_err(|_| CryptoError::MalformedPublicKey)?;
        Ok(Self { signing_key })
    }

    /// Returns the SEC1-compressed public key bytes.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        let verifying_key = VerifyingKey::from(&self.signing_key);
        verifying_key.to_encoded_point(true).as_bytes().to_vec()
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public_key_bytes())
    }

    /// Derives this keypair's on-chain [`Address`].
    pub fn address(&self) -> Address {
        Address::from_public_key(&self.public_key_bytes())
    }

    /// Signs `message` and returns a detached signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: P256Signature = self.signing_key.sign(message);
        Signature(sig.to_der().as_bytes().to_vec())
    }
}

/// Verifies a detached signature over `message` against `pubkey`.
///
/// Returns `false` on any malformed input rather than erroring, since
/// callers treat verification failure and malformed input identically
/// (both reject the transaction/block).
pub fn verify(pubkey: &PublicKey, message: &[u8], sig: &Signature) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(pubkey.as_bytes()) else {
        return false;
    };
    let Ok(signature) = P256Signature::from_der(sig.as_bytes()) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}
