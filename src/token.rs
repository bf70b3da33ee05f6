//! Opaque id tokens
//!
//! Reversible codec between internal `i64` ids and opaque, tamper-evident
//! string tokens. External surfaces never see raw primary keys; they see a
//! 43-character url-safe token that only decodes under the configured secret.
//!
//! # Wire format
//!
//! A fixed 32-byte block, AES-256-ECB encrypted and base64url-encoded:
//!
//! ```text
//! bytes  0..8   id (little-endian i64)
//! bytes  8..16  nonce = HMAC-SHA256(key, id bytes)[..8]
//! bytes 16..32  tag   = HMAC-SHA256(key, block[0..16])[..16]
//! ```
//!
//! The cipher key and the HMAC key are both SHA-256 of the shared secret.
//! ECB needs no IV; it is acceptable here only because the plaintext block
//! already embeds the keyed nonce and integrity tag, so equal ids are the only
//! inputs that produce equal ciphertexts.
//!
//! # Determinism
//!
//! Encoding the same id under the same secret always yields the identical
//! token. This is a deliberate property (tokens are comparable and cacheable,
//! and compatibility with stored tokens survives restarts), traded against
//! per-call unlinkability.

use aes::Aes256;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Plaintext block size in bytes (two AES blocks).
const BLOCK_LEN: usize = 32;

/// Length of every valid token: 32 bytes base64url-encoded without padding.
pub const TOKEN_LEN: usize = 43;

/// Token codec errors. Decoding fails closed: no variant ever carries a
/// partially recovered id.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token secret must not be empty")]
    EmptySecret,

    #[error("Token has invalid length (expected {TOKEN_LEN} characters)")]
    InvalidLength,

    #[error("Token is not valid url-safe base64")]
    Malformed,

    #[error("Token integrity check failed")]
    IntegrityCheckFailed,
}

/// Codec between `i64` ids and opaque tokens.
///
/// Cheap to clone; one instance per configured secret is shared across all
/// components that encode or decode ids.
#[derive(Clone)]
pub struct IdCodec {
    cipher: Aes256,
    mac: HmacSha256,
}

impl IdCodec {
    /// Build a codec from the shared secret.
    ///
    /// The secret is hashed with SHA-256 to derive the 256-bit key used for
    /// both the cipher and the keyed hashes.
    pub fn new(secret: &str) -> Result<Self, TokenError> {
        if secret.trim().is_empty() {
            return Err(TokenError::EmptySecret);
        }

        let key = Sha256::digest(secret.as_bytes());
        let cipher = Aes256::new(&key);
        // A 32-byte key is always a valid HMAC key; the error arm is unreachable.
        let mac =
            <HmacSha256 as Mac>::new_from_slice(&key).map_err(|_| TokenError::EmptySecret)?;

        Ok(Self { cipher, mac })
    }

    /// Encode an id into its opaque token. Deterministic per id and secret.
    pub fn encode(&self, id: i64) -> String {
        let mut block = self.build_block(id);
        self.encrypt_block(&mut block);
        URL_SAFE_NO_PAD.encode(block)
    }

    /// Decode a token back into the id it was produced from.
    ///
    /// Any token not produced by [`encode`](Self::encode) under this codec's
    /// secret fails with [`TokenError::IntegrityCheckFailed`] (or a length /
    /// encoding error); a wrong numeric id is never returned.
    pub fn decode(&self, token: &str) -> Result<i64, TokenError> {
        if token.len() != TOKEN_LEN {
            return Err(TokenError::InvalidLength);
        }

        let decoded = URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|_| TokenError::Malformed)?;
        let mut block: [u8; BLOCK_LEN] =
            decoded.try_into().map_err(|_| TokenError::Malformed)?;

        self.decrypt_block(&mut block);

        let expected = self.keyed_hash(&block[0..16]);
        // Constant-time compare of the trailing 16-byte tag.
        if !bool::from(block[16..32].ct_eq(&expected[0..16])) {
            return Err(TokenError::IntegrityCheckFailed);
        }

        let mut id_bytes = [0u8; 8];
        id_bytes.copy_from_slice(&block[0..8]);
        Ok(i64::from_le_bytes(id_bytes))
    }

    /// Non-erroring decode for call sites that only care whether the token is
    /// valid.
    pub fn try_decode(&self, token: &str) -> Option<i64> {
        self.decode(token).ok()
    }

    fn build_block(&self, id: i64) -> [u8; BLOCK_LEN] {
        let mut block = [0u8; BLOCK_LEN];
        let id_bytes = id.to_le_bytes();
        block[0..8].copy_from_slice(&id_bytes);

        let nonce = self.keyed_hash(&id_bytes);
        block[8..16].copy_from_slice(&nonce[0..8]);

        let tag = self.keyed_hash(&block[0..16]);
        block[16..32].copy_from_slice(&tag[0..16]);

        block
    }

    fn keyed_hash(&self, data: &[u8]) -> [u8; 32] {
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    fn encrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let (lo, hi) = block.split_at_mut(16);
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(lo));
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(hi));
    }

    fn decrypt_block(&self, block: &mut [u8; BLOCK_LEN]) {
        let (lo, hi) = block.split_at_mut(16);
        self.cipher
            .decrypt_block(GenericArray::from_mut_slice(lo));
        self.cipher
            .decrypt_block(GenericArray::from_mut_slice(hi));
    }
}

impl std::fmt::Debug for IdCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never expose key material through Debug.
        f.debug_struct("IdCodec").finish_non_exhaustive()
    }
}
