use std::fmt;

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{AppError, Result};

/// The size of a session signing secret in bytes.
pub const SECRET_SIZE: usize = 32;
/// The size of the AES-GCM nonce in bytes.
pub const NONCE_SIZE: usize = 12;

/// A per-session signing secret, zeroized on drop.
///
/// It lives only on the issuing/verifying side; credentials carry a MAC
/// under it, never the secret itself.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionSecret([u8; SECRET_SIZE]);

impl SessionSecret {
    /// Creates a new `SessionSecret` from raw bytes.
    pub fn new(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }

    /// Draws a fresh secret from the OS random number generator.
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_SIZE];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Returns the secret as a byte slice.
    pub fn as_bytes(&self) -> &[u8; SECRET_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SessionSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionSecret(..)")
    }
}

/// Seals a session secret under the master key with AES-256-GCM.
///
/// Output layout: `ciphertext || nonce`, nonce being the trailing 12 bytes.
pub fn seal(master_key: &[u8; 32], secret: &SessionSecret) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new(master_key.into());

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from(nonce_bytes);

    let mut sealed = cipher
        .encrypt(&nonce, secret.as_bytes().as_slice())
        .map_err(|e| AppError::Encryption(format!("Sealing session secret failed: {}", e)))?;

    sealed.extend_from_slice(&nonce_bytes);
    Ok(sealed)
}

/// Opens a secret produced by [`seal`].
pub fn open(master_key: &[u8; 32], sealed: &[u8]) -> Result<SessionSecret> {
    if sealed.len() <= NONCE_SIZE {
        return Err(AppError::Encryption("Sealed session secret is truncated".to_string()));
    }

    let (ciphertext, nonce_bytes) = sealed.split_at(sealed.len() - NONCE_SIZE);
    let nonce_arr: [u8; NONCE_SIZE] = nonce_bytes
        .try_into()
        .map_err(|_| AppError::Encryption("Invalid nonce size".to_string()))?;

    let cipher = Aes256Gcm::new(master_key.into());
    let mut plaintext = cipher
        .decrypt(&Nonce::from(nonce_arr), ciphertext)
        .map_err(|e| AppError::Encryption(format!("Opening session secret failed: {}", e)))?;

    let bytes: std::result::Result<[u8; SECRET_SIZE], _> = plaintext.as_slice().try_into();
    plaintext.zeroize();

    bytes
        .map(SessionSecret::new)
        .map_err(|_| AppError::Encryption("Session secret has the wrong length".to_string()))
}
