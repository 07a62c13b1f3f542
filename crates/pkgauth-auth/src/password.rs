//! Password hashing and verification

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tracing::debug;

use crate::error::AuthError;

/// Hash/verify capability for stored password digests
///
/// Both operations are CPU-bound; async callers should run them
/// on a blocking thread.
pub trait PasswordCodec: Send + Sync {
    /// Produce a salted digest for `plaintext`
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Check `plaintext` against `digest`. Unparseable digests never match.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

/// Argon2id codec producing PHC-format digests
///
/// Verification also accepts bcrypt digests (`$2a$`, `$2b$`, `$2y$`) so
/// records written by earlier bcrypt-based deployments keep working. New
/// digests are always argon2id.
#[derive(Debug, Clone, Default)]
pub struct Argon2Codec {
    params: Params,
}

impl Argon2Codec {
    pub fn new(params: Params) -> Self {
        Self { params }
    }

    /// Build a codec with explicit cost parameters (memory in KiB)
    pub fn with_cost(memory_kib: u32, iterations: u32, parallelism: u32) -> Result<Self, AuthError> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| AuthError::Internal(format!("Invalid argon2 parameters: {}", e)))?;
        Ok(Self::new(params))
    }

    fn hasher(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }
}

impl PasswordCodec for Argon2Codec {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);

        self.hasher()
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Internal(format!("Password hashing error: {}", e)))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        if is_bcrypt(digest) {
            return verify_bcrypt(plaintext, digest);
        }

        let parsed = match PasswordHash::new(digest) {
            Ok(h) => h,
            Err(e) => {
                if !digest.is_empty() {
                    debug!("Stored digest is not a PHC string: {}", e);
                }
                return false;
            }
        };

        // Cost parameters come from the digest itself
        self.hasher()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

fn is_bcrypt(digest: &str) -> bool {
    ["$2a$", "$2b$", "$2y$"]
        .iter()
        .any(|prefix| digest.starts_with(prefix))
}

fn verify_bcrypt(plaintext: &str, digest: &str) -> bool {
    match bcrypt::verify(plaintext, digest) {
        Ok(matched) => matched,
        Err(e) => {
            debug!("Stored bcrypt digest is malformed: {}", e);
            false
        }
    }
}
