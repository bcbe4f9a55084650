use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use bcrypt::DEFAULT_COST;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::AuthError;

const DUMMY_PASSWORD: &str = "dummy-password-for-timing";

/// Password hashing scheme. Schemes are recognized by the prefix of the stored hash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashScheme {
    Argon2,
    Bcrypt,
}

impl HashScheme {
    /// Detects the scheme which produced `hash`
    pub fn identify(hash: &str) -> Option<Self> {
        const BCRYPT_PREFIXES: [&str; 4] = ["$2a$", "$2b$", "$2x$", "$2y$"];

        if hash.starts_with("$argon2") {
            Some(HashScheme::Argon2)
        } else if BCRYPT_PREFIXES.iter().any(|prefix| hash.starts_with(prefix)) {
            Some(HashScheme::Bcrypt)
        } else {
            None
        }
    }

    fn hash(self, password: &str) -> Result<String, AuthError> {
        match self {
            HashScheme::Argon2 => argon2_hash(password),
            HashScheme::Bcrypt => bcrypt_hash(password),
        }
    }

    fn verify(self, password: &str, hash: &str) -> Result<bool, AuthError> {
        match self {
            HashScheme::Argon2 => argon2_verify(password, hash),
            HashScheme::Bcrypt => bcrypt_verify(password, hash),
        }
    }
}

/// Hashes and verifies passwords with a list of accepted schemes.
///
/// The first scheme is preferred: new hashes are always produced with it, hashes of the
/// other accepted schemes still verify but are reported for rehashing.
#[derive(Debug, Clone)]
pub struct PasswordManager {
    schemes: Vec<HashScheme>,
    dummy_hash: String,
}

impl PasswordManager {
    /// Creates a manager for `schemes`, falling back to argon2 if the list is empty
    pub fn new(schemes: &[HashScheme]) -> Result<Self, AuthError> {
        let mut accepted: Vec<HashScheme> = Vec::with_capacity(schemes.len());
        for scheme in schemes {
            if !accepted.contains(scheme) {
                accepted.push(*scheme);
            }
        }
        if accepted.is_empty() {
            accepted.push(HashScheme::Argon2);
        }

        let dummy_hash = accepted[0].hash(DUMMY_PASSWORD)?;

        Ok(PasswordManager {
            schemes: accepted,
            dummy_hash,
        })
    }

    pub fn preferred_scheme(&self) -> HashScheme {
        self.schemes[0]
    }

    pub fn schemes(&self) -> &[HashScheme] {
        &self.schemes
    }

    /// Hashes `password` with the preferred scheme
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        self.preferred_scheme().hash(password)
    }

    /// Verifies `password` against `hash` and returns a fresh hash when the stored one
    /// was made with a non-preferred scheme.
    ///
    /// A missing or unrecognized hash still costs a full verification against a dummy hash,
    /// so callers can't tell "no such user" from "wrong password" by timing.
    pub fn verify_and_update(&self, password: &str, hash: Option<&str>) -> Result<(bool, Option<String>), AuthError> {
        let scheme = hash
            .and_then(HashScheme::identify)
            .filter(|scheme| self.schemes.contains(scheme));

        let (Some(hash), Some(scheme)) = (hash, scheme) else {
            self.dummy_verify(password);
            return Ok((false, None));
        };

        if !scheme.verify(password, hash)? {
            return Ok((false, None));
        }

        if scheme != self.preferred_scheme() {
            return Ok((true, Some(self.hash(password)?)));
        }

        Ok((true, None))
    }

    fn dummy_verify(&self, password: &str) {
        let _ = self.preferred_scheme().verify(password, &self.dummy_hash);
    }
}

/// Makes a hash of the provided string using argon2id with default params
pub(crate) fn argon2_hash(source_str: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    let res = Argon2::default().hash_password(source_str.as_bytes(), &salt)?;

    Ok(res.to_string())
}

/// Checks if provided string's hash is equal to provided argon2 hash
pub(crate) fn argon2_verify(source_str: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash)?;

    match Argon2::default().verify_password(source_str.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(err) => Err(err.into()),
    }
}

/// Validates and makes a hash of the provided string using bcrypt
pub(crate) fn bcrypt_hash(source_str: &str) -> Result<String, AuthError> {
    let res = bcrypt::hash(source_str, DEFAULT_COST)?;

    Ok(res)
}

/// Checks if provided string's hash is equal to provided hash using bcrypt
pub(crate) fn bcrypt_verify(source_str: &str, hash: &str) -> Result<bool, AuthError> {
    let res = bcrypt::verify(source_str, hash)?;

    Ok(res)
}

/// Creates sha256 hash from source string
pub(crate) fn sha256_hash(source_str: &str) -> String {
    let mut hasher = Sha256::new();

    hasher.update(source_str.as_bytes());
    let hash_result = hasher.finalize();

    hex::encode(hash_result)
}
