//! HTTP Basic authentication against a bcrypt password hash.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Default bcrypt cost for generated hashes.
pub const DEFAULT_HASH_COST: u32 = 10;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credentials")]
    Missing,

    #[error("Malformed Authorization header")]
    Malformed,

    #[error("Invalid credentials")]
    Invalid,

    #[error("Password hash error: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

/// Single-user Basic auth credentials.
#[derive(Clone)]
pub struct BasicAuth {
    username: String,
    password_hash: String,
}

impl std::fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl BasicAuth {
    pub fn new(username: &str, password_hash: &str) -> Self {
        Self {
            username: username.to_string(),
            password_hash: password_hash.to_string(),
        }
    }

    /// Verify an `Authorization` header value.
    ///
    /// bcrypt verification is CPU-bound; call from a blocking context.
    pub fn verify_header(&self, header: Option<&str>) -> Result<(), AuthError> {
        let header = header.ok_or(AuthError::Missing)?;
        let (username, password) = parse_basic_header(header)?;

        if username != self.username {
            return Err(AuthError::Invalid);
        }
        if bcrypt::verify(password, &self.password_hash)? {
            Ok(())
        } else {
            Err(AuthError::Invalid)
        }
    }
}

/// Split a `Basic <base64(user:pass)>` header into its parts.
pub fn parse_basic_header(header: &str) -> Result<(String, String), AuthError> {
    let (scheme, encoded) = header.trim().split_once(' ').ok_or(AuthError::Malformed)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return Err(AuthError::Malformed);
    }

    let decoded = STANDARD
        .decode(encoded.trim())
        .map_err(|_| AuthError::Malformed)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::Malformed)?;
    let (username, password) = decoded.split_once(':').ok_or(AuthError::Malformed)?;

    Ok((username.to_string(), password.to_string()))
}

/// Hash a password for use as `BASIC_AUTH_PASSWORD`.
pub fn hash_password(password: &str, cost: u32) -> Result<String, AuthError> {
    Ok(bcrypt::hash(password, cost)?)
}
