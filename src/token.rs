//! Reconnect token codec
//!
//! A token binds a user id to a nickname without any server-side session
//! storage. Layout: `base64(HMAC-SHA256(nickname + secret + id)) + "uid" + id`,
//! keyed with the same shared secret.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::TokenError;
use crate::types::UserId;

type HmacSha256 = Hmac<Sha256>;

/// Literal separator between the encoded hash and the decimal id
const ID_SEPARATOR: &str = "uid";

/// Mints and validates reconnect tokens with a shared secret
#[derive(Clone)]
pub struct TokenCodec {
    secret: String,
    /// Keyed MAC, cloned for every computation
    mac: HmacSha256,
}

impl TokenCodec {
    /// Create a codec for the given shared secret
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        Self { secret, mac }
    }

    /// Mint a token binding `id` to `nickname`
    pub fn mint(&self, id: UserId, nickname: &str) -> String {
        let tag = self.keyed_mac(id, nickname).finalize().into_bytes();
        format!("{}{}{}", BASE64.encode(tag), ID_SEPARATOR, id)
    }

    /// Validate a token presented together with `nickname`
    ///
    /// Returns the bound id only if the token was minted for this exact
    /// nickname under this secret. The hash comparison is constant-time.
    pub fn validate(&self, token: &str, nickname: &str) -> Result<UserId, TokenError> {
        let pos = token.rfind(ID_SEPARATOR).ok_or(TokenError::MissingSeparator)?;
        let (encoded, id) = (&token[..pos], &token[pos + ID_SEPARATOR.len()..]);

        let tag = BASE64
            .decode(encoded)
            .map_err(|_| TokenError::InvalidEncoding)?;
        let id = id
            .parse::<u64>()
            .ok()
            .and_then(UserId::new)
            .ok_or(TokenError::InvalidId)?;

        self.keyed_mac(id, nickname)
            .verify_slice(&tag)
            .map_err(|_| TokenError::Mismatch)?;

        Ok(id)
    }

    fn keyed_mac(&self, id: UserId, nickname: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(format!("{}{}{}", nickname, self.secret, id).as_bytes());
        mac
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}
