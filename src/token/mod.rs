//! Token claims, codec and key management.

pub mod claims;
pub mod codec;
pub mod keys;

pub use claims::{
    private_claims_match, AccessClaims, OneTimeClaims, RefreshClaims, ACCESS_TOKEN_TTL_SECS,
    ONE_TIME_TOKEN_TTL_SECS, REFRESH_TOKEN_TTL_SECS, TOKEN_TYPE_REFRESH,
};
pub use codec::{hash_token, TokenCodec, TokenKind};
pub use keys::KeyMaterial;
