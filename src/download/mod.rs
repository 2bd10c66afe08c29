//! One-time download tokens.
//!
//! ```text
//! [none] --issue--> [active, TTL] --redeem--> [consumed]
//!                        |
//!                        +--(TTL passes)--> [expired]
//! ```

mod broker;
pub mod token;

pub use broker::{
    rate_limit_cache_key, token_cache_key, Download, DownloadTokenBroker, IssuedToken,
};
pub use token::{DownloadClaims, DownloadTokenSigner};
