//! askq crypto helpers
//!
//! Channel subscriptions are authorized with HMAC-SHA256 tokens in the
//! `<key>:<hex signature>` shape hosted pub/sub services use, so the HTTP
//! side can issue them and the gateway can check them without sharing state.
//! Webhooks from the streaming platform are verified the same way.

pub mod channel_auth;
pub mod webhook;

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Compare a presented shared secret in constant time. Both sides are reduced
/// to a MAC under the same key, so lengths leak nothing either.
pub fn secrets_match(expected: &[u8], presented: &[u8]) -> bool {
    let mac_of = |secret: &[u8]| {
        Hmac::<Sha256>::new_from_slice(b"askq shared secret").map(|mut mac| {
            mac.update(secret);
            mac
        })
    };
    let (Ok(expected_mac), Ok(presented_mac)) = (mac_of(expected), mac_of(presented)) else {
        return false;
    };
    presented_mac.verify_slice(&expected_mac.finalize().into_bytes()).is_ok()
}
