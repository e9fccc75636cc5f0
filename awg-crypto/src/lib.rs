//! BLAKE2s-256/128 (RFC 7693) and the WireGuard MAC1 helper.
//!
//! This crate deliberately does not implement anything beyond what MAC1
//! rewriting needs: no X25519, no ChaCha20-Poly1305, no Noise handshake
//! state. Obfuscated traffic is never decrypted, only reframed.

#![forbid(unsafe_code)]

mod blake2s;
mod mac1;

pub use blake2s::{digest256, mac128, Blake2s};
pub use mac1::{mac1_key, recompute_init_mac1, recompute_response_mac1};
