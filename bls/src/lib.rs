//! Opaque BLS key and signature bytes.
//!
//! Consensus code only stores, compares and hashes these. Whether a signature is valid is decided
//! by a `Verifier` supplied by the caller.

pub use crate::{public_key_bytes::PublicKeyBytes, signature_bytes::SignatureBytes};

mod public_key_bytes;
mod signature_bytes;
