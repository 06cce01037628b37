//! vfc-cipher: pluggable block ciphers for vfcrypt
//!
//! ```text
//! CipherRegistry ── get(Algorithm) ──► Arc<dyn BlockCipher>   (one per algorithm)
//!                                            │
//!                       CipherContext::bind ─┘
//!                         ├── encrypt KeySchedule + chaining IV
//!                         └── decrypt KeySchedule + chaining IV
//! ```
//!
//! Backends implement [`BlockCipher`] and are constructed lazily, once per
//! algorithm, by the registry. A [`CipherContext`] applies CBC chaining over
//! whole blocks; padding and framing are the caller's concern.
//!
//! Keys come from passphrases through Argon2id ([`kdf::derive_key`]).

pub mod aes_backend;
pub mod block;
pub mod context;
pub mod error;
pub mod kdf;
pub mod registry;

pub use aes_backend::{is_accel_available, AesCipher, AES_BLOCK_SIZE};
pub use block::{BlockCipher, ExpandedKey, InterfaceVersion, KeySchedule, INTERFACE_VERSION};
pub use context::CipherContext;
pub use error::{CipherError, CipherResult};
pub use kdf::{derive_key, generate_salt, DerivedKey, KdfParams, KEY_CHECK_SIZE, SALT_SIZE};
pub use registry::{CipherFactory, CipherRegistry};
