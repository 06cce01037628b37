//! vfc-keyring: out-of-process passphrase handling
//!
//! Long-lived passphrases live in a separate secret-holder process
//! (`vfc-keyringd`). Everything else asks for them over a Unix socket when it
//! needs to derive a key, and drops them right after.
//!
//! ```text
//! SecretChannel ──(ClientCodec)── UnixStream ──(ServerCodec)── server::serve
//!                                                                  │
//!                                                          PassphraseStore (files)
//! ```

pub mod channel;
pub mod error;
pub mod passphrase;
pub mod protocol;
pub mod server;
pub mod store;

pub use channel::{AccessMode, ChannelConfig, SecretChannel, SecretSource};
pub use error::{SecretError, SecretResult};
pub use passphrase::{Passphrase, MAX_PASSPHRASE_LEN};
pub use protocol::Status;
pub use store::PassphraseStore;
