//! vfc-resolver: open virtual resources, decrypting transparently
//!
//! A resource's scheme and parameters decide whether its bytes are plain or
//! an encrypted container. Encrypted ones get their passphrase from a
//! [`vfc_keyring::SecretSource`], a cipher from the
//! [`vfc_cipher::CipherRegistry`], and are wrapped in a block-aligned
//! decrypting (or encrypting) stream.

pub mod error;
pub mod format;
pub mod policy;
pub mod resolver;
pub mod resource;
pub mod staged;
pub mod stream;

pub use error::{ResolveError, ResolveResult};
pub use format::Header;
pub use policy::{encryption_params, EncryptionParams, SchemeKind};
pub use resolver::{CreatedResource, EncryptedResourceResolver, OpenState, OpenedResource, ResolverOptions};
pub use resource::{ResourceHandle, ResourcePath};
pub use staged::StagedFile;
pub use stream::{DecryptingReader, EncryptingWriter};
