//! Process-wide block cipher registry.
//!
//! One slot per [`Algorithm`]; each slot lazily constructs at most one
//! backend instance and keeps it until the registry itself goes away.
//! Contexts hold their own `Arc` to the cipher, so a cipher outlives the
//! registry for as long as any context still uses it.
//!
//! ```text
//! CipherRegistry (Arc<RegistryInner>, cloned per holder)
//!   └── slot[alg]: Mutex<{ factory, cipher: Option<Arc<dyn BlockCipher>> }>
//!                                      └── shared with every CipherContext
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tracing::debug;
use vfc_core::Algorithm;

use crate::aes_backend::AesCipher;
use crate::block::{ensure_supported, BlockCipher};
use crate::error::{CipherError, CipherResult};

/// Constructor for one algorithm's backend.
pub type CipherFactory = Arc<dyn Fn(Algorithm) -> CipherResult<Arc<dyn BlockCipher>> + Send + Sync>;

struct SlotState {
    factory: Option<CipherFactory>,
    cipher: Option<Arc<dyn BlockCipher>>,
    constructions: u64,
}

struct Slot {
    state: Mutex<SlotState>,
}

impl Slot {
    fn new(factory: Option<CipherFactory>) -> Self {
        Slot {
            state: Mutex::new(SlotState {
                factory,
                cipher: None,
                constructions: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct RegistryInner {
    slots: [Slot; Algorithm::COUNT],
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let released = self
            .slots
            .iter_mut()
            .filter_map(|slot| {
                slot.state
                    .get_mut()
                    .unwrap_or_else(PoisonError::into_inner)
                    .cipher
                    .take()
            })
            .count();
        debug!(released, "cipher registry torn down");
    }
}

fn portable_aes(_: Algorithm) -> CipherResult<Arc<dyn BlockCipher>> {
    Ok(Arc::new(AesCipher::portable()))
}

fn accelerated_aes(_: Algorithm) -> CipherResult<Arc<dyn BlockCipher>> {
    Ok(Arc::new(AesCipher::accelerated()?))
}

fn builtin_factory(algorithm: Algorithm) -> Option<CipherFactory> {
    let factory: CipherFactory = match algorithm {
        Algorithm::Aes => Arc::new(portable_aes),
        Algorithm::AesAccel => Arc::new(accelerated_aes),
        Algorithm::Vendor => return None,
    };
    Some(factory)
}

static GLOBAL: Mutex<Weak<RegistryInner>> = Mutex::new(Weak::new());

/// Shared handle to a cipher registry.
///
/// Cloning a handle adds a reference; dropping (or [`release`](Self::release))
/// removes one. The registry and every cached cipher reference it holds are
/// released when the last handle goes.
#[derive(Clone)]
pub struct CipherRegistry {
    inner: Arc<RegistryInner>,
}

impl CipherRegistry {
    /// A standalone registry with the built-in backends.
    pub fn new() -> Self {
        let slots = std::array::from_fn(|i| {
            let algorithm = Algorithm::ALL[i];
            Slot::new(builtin_factory(algorithm))
        });
        CipherRegistry {
            inner: Arc::new(RegistryInner { slots }),
        }
    }

    /// The process-wide registry.
    ///
    /// Created on first use; torn down when the last handle drops and
    /// re-created by the next call.
    pub fn global() -> Self {
        let mut global = GLOBAL.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(inner) = global.upgrade() {
            return CipherRegistry { inner };
        }
        let registry = CipherRegistry::new();
        *global = Arc::downgrade(&registry.inner);
        debug!("process-wide cipher registry created");
        registry
    }

    /// Install a backend factory for `algorithm`.
    ///
    /// Only allowed before the slot has constructed its cipher.
    pub fn register<F>(&self, algorithm: Algorithm, factory: F) -> CipherResult<()>
    where
        F: Fn(Algorithm) -> CipherResult<Arc<dyn BlockCipher>> + Send + Sync + 'static,
    {
        let mut state = self.slot(algorithm).lock();
        if state.cipher.is_some() {
            return Err(CipherError::InvalidArgument(format!(
                "{algorithm} cipher already constructed; register before first use"
            )));
        }
        let factory: CipherFactory = Arc::new(factory);
        state.factory = Some(factory);
        debug!(%algorithm, "cipher backend registered");
        Ok(())
    }

    /// Shared reference to the cipher for `algorithm`, constructing it on
    /// first request.
    ///
    /// Construction runs under the slot lock, so concurrent first requests
    /// build exactly one instance. A failed construction leaves the slot
    /// empty; other slots are unaffected.
    pub fn get(&self, algorithm: Algorithm) -> CipherResult<Arc<dyn BlockCipher>> {
        let mut state = self.slot(algorithm).lock();
        if let Some(cipher) = &state.cipher {
            return Ok(cipher.clone());
        }

        let factory = state.factory.clone().ok_or_else(|| CipherError::ConstructionFailed {
            algorithm,
            reason: "no backend registered".into(),
        })?;
        let cipher = factory(algorithm)?;

        ensure_supported(cipher.as_ref())?;
        if cipher.algorithm() != algorithm {
            return Err(CipherError::ConstructionFailed {
                algorithm,
                reason: format!("backend '{}' implements {}", cipher.name(), cipher.algorithm()),
            });
        }
        if cipher.block_size() == 0 || cipher.key_size() == 0 {
            return Err(CipherError::ConstructionFailed {
                algorithm,
                reason: format!("backend '{}' reports a zero block or key size", cipher.name()),
            });
        }

        state.constructions += 1;
        state.cipher = Some(cipher.clone());
        debug!(
            %algorithm,
            backend = cipher.name(),
            version = %cipher.interface_version(),
            block_size = cipher.block_size(),
            "cipher constructed"
        );
        Ok(cipher)
    }

    /// Give up this handle.
    pub fn release(self) {
        drop(self);
    }

    /// Number of live handles to this registry.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub fn is_constructed(&self, algorithm: Algorithm) -> bool {
        self.slot(algorithm).lock().cipher.is_some()
    }

    /// How many times the slot for `algorithm` built a backend.
    pub fn constructions(&self, algorithm: Algorithm) -> u64 {
        self.slot(algorithm).lock().constructions
    }

    /// Live references to the cached cipher, including the registry's own.
    pub fn cipher_refs(&self, algorithm: Algorithm) -> usize {
        self.slot(algorithm)
            .lock()
            .cipher
            .as_ref()
            .map_or(0, Arc::strong_count)
    }

    fn slot(&self, algorithm: Algorithm) -> &Slot {
        &self.inner.slots[algorithm.index()]
    }
}

impl Default for CipherRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CipherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let constructed: Vec<Algorithm> = Algorithm::ALL
            .into_iter()
            .filter(|alg| self.is_constructed(*alg))
            .collect();
        f.debug_struct("CipherRegistry")
            .field("handles", &self.handle_count())
            .field("constructed", &constructed)
            .finish()
    }
}
