//! Infrastructure construction, resolved by explicit registration.

use std::collections::HashMap;
use std::sync::Arc;

use chronicle_persistence::{
    AesGcmCipher, AggregateRecorder, ApplicationRecorder, Cipher, Compressor,
    InMemoryAggregateRecorder, InMemoryApplicationRecorder, InMemoryProcessRecorder,
    ProcessRecorder, ZlibCompressor,
};

use crate::env::{Env, keys};
use crate::error::ApplicationError;

/// Builds the recorders an application runs on.
///
/// One factory instance serves one application; the recorders it hands out
/// share the factory's underlying storage.
pub trait InfrastructureFactory: Send + Sync {
    /// A plain aggregate recorder for a named purpose (e.g. "snapshots").
    fn aggregate_recorder(
        &self,
        purpose: &str,
    ) -> Result<Arc<dyn AggregateRecorder>, ApplicationError>;

    fn application_recorder(&self) -> Result<Arc<dyn ApplicationRecorder>, ApplicationError>;

    fn process_recorder(&self) -> Result<Arc<dyn ProcessRecorder>, ApplicationError>;
}

/// In-memory infrastructure for tests and development.
#[derive(Debug, Default)]
pub struct MemoryFactory;

impl MemoryFactory {
    pub fn new() -> Self {
        Self
    }
}

impl InfrastructureFactory for MemoryFactory {
    fn aggregate_recorder(
        &self,
        _purpose: &str,
    ) -> Result<Arc<dyn AggregateRecorder>, ApplicationError> {
        Ok(Arc::new(InMemoryAggregateRecorder::new()))
    }

    fn application_recorder(&self) -> Result<Arc<dyn ApplicationRecorder>, ApplicationError> {
        Ok(Arc::new(InMemoryApplicationRecorder::new()))
    }

    fn process_recorder(&self) -> Result<Arc<dyn ProcessRecorder>, ApplicationError> {
        Ok(Arc::new(InMemoryProcessRecorder::new()))
    }
}

type FactoryCtor =
    Arc<dyn Fn(&Env) -> Result<Arc<dyn InfrastructureFactory>, ApplicationError> + Send + Sync>;

/// Explicit `PERSISTENCE_MODULE` → factory constructor map.
///
/// "memory" is registered out of the box; driver crates register their own
/// module names. Resolution is a map lookup, and an unknown module is a
/// configuration bug, not a discovery problem.
#[derive(Clone)]
pub struct FactoryRegistry {
    constructors: HashMap<String, FactoryCtor>,
}

impl FactoryRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            constructors: HashMap::new(),
        };
        registry.register("memory", |_env| Ok(Arc::new(MemoryFactory::new())));
        registry
    }

    pub fn register(
        &mut self,
        module: &str,
        ctor: impl Fn(&Env) -> Result<Arc<dyn InfrastructureFactory>, ApplicationError>
        + Send
        + Sync
        + 'static,
    ) {
        self.constructors.insert(module.to_string(), Arc::new(ctor));
    }

    /// Resolve the factory selected by `PERSISTENCE_MODULE` (default
    /// "memory").
    pub fn resolve(&self, env: &Env) -> Result<Arc<dyn InfrastructureFactory>, ApplicationError> {
        let module = env.get(keys::PERSISTENCE_MODULE).unwrap_or("memory");
        match self.constructors.get(module) {
            Some(ctor) => ctor(env),
            None => Err(ApplicationError::programming(format!(
                "persistence module '{module}' is not registered"
            ))),
        }
    }
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for FactoryRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FactoryRegistry")
            .field("modules", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Resolve `COMPRESSOR_TOPIC` to a compressor.
pub fn construct_compressor(env: &Env) -> Result<Option<Arc<dyn Compressor>>, ApplicationError> {
    match env.get(keys::COMPRESSOR_TOPIC) {
        None => Ok(None),
        Some("zlib") => Ok(Some(Arc::new(ZlibCompressor::new()))),
        Some(other) => Err(ApplicationError::programming(format!(
            "compressor topic '{other}' is not registered"
        ))),
    }
}

/// Resolve `CIPHER_TOPIC` + `CIPHER_KEY` to a cipher.
pub fn construct_cipher(env: &Env) -> Result<Option<Arc<dyn Cipher>>, ApplicationError> {
    match env.get(keys::CIPHER_TOPIC) {
        None => Ok(None),
        Some("aes-gcm") => {
            let key = env.get_bytes(keys::CIPHER_KEY).ok_or_else(|| {
                ApplicationError::programming("CIPHER_TOPIC is set but CIPHER_KEY is missing")
            })?;
            let cipher = AesGcmCipher::new(&key)
                .map_err(|e| ApplicationError::programming(e.to_string()))?;
            Ok(Some(Arc::new(cipher)))
        }
        Some(other) => Err(ApplicationError::programming(format!(
            "cipher topic '{other}' is not registered"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD as BASE64;

    #[test]
    fn memory_module_is_registered_by_default() {
        let registry = FactoryRegistry::new();
        assert!(registry.resolve(&Env::new()).is_ok());

        let explicit = Env::from_iter([(keys::PERSISTENCE_MODULE, "memory")]);
        assert!(registry.resolve(&explicit).is_ok());
    }

    #[test]
    fn unknown_module_is_a_programming_error() {
        let registry = FactoryRegistry::new();
        let env = Env::from_iter([(keys::PERSISTENCE_MODULE, "cassandra")]);
        assert!(matches!(
            registry.resolve(&env),
            Err(ApplicationError::Programming(_))
        ));
    }

    #[test]
    fn compressor_resolution() {
        assert!(construct_compressor(&Env::new()).unwrap().is_none());
        let zlib = Env::from_iter([(keys::COMPRESSOR_TOPIC, "zlib")]);
        assert!(construct_compressor(&zlib).unwrap().is_some());
        let unknown = Env::from_iter([(keys::COMPRESSOR_TOPIC, "lz5")]);
        assert!(construct_compressor(&unknown).is_err());
    }

    #[test]
    fn cipher_resolution() {
        assert!(construct_cipher(&Env::new()).unwrap().is_none());

        let env = Env::from_iter([
            (keys::CIPHER_TOPIC, "aes-gcm".to_string()),
            (keys::CIPHER_KEY, BASE64.encode([1u8; 32])),
        ]);
        assert!(construct_cipher(&env).unwrap().is_some());

        let missing_key = Env::from_iter([(keys::CIPHER_TOPIC, "aes-gcm")]);
        assert!(construct_cipher(&missing_key).is_err());

        let bad_key = Env::from_iter([
            (keys::CIPHER_TOPIC, "aes-gcm"),
            (keys::CIPHER_KEY, "too-short"),
        ]);
        assert!(construct_cipher(&bad_key).is_err());
    }
}
