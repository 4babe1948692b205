use std::fmt;
use std::result;
use std::sync::Arc;
use std::collections::HashMap;

use parking_lot::RwLock;
use whiley_env::ModuleId;
use whiley_il::Module;

/// A name could not be resolved against the available modules.
#[derive(Clone, Debug)]
pub struct ResolveError {
    pub missing: String,
}

impl ResolveError {
    pub fn new<S: Into<String>>(missing: S) -> ResolveError {
        ResolveError { missing: missing.into() }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "unable to resolve {}", self.missing)
    }
}

/// Provides already-compiled modules for cross-module references.
///
/// The backing store is an external collaborator; the front end only relies
/// on the returned modules carrying fully resolved types and constants.
pub trait ModuleLoader {
    fn load_module(&self, module: &ModuleId) -> result::Result<Arc<Module>, ResolveError>;
}

impl<'a, L: ModuleLoader + ?Sized> ModuleLoader for &'a L {
    fn load_module(&self, module: &ModuleId) -> result::Result<Arc<Module>, ResolveError> {
        (**self).load_module(module)
    }
}

/// A loader with no modules at all, for self-contained compilations.
pub struct NoModules;

impl ModuleLoader for NoModules {
    fn load_module(&self, module: &ModuleId) -> result::Result<Arc<Module>, ResolveError> {
        Err(ResolveError::new(module.to_string()))
    }
}

/// A process-wide, publish-only cache in front of another loader.
///
/// Entries are created lazily and never mutated after publication, so
/// concurrent compilations of unrelated units can share one cache without
/// further coordination.
pub struct CachingLoader<L> {
    inner: L,
    cache: RwLock<HashMap<ModuleId, Arc<Module>>>,
}

impl<L: ModuleLoader> CachingLoader<L> {
    pub fn new(inner: L) -> CachingLoader<L> {
        CachingLoader { inner: inner, cache: RwLock::new(HashMap::new()) }
    }
}

impl<L: ModuleLoader> ModuleLoader for CachingLoader<L> {
    fn load_module(&self, module: &ModuleId) -> result::Result<Arc<Module>, ResolveError> {
        if let Some(m) = self.cache.read().get(module) {
            return Ok(m.clone());
        }
        let loaded = self.inner.load_module(module)?;
        let mut cache = self.cache.write();
        // a racing loader may have published first; keep the existing entry
        Ok(cache.entry(module.clone()).or_insert(loaded).clone())
    }
}

/// A loader over a fixed set of modules, useful for tests and for compiling
/// groups of units against each other.
pub struct FixedModules {
    modules: HashMap<ModuleId, Arc<Module>>,
}

impl FixedModules {
    pub fn new(modules: Vec<Module>) -> FixedModules {
        FixedModules {
            modules: modules.into_iter().map(|m| (m.id.clone(), Arc::new(m))).collect(),
        }
    }
}

impl ModuleLoader for FixedModules {
    fn load_module(&self, module: &ModuleId) -> result::Result<Arc<Module>, ResolveError> {
        match self.modules.get(module) {
            Some(m) => Ok(m.clone()),
            None => Err(ResolveError::new(module.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// tests

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::result;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use whiley_env::ModuleId;
    use whiley_il::Module;
    use super::{ModuleLoader, CachingLoader, ResolveError};

    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl ModuleLoader for CountingLoader {
        fn load_module(&self, module: &ModuleId)
                       -> result::Result<Arc<Module>, ResolveError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(Module::new(module.clone())))
        }
    }

    #[test]
    fn test_cache_loads_once() {
        let loader = CachingLoader::new(CountingLoader { loads: AtomicUsize::new(0) });
        let mid = ModuleId::from_path("whiley.lang.Math");
        let a = loader.load_module(&mid).unwrap();
        let b = loader.load_module(&mid).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(loader.inner.loads.load(Ordering::SeqCst), 1);
    }
}
