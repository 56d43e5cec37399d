/*!
 * Module Loader
 * Resolve, read and compile once per path; cached for the loader's life
 */

use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

use super::builtins::{synthesize, BuiltinProvider, BuiltinRegistry};
use super::resolver::Resolver;
use super::types::*;
use crate::vfs::{FsEvent, SharedFs};

/// Turns module source into what the guest runtime evaluates
pub trait SourceCompiler: Send + Sync {
    fn compile(&self, path: &str, source: &str, format: ModuleFormat) -> ModuleResult<String>;
}

/// JSON becomes a default export; everything else passes through
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultCompiler;

impl SourceCompiler for DefaultCompiler {
    fn compile(&self, path: &str, source: &str, format: ModuleFormat) -> ModuleResult<String> {
        match format {
            ModuleFormat::Json => {
                let value: serde_json::Value =
                    serde_json::from_str(source).map_err(|err| ModuleError::Compile {
                        path: path.to_string(),
                        reason: err.to_string(),
                    })?;
                Ok(format!("export default {value};"))
            }
            _ => Ok(source.to_string()),
        }
    }
}

/// Guess the module format from the extension, then the source
///
/// `.mjs` and `.cjs` are authoritative. Otherwise a file counts as
/// CommonJS when it touches `module.exports`/`exports.`/`require(` and has
/// no top-level `import`/`export` statement.
pub fn detect_format(path: &str, source: &str) -> ModuleFormat {
    if path.ends_with(".json") {
        return ModuleFormat::Json;
    }
    if path.ends_with(".mjs") {
        return ModuleFormat::Esm;
    }
    if path.ends_with(".cjs") {
        return ModuleFormat::CommonJs;
    }
    let has_esm = source.lines().map(str::trim_start).any(|line| {
        line.starts_with("import ")
            || line.starts_with("import{")
            || line.starts_with("export ")
            || line.starts_with("export{")
    });
    let has_cjs = source.contains("module.exports")
        || source.contains("exports.")
        || source.contains("require(");
    if has_cjs && !has_esm {
        ModuleFormat::CommonJs
    } else {
        ModuleFormat::Esm
    }
}

/// Nested module loader for one execution context
pub struct ModuleLoader {
    fs: SharedFs,
    resolver: Resolver,
    compiler: Arc<dyn SourceCompiler>,
    provider: Option<Arc<dyn BuiltinProvider>>,
    builtins: BuiltinRegistry,
    cache: DashMap<String, Arc<CompiledModule>, RandomState>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ModuleLoader {
    pub fn new(fs: SharedFs) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&fs)),
            fs,
            compiler: Arc::new(DefaultCompiler),
            provider: None,
            builtins: BuiltinRegistry::new(),
            cache: DashMap::with_hasher(RandomState::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_compiler(mut self, compiler: Arc<dyn SourceCompiler>) -> Self {
        self.compiler = compiler;
        self
    }

    #[must_use]
    pub fn with_builtins(mut self, provider: Arc<dyn BuiltinProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn resolve(&self, specifier: &str, referrer: Option<&str>) -> ModuleResult<Resolved> {
        self.resolver.resolve(specifier, referrer)
    }

    /// Resolve and compile `specifier`, reusing an earlier compile
    ///
    /// The cache entry stays locked while compiling, so concurrent loads of
    /// one id compile it once. A compiler must not call back into `load`.
    pub fn load(&self, specifier: &str, referrer: Option<&str>) -> ModuleResult<Arc<CompiledModule>> {
        if self.builtins.binding_key(specifier).is_some() {
            return Ok(Arc::new(CompiledModule {
                id: specifier.to_string(),
                source: String::new(),
                format: ModuleFormat::Binding,
            }));
        }
        let resolved = self.resolve(specifier, referrer)?;
        let id = resolved.id();

        match self.cache.entry(id) {
            Entry::Occupied(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                trace!(id = %entry.key(), "module cache hit");
                Ok(Arc::clone(entry.get()))
            }
            Entry::Vacant(entry) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                let module = Arc::new(match resolved {
                    Resolved::Builtin(name) => self.materialize_builtin(&name),
                    Resolved::File(path) => self.compile_file(&path)?,
                });
                debug!(id = %entry.key(), format = ?module.format, "module compiled");
                entry.insert(Arc::clone(&module));
                Ok(module)
            }
        }
    }

    fn materialize_builtin(&self, name: &str) -> CompiledModule {
        let exports = self
            .provider
            .as_ref()
            .and_then(|provider| provider.exports(name))
            .unwrap_or_default();
        let key = self.builtins.register(name, exports.clone());
        CompiledModule {
            source: synthesize(&self.builtins.binding_specifier(&key), &exports),
            id: key,
            format: ModuleFormat::Builtin,
        }
    }

    fn compile_file(&self, path: &str) -> ModuleResult<CompiledModule> {
        let source = self
            .fs
            .lock()
            .read_file(path)
            .map_err(|source| ModuleError::Read {
                path: path.to_string(),
                source,
            })?;
        let format = detect_format(path, &source);
        let compiled = self.compiler.compile(path, &source, format)?;
        Ok(CompiledModule {
            id: path.to_string(),
            source: compiled,
            format,
        })
    }

    /// Drop the cached compile of `path`
    pub fn invalidate(&self, path: &str) -> bool {
        self.cache.remove(path).is_some()
    }

    /// Drop compiles made stale by a filesystem change
    pub fn invalidate_event(&self, event: &FsEvent) {
        match event {
            FsEvent::Create { path } | FsEvent::Delete { path } => {
                self.invalidate(path);
            }
            FsEvent::Move { from, to } => {
                self.invalidate(from);
                self.invalidate(to);
            }
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("stats", &self.stats())
            .field("builtins", &self.builtins.len())
            .finish()
    }
}
