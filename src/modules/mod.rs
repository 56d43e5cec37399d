/*!
 * Modules
 * Specifier resolution and the compile cache behind the guest's nested
 * module loader
 */

pub mod builtins;
pub mod loader;
pub mod resolver;
pub mod types;

// Re-exports
pub use builtins::{builtin_name, BuiltinProvider, BuiltinRegistry, StaticBuiltins};
pub use loader::{detect_format, DefaultCompiler, ModuleLoader, SourceCompiler};
pub use resolver::Resolver;
pub use types::{CacheStats, CompiledModule, ModuleError, ModuleFormat, ModuleResult, Resolved};
