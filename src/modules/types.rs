/*!
 * Module Types
 * Resolution results, compiled modules and loader errors
 */

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::core::errors::Errno;
use crate::vfs::VfsError;

/// Key under which built-in modules are registered
pub const BUILTIN_SCHEME: &str = "builtin:";

/// Loader result type
pub type ModuleResult<T> = Result<T, ModuleError>;

/// Module loading errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    #[error("Cannot find module '{specifier}' from '{base}'")]
    NotFound { specifier: String, base: String },

    #[error("failed to read module {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: VfsError,
    },

    #[error("invalid package manifest {path}: {reason}")]
    Manifest { path: String, reason: String },

    #[error("failed to compile {path}: {reason}")]
    Compile { path: String, reason: String },
}

impl ModuleError {
    pub fn not_found(specifier: &str, base: &str) -> Self {
        Self::NotFound {
            specifier: specifier.into(),
            base: base.into(),
        }
    }

    #[must_use]
    pub fn errno(&self) -> Errno {
        match self {
            Self::NotFound { .. } => Errno::Noent,
            Self::Read { source, .. } => source.errno(),
            Self::Manifest { .. } | Self::Compile { .. } => Errno::Inval,
        }
    }
}

/// Where a specifier ended up
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Resolved {
    /// A built-in, by bare name (`fs`, `path/posix`)
    Builtin(String),
    /// An absolute VFS path
    File(String),
}

impl Resolved {
    /// Cache key: the VFS path, or `builtin:<name>`
    #[must_use]
    pub fn id(&self) -> String {
        match self {
            Self::Builtin(name) => format!("{BUILTIN_SCHEME}{name}"),
            Self::File(path) => path.clone(),
        }
    }

    #[must_use]
    pub fn is_builtin(&self) -> bool {
        matches!(self, Self::Builtin(_))
    }
}

impl fmt::Display for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// How a module's source should be evaluated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleFormat {
    Esm,
    CommonJs,
    Json,
    Builtin,
    /// Host object backing a built-in; the runtime supplies it, no source
    Binding,
}

/// Source ready to hand to the guest runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledModule {
    pub id: String,
    pub source: String,
    pub format: ModuleFormat,
}

/// Compile cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
