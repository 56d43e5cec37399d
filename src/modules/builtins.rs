/*!
 * Built-in Modules
 *
 * Built-ins never touch the VFS. Their bindings live on the host side; the
 * loader records the export names in a [`BuiltinRegistry`] and hands the
 * guest a synthetic module that re-exports each binding.
 *
 * The synthetic module imports the binding object from a specifier only its
 * own registry resolves, so guest code has no shared global to overwrite.
 */

use ahash::RandomState;
use dashmap::DashMap;
use std::fmt::Write;
use std::sync::Arc;
use uuid::Uuid;

use super::types::BUILTIN_SCHEME;

/// Prefix accepted in front of every built-in name
pub const NODE_PREFIX: &str = "node:";

/// Scheme of the specifiers that hand a shim its host binding object
pub const BINDING_SCHEME: &str = "sandbox-binding:";

/// Built-in module names
pub const BUILTIN_MODULES: &[&str] = &[
    "assert",
    "assert/strict",
    "async_hooks",
    "buffer",
    "child_process",
    "cluster",
    "console",
    "constants",
    "crypto",
    "dgram",
    "diagnostics_channel",
    "dns",
    "dns/promises",
    "domain",
    "events",
    "fs",
    "fs/promises",
    "http",
    "http2",
    "https",
    "inspector",
    "module",
    "net",
    "os",
    "path",
    "path/posix",
    "path/win32",
    "perf_hooks",
    "process",
    "punycode",
    "querystring",
    "readline",
    "readline/promises",
    "repl",
    "stream",
    "stream/consumers",
    "stream/promises",
    "stream/web",
    "string_decoder",
    "timers",
    "timers/promises",
    "tls",
    "trace_events",
    "tty",
    "url",
    "util",
    "util/types",
    "v8",
    "vm",
    "wasi",
    "worker_threads",
    "zlib",
];

/// Bare built-in name for `specifier`, with or without the `node:` prefix
pub fn builtin_name(specifier: &str) -> Option<&str> {
    let name = specifier.strip_prefix(NODE_PREFIX).unwrap_or(specifier);
    BUILTIN_MODULES.contains(&name).then_some(name)
}

/// Host side knowledge of what each built-in exports
pub trait BuiltinProvider: Send + Sync {
    /// Export names of `name`, or `None` if the host does not provide it
    fn exports(&self, name: &str) -> Option<Vec<String>>;
}

/// Provider backed by a fixed table, for hosts that know their bindings
/// up front
#[derive(Debug, Default, Clone)]
pub struct StaticBuiltins {
    table: ahash::HashMap<String, Vec<String>>,
}

impl StaticBuiltins {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with<I, S>(mut self, name: &str, exports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.table
            .insert(name.to_string(), exports.into_iter().map(Into::into).collect());
        self
    }
}

impl BuiltinProvider for StaticBuiltins {
    fn exports(&self, name: &str) -> Option<Vec<String>> {
        self.table.get(name).cloned()
    }
}

/// Export names of every built-in the loader has materialized
///
/// Each registry carries its own random handle; binding specifiers minted
/// by one registry are unknown to every other.
#[derive(Debug)]
pub struct BuiltinRegistry {
    handle: String,
    entries: DashMap<String, Arc<Vec<String>>, RandomState>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self {
            handle: Uuid::new_v4().simple().to_string(),
            entries: DashMap::with_hasher(RandomState::new()),
        }
    }

    #[inline]
    pub fn handle(&self) -> &str {
        &self.handle
    }

    /// Specifier a shim imports to receive the binding object for `key`
    pub fn binding_specifier(&self, key: &str) -> String {
        format!("{BINDING_SCHEME}{}/{key}", self.handle)
    }

    /// Registry key behind `specifier`, if this registry minted it for a
    /// registered built-in
    pub fn binding_key<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        let (handle, key) = specifier.strip_prefix(BINDING_SCHEME)?.split_once('/')?;
        (handle == self.handle && self.contains(key)).then_some(key)
    }

    /// Record `name`'s exports; returns the registry key
    pub fn register(&self, name: &str, exports: Vec<String>) -> String {
        let key = format!("{BUILTIN_SCHEME}{name}");
        self.entries.insert(key.clone(), Arc::new(exports));
        key
    }

    pub fn exports(&self, key: &str) -> Option<Arc<Vec<String>>> {
        self.entries.get(key).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
}

/// Source of the module standing in for a built-in
///
/// `binding` is the specifier that yields the host object. Every export
/// that is a valid identifier becomes a named re-export; `default` is the
/// whole binding object unless it provides its own.
pub fn synthesize(binding: &str, exports: &[String]) -> String {
    let mut source = String::new();
    let _ = writeln!(
        source,
        "import __builtin from {};",
        serde_json::Value::String(binding.to_string())
    );
    for name in exports {
        if name != "default" && is_identifier(name) {
            let _ = writeln!(source, "export const {name} = __builtin.{name};");
        }
    }
    source.push_str("export default (\"default\" in __builtin ? __builtin.default : __builtin);\n");
    source
}
