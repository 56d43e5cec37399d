/*!
 * Module Resolver
 *
 * Maps an import specifier and the importing module's path to a built-in
 * or an absolute VFS path. Unlike VFS paths, specifiers do climb on `..`,
 * stopping at the root.
 */

use serde_json::Value;
use tracing::trace;

use super::builtins::builtin_name;
use super::types::{ModuleError, ModuleResult, Resolved};
use crate::vfs::{paths, SharedFs};

/// Extensions tried, in order, after the bare path
pub const PROBE_EXTENSIONS: &[&str] = &[".js", ".mjs", ".cjs", ".ts", ".json"];

/// Export conditions honored, in priority order
const CONDITIONS: &[&str] = &["import", "default", "require"];

const MANIFEST: &str = "package.json";
const NODE_MODULES: &str = "node_modules";

/// Join a relative specifier onto `dir`, popping on `..` but never past
/// the root
pub fn join_specifier(dir: &str, specifier: &str) -> String {
    let mut stack: Vec<&str> = if specifier.starts_with('/') {
        Vec::new()
    } else {
        dir.split('/').filter(|s| !s.is_empty()).collect()
    };
    for segment in specifier.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            name => stack.push(name),
        }
    }
    format!("/{}", stack.join("/"))
}

/// Split `@scope/name/sub/path` or `name/sub/path` into package and subpath
pub fn split_package(specifier: &str) -> (String, Option<String>) {
    let mut parts = specifier.splitn(if specifier.starts_with('@') { 3 } else { 2 }, '/');
    let name = if specifier.starts_with('@') {
        let scope = parts.next().unwrap_or_default();
        let pkg = parts.next().unwrap_or_default();
        format!("{scope}/{pkg}")
    } else {
        parts.next().unwrap_or_default().to_string()
    };
    let subpath = parts.next().filter(|rest| !rest.is_empty()).map(str::to_string);
    (name, subpath)
}

fn is_relative(specifier: &str) -> bool {
    specifier == "."
        || specifier == ".."
        || specifier.starts_with("./")
        || specifier.starts_with("../")
}

/// Resolver over one VFS replica
#[derive(Debug, Clone)]
pub struct Resolver {
    fs: SharedFs,
}

impl Resolver {
    pub fn new(fs: SharedFs) -> Self {
        Self { fs }
    }

    /// Resolve `specifier` as imported from `referrer` (a file path)
    ///
    /// Without a referrer, relative specifiers resolve against the root.
    pub fn resolve(&self, specifier: &str, referrer: Option<&str>) -> ModuleResult<Resolved> {
        if let Some(name) = builtin_name(specifier) {
            return Ok(Resolved::Builtin(name.to_string()));
        }

        let base_dir = referrer
            .and_then(|path| paths::split_parent(path).map(|(parent, _)| parent))
            .unwrap_or_else(|| "/".to_string());
        let base = referrer.unwrap_or("/");
        let not_found = || ModuleError::not_found(specifier, base);

        let resolved = if is_relative(specifier) || specifier.starts_with('/') {
            let target = join_specifier(&base_dir, specifier);
            self.probe(&target)?
        } else if specifier.is_empty() {
            None
        } else {
            self.resolve_bare(specifier, &base_dir)?
        };

        let path = resolved.ok_or_else(not_found)?;
        trace!(specifier, base, path = %path, "module resolved");
        Ok(Resolved::File(path))
    }

    /// Walk `node_modules` directories from `dir` up to the root
    fn resolve_bare(&self, specifier: &str, dir: &str) -> ModuleResult<Option<String>> {
        let (name, subpath) = split_package(specifier);
        let mut current = dir.to_string();
        loop {
            let pkg_dir = paths::join(&paths::join(&current, NODE_MODULES), &name);
            if self.is_dir(&pkg_dir) {
                let found = match &subpath {
                    Some(sub) => self.resolve_subpath(&pkg_dir, sub)?,
                    None => self.resolve_package(&pkg_dir)?,
                };
                if found.is_some() {
                    return Ok(found);
                }
            }
            match paths::split_parent(&current) {
                Some((parent, _)) => current = parent,
                None => return Ok(None),
            }
        }
    }

    /// `pkg/sub`: an `exports["./sub"]` entry wins, then the file itself
    fn resolve_subpath(&self, pkg_dir: &str, subpath: &str) -> ModuleResult<Option<String>> {
        if let Some(manifest) = self.manifest(pkg_dir)? {
            let key = format!("./{subpath}");
            if let Some(target) = manifest
                .get("exports")
                .and_then(|exports| exports.get(&key))
                .and_then(select_target)
            {
                return self.probe(&join_specifier(pkg_dir, &target));
            }
        }
        self.probe(&join_specifier(pkg_dir, subpath))
    }

    /// Package root: `exports["."]`, then `module`, then `main`, then index
    fn resolve_package(&self, pkg_dir: &str) -> ModuleResult<Option<String>> {
        if let Some(manifest) = self.manifest(pkg_dir)? {
            let entries = [
                manifest.get("exports").and_then(root_export),
                manifest.get("module").and_then(Value::as_str).map(str::to_string),
                manifest.get("main").and_then(Value::as_str).map(str::to_string),
            ];
            for entry in entries.into_iter().flatten() {
                let target = join_specifier(pkg_dir, &entry);
                if let Some(found) = self.probe_file(&target).or_else(|| self.probe_index(&target)) {
                    return Ok(Some(found));
                }
            }
        }
        Ok(self.probe_index(pkg_dir))
    }

    fn manifest(&self, dir: &str) -> ModuleResult<Option<Value>> {
        let path = paths::join(dir, MANIFEST);
        if !self.is_file(&path) {
            return Ok(None);
        }
        let text = self
            .fs
            .lock()
            .read_file(&path)
            .map_err(|source| ModuleError::Read {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|err| ModuleError::Manifest {
                path,
                reason: err.to_string(),
            })
    }

    /// File as-is, with each extension, then as a package or index directory
    fn probe(&self, path: &str) -> ModuleResult<Option<String>> {
        if let Some(found) = self.probe_file(path) {
            return Ok(Some(found));
        }
        if self.is_dir(path) {
            if self.is_file(&paths::join(path, MANIFEST)) {
                return self.resolve_package(path);
            }
            return Ok(self.probe_index(path));
        }
        Ok(None)
    }

    fn probe_file(&self, path: &str) -> Option<String> {
        if self.is_file(path) {
            return Some(paths::normalize(path));
        }
        PROBE_EXTENSIONS
            .iter()
            .map(|ext| format!("{path}{ext}"))
            .find(|candidate| self.is_file(candidate))
    }

    fn probe_index(&self, dir: &str) -> Option<String> {
        let index = paths::join(dir, "index");
        PROBE_EXTENSIONS
            .iter()
            .map(|ext| format!("{index}{ext}"))
            .find(|candidate| self.is_file(candidate))
    }

    fn is_file(&self, path: &str) -> bool {
        self.fs
            .lock()
            .stat(path)
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    fn is_dir(&self, path: &str) -> bool {
        self.fs
            .lock()
            .stat(path)
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }
}

/// `exports` value for the package root
///
/// A string, an object keyed by `"."`, or a bare condition object.
fn root_export(exports: &Value) -> Option<String> {
    match exports {
        Value::String(target) => Some(target.clone()),
        Value::Object(map) => match map.get(".") {
            Some(root) => select_target(root),
            None if map.keys().all(|key| !key.starts_with('.')) => select_target(exports),
            None => None,
        },
        _ => None,
    }
}

/// Pick a target out of a string or a (possibly nested) condition object
fn select_target(value: &Value) -> Option<String> {
    match value {
        Value::String(target) => Some(target.clone()),
        Value::Object(map) => CONDITIONS
            .iter()
            .find_map(|condition| map.get(*condition).and_then(select_target)),
        Value::Array(items) => items.iter().find_map(select_target),
        _ => None,
    }
}
