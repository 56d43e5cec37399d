/*!
 * Resolver Tests
 */

use pretty_assertions::assert_eq;
use sandbox_kernel::modules::{ModuleError, Resolved, Resolver};
use sandbox_kernel::vfs::{MemFs, SharedFs};

fn project() -> SharedFs {
    let mut fs = MemFs::new();
    fs.mkdirp("/app/src/lib").unwrap();
    fs.write_file("/app/src/main.js", "import './lib/util';").unwrap();
    fs.write_file("/app/src/lib/util.ts", "export const x = 1;").unwrap();
    fs.write_file("/app/src/lib/data.json", "{}").unwrap();
    fs.mkdirp("/app/src/widgets").unwrap();
    fs.write_file("/app/src/widgets/index.mjs", "export {};").unwrap();

    fs.mkdirp("/node_modules/left-pad").unwrap();
    fs.write_file("/node_modules/left-pad/package.json", r#"{"main": "lib/pad"}"#).unwrap();
    fs.mkdirp("/node_modules/left-pad/lib").unwrap();
    fs.write_file("/node_modules/left-pad/lib/pad.js", "").unwrap();
    fs.write_file("/node_modules/left-pad/index.js", "").unwrap();

    fs.mkdirp("/node_modules/@scope/kit/dist").unwrap();
    fs.write_file(
        "/node_modules/@scope/kit/package.json",
        r#"{"exports": {".": {"import": "./dist/kit.mjs", "require": "./dist/kit.cjs"}, "./extra": "./dist/extra.js"}, "main": "./dist/kit.cjs"}"#,
    )
    .unwrap();
    fs.write_file("/node_modules/@scope/kit/dist/kit.mjs", "").unwrap();
    fs.write_file("/node_modules/@scope/kit/dist/kit.cjs", "").unwrap();
    fs.write_file("/node_modules/@scope/kit/dist/extra.js", "").unwrap();

    fs.mkdirp("/node_modules/modfirst").unwrap();
    fs.write_file(
        "/node_modules/modfirst/package.json",
        r#"{"module": "esm.js", "main": "cjs.js"}"#,
    )
    .unwrap();
    fs.write_file("/node_modules/modfirst/esm.js", "").unwrap();
    fs.write_file("/node_modules/modfirst/cjs.js", "").unwrap();
    fs.shared()
}

fn file(path: &str) -> Resolved {
    Resolved::File(path.to_string())
}

#[test]
fn test_relative_with_extension_probing() {
    let resolver = Resolver::new(project());
    let from = Some("/app/src/main.js");
    assert_eq!(resolver.resolve("./lib/util", from).unwrap(), file("/app/src/lib/util.ts"));
    assert_eq!(resolver.resolve("./lib/data.json", from).unwrap(), file("/app/src/lib/data.json"));
    assert_eq!(resolver.resolve("./widgets", from).unwrap(), file("/app/src/widgets/index.mjs"));
    assert_eq!(
        resolver.resolve("../src/lib/util", Some("/app/src/lib/x.js")).unwrap(),
        file("/app/src/lib/util.ts")
    );
}

#[test]
fn test_absolute_specifier() {
    let resolver = Resolver::new(project());
    assert_eq!(resolver.resolve("/app/src/main", None).unwrap(), file("/app/src/main.js"));
}

#[test]
fn test_bare_package_entry_points() {
    let resolver = Resolver::new(project());
    let from = Some("/app/src/main.js");
    assert_eq!(resolver.resolve("left-pad", from).unwrap(), file("/node_modules/left-pad/lib/pad.js"));
    assert_eq!(resolver.resolve("@scope/kit", from).unwrap(), file("/node_modules/@scope/kit/dist/kit.mjs"));
    assert_eq!(
        resolver.resolve("@scope/kit/extra", from).unwrap(),
        file("/node_modules/@scope/kit/dist/extra.js")
    );
    assert_eq!(resolver.resolve("modfirst", from).unwrap(), file("/node_modules/modfirst/esm.js"));
}

#[test]
fn test_builtins_bypass_the_vfs() {
    let resolver = Resolver::new(MemFs::new().shared());
    assert_eq!(resolver.resolve("fs", None).unwrap(), Resolved::Builtin("fs".into()));
    assert_eq!(resolver.resolve("node:path", None).unwrap().id(), "builtin:path");
}

#[test]
fn test_not_found_names_specifier_and_base() {
    let resolver = Resolver::new(project());
    let err = resolver.resolve("./nope", Some("/app/src/main.js")).unwrap_err();
    assert!(matches!(err, ModuleError::NotFound { .. }));
    assert_eq!(err.to_string(), "Cannot find module './nope' from '/app/src/main.js'");
    assert!(resolver.resolve("missing-pkg", None).is_err());
}
