/*!
 * VFS Path Handling
 *
 * Paths are `/`-delimited and walked from the single root. `.` and empty
 * segments are skipped. `..` is flattened to a no-op rather than climbing
 * to the parent: a guest can never name anything outside the subtree it
 * walks through, and `/../../etc` is just `/etc` inside the sandbox.
 */

/// Iterate the effective segments of a path
pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
}

/// Canonical absolute form of a path
pub fn normalize(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    for segment in segments(path) {
        out.push('/');
        out.push_str(segment);
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Split a path into its normalized parent and final segment
///
/// Returns `None` for the root, which has no name.
pub fn split_parent(path: &str) -> Option<(String, String)> {
    let parts: Vec<&str> = segments(path).collect();
    let (name, parent) = parts.split_last()?;
    let parent = if parent.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", parent.join("/"))
    };
    Some((parent, (*name).to_string()))
}

/// Join a child name onto a normalized directory path
pub fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// True when `path` is `ancestor` itself or lies underneath it
pub fn is_within(path: &str, ancestor: &str) -> bool {
    let path = normalize(path);
    let ancestor = normalize(ancestor);
    ancestor == "/" || path == ancestor || path.starts_with(&format!("{ancestor}/"))
}
