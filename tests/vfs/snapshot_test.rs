/*!
 * Snapshot Tests
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sandbox_kernel::vfs::{MemFs, VfsSnapshot};

fn path_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z]{1,6}", 1..4).prop_map(|parts| format!("/{}", parts.join("/")))
}

#[test]
fn test_snapshot_json_shape() {
    let snapshot = VfsSnapshot::from_files([("/a.txt", "hi")]);
    let json = serde_json::to_value(&snapshot).unwrap();
    assert_eq!(json["encoding"], "base64");
    assert_eq!(json["files"]["/a.txt"], "aGk=");
}

proptest! {
    #[test]
    fn prop_snapshot_restore_round_trip(
        files in proptest::collection::btree_map(path_strategy(), proptest::collection::vec(any::<u8>(), 0..128), 1..8)
    ) {
        let mut source = MemFs::new();
        let mut written = Vec::new();
        for (path, data) in &files {
            // A prefix of another path may already be a directory
            if let Some(parent) = path.rsplit_once('/').map(|(p, _)| p).filter(|p| !p.is_empty()) {
                if source.mkdirp(parent).is_err() {
                    continue;
                }
            }
            if source.write_file(path, data.clone()).is_ok() {
                written.push(path.clone());
            }
        }

        let snapshot = source.snapshot();
        let mut restored = MemFs::from_snapshot(&snapshot).unwrap();
        for path in &written {
            prop_assert_eq!(restored.read_file_bytes(path).unwrap(), source.read_file_bytes(path).unwrap());
        }
        prop_assert_eq!(restored.snapshot(), snapshot);
    }
}
