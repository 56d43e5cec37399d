/*!
 * MemFs Tests
 * Path resolution, directory and file operations
 */

use pretty_assertions::assert_eq;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::vfs::{FileType, FsEvent, MemFs, VfsError};

#[test]
fn test_write_read_and_overwrite() {
    let mut fs = MemFs::new();
    fs.write_file("/hello.txt", "hello").unwrap();
    let first = fs.stat("/hello.txt").unwrap();

    fs.write_file("/hello.txt", "hi").unwrap();
    let second = fs.stat("/hello.txt").unwrap();

    assert_eq!(fs.read_file("/hello.txt").unwrap(), "hi");
    assert_eq!(second.size, 2);
    assert_eq!(first.ino, second.ino);
    assert!(second.mtime_ms >= first.mtime_ms);
}

#[test]
fn test_dotdot_never_climbs_above_root() {
    let mut fs = MemFs::new();
    fs.mkdirp("/a/b").unwrap();
    fs.write_file("/a/b/file", "x").unwrap();

    assert_eq!(fs.read_file("/../../a/./b//file").unwrap(), "x");
    assert!(fs.exists("/a/b/../b/file"));
    assert!(fs.stat("/..").unwrap().is_dir());
}

#[test]
fn test_mkdir_errors() {
    let mut fs = MemFs::new();
    let err = fs.mkdir("/missing/child").unwrap_err();
    assert_eq!(err.errno(), Errno::Noent);

    fs.mkdir("/dir").unwrap();
    assert_eq!(fs.mkdir("/dir").unwrap_err().errno(), Errno::Exist);

    fs.write_file("/file", "").unwrap();
    assert_eq!(fs.mkdir("/file/sub").unwrap_err().errno(), Errno::Notdir);
    assert_eq!(fs.mkdirp("/file/sub").unwrap_err().errno(), Errno::Notdir);
}

#[test]
fn test_write_file_errors() {
    let mut fs = MemFs::new();
    assert_eq!(fs.write_file("/nope/a", "x").unwrap_err().errno(), Errno::Noent);
    fs.mkdir("/d").unwrap();
    assert_eq!(fs.write_file("/d", "x").unwrap_err().errno(), Errno::Isdir);
}

#[test]
fn test_unlink_and_rmdir() {
    let mut fs = MemFs::new();
    fs.mkdirp("/d/e").unwrap();
    fs.write_file("/d/f", "x").unwrap();

    assert_eq!(fs.unlink("/d").unwrap_err().errno(), Errno::Isdir);
    assert_eq!(fs.rmdir("/d").unwrap_err().errno(), Errno::Notempty);
    assert_eq!(fs.rmdir("/d/f").unwrap_err().errno(), Errno::Notdir);
    assert_eq!(fs.rmdir("/").unwrap_err().errno(), Errno::Inval);

    fs.unlink("/d/f").unwrap();
    fs.rmdir("/d/e").unwrap();
    fs.rmdir("/d").unwrap();
    assert!(!fs.exists("/d"));
}

#[test]
fn test_readdir_sorted_with_types() {
    let mut fs = MemFs::new();
    fs.mkdir("/src").unwrap();
    fs.write_file("/b.txt", "").unwrap();
    fs.write_file("/a.txt", "").unwrap();

    assert_eq!(fs.readdir("/").unwrap(), vec!["a.txt", "b.txt", "src"]);
    let entries = fs.readdir_entries("/").unwrap();
    assert_eq!(entries[2].file_type, FileType::Directory);
    assert_eq!(fs.readdir("/a.txt").unwrap_err().errno(), Errno::Notdir);
}

#[test]
fn test_rename_moves_trees() {
    let mut fs = MemFs::new();
    fs.mkdirp("/app/lib").unwrap();
    fs.write_file("/app/lib/x.js", "x").unwrap();
    fs.write_file("/target", "old").unwrap();

    fs.rename("/app", "/moved").unwrap();
    assert_eq!(fs.read_file("/moved/lib/x.js").unwrap(), "x");
    assert!(!fs.exists("/app"));

    fs.rename("/moved/lib/x.js", "/target").unwrap();
    assert_eq!(fs.read_file("/target").unwrap(), "x");

    assert_eq!(
        fs.rename("/moved", "/moved/lib/inner").unwrap_err().errno(),
        Errno::Inval
    );
}

#[test]
fn test_symlinks_resolve_and_loop_is_rejected() {
    let mut fs = MemFs::new();
    fs.mkdir("/real").unwrap();
    fs.write_file("/real/file", "data").unwrap();
    fs.symlink("/real", "/link").unwrap();

    assert_eq!(fs.read_file("/link/file").unwrap(), "data");
    assert_eq!(fs.readlink("/link").unwrap(), "/real");
    assert!(fs.lstat("/link").unwrap().is_symlink());

    fs.symlink("/loop-b", "/loop-a").unwrap();
    fs.symlink("/loop-a", "/loop-b").unwrap();
    assert!(matches!(
        fs.read_file("/loop-a"),
        Err(VfsError::InvalidArgument { .. })
    ));
}

#[test]
fn test_error_display_leads_with_code() {
    let mut fs = MemFs::new();
    let message = fs.read_file("/missing").unwrap_err().to_string();
    assert!(message.starts_with("ENOENT:"), "{message}");
    assert!(message.contains("'/missing'"), "{message}");
}

#[test]
fn test_observer_sees_changes() {
    let (tx, rx) = flume::unbounded();
    let mut fs = MemFs::new();
    fs.set_observer(tx);

    fs.write_file("/a", "1").unwrap();
    fs.write_file("/a", "2").unwrap();
    fs.rename("/a", "/b").unwrap();
    fs.unlink("/b").unwrap();

    let events: Vec<FsEvent> = rx.try_iter().collect();
    assert_eq!(
        events,
        vec![
            FsEvent::Create { path: "/a".into() },
            FsEvent::Move {
                from: "/a".into(),
                to: "/b".into()
            },
            FsEvent::Delete { path: "/b".into() },
        ]
    );
}
