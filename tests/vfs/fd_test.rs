/*!
 * Descriptor Tests
 * open flags, positional I/O and sparse growth
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use sandbox_kernel::core::errors::Errno;
use sandbox_kernel::core::limits::MAX_FILE_SIZE;
use sandbox_kernel::vfs::{MemFs, OpenFlags, Whence};

#[test]
fn test_descriptors_start_at_three() {
    let mut fs = MemFs::new();
    let a = fs.open("/a", OpenFlags::create()).unwrap();
    let b = fs.open("/b", OpenFlags::create()).unwrap();
    assert_eq!((a, b), (3, 4));
    fs.close(a).unwrap();
    assert_eq!(fs.close(a).unwrap_err().errno(), Errno::Badf);
}

#[test]
fn test_open_flag_errors() {
    let mut fs = MemFs::new();
    assert_eq!(
        fs.open("/missing", OpenFlags::read_only()).unwrap_err().errno(),
        Errno::Noent
    );

    fs.write_file("/exists", "x").unwrap();
    assert_eq!(
        fs.open("/exists", OpenFlags::create_new()).unwrap_err().errno(),
        Errno::Exist
    );

    fs.mkdir("/dir").unwrap();
    assert_eq!(
        fs.open("/dir", OpenFlags::write_only()).unwrap_err().errno(),
        Errno::Isdir
    );
}

#[test]
fn test_append_always_writes_at_end() {
    let mut fs = MemFs::new();
    fs.write_file("/log", "one\n").unwrap();
    let fd = fs.open("/log", OpenFlags::append_only()).unwrap();

    fs.fd_seek(fd, 0, Whence::Set).unwrap();
    fs.fd_write(fd, b"two\n").unwrap();
    fs.close(fd).unwrap();

    assert_eq!(fs.read_file("/log").unwrap(), "one\ntwo\n");
}

#[test]
fn test_read_stops_at_eof() {
    let mut fs = MemFs::new();
    fs.write_file("/f", "abcdef").unwrap();
    let fd = fs.open("/f", OpenFlags::read_only()).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(fs.fd_read(fd, &mut buf).unwrap(), 4);
    assert_eq!(&buf, b"abcd");
    assert_eq!(fs.fd_read(fd, &mut buf).unwrap(), 2);
    assert_eq!(fs.fd_read(fd, &mut buf).unwrap(), 0);
}

#[test]
fn test_unlinked_file_readable_through_open_fd() {
    let mut fs = MemFs::new();
    fs.write_file("/tmp", "still here").unwrap();
    let fd = fs.open("/tmp", OpenFlags::read_only()).unwrap();
    fs.unlink("/tmp").unwrap();
    assert!(!fs.exists("/tmp"));

    let mut buf = vec![0u8; 32];
    let n = fs.fd_read(fd, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"still here");
    fs.close(fd).unwrap();
}

#[test]
fn test_unknown_descriptor() {
    let mut fs = MemFs::new();
    let mut buf = [0u8; 1];
    assert_eq!(fs.fd_read(42, &mut buf).unwrap_err().errno(), Errno::Badf);
    assert_eq!(fs.fd_write(42, b"x").unwrap_err().errno(), Errno::Badf);
    assert_eq!(fs.fd_stat(42).unwrap_err().errno(), Errno::Badf);
}

#[test]
fn test_write_past_max_file_size() {
    let mut fs = MemFs::new();
    fs.write_file("/f", "abc").unwrap();
    let fd = fs.open("/f", OpenFlags::read_write()).unwrap();

    for offset in [i64::MAX, 1 << 40, MAX_FILE_SIZE as i64] {
        fs.fd_seek(fd, offset, Whence::Set).unwrap();
        let err = fs.fd_write(fd, b"x").unwrap_err();
        assert_eq!(err.errno(), Errno::Inval);
        assert!(err.to_string().starts_with("EINVAL"), "{err}");
    }
    assert_eq!(fs.stat("/f").unwrap().size, 3);

    fs.fd_seek(fd, 0, Whence::Set).unwrap();
    assert_eq!(fs.fd_write(fd, b"xyz").unwrap(), 3);
    fs.close(fd).unwrap();
    assert_eq!(fs.read_file("/f").unwrap(), "xyz");
}

#[test]
fn test_truncate_past_max_file_size() {
    let mut fs = MemFs::new();
    fs.write_file("/f", "abc").unwrap();

    assert_eq!(fs.truncate("/f", u64::MAX).unwrap_err().errno(), Errno::Inval);
    assert_eq!(fs.truncate("/f", MAX_FILE_SIZE + 1).unwrap_err().errno(), Errno::Inval);
    assert_eq!(fs.read_file("/f").unwrap(), "abc");

    fs.truncate("/f", 5).unwrap();
    assert_eq!(fs.read_file_bytes("/f").unwrap(), b"abc\0\0".to_vec());
}

proptest! {
    #[test]
    fn prop_sparse_write_zero_fills(offset in 0u64..4096, data in proptest::collection::vec(any::<u8>(), 1..64)) {
        let mut fs = MemFs::new();
        let fd = fs.open("/sparse", OpenFlags::create()).unwrap();
        fs.fd_seek(fd, offset as i64, Whence::Set).unwrap();
        fs.fd_write(fd, &data).unwrap();
        fs.close(fd).unwrap();

        let contents = fs.read_file_bytes("/sparse").unwrap();
        prop_assert_eq!(contents.len() as u64, offset + data.len() as u64);
        prop_assert!(contents[..offset as usize].iter().all(|b| *b == 0));
        prop_assert_eq!(&contents[offset as usize..], &data[..]);
    }
}
