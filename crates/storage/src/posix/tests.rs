//! Posix driver tests on real temp directories.

use std::os::unix::fs::PermissionsExt;

use types::{Buffer, ErrorKind, Result, StringId, Variant};
use vault_io::{Filter, StreamFilter};

use crate::options::{
    ListOptions, PathCreateOptions, PathRemoveOptions, ReadOptions, RemoveOptions, WriteOptions,
};
use crate::storage::Storage;
use crate::{InfoKind, StorageOptions};

fn writable(base: &tempfile::TempDir) -> Storage {
    super::storage(
        base.path().to_string_lossy().into_owned(),
        StorageOptions::new().write(true),
    )
    .expect("storage")
}

#[test]
fn put_get_round_trip_with_default_mode() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    storage
        .put("file.txt", b"a test file", WriteOptions::new())
        .expect("put");

    let content = storage
        .get("file.txt", ReadOptions::new())
        .expect("get")
        .expect("found");
    assert_eq!(content, b"a test file");

    let mode = std::fs::metadata(base.path().join("file.txt"))
        .expect("metadata")
        .permissions()
        .mode()
        & 0o7777;
    assert_eq!(mode, 0o640);
}

#[test]
fn missing_file_read_behaviors() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    let error = storage
        .get("absent.txt", ReadOptions::new())
        .expect_err("missing");
    assert_eq!(error.kind(), ErrorKind::FileMissing);
    assert!(error.message().ends_with("No such file or directory"));

    let missing = storage
        .get("absent.txt", ReadOptions::new().ignore_missing(true))
        .expect("get");
    assert!(missing.is_none());
}

#[test]
fn atomic_write_creates_parents_and_leaves_no_temp() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    let mut write = storage
        .new_write("deep/nested/file.bin", WriteOptions::new())
        .expect("new write");
    write.open().expect("open");
    write.write(&Buffer::from_slice(&[7u8; 100_000])).expect("write");

    // Nothing visible at the target before close
    assert!(!base.path().join("deep/nested/file.bin").exists());

    write.close().expect("close");

    assert_eq!(
        std::fs::read(base.path().join("deep/nested/file.bin")).expect("read").len(),
        100_000
    );

    // The staging file is gone
    let leftovers: Vec<_> = std::fs::read_dir(base.path().join("deep/nested"))
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

/// Filter that fails after passing a fixed number of bytes, to drive the
/// error-mid-write path.
struct TripwireFilter {
    budget: usize,
    passed: usize,
    done: bool,
}

impl StreamFilter for TripwireFilter {
    fn kind(&self) -> StringId {
        StringId::pack(types::StringIdBits::Bit5, "tripwire")
    }

    fn process(&mut self, input: Option<&Buffer>, out: &mut Buffer) -> Result<()> {
        match input {
            Some(input) => {
                if self.passed + input.used() > self.budget {
                    return Err(types::Error::new(ErrorKind::FileWrite, "simulated write failure"));
                }

                self.passed += input.used();
                out.append(input.bytes());
                Ok(())
            }
            None => {
                self.done = true;
                Ok(())
            }
        }
    }

    fn done(&self) -> bool {
        self.done
    }

    fn input_same(&self) -> bool {
        false
    }

    fn result(&self) -> Option<Variant> {
        None
    }
}

#[test]
fn failed_write_discards_temp_and_preserves_target() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    // Pre-existing content must survive a failed overwrite
    storage
        .put("data.bin", b"previous content", WriteOptions::new())
        .expect("put");

    {
        let mut write = storage
            .new_write("data.bin", WriteOptions::new())
            .expect("new write");
        write
            .filter_group_mut()
            .push(Filter::stream(TripwireFilter {
                budget: 600 * 1024,
                passed: 0,
                done: false,
            }))
            .expect("push");

        write.open().expect("open");

        let block = Buffer::from_slice(&[0u8; 512 * 1024]);
        write.write(&block).expect("first write fits");

        let error = write.write(&block).expect_err("second write trips");
        assert_eq!(error.kind(), ErrorKind::FileWrite);
        // Dropped without close
    }

    // Target unchanged, no temp debris
    assert_eq!(
        std::fs::read(base.path().join("data.bin")).expect("read"),
        b"previous content"
    );

    let leftovers: Vec<_> = std::fs::read_dir(base.path())
        .expect("read dir")
        .map(|entry| entry.expect("entry").file_name().to_string_lossy().into_owned())
        .filter(|name| name.contains(".tmp"))
        .collect();
    assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
}

#[test]
fn create_path_disabled_makes_missing_parent_an_error() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    let mut write = storage
        .new_write("no/such/parent.txt", WriteOptions::new().create_path(false))
        .expect("new write");

    let error = write.open().expect_err("missing parent");
    assert_eq!(error.kind(), ErrorKind::FileOpen);
}

#[test]
fn non_atomic_write_goes_straight_to_the_target() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    let mut write = storage
        .new_write("direct.txt", WriteOptions::new().atomic(false).sync_path(false))
        .expect("new write");
    write.open().expect("open");

    // Visible immediately under the real name
    assert!(base.path().join("direct.txt").exists());

    write.write(&Buffer::from_slice(b"direct")).expect("write");
    write.close().expect("close");

    assert_eq!(std::fs::read(base.path().join("direct.txt")).expect("read"), b"direct");
}

#[test]
fn info_and_listing_report_kinds_and_metadata() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    storage.put("file.txt", b"0123456789", WriteOptions::new()).expect("put");
    storage.path_create("subdir", PathCreateOptions::new()).expect("mkdir");
    std::os::unix::fs::symlink("file.txt", base.path().join("link")).expect("symlink");

    let info = storage
        .info("file.txt", ReadOptions::new())
        .expect("info")
        .expect("present");
    assert_eq!(info.kind, InfoKind::File);
    assert_eq!(info.size, 10);
    assert_eq!(info.mode, 0o640);
    assert!(info.mtime > 0);
    assert!(info.user.is_some());

    let names = storage.list("", ListOptions::new()).expect("list");
    assert_eq!(names, vec!["file.txt", "link", "subdir"]);

    let mut kinds = Vec::new();
    storage
        .info_list("", ListOptions::new(), &mut |entry| {
            kinds.push((entry.name.clone(), entry.kind, entry.link_target.clone()));
            Ok(())
        })
        .expect("info list");

    assert!(kinds.contains(&("subdir".to_string(), InfoKind::Path, None)));
    assert!(kinds.contains(&("link".to_string(), InfoKind::Link, Some("file.txt".to_string()))));
}

#[test]
fn list_missing_path_behaviors() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    let names = storage.list("nowhere", ListOptions::new()).expect("list");
    assert!(names.is_empty());

    let error = storage
        .list("nowhere", ListOptions::new().error_on_missing(true))
        .expect_err("missing path");
    assert_eq!(error.kind(), ErrorKind::PathMissing);
}

#[test]
fn path_create_and_remove() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    storage.path_create("a/b/c", PathCreateOptions::new()).expect("create");
    assert!(base.path().join("a/b/c").is_dir());

    // Recreating is fine unless told otherwise
    storage.path_create("a/b/c", PathCreateOptions::new()).expect("recreate");
    let error = storage
        .path_create("a/b/c", PathCreateOptions::new().error_on_exists(true))
        .expect_err("exists");
    assert_eq!(error.kind(), ErrorKind::PathCreate);

    let error = storage
        .path_create("x/y/z", PathCreateOptions::new().no_parent_create(true))
        .expect_err("missing parent");
    assert_eq!(error.kind(), ErrorKind::PathCreate);

    storage.put("a/b/c/f.txt", b"x", WriteOptions::new()).expect("put");

    // Non-recursive remove refuses a non-empty path
    let error = storage
        .path_remove("a/b/c", PathRemoveOptions::new())
        .expect_err("not empty");
    assert_eq!(error.kind(), ErrorKind::PathRemove);

    storage
        .path_remove("a", PathRemoveOptions::new().recurse(true))
        .expect("recursive remove");
    assert!(!base.path().join("a").exists());
}

#[test]
fn move_and_remove() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    storage.put("from.txt", b"move me", WriteOptions::new()).expect("put");
    storage.path_create("dest", PathCreateOptions::new()).expect("mkdir");

    storage.move_file("from.txt", "dest/to.txt").expect("move");
    assert!(!base.path().join("from.txt").exists());
    assert_eq!(
        std::fs::read(base.path().join("dest/to.txt")).expect("read"),
        b"move me"
    );

    storage
        .remove("dest/to.txt", RemoveOptions::new().error_on_missing(true))
        .expect("remove");

    // Removing again is fine without the error flag
    storage.remove("dest/to.txt", RemoveOptions::new()).expect("remove again");

    let error = storage
        .remove("dest/to.txt", RemoveOptions::new().error_on_missing(true))
        .expect_err("missing");
    assert_eq!(error.kind(), ErrorKind::FileMissing);
}

#[test]
fn path_sync_succeeds_on_real_paths() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = writable(&base);

    storage.path_create("synced", PathCreateOptions::new()).expect("mkdir");
    storage.path_sync("synced").expect("sync");

    let error = storage.path_sync("missing").expect_err("missing path");
    assert_eq!(error.kind(), ErrorKind::PathMissing);
}
