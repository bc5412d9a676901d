use fti_core::{open_for_read, sync, ReadSession};
use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

fn canonical(path: &Path) -> String {
    fs::canonicalize(path).unwrap().to_string_lossy().into_owned()
}

fn search(reader: &ReadSession, query: &str) -> Vec<String> {
    reader.search(query, 0, 100).unwrap().ids().map(str::to_string).collect()
}

fn touch_later(path: &Path, secs: u64) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(secs)).unwrap();
}

#[test]
fn second_sync_skips_unchanged_files() {
    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "alpha").unwrap();
    fs::create_dir(src.path().join("nested")).unwrap();
    fs::write(src.path().join("nested/b.txt"), "beta").unwrap();

    let first = sync(src.path(), idx.path(), false).unwrap();
    assert_eq!((first.added, first.updated, first.skipped), (2, 0, 0));
    assert!(first.failures.is_empty());

    let second = sync(src.path(), idx.path(), false).unwrap();
    assert_eq!((second.added, second.updated, second.skipped), (0, 0, 2));
    assert_eq!(open_for_read(idx.path()).unwrap().doc_count(), 2);
}

#[test]
fn modified_files_are_reindexed() {
    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    let file = src.path().join("notes.txt");
    fs::write(&file, "original wording").unwrap();
    sync(src.path(), idx.path(), false).unwrap();
    let before = open_for_read(idx.path()).unwrap().get(&canonical(&file)).unwrap();

    fs::write(&file, "revised wording").unwrap();
    touch_later(&file, 60);
    let report = sync(src.path(), idx.path(), false).unwrap();
    assert_eq!((report.added, report.updated, report.skipped), (0, 1, 0));
    assert_eq!(report.changed(), 1);

    let reader = open_for_read(idx.path()).unwrap();
    assert_eq!(reader.doc_count(), 1);
    assert!(search(&reader, "original").is_empty());
    assert_eq!(search(&reader, "revised"), vec![canonical(&file)]);
    let after = reader.get(&canonical(&file)).unwrap();
    assert!(after.first_float("mtime").unwrap() > before.first_float("mtime").unwrap());
}

#[test]
fn stored_fields_describe_the_file() {
    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    let file = src.path().join("a.txt");
    fs::write(&file, "some content").unwrap();
    sync(src.path(), idx.path(), false).unwrap();

    let reader = open_for_read(idx.path()).unwrap();
    let stored = reader.get(&canonical(&file)).unwrap();
    assert_eq!(stored.first_text("path"), Some(canonical(&file).as_str()));
    assert!(stored.first_float("mtime").unwrap() > 0.0);
    assert!(stored.first_float("ctime").is_some());
    assert!(stored.values("content").is_empty());
    assert_eq!(search(&reader, &format!("path:{}", canonical(&file))), vec![canonical(&file)]);
}

#[test]
fn vcs_directories_are_skipped_unless_requested() {
    let src = tempfile::tempdir().unwrap();
    fs::create_dir_all(src.path().join(".git/objects")).unwrap();
    fs::write(src.path().join(".git/config"), "secretword").unwrap();
    fs::create_dir(src.path().join(".hg")).unwrap();
    fs::write(src.path().join(".hg/store"), "secretword").unwrap();
    fs::write(src.path().join("visible.txt"), "secretword").unwrap();

    let without = tempfile::tempdir().unwrap();
    let report = sync(src.path(), without.path(), false).unwrap();
    assert_eq!(report.added, 1);
    let reader = open_for_read(without.path()).unwrap();
    assert_eq!(search(&reader, "secretword"), vec![canonical(&src.path().join("visible.txt"))]);

    let with = tempfile::tempdir().unwrap();
    let report = sync(src.path(), with.path(), true).unwrap();
    assert_eq!(report.added, 3);
    assert_eq!(search(&open_for_read(with.path()).unwrap(), "secretword").len(), 3);
}

#[test]
fn index_inside_the_source_tree_is_not_indexed() {
    let src = tempfile::tempdir().unwrap();
    fs::write(src.path().join("doc.txt"), "generation schema").unwrap();
    let idx = src.path().join(".fti");

    let first = sync(src.path(), &idx, false).unwrap();
    assert_eq!(first.added, 1);
    let second = sync(src.path(), &idx, false).unwrap();
    assert_eq!((second.added, second.updated, second.skipped), (0, 0, 1));

    let reader = open_for_read(&idx).unwrap();
    assert_eq!(reader.doc_count(), 1);
    assert!(reader.get(&canonical(&idx.join("meta.json"))).unwrap_err().is_not_found());
    assert_eq!(search(&reader, "schema"), vec![canonical(&src.path().join("doc.txt"))]);
}

#[test]
fn content_is_stemmed_and_words_are_anded() {
    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    fs::write(src.path().join("one.txt"), "the dogs were running quickly").unwrap();
    fs::write(src.path().join("two.txt"), "a dog sleeps").unwrap();
    sync(src.path(), idx.path(), false).unwrap();

    let reader = open_for_read(idx.path()).unwrap();
    let one = canonical(&src.path().join("one.txt"));
    let two = canonical(&src.path().join("two.txt"));
    assert_eq!(search(&reader, "run"), vec![one.clone()]);
    assert_eq!(search(&reader, "dog running"), vec![one.clone()]);
    let mut dogs = search(&reader, "dog");
    dogs.sort();
    let mut expected = vec![one, two];
    expected.sort();
    assert_eq!(dogs, expected);
}

#[test]
fn invalid_utf8_is_decoded_lossily() {
    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    fs::write(src.path().join("bin.dat"), b"header \xff\xfe payload").unwrap();
    let report = sync(src.path(), idx.path(), false).unwrap();
    assert_eq!(report.added, 1);
    let reader = open_for_read(idx.path()).unwrap();
    assert_eq!(search(&reader, "payload").len(), 1);
}

#[cfg(unix)]
#[test]
fn symlinks_resolve_to_their_target() {
    use std::os::unix::fs::symlink;

    let src = tempfile::tempdir().unwrap();
    let outside = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    fs::write(src.path().join("real.txt"), "linked text").unwrap();
    symlink(src.path().join("real.txt"), src.path().join("alias.txt")).unwrap();
    fs::write(outside.path().join("hidden.txt"), "elsewhere").unwrap();
    symlink(outside.path(), src.path().join("dirlink")).unwrap();

    let report = sync(src.path(), idx.path(), false).unwrap();
    // both names share one canonical id
    assert_eq!((report.added, report.skipped), (1, 1));

    let reader = open_for_read(idx.path()).unwrap();
    assert_eq!(search(&reader, "linked"), vec![canonical(&src.path().join("real.txt"))]);
    assert!(search(&reader, "elsewhere").is_empty());
}

#[cfg(unix)]
#[test]
fn links_into_the_index_or_vcs_metadata_are_not_indexed() {
    use std::os::unix::fs::symlink;

    let src = tempfile::tempdir().unwrap();
    let idx = src.path().join(".fti");
    fs::write(src.path().join("doc.txt"), "plain text").unwrap();
    fs::create_dir(src.path().join(".git")).unwrap();
    fs::write(src.path().join(".git/config"), "secretword").unwrap();
    sync(src.path(), &idx, false).unwrap();

    symlink(idx.join("meta.json"), src.path().join("meta_link")).unwrap();
    symlink(src.path().join(".git/config"), src.path().join("cfg_link")).unwrap();

    let report = sync(src.path(), &idx, false).unwrap();
    assert_eq!((report.added, report.updated, report.skipped), (0, 0, 1));
    for _ in 0..2 {
        let again = sync(src.path(), &idx, false).unwrap();
        assert_eq!((again.added, again.updated, again.skipped), (0, 0, 1));
    }

    let reader = open_for_read(&idx).unwrap();
    assert_eq!(reader.doc_count(), 1);
    assert!(reader.get(&canonical(&idx.join("meta.json"))).unwrap_err().is_not_found());
    assert!(reader.get(&canonical(&src.path().join(".git/config"))).unwrap_err().is_not_found());
    assert!(search(&reader, "secretword").is_empty());
}

#[cfg(unix)]
#[test]
fn links_into_vcs_metadata_are_indexed_when_requested() {
    use std::os::unix::fs::symlink;

    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    fs::create_dir(src.path().join(".git")).unwrap();
    fs::write(src.path().join(".git/config"), "secretword").unwrap();
    symlink(src.path().join(".git/config"), src.path().join("cfg_link")).unwrap();

    let report = sync(src.path(), idx.path(), true).unwrap();
    assert_eq!((report.added, report.skipped), (1, 1));
    let reader = open_for_read(idx.path()).unwrap();
    assert_eq!(search(&reader, "secretword"), vec![canonical(&src.path().join(".git/config"))]);
}

#[cfg(unix)]
#[test]
fn unreadable_entries_are_reported_and_skipped() {
    use std::os::unix::fs::symlink;

    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    fs::write(src.path().join("ok.txt"), "fine").unwrap();
    let dangling = src.path().join("dangling");
    symlink(src.path().join("missing.txt"), &dangling).unwrap();

    let report = sync(src.path(), idx.path(), false).unwrap();
    assert_eq!(report.added, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].0, dangling);
    assert!(!report.failures[0].1.is_empty());

    let reader = open_for_read(idx.path()).unwrap();
    assert_eq!(search(&reader, "fine"), vec![canonical(&src.path().join("ok.txt"))]);
}

#[test]
fn older_disk_mtime_is_not_reindexed() {
    let src = tempfile::tempdir().unwrap();
    let idx = tempfile::tempdir().unwrap();
    let file = src.path().join("a.txt");
    fs::write(&file, "first").unwrap();
    sync(src.path(), idx.path(), false).unwrap();

    fs::write(&file, "second").unwrap();
    let file_handle = File::options().write(true).open(&file).unwrap();
    file_handle.set_modified(SystemTime::now() - Duration::from_secs(3600)).unwrap();
    drop(file_handle);

    let report = sync(src.path(), idx.path(), false).unwrap();
    assert_eq!((report.added, report.updated, report.skipped), (0, 0, 1));
    let reader = open_for_read(idx.path()).unwrap();
    assert_eq!(search(&reader, "first"), vec![canonical(&file)]);
    assert!(search(&reader, "second").is_empty());
}
