//! Directory listings, stat and whole-archive extraction through `ArchiveFs`.

mod common;

use std::fs;
use std::io::Read;

use common::{DOS_DATE, DOS_TIME, ZipBuilder, about_text};
use tempfile::TempDir;
use zipfs::vfs::ChildKind;
use zipfs::zip::{CompressionMethod, ExtractOptions, Overwrite};
use zipfs::{ArchiveFs, ArchiveUrl, Error};

fn nested_archive() -> (TempDir, ArchiveUrl) {
    let dir = tempfile::tempdir().unwrap();
    let path = ZipBuilder::new()
        .stored("a/b.txt", b"bee")
        .deflated("a/c/d.txt", &about_text())
        .stored("e.txt", b"eee")
        .directory("docs/")
        .stored("__MACOSX/a/._b.txt", b"resource fork")
        .write_to(dir.path(), "nested.zip");
    (dir, ArchiveUrl::new(path))
}

fn summary(items: &[zipfs::ListingItem]) -> Vec<(&str, bool)> {
    items.iter().map(|i| (i.label.as_str(), i.is_dir)).collect()
}

#[test]
fn root_and_sub_directory_levels() {
    let (_dir, root) = nested_archive();
    let fs = ArchiveFs::local();

    let top = fs.list_dir(&root).unwrap();
    assert_eq!(summary(&top), [("a", true), ("e.txt", false), ("docs", true)]);

    let a = fs.list_dir(&root.join("a")).unwrap();
    assert_eq!(summary(&a), [("b.txt", false), ("c", true)]);
    assert_eq!(a[0].url, root.join("a").join("b.txt"));
    assert_eq!(a[0].size, 3);
    assert_eq!(a[0].method, Some(CompressionMethod::Stored));
    assert_eq!(a[0].dos_time, Some((DOS_DATE, DOS_TIME)));

    let c = fs.list_dir(&root.join("a/c")).unwrap();
    assert_eq!(summary(&c), [("d.txt", false)]);
    assert_eq!(c[0].size, 1616);
    assert_eq!(c[0].method, Some(CompressionMethod::Deflate));
    assert!(c[0].compressed_size < 1616);

    assert!(fs.list_dir(&root.join("docs")).unwrap().is_empty());
}

#[test]
fn child_urls_carry_container_and_options() {
    let (_dir, root) = nested_archive();
    let fs = ArchiveFs::local();
    let dir = root.join("a").with_options("cache=no&x=1");

    for item in fs.list_dir(&dir).unwrap() {
        assert_eq!(item.url.container(), root.container());
        assert_eq!(item.url.options(), "cache=no&x=1");
        assert!(item.url.to_string().ends_with("?cache=no&x=1"));
    }
}

#[test]
fn custom_conversion_sees_entries() {
    let (_dir, root) = nested_archive();
    let fs = ArchiveFs::local();
    let labels = fs
        .list_dir_with(&root.join("a"), |child| match child.kind {
            ChildKind::Directory => format!("{}/", child.name),
            ChildKind::File(entry) => format!("{} ({})", child.name, entry.crc32 != 0),
        })
        .unwrap();
    assert_eq!(labels, ["b.txt (true)", "c/"]);
}

#[test]
fn listing_a_file_or_missing_path_fails() {
    let (_dir, root) = nested_archive();
    let fs = ArchiveFs::local();
    assert!(matches!(fs.list_dir(&root.join("e.txt")), Err(Error::NotFound { .. })));
    assert!(matches!(fs.list_dir(&root.join("zzz")), Err(Error::NotFound { .. })));
    assert!(matches!(
        fs.list_dir(&root.join("a/../..")),
        Err(Error::PathTraversal { .. })
    ));
}

#[test]
fn stat_and_exists() {
    let (dir, root) = nested_archive();
    let fs = ArchiveFs::local();

    let stat = fs.stat(&root).unwrap();
    assert!(stat.is_dir);

    let implicit = fs.stat(&root.join("a/c")).unwrap();
    assert!(implicit.is_dir);
    assert_eq!(implicit.dos_time, None);

    let explicit = fs.stat(&root.join("docs")).unwrap();
    assert!(explicit.is_dir);
    assert_eq!(explicit.dos_time, Some((DOS_DATE, DOS_TIME)));

    let file = fs.stat(&root.join("a/c/d.txt")).unwrap();
    assert!(!file.is_dir);
    assert_eq!(file.size, 1616);
    assert_eq!(file.crc32, Some(crc32fast::hash(&about_text())));

    assert!(fs.exists(&root.join("e.txt")));
    assert!(fs.exists(&root.join("a")));
    assert!(!fs.exists(&root.join("a/b")));
    assert!(!fs.exists(&ArchiveUrl::new(dir.path().join("missing.zip"))));
}

#[test]
fn invalidate_picks_up_rewritten_container() {
    let (dir, root) = nested_archive();
    let fs = ArchiveFs::local();
    assert!(fs.exists(&root.join("e.txt")));

    ZipBuilder::new()
        .stored("only.txt", b"1")
        .write_to(dir.path(), "nested.zip");
    assert!(fs.invalidate(root.container()));
    assert!(!fs.exists(&root.join("e.txt")));
    assert!(fs.exists(&root.join("only.txt")));
}

#[test]
fn extract_archive_writes_verified_files() {
    let (_dir, root) = nested_archive();
    let out = tempfile::tempdir().unwrap();
    let extractor = ArchiveFs::local().extractor();

    let summary = extractor
        .extract_archive(root.container(), out.path(), &ExtractOptions::default(), |_| true)
        .unwrap();
    assert_eq!(summary.extracted, 4);
    assert_eq!(summary.skipped, 0);
    assert_eq!(fs::read(out.path().join("a/b.txt")).unwrap(), b"bee");
    assert_eq!(fs::read(out.path().join("a/c/d.txt")).unwrap(), about_text());
    assert!(out.path().join("docs").is_dir());

    // Existing files are skipped unless overwriting
    fs::write(out.path().join("e.txt"), b"local edit").unwrap();
    let summary = extractor
        .extract_archive(root.container(), out.path(), &ExtractOptions::default(), |e| {
            e.file_name == "e.txt"
        })
        .unwrap();
    assert_eq!((summary.extracted, summary.skipped), (0, 1));
    assert_eq!(fs::read(out.path().join("e.txt")).unwrap(), b"local edit");

    let options = ExtractOptions {
        junk_paths: false,
        overwrite: Overwrite::Always,
    };
    extractor
        .extract_archive(root.container(), out.path(), &options, |e| e.file_name == "e.txt")
        .unwrap();
    assert_eq!(fs::read(out.path().join("e.txt")).unwrap(), b"eee");
}

#[test]
fn extract_archive_junk_paths() {
    let (_dir, root) = nested_archive();
    let out = tempfile::tempdir().unwrap();
    let options = ExtractOptions {
        junk_paths: true,
        overwrite: Overwrite::Skip,
    };
    ArchiveFs::local()
        .extractor()
        .extract_archive(root.container(), out.path(), &options, |e| e.file_name.ends_with(".txt"))
        .unwrap();

    assert!(out.path().join("b.txt").is_file());
    assert!(out.path().join("d.txt").is_file());
    assert!(!out.path().join("a").exists());
    assert!(!out.path().join("docs").exists());
}

/// Every file reachable by walking the listing can be stat'd and opened
fn walk(fs: &ArchiveFs, dir: &ArchiveUrl, files: &mut Vec<String>) {
    for item in fs.list_dir(dir).unwrap() {
        assert_ne!(item.url, *dir, "child {} loops back to its parent", item.label);
        if item.is_dir {
            walk(fs, &item.url, files);
            continue;
        }
        assert_eq!(fs.stat(&item.url).unwrap().size, item.size);
        let mut data = Vec::new();
        fs.open(&item.url).unwrap().read_to_end(&mut data).unwrap();
        assert_eq!(data.len() as u64, item.size);
        files.push(item.url.inner().to_string());
    }
}

#[test]
fn redundant_segments_resolve_to_reachable_children() {
    let dir = tempfile::tempdir().unwrap();
    let path = ZipBuilder::new()
        .stored("dir//file.txt", b"double")
        .stored("./dot.txt", b"dot")
        .stored("x/./y.txt", b"why")
        .directory("./")
        .write_to(dir.path(), "segments.zip");
    let root = ArchiveUrl::new(path);
    let fs = ArchiveFs::local();

    let top = fs.list_dir(&root).unwrap();
    assert_eq!(summary(&top), [("dir", true), ("dot.txt", false), ("x", true)]);

    let mut files = Vec::new();
    walk(&fs, &root, &mut files);
    assert_eq!(files, ["dir/file.txt", "dot.txt", "x/y.txt"]);
}
