use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use ampetl::config::Layout;
use ampetl::stages::process;

fn gzip_bytes(payload: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    encoder.finish().unwrap()
}

/// Build an export-shaped zip: gzip payloads under `parts` land inside the
/// first entry of `partition_dirs`.
fn write_archive(path: &Path, partition_dirs: &[&str], parts: &[(&str, &[u8])]) {
    let file = File::create(path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();

    for dir in partition_dirs {
        writer.add_directory(format!("{dir}/"), options).unwrap();
    }
    for (name, payload) in parts {
        writer
            .start_file(format!("{}/{}", partition_dirs[0], name), options)
            .unwrap();
        writer.write_all(&gzip_bytes(payload)).unwrap();
    }

    writer.finish().unwrap();
}

fn test_layout() -> (TempDir, Layout) {
    let root = TempDir::new().unwrap();
    let layout = Layout::rooted_at(root.path());
    layout.ensure().unwrap();
    (root, layout)
}

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_str().unwrap().to_string())
        .collect();
    names.sort();
    names
}

#[test]
fn processes_archive_into_flattened_output() {
    let (_root, layout) = test_layout();
    let part1 = b"{\"event_type\":\"session_start\"}\n" as &[u8];
    let part2 = b"{\"event_type\":\"session_end\"}\n" as &[u8];

    write_archive(
        &layout.drop_dir.join("amplitude_data_20240101.zip"),
        &["12345"],
        &[("part1.gz", part1), ("part2.gz", part2)],
    );

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.output_dir), ["20240101_part1", "20240101_part2"]);
    // Round-trip fidelity: output bytes match the payload that was gzipped.
    assert_eq!(fs::read(layout.output_dir.join("20240101_part1")).unwrap(), part1);
    assert_eq!(fs::read(layout.output_dir.join("20240101_part2")).unwrap(), part2);

    // The zip moved from the drop directory into the archive directory.
    assert_eq!(dir_names(&layout.drop_dir), Vec::<String>::new());
    assert_eq!(dir_names(&layout.zip_archive_dir), ["amplitude_data_20240101.zip"]);
}

#[test]
fn rerun_after_success_is_a_no_op() {
    let (_root, layout) = test_layout();
    write_archive(
        &layout.drop_dir.join("amplitude_data_20240101.zip"),
        &["12345"],
        &[("part1.gz", b"{}\n")],
    );

    process::run(&layout).unwrap();
    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.output_dir), ["20240101_part1"]);
    assert_eq!(dir_names(&layout.zip_archive_dir), ["amplitude_data_20240101.zip"]);
}

#[test]
fn archive_without_partition_folder_stays_in_drop_dir() {
    let (_root, layout) = test_layout();

    // Payload at the archive root, no nested folder at all.
    let path = layout.drop_dir.join("amplitude_data_20240102.zip");
    let file = File::create(&path).unwrap();
    let mut writer = ZipWriter::new(file);
    writer
        .start_file("part1.gz", SimpleFileOptions::default())
        .unwrap();
    writer.write_all(&gzip_bytes(b"{}\n")).unwrap();
    writer.finish().unwrap();

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.drop_dir), ["amplitude_data_20240102.zip"]);
    assert_eq!(dir_names(&layout.output_dir), Vec::<String>::new());
    assert_eq!(dir_names(&layout.zip_archive_dir), Vec::<String>::new());
}

#[test]
fn archive_with_two_partition_folders_stays_in_drop_dir() {
    let (_root, layout) = test_layout();
    write_archive(
        &layout.drop_dir.join("amplitude_data_20240103.zip"),
        &["111", "222"],
        &[("part1.gz", b"{}\n")],
    );

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.drop_dir), ["amplitude_data_20240103.zip"]);
    assert_eq!(dir_names(&layout.output_dir), Vec::<String>::new());
}

#[test]
fn bad_archive_does_not_block_valid_one() {
    let (_root, layout) = test_layout();

    // Not a zip at all.
    fs::write(layout.drop_dir.join("amplitude_data_20240104.zip"), b"garbage").unwrap();
    write_archive(
        &layout.drop_dir.join("amplitude_data_20240105.zip"),
        &["12345"],
        &[("part1.gz", b"{\"a\":1}\n")],
    );

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.drop_dir), ["amplitude_data_20240104.zip"]);
    assert_eq!(dir_names(&layout.zip_archive_dir), ["amplitude_data_20240105.zip"]);
    assert_eq!(dir_names(&layout.output_dir), ["20240105_part1"]);
}

#[test]
fn temp_workspaces_never_survive_a_run() {
    let (_root, layout) = test_layout();

    // One valid and one malformed archive: cleanup must happen on both the
    // success and failure paths.
    write_archive(
        &layout.drop_dir.join("amplitude_data_20240106.zip"),
        &["12345"],
        &[("part1.gz", b"{}\n")],
    );
    write_archive(
        &layout.drop_dir.join("amplitude_data_20240107.zip"),
        &["111", "222"],
        &[("part1.gz", b"{}\n")],
    );

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.work_dir), Vec::<String>::new());
}

#[test]
fn nested_payloads_inside_partition_folder_are_found() {
    let (_root, layout) = test_layout();

    // Payloads can sit in subfolders of the partition folder; the walk is
    // recursive and the output stays flat.
    let path = layout.drop_dir.join("amplitude_data_20240108.zip");
    let file = File::create(&path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    writer.add_directory("12345/", options).unwrap();
    writer.add_directory("12345/hourly/", options).unwrap();
    writer.start_file("12345/hourly/part1.gz", options).unwrap();
    writer.write_all(&gzip_bytes(b"{}\n")).unwrap();
    writer.finish().unwrap();

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.output_dir), ["20240108_part1"]);
}

#[test]
fn non_gzip_members_are_skipped() {
    let (_root, layout) = test_layout();

    let path = layout.drop_dir.join("amplitude_data_20240109.zip");
    let file = File::create(&path).unwrap();
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    writer.add_directory("12345/", options).unwrap();
    writer.start_file("12345/part1.gz", options).unwrap();
    writer.write_all(&gzip_bytes(b"{}\n")).unwrap();
    writer.start_file("12345/readme.txt", options).unwrap();
    writer.write_all(b"not an event payload").unwrap();
    writer.finish().unwrap();

    process::run(&layout).unwrap();

    assert_eq!(dir_names(&layout.output_dir), ["20240109_part1"]);
    assert_eq!(dir_names(&layout.zip_archive_dir), ["amplitude_data_20240109.zip"]);
}

#[test]
fn empty_drop_dir_is_a_no_op() {
    let (_root, layout) = test_layout();
    process::run(&layout).unwrap();
    assert_eq!(dir_names(&layout.output_dir), Vec::<String>::new());
}
