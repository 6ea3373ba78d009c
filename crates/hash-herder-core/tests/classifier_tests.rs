use std::fs;
use std::path::Path;
use tempfile::tempdir;

use hash_herder_core::classifier::shard::shard_dir_name;
use hash_herder_core::storage::Database;
use hash_herder_core::{Classifier, ClassifyOptions, SilentReporter, TransferMode};

const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];

fn write_pdf(path: &Path, body: &str) {
    fs::write(path, format!("%PDF-1.4\n{}\n", body)).unwrap();
}

fn classifier(files_per_dir: usize) -> Classifier {
    Classifier::new(ClassifyOptions {
        files_per_dir,
        ..ClassifyOptions::default()
    })
    .unwrap()
}

fn files_in(dir: &Path) -> usize {
    match fs::read_dir(dir) {
        Ok(entries) => entries.flatten().filter(|e| e.path().is_file()).count(),
        Err(_) => 0,
    }
}

#[test]
fn test_shards_fill_to_capacity() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    for i in 0..5 {
        write_pdf(&src.join(format!("doc_{}.pdf", i)), &i.to_string());
    }

    let stats = classifier(2)
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    assert_eq!(stats.total_processed, 5);
    assert_eq!(stats.processed, 5);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.unknown_type, 0);
    assert_eq!(stats.per_category.get("document"), Some(&5));

    let documents = dest.join("document");
    assert_eq!(files_in(&documents.join(shard_dir_name(0))), 2);
    assert_eq!(files_in(&documents.join(shard_dir_name(1))), 2);
    assert_eq!(files_in(&documents.join(shard_dir_name(2))), 1);
    assert!(!documents.join(shard_dir_name(3)).exists());
    assert_eq!(files_in(&src), 0);
}

#[test]
fn test_second_run_continues_last_shard() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("dest");
    let first = tmp.path().join("first");
    let second = tmp.path().join("second");
    fs::create_dir_all(&first).unwrap();
    fs::create_dir_all(&second).unwrap();
    for i in 0..3 {
        write_pdf(&first.join(format!("a_{}.pdf", i)), &format!("a{}", i));
    }
    for i in 0..2 {
        write_pdf(&second.join(format!("b_{}.pdf", i)), &format!("b{}", i));
    }

    classifier(2)
        .classify(&[first.clone()], &dest, &SilentReporter)
        .unwrap();
    classifier(2)
        .classify(&[second.clone()], &dest, &SilentReporter)
        .unwrap();

    let documents = dest.join("document");
    assert_eq!(files_in(&documents.join("part_0000")), 2);
    assert_eq!(files_in(&documents.join("part_0001")), 2);
    assert_eq!(files_in(&documents.join("part_0002")), 1);
    assert!(documents.join("part_0001").join("b_0.pdf").exists());
    assert!(documents.join("part_0002").join("b_1.pdf").exists());
}

#[test]
fn test_thinned_lower_shard_counts_as_full() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_pdf(&src.join("new.pdf"), "new");

    // part_0000 lost a file since it was filled; part_0001 is half full.
    let documents = dest.join("document");
    fs::create_dir_all(documents.join("part_0000")).unwrap();
    fs::create_dir_all(documents.join("part_0001")).unwrap();
    write_pdf(&documents.join("part_0000").join("old_0.pdf"), "old0");
    write_pdf(&documents.join("part_0001").join("old_2.pdf"), "old2");

    classifier(2)
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    assert!(documents.join("part_0001").join("new.pdf").exists());
    assert_eq!(files_in(&documents.join("part_0000")), 1);
}

#[test]
fn test_categories_and_unknown_types() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("picture.bin"), PNG_HEADER).unwrap();
    write_pdf(&src.join("report.pdf"), "report");
    fs::write(src.join("notes.txt"), "just some words").unwrap();
    fs::write(src.join("blob.dat"), "key=value\n").unwrap();

    let stats = classifier(10)
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    assert_eq!(stats.processed, 4);
    assert_eq!(stats.unknown_type, 2);
    assert!(dest.join("image/part_0000/picture.bin").exists());
    assert!(dest.join("document/part_0000/report.pdf").exists());
    assert!(dest.join("other/part_0000/notes.txt").exists());
    assert!(dest.join("other/part_0000/blob.dat").exists());
    assert_eq!(stats.per_category.get("other"), Some(&2));
}

#[test]
fn test_name_collisions_are_renamed() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("dest");
    let left = tmp.path().join("left");
    let right = tmp.path().join("right");
    fs::create_dir_all(&left).unwrap();
    fs::create_dir_all(&right).unwrap();
    write_pdf(&left.join("scan.pdf"), "left");
    write_pdf(&right.join("scan.pdf"), "right");

    let stats = classifier(10)
        .classify(&[left.clone(), right.clone()], &dest, &SilentReporter)
        .unwrap();

    assert_eq!(stats.processed, 2);
    let shard = dest.join("document/part_0000");
    assert!(fs::read_to_string(shard.join("scan.pdf")).unwrap().contains("left"));
    assert!(fs::read_to_string(shard.join("scan_1.pdf")).unwrap().contains("right"));
}

#[test]
fn test_copy_mode_keeps_sources() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_pdf(&src.join("keep.pdf"), "keep");

    let mut classifier = Classifier::new(ClassifyOptions {
        transfer: TransferMode::Copy,
        ..ClassifyOptions::default()
    })
    .unwrap();
    classifier
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    assert!(src.join("keep.pdf").exists());
    assert!(dest.join("document/part_0000/keep.pdf").exists());
}

#[test]
fn test_count_store_seeds_and_records() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    let db_path = tmp.path().join("counts.db");
    fs::create_dir_all(&src).unwrap();
    fs::create_dir_all(&dest).unwrap();
    write_pdf(&src.join("next.pdf"), "next");

    let dest_key = dest.canonicalize().unwrap().to_string_lossy().into_owned();
    {
        let db = Database::open(&db_path).unwrap();
        db.set_category_count(&dest_key, "document", 4).unwrap();
    }

    let mut classifier = classifier(2).with_count_store(Database::open(&db_path).unwrap());
    classifier
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    // The stored count wins over the empty destination tree.
    assert!(dest.join("document/part_0002/next.pdf").exists());
    let db = Database::open(&db_path).unwrap();
    assert_eq!(db.get_category_count(&dest_key, "document").unwrap(), Some(5));
}

#[test]
fn test_interrupt_stops_between_files() {
    let tmp = tempdir().unwrap();
    let src = tmp.path().join("src");
    let dest = tmp.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    write_pdf(&src.join("one.pdf"), "1");

    let mut classifier = classifier(2);
    classifier.interrupt_handle().interrupt();
    let stats = classifier
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    assert!(stats.interrupted);
    assert_eq!(stats.total_processed, 0);
    assert!(src.join("one.pdf").exists());
}

#[test]
fn test_source_inside_destination() {
    let tmp = tempdir().unwrap();
    let dest = tmp.path().join("dest");
    let src = dest.join("incoming");
    fs::create_dir_all(&src).unwrap();
    for i in 0..3 {
        write_pdf(&src.join(format!("scan_{}.pdf", i)), &i.to_string());
    }

    let stats = classifier(10)
        .classify(&[src.clone()], &dest, &SilentReporter)
        .unwrap();

    assert_eq!(stats.total_processed, 3);
    assert_eq!(stats.processed, 3);
    assert_eq!(files_in(&dest.join("document").join(shard_dir_name(0))), 3);
    assert_eq!(files_in(&src), 0);
}
