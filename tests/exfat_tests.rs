mod common;

use common::*;
use exhume::application::dto::ScanOptions;
use exhume::application::{RecoverFilesUseCase, ScanVolumeUseCase};
use exhume::domain::entities::{DeletedEntry, FileLocation, FilesystemType};
use exhume::infrastructure::file_systems::detect_filesystem;
use std::sync::atomic::AtomicBool;

const FAT_END: u32 = 0xFFFF_FFFF;

fn scan(image: &ExFatImage) -> Vec<DeletedEntry> {
    let (_tmp, mut device) = open_image(&image.bytes);
    assert_eq!(detect_filesystem(&device), FilesystemType::ExFat);

    let mut results = Vec::new();
    let cancel = AtomicBool::new(false);
    {
        let mut on_found = |entry: DeletedEntry| results.push(entry);
        let mut on_progress = |_: &str, _: f32| {};
        ScanVolumeUseCase::new().execute(
            &mut device,
            FilesystemType::ExFat,
            &ScanOptions::new(),
            &mut on_found,
            &mut on_progress,
            &cancel,
        );
    }
    results
}

#[test]
fn deleted_file_round_trip() {
    let payload: Vec<u8> = (0..100u32).map(|i| (i * 3 % 251) as u8).collect();

    // Heap at sector 64 (cluster base 8); root directory in cluster 4.
    let mut image = ExFatImage::new(512 * 1024, 64);
    image.set_fat(EXFAT_ROOT_CLUSTER, FAT_END);
    let dir = exfat_entry_set("note.txt", 5, payload.len() as u64, false, true);
    image.put_cluster_data(EXFAT_ROOT_CLUSTER, &dir);
    image.put_cluster_data(5, &payload);

    let results = scan(&image);
    assert_eq!(results.len(), 1);

    let entry = &results[0];
    assert_eq!(entry.name, "note.txt");
    assert_eq!(entry.path, "<exFAT>\\note.txt");
    assert_eq!(entry.size, 100);
    assert_eq!(entry.filesystem_type, FilesystemType::ExFat);
    assert!(entry.is_recoverable);
    // Cluster 5 in a heap based at cluster 8 is absolute LCN 11.
    assert_eq!(entry.location, FileLocation::Clusters(vec![11]));

    let (_tmp, device) = open_image(&image.bytes);
    let out_dir = tempfile::tempdir().unwrap();
    let out_path = out_dir.path().join(&entry.name);
    let mut on_progress = |_: &str, _: f32| {};
    assert!(RecoverFilesUseCase::new().execute_one(
        &device,
        entry,
        None,
        &out_path,
        &mut on_progress
    ));
    assert_eq!(std::fs::read(&out_path).unwrap(), payload);
}

#[test]
fn deleted_contiguous_reconstruction_uses_heap_base() {
    // S3: heap base 4096 clusters, photo.jpg at first cluster 10,
    // 1 MiB = 256 clusters. Expected absolute LCNs 4104..=4359.
    let heap_sectors = 4_096 * SECTORS_PER_CLUSTER;
    let total = (heap_sectors + 4 * SECTORS_PER_CLUSTER) * SECTOR_SIZE;

    let mut image = ExFatImage::new(total as usize, heap_sectors);
    image.set_fat(EXFAT_ROOT_CLUSTER, FAT_END);
    let dir = exfat_entry_set("photo.jpg", 10, 1_048_576, false, true);
    image.put_cluster_data(EXFAT_ROOT_CLUSTER, &dir);

    let results = scan(&image);
    assert_eq!(results.len(), 1);

    match &results[0].location {
        FileLocation::Clusters(clusters) => {
            assert_eq!(clusters.len(), 256);
            assert_eq!(clusters[0], 4_104);
            assert_eq!(*clusters.last().unwrap(), 4_359);
        }
        other => panic!("expected cluster list, got {:?}", other),
    }
}

#[test]
fn oversized_deleted_file_is_partial() {
    // Reconstruction caps at 10 GiB; anything larger is tagged partial
    // and not recoverable.
    let size = 10u64 * 1024 * 1024 * 1024 + 4_096;

    let mut image = ExFatImage::new(512 * 1024, 64);
    image.set_fat(EXFAT_ROOT_CLUSTER, FAT_END);
    let dir = exfat_entry_set("huge.iso", 6, size, false, true);
    image.put_cluster_data(EXFAT_ROOT_CLUSTER, &dir);

    let results = scan(&image);
    assert_eq!(results.len(), 1);

    let entry = &results[0];
    assert!(!entry.is_recoverable);
    assert_eq!(entry.size_formatted, "Partial (size limit)");
    assert_eq!(
        entry.location.cluster_count(),
        10 * 1024 * 1024 * 1024 / BYTES_PER_CLUSTER
    );
}

#[test]
fn walks_into_active_subdirectories() {
    let mut image = ExFatImage::new(512 * 1024, 64);
    image.set_fat(EXFAT_ROOT_CLUSTER, FAT_END);
    image.set_fat(6, FAT_END);

    let root = exfat_entry_set("album", 6, BYTES_PER_CLUSTER, true, false);
    image.put_cluster_data(EXFAT_ROOT_CLUSTER, &root);
    let album = exfat_entry_set("pic.jpg", 7, 512, false, true);
    image.put_cluster_data(6, &album);

    let results = scan(&image);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].path, "<exFAT>\\album\\pic.jpg");
}

#[test]
fn active_files_are_not_reported() {
    let mut image = ExFatImage::new(512 * 1024, 64);
    image.set_fat(EXFAT_ROOT_CLUSTER, FAT_END);
    let dir = exfat_entry_set("current.txt", 5, 256, false, false);
    image.put_cluster_data(EXFAT_ROOT_CLUSTER, &dir);

    assert!(scan(&image).is_empty());
}

#[test]
fn long_names_span_multiple_name_entries() {
    // 20 characters needs two 15-unit name entries.
    let name = "very-long-photo-name";
    let mut image = ExFatImage::new(512 * 1024, 64);
    image.set_fat(EXFAT_ROOT_CLUSTER, FAT_END);
    let dir = exfat_entry_set(name, 5, 123, false, true);
    image.put_cluster_data(EXFAT_ROOT_CLUSTER, &dir);

    let results = scan(&image);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, name);
}
