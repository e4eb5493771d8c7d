//! Contract tests run against every in-tree backend.
//!
//! Each test body is written once against `&dyn EncryptedVolume` and invoked
//! for both the memory and the host-directory backend, so the two stay
//! behaviourally interchangeable.

use oxvault_core::testing::{assert_volume_file, patterned};
use oxvault_core::{
    DEFAULT_IO_CHUNK_SIZE, EncryptedVolume, HostVolume, LoadError, MemoryVolume, VolumeError,
    VolumeExt, VolumeReader, VolumeWriter, copy_chunks,
};
use std::io::Write;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn with_backends(test: impl Fn(&dyn EncryptedVolume)) {
    init_tracing();
    let memory = MemoryVolume::new();
    test(&memory);

    let dir = TempDir::new().expect("Failed to create temp dir");
    let host = HostVolume::open(dir.path()).expect("Failed to open host volume");
    test(&host);
}

#[test]
fn test_import_export_roundtrip_multi_chunk() {
    with_backends(|volume| {
        let data = patterned(DEFAULT_IO_CHUNK_SIZE * 3 + 17);
        volume.mkdir("/docs").unwrap();
        volume.import_file(data.as_slice(), "/docs/big.bin").unwrap();

        let mut out = Vec::new();
        let n = volume.export_file("/docs/big.bin", &mut out).unwrap();
        assert_eq!(n, data.len() as u64);
        assert_eq!(out, data);
    });
}

#[test]
fn test_overwrite_with_shorter_content_truncates() {
    with_backends(|volume| {
        volume.import_file(&[1_u8; 4000][..], "/f").unwrap();
        volume.import_file(&b"tiny"[..], "/f").unwrap();
        assert_volume_file(volume, "/f", b"tiny");
    });
}

#[test]
fn test_stream_copy_between_files() {
    with_backends(|volume| {
        let data = patterned(70_000);
        volume.import_file(data.as_slice(), "/src").unwrap();

        let mut reader = VolumeReader::open(volume, "/src").unwrap();
        let mut writer = VolumeWriter::create(volume, "/dst").unwrap();
        let mut buf = vec![0_u8; 8192];
        let copied = copy_chunks(&mut reader, &mut writer, &mut buf, || false).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.finish().unwrap(), copied.bytes());
        reader.close().unwrap();

        assert_volume_file(volume, "/dst", &data);
    });
}

#[test]
fn test_missing_paths() {
    with_backends(|volume| {
        assert!(volume.get_attr("/nope").is_none());
        assert!(!volume.path_exists("/nope"));
        assert!(matches!(
            volume.open_file_read_mode("/nope"),
            Err(VolumeError::NotFound { .. })
        ));
        assert!(volume.read_dir("/nope").is_err());
        assert!(volume.recursive_map_files("/nope").is_none());
        assert!(matches!(
            volume.load_whole_file("/nope", None),
            Err(LoadError::StatFailed { .. })
        ));
    });
}

#[test]
fn test_rmdir_refuses_non_empty() {
    with_backends(|volume| {
        volume.mkdir("/d").unwrap();
        volume.import_file(&b"x"[..], "/d/x").unwrap();
        assert!(volume.rmdir("/d").is_err());
        assert!(volume.path_exists("/d/x"));
    });
}

#[test]
fn test_recursive_listing_and_removal() {
    with_backends(|volume| {
        volume.mkdir("/a").unwrap();
        volume.mkdir("/a/b").unwrap();
        volume.mkdir("/a/b/c").unwrap();
        volume.import_file(&b"1"[..], "/a/one").unwrap();
        volume.import_file(&b"2"[..], "/a/b/c/two").unwrap();

        let listed: Vec<String> = volume
            .recursive_map_files("/a")
            .unwrap()
            .iter()
            .map(|e| e.full_path())
            .collect();
        assert_eq!(listed, ["/a/b", "/a/b/c", "/a/b/c/two", "/a/one"]);

        assert_eq!(volume.recursive_remove_directory("/a"), None);
        assert!(!volume.path_exists("/a"));
    });
}

#[test]
fn test_rename_file_and_directory() {
    with_backends(|volume| {
        volume.mkdir("/from").unwrap();
        volume.import_file(&b"payload"[..], "/from/f").unwrap();
        volume.mkdir("/to").unwrap();

        volume.rename("/from/f", "/to/f").unwrap();
        assert!(!volume.path_exists("/from/f"));
        assert_volume_file(volume, "/to/f", b"payload");

        volume.rename("/from", "/to/from").unwrap();
        assert!(volume.get_attr("/to/from").unwrap().is_directory());
    });
}

#[test]
fn test_close_is_final() {
    with_backends(|volume| {
        volume.import_file(&b"x"[..], "/f").unwrap();
        volume.close();
        volume.close();
        assert!(volume.is_closed());
        assert!(matches!(volume.mkdir("/g"), Err(VolumeError::Closed)));
        assert!(volume.get_attr("/f").is_none());
    });
}
