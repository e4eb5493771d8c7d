//! End-to-end behaviour of the bulk operations.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{Event, Harness, host_tree};
use oxvault_core::testing::{Fault, FaultyVolume, assert_volume_file, patterned, random_bytes};
use oxvault_core::{EncryptedVolume, FileType, MemoryVolume, VolumeExt};
use oxvault_ops::{
    EngineConfig, ExternalTree, HostNode, OperationFile, TaskResult, Wipeable, plan_copy,
    plan_import, plan_move,
};
use tempfile::TempDir;

fn file(src: &str, dst: &str) -> OperationFile {
    OperationFile::new(src, FileType::RegularFile).with_dst(dst)
}

#[tokio::test]
async fn test_cross_volume_copy_roundtrip() {
    let h = Harness::new();
    let a = Arc::new(MemoryVolume::new());
    let b = Arc::new(MemoryVolume::new());
    let sizes = [0, 1, 16 * 1024 - 1, 16 * 1024, 40_000];
    for (i, size) in sizes.iter().enumerate() {
        a.put_file(&format!("/data/f{i}.bin"), &random_bytes(*size));
    }
    a.put_file("/data/nested/deep.bin", &patterned(3333));
    let a_id = h.add("a", &a);
    let b_id = h.add("b", &b);

    let items = plan_copy(a.as_ref(), &["/data"], "/", "/").unwrap();
    let result = h.engine.copy_elements(b_id, items, Some(a_id)).join().await;
    assert_eq!(result, TaskResult::Success);

    for entry in a.recursive_map_files("/data").unwrap() {
        if entry.is_directory() {
            continue;
        }
        let mut original = Vec::new();
        a.export_file(&entry.full_path(), &mut original).unwrap();
        let mut copied = Vec::new();
        b.export_file(&entry.full_path(), &mut copied).unwrap();
        assert_eq!(original, copied, "{}", entry.full_path());
    }
    assert_eq!(b.open_handles(), 0);
    assert_eq!(a.open_handles(), 0);
}

#[tokio::test]
async fn test_copy_overwrites_larger_file() {
    let h = Harness::new();
    let volume = Arc::new(MemoryVolume::new());
    volume.put_file("/small", b"new");
    volume.put_file("/big", &[7; 10_000]);
    let id = h.add("v", &volume);

    let result = h
        .engine
        .copy_elements(id, vec![file("/small", "/big")], None)
        .join()
        .await;
    assert_eq!(result, TaskResult::Success);
    assert_volume_file(volume.as_ref(), "/big", b"new");
}

#[tokio::test]
async fn test_short_write_fails_item_and_truncates() {
    let h = Harness::with_config(EngineConfig::default().io_chunk_size(1024));
    let volume = Arc::new(FaultyVolume::new(MemoryVolume::new()).with_short_write("/dst/a.txt", 3000));
    let data = patterned(5000);
    volume.inner().put_file("/src/a.txt", &data);
    volume.inner().mkdir("/dst").unwrap();
    let id = h.add("faulty", &volume);

    let result = h
        .engine
        .copy_elements(id, vec![file("/src/a.txt", "/dst/a.txt")], None)
        .join()
        .await;

    assert_eq!(result, TaskResult::Failed("/src/a.txt".to_string()));
    let size = volume.get_attr("/dst/a.txt").unwrap().len();
    assert!(size <= 3000, "destination holds {size} bytes");
    assert_eq!(size, 2048);
    let mut written = Vec::new();
    volume.export_file("/dst/a.txt", &mut written).unwrap();
    assert_eq!(written, data[..2048]);
    assert_volume_file(volume.as_ref(), "/src/a.txt", &data);
    assert_eq!(volume.inner().open_handles(), 0);
}

#[tokio::test]
async fn test_copy_stops_at_first_failure() {
    let h = Harness::new();
    let volume = Arc::new(
        FaultyVolume::new(MemoryVolume::new()).with_failure(Fault::Mkdir, "/out/b"),
    );
    volume.inner().put_file("/a", b"a");
    volume.inner().put_file("/c", b"c");
    volume.inner().mkdir("/out").unwrap();
    let id = h.add("v", &volume);

    let items = vec![
        file("/a", "/out/a"),
        OperationFile::new("/b", FileType::Directory).with_dst("/out/b"),
        file("/c", "/out/c"),
    ];
    let result = h.engine.copy_elements(id, items, None).join().await;
    assert_eq!(result, TaskResult::Failed("/b".to_string()));
    assert!(volume.path_exists("/out/a"));
    assert!(!volume.path_exists("/out/c"));
}

#[tokio::test]
async fn test_move_cancelled_after_two_items() {
    let h = Harness::cancelling_at(2);
    let volume = Arc::new(MemoryVolume::new());
    for i in 0..5 {
        volume.put_file(&format!("/src/f{i}"), format!("content {i}").as_bytes());
    }
    volume.mkdir("/dst").unwrap();
    let id = h.add("v", &volume);

    let selection: Vec<String> = (0..5).map(|i| format!("/src/f{i}")).collect();
    let plan = plan_move(volume.as_ref(), &selection, "/src", "/dst").unwrap();
    let result = h
        .engine
        .move_elements(id, plan.to_move, plan.to_clean)
        .join()
        .await;

    assert_eq!(result, TaskResult::Cancelled);
    for i in 0..2 {
        assert!(!volume.path_exists(&format!("/src/f{i}")));
        assert_volume_file(volume.as_ref(), &format!("/dst/f{i}"), format!("content {i}").as_bytes());
    }
    for i in 2..5 {
        assert_volume_file(volume.as_ref(), &format!("/src/f{i}"), format!("content {i}").as_bytes());
        assert!(!volume.path_exists(&format!("/dst/f{i}")));
    }
    assert_eq!(h.progress.count(|e| *e == Event::End), 1);
}

#[tokio::test]
async fn test_move_merges_and_cleans_deepest_first() {
    let h = Harness::new();
    let volume = Arc::new(MemoryVolume::new());
    volume.put_file("/src/docs/a/one.txt", b"1");
    volume.put_file("/src/docs/two.txt", b"2");
    volume.mkdir("/dst").unwrap();
    volume.mkdir("/dst/docs").unwrap();
    volume.mkdir("/dst/docs/a").unwrap();
    let id = h.add("v", &volume);

    let plan = plan_move(volume.as_ref(), &["/src/docs"], "/src", "/dst").unwrap();
    assert_eq!(plan.to_clean.len(), 2);
    let result = h
        .engine
        .move_elements(id, plan.to_move, plan.to_clean)
        .join()
        .await;

    assert_eq!(result, TaskResult::Success);
    assert_volume_file(volume.as_ref(), "/dst/docs/a/one.txt", b"1");
    assert_volume_file(volume.as_ref(), "/dst/docs/two.txt", b"2");
    assert!(!volume.path_exists("/src/docs"));
}

#[tokio::test]
async fn test_move_clean_failure_reports_dir() {
    let h = Harness::new();
    let volume = Arc::new(
        FaultyVolume::new(MemoryVolume::new()).with_failure(Fault::Rmdir, "/src/docs"),
    );
    volume.inner().put_file("/src/docs/a/one.txt", b"1");
    volume.inner().put_file("/dst/docs/a/keep.txt", b"k");
    let id = h.add("v", &volume);

    let plan = plan_move(volume.as_ref(), &["/src/docs"], "/src", "/dst").unwrap();
    let result = h
        .engine
        .move_elements(id, plan.to_move, plan.to_clean)
        .join()
        .await;

    assert_eq!(result, TaskResult::Failed("/src/docs".to_string()));
    assert_volume_file(volume.as_ref(), "/dst/docs/a/one.txt", b"1");
    assert!(!volume.path_exists("/src/docs/a"));
    assert!(volume.path_exists("/src/docs"));
}

#[tokio::test]
async fn test_move_rename_failure_reports_source() {
    let h = Harness::new();
    let volume = Arc::new(
        FaultyVolume::new(MemoryVolume::new()).with_failure(Fault::Rename, "/b"),
    );
    volume.inner().put_file("/a", b"a");
    volume.inner().put_file("/b", b"b");
    volume.inner().mkdir("/d").unwrap();
    let id = h.add("v", &volume);

    let result = h
        .engine
        .move_elements(id, vec![file("/a", "/d/a"), file("/b", "/d/b")], Vec::new())
        .join()
        .await;
    assert_eq!(result, TaskResult::Failed("/b".to_string()));
    assert!(volume.path_exists("/d/a"));
    assert!(volume.path_exists("/b"));
}

#[tokio::test]
async fn test_import_stops_at_missing_source() {
    let h = Harness::new();
    let host = TempDir::new().unwrap();
    host_tree(
        host.path(),
        &[("a.txt", b"alpha".as_slice()), ("c.txt", b"gamma".as_slice())],
    );
    let volume = Arc::new(MemoryVolume::new());
    volume.mkdir("/in").unwrap();
    let id = h.add("v", &volume);

    let sources: Vec<Box<dyn ExternalTree>> = ["a.txt", "b.txt", "c.txt"]
        .iter()
        .map(|name| HostNode::tree(host.path().join(name)))
        .collect();
    let missing = sources[1].id();
    let dst_paths = plan_import("/in", &["a.txt", "b.txt", "c.txt"]);

    let result = h
        .engine
        .import_files_from_uris(id, dst_paths, sources)
        .join()
        .await;

    assert_eq!(result, TaskResult::Failed(missing));
    assert_volume_file(volume.as_ref(), "/in/a.txt", b"alpha");
    assert!(!volume.path_exists("/in/b.txt"));
    assert!(!volume.path_exists("/in/c.txt"));
}

#[tokio::test]
async fn test_import_directory_creates_tree() {
    let h = Harness::new();
    let host = TempDir::new().unwrap();
    let big = patterned(50_000);
    host_tree(
        host.path(),
        &[
            ("album/cover.png", b"png".as_slice()),
            ("album/2024/a.raw", big.as_slice()),
            ("album/2024/b.raw", b"".as_slice()),
        ],
    );
    fs::create_dir(host.path().join("album/empty")).unwrap();
    let volume = Arc::new(MemoryVolume::new());
    volume.mkdir("/imports").unwrap();
    let id = h.add("v", &volume);

    let outcome = h
        .engine
        .import_directory(id, "/imports".into(), HostNode::tree(host.path().join("album")))
        .join()
        .await;

    assert_eq!(outcome.result, TaskResult::Success);
    assert_eq!(outcome.sources.len(), 3);
    assert_volume_file(volume.as_ref(), "/imports/album/cover.png", b"png");
    assert_volume_file(volume.as_ref(), "/imports/album/2024/a.raw", &big);
    assert_volume_file(volume.as_ref(), "/imports/album/2024/b.raw", b"");
    assert!(volume.get_attr("/imports/album/empty").unwrap().is_directory());
    assert!(h.progress.events().contains(&Event::Update(0, Some(3))));
}

#[tokio::test]
async fn test_export_files_and_directories() {
    let h = Harness::new();
    let volume = Arc::new(MemoryVolume::new());
    volume.put_file("/docs/a.txt", b"a");
    volume.put_file("/docs/sub/b.txt", b"bb");
    volume.put_file("/top.txt", b"top");
    let id = h.add("v", &volume);
    let out = TempDir::new().unwrap();

    let result = h
        .engine
        .export_files(
            id,
            vec!["/docs".into(), "/top.txt".into()],
            HostNode::tree(out.path()),
        )
        .join()
        .await;

    assert_eq!(result, TaskResult::Success);
    assert_eq!(fs::read(out.path().join("docs/a.txt")).unwrap(), b"a");
    assert_eq!(fs::read(out.path().join("docs/sub/b.txt")).unwrap(), b"bb");
    assert_eq!(fs::read(out.path().join("top.txt")).unwrap(), b"top");
    assert_eq!(volume.open_handles(), 0);
}

#[tokio::test]
async fn test_export_reports_volume_path() {
    let h = Harness::new();
    let volume = Arc::new(
        FaultyVolume::new(MemoryVolume::new())
            .with_failure(Fault::OpenRead, "/docs/bad.txt"),
    );
    volume.inner().put_file("/docs/bad.txt", b"x");
    let id = h.add("v", &volume);
    let out = TempDir::new().unwrap();

    let result = h
        .engine
        .export_files(id, vec!["/docs".into()], HostNode::tree(out.path()))
        .join()
        .await;
    assert_eq!(result, TaskResult::Failed("/docs/bad.txt".to_string()));
}

#[tokio::test]
async fn test_remove_deletes_trees() {
    let h = Harness::new();
    let volume = Arc::new(MemoryVolume::new());
    volume.put_file("/d/x/1", b"1");
    volume.put_file("/d/2", b"2");
    volume.put_file("/f", b"f");
    let id = h.add("v", &volume);

    let items = vec![
        OperationFile::new("/d", FileType::Directory),
        OperationFile::new("/f", FileType::RegularFile),
    ];
    let result = h.engine.remove_elements(id, items).join().await;
    assert_eq!(result, TaskResult::Success);
    assert!(!volume.path_exists("/d"));
    assert!(!volume.path_exists("/f"));
}

#[tokio::test]
async fn test_remove_reports_first_failed_path() {
    let h = Harness::new();
    let volume = Arc::new(
        FaultyVolume::new(MemoryVolume::new()).with_failure(Fault::Delete, "/d/x/1"),
    );
    volume.inner().put_file("/d/x/1", b"1");
    volume.inner().put_file("/d/x/2", b"2");
    volume.inner().put_file("/f", b"f");
    let id = h.add("v", &volume);

    let items = vec![
        OperationFile::new("/d", FileType::Directory),
        OperationFile::new("/f", FileType::RegularFile),
    ];
    let result = h.engine.remove_elements(id, items).join().await;

    assert_eq!(result, TaskResult::Failed("/d/x/1".to_string()));
    assert!(volume.path_exists("/d/x/1"));
    assert!(volume.path_exists("/f"));
}

#[tokio::test]
async fn test_cancelled_remove_is_success() {
    let h = Harness::cancelling_at(1);
    let volume = Arc::new(MemoryVolume::new());
    for i in 0..3 {
        volume.put_file(&format!("/f{i}"), b"x");
    }
    let id = h.add("v", &volume);

    let items = (0..3)
        .map(|i| OperationFile::new(format!("/f{i}"), FileType::RegularFile))
        .collect();
    let result = h.engine.remove_elements(id, items).join().await;

    assert_eq!(result, TaskResult::Success);
    assert!(!volume.path_exists("/f0"));
    assert!(volume.path_exists("/f1"));
    assert!(volume.path_exists("/f2"));
}

#[tokio::test]
async fn test_wipe_deletes_sources_and_root() {
    let h = Harness::new();
    let host = TempDir::new().unwrap();
    let nines = [9_u8; 5000];
    host_tree(
        host.path(),
        &[("plain/a", nines.as_slice()), ("plain/b", b"b".as_slice())],
    );
    let root = host.path().join("plain");

    let sources: Vec<Box<dyn Wipeable>> = vec![
        HostNode::wipeable(root.join("a")),
        HostNode::wipeable(root.join("b")),
    ];
    let result = h
        .engine
        .wipe_uris(sources, Some(HostNode::wipeable(&root)))
        .join()
        .await;

    assert_eq!(result, TaskResult::Success);
    assert!(!root.exists());
    assert_eq!(h.progress.last_done(), 2);
}

#[tokio::test]
async fn test_wipe_failure_carries_message() {
    let h = Harness::new();
    let host = TempDir::new().unwrap();
    let missing = HostNode::wipeable(host.path().join("gone"));
    let id = missing.id();

    let result = h.engine.wipe_uris(vec![missing], None).join().await;
    let TaskResult::Failed(message) = result else {
        panic!("expected failure, got {result:?}");
    };
    assert!(message.starts_with(&id), "{message}");
}

#[tokio::test]
async fn test_copy_volume_duplicates_tree() {
    let h = Harness::new();
    let src = TempDir::new().unwrap();
    host_tree(
        src.path(),
        &[
            ("vault/masterkey", b"key".as_slice()),
            ("vault/d/AA/blob", vec![1_u8; 70_000].as_slice()),
            ("vault/d/BB/blob", b"small".as_slice()),
        ],
    );
    let dest = TempDir::new().unwrap();

    let outcome = h
        .engine
        .copy_volume(
            HostNode::tree(src.path().join("vault")),
            HostNode::tree(dest.path()),
        )
        .join()
        .await;

    assert_eq!(outcome.result, TaskResult::Success);
    let created = outcome.created.expect("root created");
    assert_eq!(created.id(), dest.path().join("vault").display().to_string());
    assert_eq!(fs::read(dest.path().join("vault/d/AA/blob")).unwrap(), vec![1; 70_000]);
    assert_eq!(fs::read(dest.path().join("vault/masterkey")).unwrap(), b"key");
    // vault, masterkey, d, AA, blob, BB, blob
    assert!(h.progress.events().contains(&Event::Begin(
        oxvault_ops::OperationKind::CopyVolume,
        Some(7)
    )));
    assert_eq!(h.progress.last_done(), 7);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tasks_on_one_volume_never_overlap() {
    let h = Harness::new();
    let volume = Arc::new(FaultyVolume::new(MemoryVolume::new()).with_call_delay(Duration::from_millis(1)));
    for i in 0..4 {
        volume.inner().put_file(&format!("/src/f{i}"), &patterned(2000));
    }
    let id = h.add("v", &volume);

    let tasks: Vec<_> = (0..4)
        .map(|i| {
            h.engine.copy_elements(
                id,
                vec![file(&format!("/src/f{i}"), &format!("/copy{i}"))],
                None,
            )
        })
        .collect();
    for task in tasks {
        assert_eq!(task.join().await, TaskResult::Success);
    }
    assert_eq!(volume.max_concurrency(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_volume_cancels_running_task() {
    let h = Harness::new();
    let volume = Arc::new(FaultyVolume::new(MemoryVolume::new()).with_call_delay(Duration::from_millis(2)));
    for i in 0..50 {
        volume.inner().put_file(&format!("/f{i}"), b"data");
    }
    let id = h.add("v", &volume);

    let items = (0..50)
        .map(|i| file(&format!("/f{i}"), &format!("/g{i}")))
        .collect();
    let task = h.engine.copy_elements(id, items, None);
    assert_eq!(h.engine.running_tasks().len(), 1);

    assert!(h.manager.close_volume(id));
    assert_eq!(task.join().await, TaskResult::Cancelled);
    assert!(volume.is_closed());
    assert!(h.engine.running_tasks().is_empty());

    let late = h.engine.remove_elements(id, Vec::new()).join().await;
    assert!(matches!(late, TaskResult::Error(_)));
}

#[tokio::test]
async fn test_cancel_by_task_id() {
    let h = Harness::new();
    let volume = Arc::new(FaultyVolume::new(MemoryVolume::new()).with_call_delay(Duration::from_millis(2)));
    for i in 0..30 {
        volume.inner().put_file(&format!("/f{i}"), b"data");
    }
    let id = h.add("v", &volume);

    let items = (0..30)
        .map(|i| file(&format!("/f{i}"), &format!("/g{i}")))
        .collect();
    let task = h.engine.copy_elements(id, items, None);
    assert!(h.engine.cancel(task.id()));
    assert_eq!(task.join().await, TaskResult::Cancelled);
    assert!(!volume.path_exists("/g29"));
}

#[tokio::test]
async fn test_progress_ends_once_per_task() {
    let h = Harness::new();
    let volume = Arc::new(MemoryVolume::new());
    volume.put_file("/a", b"a");
    let id = h.add("v", &volume);

    let ok = h.engine.copy_elements(id, vec![file("/a", "/b")], None).join().await;
    let failed = h
        .engine
        .copy_elements(id, vec![file("/missing", "/c")], None)
        .join()
        .await;
    assert!(ok.is_success());
    assert_eq!(failed, TaskResult::Failed("/missing".to_string()));
    assert_eq!(h.progress.count(|e| matches!(e, Event::Begin(..))), 2);
    assert_eq!(h.progress.count(|e| *e == Event::End), 2);
}
