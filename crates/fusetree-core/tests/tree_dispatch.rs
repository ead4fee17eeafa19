//! End-to-end behaviour of node trees driven through the dispatcher.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use fusetree_core::nodes::{BlobFile, BlobStorage, DictDir, GeneratorFile};
use fusetree_core::{Dispatcher, FsError, FsResult, HandleTable, NodeRef, OpenFlags};

#[derive(Default)]
struct RecordingStorage {
    data: Mutex<Vec<u8>>,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl RecordingStorage {
    fn with(data: &[u8]) -> Self {
        Self {
            data: Mutex::new(data.to_vec()),
            ..Default::default()
        }
    }

    fn contents(&self) -> Vec<u8> {
        self.data.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStorage for RecordingStorage {
    async fn load(&self) -> FsResult<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.contents())
    }

    async fn save(&self, data: &[u8]) -> FsResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        *self.data.lock().unwrap() = data.to_vec();
        Ok(())
    }
}

fn tree_with(name: &str, node: NodeRef) -> Dispatcher {
    let root = DictDir::builder()
        .shared(name, node)
        .entry("a", BlobFile::new("first"))
        .entry("b", BlobFile::new("second"))
        .build();
    Dispatcher::new(Arc::new(root))
}

#[tokio::test]
async fn test_open_release_cycles_save_once() {
    let file = Arc::new(BlobFile::with_storage(RecordingStorage::with(b"hello"), None, true));
    let fs = tree_with("notes", file.clone());

    let mut sessions = Vec::new();
    for _ in 0..5 {
        sessions.push(fs.open("/notes", OpenFlags::READ_WRITE).await.unwrap());
    }
    assert_eq!(file.open_sessions().await, 5);
    assert_eq!(file.storage().loads.load(Ordering::SeqCst), 1);

    fs.write(&sessions[2], b"J", 0).await.unwrap();
    fs.write(&sessions[4], b"!", 5).await.unwrap();

    for session in &sessions {
        fs.release(session).await.unwrap();
    }
    assert_eq!(file.open_sessions().await, 0);
    assert_eq!(file.storage().saves.load(Ordering::SeqCst), 1);
    assert_eq!(file.storage().contents(), b"Jello!");
}

#[tokio::test]
async fn test_untouched_sessions_never_save() {
    let file = Arc::new(BlobFile::with_storage(RecordingStorage::with(b"x"), None, true));
    let fs = tree_with("notes", file.clone());

    for _ in 0..3 {
        let session = fs.open("/notes", OpenFlags::READ).await.unwrap();
        fs.read(&session, 10, 0).await.unwrap();
        fs.release(&session).await.unwrap();
    }
    assert_eq!(file.storage().saves.load(Ordering::SeqCst), 0);
    assert_eq!(file.storage().loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_concurrent_sessions_see_each_others_writes() {
    let fs = tree_with("notes", Arc::new(BlobFile::writable("........")));

    let a = fs.open("/notes", OpenFlags::READ_WRITE).await.unwrap();
    let b = fs.open("/notes", OpenFlags::READ).await.unwrap();

    fs.write(&a, b"shared", 0).await.unwrap();
    assert_eq!(&fs.read(&b, 6, 0).await.unwrap()[..], b"shared");
    assert_eq!(fs.getattr("/notes").await.unwrap().size, 8);

    fs.write(&a, b"!", 10).await.unwrap();
    assert_eq!(fs.fgetattr(&b).await.unwrap().size, 11);

    fs.release(&a).await.unwrap();
    fs.release(&b).await.unwrap();
}

#[tokio::test]
async fn test_readdir_order_is_stable_across_opens() {
    let root = DictDir::builder()
        .entry("a", BlobFile::new(""))
        .entry("b", BlobFile::new(""))
        .build();
    let fs = Dispatcher::new(Arc::new(root));

    for _ in 0..2 {
        let dir = fs.opendir("/").await.unwrap();
        let names: Vec<String> = fs.readdir(&dir).await.unwrap().map(|e| e.name).collect();
        assert_eq!(names, ["a", "b"]);
        fs.releasedir(&dir).await.unwrap();
    }
}

#[tokio::test]
async fn test_unlink_missing_keeps_mapping() {
    let root = Arc::new(DictDir::writable());
    let fs = Dispatcher::new(root.clone());
    fs.mknod("/kept", 0o644, 0).await.unwrap();

    assert!(matches!(fs.unlink("/missing").await, Err(FsError::NotFound)));
    assert_eq!(root.names().await, ["kept"]);
}

#[tokio::test]
async fn test_mknod_in_read_only_directory() {
    let root = Arc::new(DictDir::builder().entry("a", BlobFile::new("")).build());
    let fs = Dispatcher::new(root.clone());

    let err = fs.mknod("/new", 0o644, 0).await.err().unwrap();
    assert!(matches!(err, FsError::PermissionDenied));
    assert_eq!(err.errno(), libc::EPERM);
    assert_eq!(root.len().await, 1);
}

#[tokio::test]
async fn test_stream_reads_through_handle_table() {
    let fs = tree_with("stream", Arc::new(GeneratorFile::from_chunks(vec!["ab", "cde"])));
    let table = HandleTable::new();

    let file = fs.open("/stream", OpenFlags::READ).await.unwrap();
    assert!(file.direct_io());
    assert!(file.nonseekable());
    let fh = table.insert_file(file);

    let file = table.file(fh).unwrap();
    assert_eq!(&fs.read(&file, 4, 0).await.unwrap()[..], b"abcd");
    assert_eq!(&fs.read(&file, 4, 4).await.unwrap()[..], b"e");
    assert!(fs.read(&file, 4, 5).await.unwrap().is_empty());

    let file = table.remove_file(fh).unwrap();
    fs.release(&file).await.unwrap();
    assert!(matches!(table.file(fh), Err(FsError::BadHandle)));
    assert!(table.is_empty());
}

#[tokio::test]
async fn test_truncate_commits_empty_content() {
    let file = Arc::new(BlobFile::with_storage(
        RecordingStorage::with(b"existing content"),
        None,
        true,
    ));
    let fs = tree_with("notes", file.clone());

    fs.truncate("/notes", 0).await.unwrap();
    assert_eq!(file.open_sessions().await, 0);
    assert!(file.storage().load().await.unwrap().is_empty());
    assert_eq!(fs.getattr("/notes").await.unwrap().size, 0);
}

#[tokio::test]
async fn test_paths_through_files_are_not_directories() {
    let fs = tree_with("notes", Arc::new(BlobFile::new("x")));

    assert!(matches!(fs.getattr("/notes/child").await, Err(FsError::NotADirectory)));
    assert!(matches!(fs.getattr("/notes/a/b").await, Err(FsError::NotADirectory)));
    assert!(matches!(fs.mknod("/notes/child", 0o644, 0).await, Err(FsError::Unsupported)));
    assert!(matches!(fs.getattr("/nothing/child").await, Err(FsError::NotFound)));
}

#[tokio::test]
async fn test_editable_tree_round_trip() {
    let fs = Dispatcher::new(Arc::new(DictDir::writable()));

    fs.mkdir("/docs", 0o755).await.unwrap();
    let file = fs.create("/docs/todo", 0o644, OpenFlags::WRITE).await.unwrap();
    fs.write(&file, b"- write tests\n", 0).await.unwrap();
    fs.flush(&file).await.unwrap();
    fs.release(&file).await.unwrap();

    fs.rename("/docs/todo", "/todo").await.unwrap();
    let file = fs.open("/todo", OpenFlags::READ).await.unwrap();
    assert_eq!(&fs.read(&file, 100, 0).await.unwrap()[..], b"- write tests\n");
    fs.release(&file).await.unwrap();

    assert!(matches!(fs.create("/todo", 0o644, OpenFlags::WRITE).await, Err(FsError::AlreadyExists)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_sessions_on_one_blob_keep_every_write() {
    let file = Arc::new(BlobFile::with_storage(RecordingStorage::default(), None, true));
    let fs = Arc::new(tree_with("notes", file.clone()));

    let mut tasks = Vec::new();
    for i in 1..=64u8 {
        let fs = fs.clone();
        tasks.push(tokio::spawn(async move {
            let session = fs.open("/notes", OpenFlags::READ_WRITE).await?;
            fs.write(&session, &[i], u64::from(i - 1)).await?;
            fs.release(&session).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(file.open_sessions().await, 0);
    assert_eq!(file.storage().contents(), (1..=64).collect::<Vec<u8>>());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_parallel_mknod_on_one_directory() {
    let root = Arc::new(DictDir::writable());
    let fs = Arc::new(Dispatcher::new(root.clone()));

    let tasks: Vec<_> = (0..200)
        .map(|i| {
            let fs = fs.clone();
            tokio::spawn(async move {
                let path = format!("/f{i}");
                fs.mknod(&path, 0o644, 0).await.map(|_| ())
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(root.len().await, 200);

    let racers: Vec<_> = (0..32)
        .map(|_| {
            let fs = fs.clone();
            tokio::spawn(async move { fs.mknod("/same", 0o644, 0).await.map(|_| ()) })
        })
        .collect();
    let mut created = 0;
    for racer in racers {
        match racer.await.unwrap() {
            Ok(()) => created += 1,
            Err(err) => assert!(matches!(err, FsError::AlreadyExists)),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(root.len().await, 201);
}
