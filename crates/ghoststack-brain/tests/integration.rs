//! Integration tests: scan → chunk → embed → store on temporary repositories.

use std::fs;
use std::path::Path;

use ghoststack_brain::embedding::{hash_embedding, EmbeddingModel};
use ghoststack_brain::hash_cache::FileHashCache;
use ghoststack_brain::index::document_id;
use ghoststack_brain::{index_db_path, CodeIndex, IndexStats, Ingestor, VectorStore};
use ghoststack_core::{state_dir, BrainConfig, GhostError};

fn write(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn sample_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(
        root,
        "app/auth.py",
        "def login(user, password):\n    return check(user, password)\n\n\nclass Session:\n    def close(self):\n        pass\n",
    );
    write(root, "app/config.py", "DEBUG = True\n");
    write(root, "web/index.ts", "export const answer = 42;\n");
    write(root, "docs/guide.md", "# not indexed\n");
    dir
}

#[test]
fn empty_repository_indexes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(
        dir.path(),
        CodeIndex::new(&store, &model),
        BrainConfig::default(),
    );

    let stats = ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(
        stats,
        IndexStats {
            files_scanned: 0,
            files_indexed: 0,
            chunks_total: 0,
        }
    );
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn full_pass_then_incremental_pass() {
    let repo = sample_repo();
    let root = repo.path();
    let store = VectorStore::open(&index_db_path(root)).unwrap();
    let model = EmbeddingModel::fallback(32);

    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    let first = ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(first.files_scanned, 3);
    assert_eq!(first.files_indexed, 3);
    // login, Session, close + config module + index.ts full
    assert_eq!(first.chunks_total, 5);
    assert_eq!(store.count().unwrap(), 5);

    assert!(store.get(&document_id("app/auth.py", "login")).unwrap().is_some());
    assert!(store.get(&document_id("app/config.py", "module")).unwrap().is_some());
    let ts = store.get(&document_id("web/index.ts", "full")).unwrap().unwrap();
    assert_eq!(ts.metadata["language"], "typescript");
    assert_eq!(ts.metadata["type"], "full_file");

    // Cache is persisted once at the end of the pass.
    let cache = FileHashCache::load(&state_dir(root).join("file_hashes.json"));
    assert_eq!(cache.len(), 3);

    // A fresh ingestor sees nothing new.
    let mut again = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    let second = again.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(second.files_scanned, 3);
    assert_eq!(second.files_indexed, 0);
    assert_eq!(second.chunks_total, 0);
}

#[test]
fn index_file_is_idempotent() {
    let repo = sample_repo();
    let root = repo.path();
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());

    let path = root.join("app/auth.py");
    assert_eq!(ingestor.index_file(&path, false).unwrap(), 3);
    let before = store.get(&document_id("app/auth.py", "login")).unwrap();

    assert_eq!(ingestor.index_file(&path, false).unwrap(), 0);
    assert_eq!(store.get(&document_id("app/auth.py", "login")).unwrap(), before);

    // Forcing re-chunks, but unchanged chunks are not rewritten.
    assert_eq!(ingestor.index_file(&path, true).unwrap(), 3);
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn changed_file_is_reindexed() {
    let repo = sample_repo();
    let root = repo.path();
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    ingestor.index_all(false, |_, _, _| {}).unwrap();

    write(root, "web/index.ts", "export const answer = 43;\n");
    let stats = ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(stats.files_indexed, 1);
    assert_eq!(stats.chunks_total, 1);

    let doc = store.get(&document_id("web/index.ts", "full")).unwrap().unwrap();
    assert!(doc.content.contains("43"));
}

#[test]
fn renamed_function_leaves_no_stale_chunk() {
    let repo = sample_repo();
    let root = repo.path();
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(store.count().unwrap(), 5);

    write(
        root,
        "app/auth.py",
        "def sign_in(user, password):\n    return check(user, password)\n",
    );
    ingestor.index_all(false, |_, _, _| {}).unwrap();

    assert!(store.get(&document_id("app/auth.py", "sign_in")).unwrap().is_some());
    assert!(store.get(&document_id("app/auth.py", "login")).unwrap().is_none());
    assert!(store.get(&document_id("app/auth.py", "Session")).unwrap().is_none());
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn grown_file_drops_its_whole_file_document() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "main.go", "package main\n");
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert!(store.get(&document_id("main.go", "full")).unwrap().is_some());

    write(root, "main.go", &"x".repeat(2100));
    ingestor.index_all(false, |_, _, _| {}).unwrap();

    assert!(store.get(&document_id("main.go", "full")).unwrap().is_none());
    assert!(store.get(&document_id("main.go", "chunk_0")).unwrap().is_some());
}

#[test]
fn long_unsupported_structure_file_is_windowed() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "main.go", &"x".repeat(2100));

    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());

    assert_eq!(ingestor.index_file(&root.join("main.go"), false).unwrap(), 2);
    let first = store.get(&document_id("main.go", "chunk_0")).unwrap().unwrap();
    let second = store.get(&document_id("main.go", "chunk_1")).unwrap().unwrap();
    assert_eq!(first.metadata["start_char"], 0);
    assert_eq!(first.metadata["end_char"], 2000);
    assert_eq!(second.metadata["start_char"], 1800);
    assert_eq!(second.metadata["end_char"], 2100);
    assert_eq!(second.metadata["type"], "chunk");
}

#[test]
fn progress_reports_every_file_in_order() {
    let repo = sample_repo();
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(
        repo.path(),
        CodeIndex::new(&store, &model),
        BrainConfig::default(),
    );

    let mut seen = Vec::new();
    ingestor
        .index_all(false, |path, current, total| {
            seen.push((path.to_string(), current, total))
        })
        .unwrap();

    assert_eq!(
        seen,
        [
            ("app/auth.py".to_string(), 1, 3),
            ("app/config.py".to_string(), 2, 3),
            ("web/index.ts".to_string(), 3, 3),
        ]
    );
}

#[test]
fn deleted_files_are_pruned() {
    let repo = sample_repo();
    let root = repo.path();
    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(store.count().unwrap(), 5);

    assert_eq!(ingestor.remove_deleted_files().unwrap(), 0);

    fs::remove_file(root.join("app/auth.py")).unwrap();
    assert_eq!(ingestor.remove_deleted_files().unwrap(), 1);
    assert_eq!(store.count().unwrap(), 2);
    assert!(ingestor.hash_cache().get("app/auth.py").is_none());

    let cache = FileHashCache::load(&state_dir(root).join("file_hashes.json"));
    assert!(cache.get("app/auth.py").is_none());
    assert_eq!(cache.len(), 2);
}

#[test]
fn corrupt_hash_cache_means_full_reindex() {
    let repo = sample_repo();
    let root = repo.path();
    write(root, ".ghoststack/file_hashes.json", "not json at all");

    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    let stats = ingestor.index_all(false, |_, _, _| {}).unwrap();
    assert_eq!(stats.files_indexed, 3);
}

#[test]
fn failing_backend_falls_back_deterministically() {
    let model = EmbeddingModel::with_factory(
        Box::new(|| Err(GhostError::Embedding("no model weights".into()))),
        384,
    );

    let first = model.embed("def handler(): pass");
    assert!(model.is_fallback());
    let second = model.embed("def handler(): pass");
    assert_eq!(first, second);
    assert_eq!(first, hash_embedding("def handler(): pass", 384));
}

#[test]
fn invalid_utf8_is_indexed_lossily() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::write(root.join("bin.c"), [b'i', b'n', b't', 0xff, 0xfe, b';']).unwrap();

    let store = VectorStore::in_memory().unwrap();
    let model = EmbeddingModel::fallback(16);
    let mut ingestor = Ingestor::new(root, CodeIndex::new(&store, &model), BrainConfig::default());
    assert_eq!(ingestor.index_file(&root.join("bin.c"), false).unwrap(), 1);

    let doc = store.get(&document_id("bin.c", "full")).unwrap().unwrap();
    assert!(doc.content.starts_with("int"));
    assert!(doc.content.contains('\u{FFFD}'));
}
