//! End-to-end pipeline tests: upload -> chunk -> reassemble -> unpack ->
//! device placement -> dispatch -> teardown.

use depot::{
    ArtifactMeta, ChunkStore, DepotConfig, DepotError, EngineKind, EngineRegistry, MemoryStore,
    MetadataStore, ModelConfig, ModelFormat, ModelKind, ModelManager, ModelState, StubEngine,
    UndeployOutcome,
};
use std::io::Write;
use std::sync::Arc;
use tempfile::TempDir;

fn embedding_meta() -> ArtifactMeta {
    ArtifactMeta {
        name: "msmarco-distilbert".to_string(),
        version: "1.0.1".to_string(),
        format: ModelFormat::TorchScript,
        kind: ModelKind::TextEmbedding,
        config: ModelConfig::default(),
    }
}

/// Build a zip package in memory.
fn make_package(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}

fn valid_package() -> Vec<u8> {
    make_package(&[
        ("original-upload-name.pt", b"scripted graph bytes"),
        ("tokenizer.json", b"{\"version\": \"1.0\"}"),
    ])
}

struct Harness {
    _temp: TempDir,
    manager: ModelManager,
}

fn harness(engine: StubEngine, chunk_size: usize) -> Harness {
    let temp = TempDir::new().unwrap();
    let mut config = DepotConfig::for_root(temp.path().to_path_buf());
    config.chunk_size_bytes = chunk_size;

    let store = Arc::new(MemoryStore::new());
    let engines = Arc::new(EngineRegistry::new());
    engines.register(EngineKind::TorchScript, Arc::new(engine));

    let manager = ModelManager::new(
        config,
        Arc::clone(&store) as Arc<dyn MetadataStore>,
        store as Arc<dyn ChunkStore>,
        engines,
    );
    Harness {
        _temp: temp,
        manager,
    }
}

#[tokio::test]
async fn test_25mb_artifact_splits_into_three_chunks() {
    const SIZE: usize = 25_000_000;
    const CHUNK: usize = 10_000_000;

    let h = harness(StubEngine::new(1), CHUNK);

    // A deterministic 25MB payload
    let payload: Vec<u8> = (0..SIZE).map(|i| (i % 251) as u8).collect();
    let declared = {
        use sha2::{Digest, Sha256};
        let mut hasher = Sha256::new();
        hasher.update(&payload);
        hex::encode(hasher.finalize())
    };

    let mut session = h
        .manager
        .begin_upload(embedding_meta(), Some(declared.clone()))
        .await
        .unwrap();
    for (index, part) in payload.chunks(CHUNK).enumerate() {
        session.receive_chunk(index as u32, part.to_vec()).unwrap();
    }

    let artifact = h.manager.finalize_upload(session).await.unwrap();
    assert_eq!(artifact.state, ModelState::Registered);
    assert_eq!(artifact.total_chunks, 3);
    assert_eq!(artifact.total_size_bytes, SIZE as u64);
    assert_eq!(artifact.content_hash, declared);

    // Stored chunks are 10MB, 10MB, 5MB
    let c0 = h.manager.fetch_chunk(&artifact.model_id, 0).await.unwrap();
    let c1 = h.manager.fetch_chunk(&artifact.model_id, 1).await.unwrap();
    let c2 = h.manager.fetch_chunk(&artifact.model_id, 2).await.unwrap();
    assert_eq!(c0.len(), CHUNK);
    assert_eq!(c1.len(), CHUNK);
    assert_eq!(c2.len(), 5_000_000);

    // Reassembled content is byte-identical
    let mut reassembled = c0;
    reassembled.extend(c1);
    reassembled.extend(c2);
    assert_eq!(reassembled, payload);
}

#[tokio::test]
async fn test_out_of_order_upload_matches_in_order() {
    let payload: Vec<u8> = (0..10_000).map(|i| (i % 13) as u8).collect();
    let h = harness(StubEngine::new(1), 1_000);

    let mut in_order = h.manager.begin_upload(embedding_meta(), None).await.unwrap();
    for (index, part) in payload.chunks(1_000).enumerate() {
        in_order.receive_chunk(index as u32, part.to_vec()).unwrap();
    }
    let a = h.manager.finalize_upload(in_order).await.unwrap();

    let mut reversed = h.manager.begin_upload(embedding_meta(), None).await.unwrap();
    for (index, part) in payload.chunks(1_000).enumerate().rev() {
        reversed.receive_chunk(index as u32, part.to_vec()).unwrap();
    }
    let b = h.manager.finalize_upload(reversed).await.unwrap();

    // Delivery order cannot change the registered content
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(a.total_chunks, b.total_chunks);
}

#[tokio::test]
async fn test_end_to_end_two_device_serving() {
    let h = harness(StubEngine::new(2), 256);

    let artifact = h
        .manager
        .register_from_bytes(embedding_meta(), &valid_package(), None)
        .await
        .unwrap();

    h.manager.deploy(&artifact.model_id).await.unwrap();

    let devices = h.manager.devices(&artifact.model_id).await.unwrap();
    assert_eq!(devices.len(), 2);

    // Round-robin across both replicas: outputs carry the device label
    let first = h
        .manager
        .predict(&artifact.model_id, b"the quick brown fox")
        .await
        .unwrap();
    let second = h
        .manager
        .predict(&artifact.model_id, b"the quick brown fox")
        .await
        .unwrap();
    let third = h
        .manager
        .predict(&artifact.model_id, b"the quick brown fox")
        .await
        .unwrap();

    assert_ne!(first, second);
    assert_eq!(first, third);

    // Undeploy releases everything and removes the working directory
    let outcome = h.manager.undeploy(&artifact.model_id).await.unwrap();
    assert_eq!(outcome, UndeployOutcome::Unloaded);
    assert!(!h.manager.is_deployed(&artifact.model_id).await);
    assert!(!h.manager.config().model_dir(&artifact.model_id).exists());

    let stored = h
        .manager
        .artifact(&artifact.model_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, ModelState::Undeployed);
}

#[tokio::test]
async fn test_package_with_two_model_files_fails_cleanly() {
    let h = harness(StubEngine::new(2), 256);

    let package = make_package(&[
        ("first.pt", b"graph one"),
        ("second.pt", b"graph two"),
        ("tokenizer.json", b"{}"),
    ]);
    let artifact = h
        .manager
        .register_from_bytes(embedding_meta(), &package, None)
        .await
        .unwrap();

    let err = h.manager.deploy(&artifact.model_id).await.unwrap_err();
    assert!(matches!(err, DepotError::Packaging(_)));

    // No working-directory leak and no resident model after the failure
    let config = h.manager.config();
    assert!(!config.model_dir(&artifact.model_id).exists());
    assert!(!config.deploy_dir(&artifact.model_id).exists());
    assert!(!h.manager.is_deployed(&artifact.model_id).await);

    let stored = h
        .manager
        .artifact(&artifact.model_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.state, ModelState::DeployFailed);
}

#[tokio::test]
async fn test_missing_tokenizer_fails_for_embedding_kind() {
    let h = harness(StubEngine::new(1), 256);

    let package = make_package(&[("weights.pt", b"graph")]);
    let artifact = h
        .manager
        .register_from_bytes(embedding_meta(), &package, None)
        .await
        .unwrap();

    let err = h.manager.deploy(&artifact.model_id).await.unwrap_err();
    assert!(matches!(err, DepotError::Packaging(_)));
}

#[tokio::test]
async fn test_device_failure_mid_load_leaves_no_residue() {
    let engine = StubEngine::new(3).fail_load_on_device(1);
    let counters = engine.counters();
    let h = harness(engine, 256);

    let artifact = h
        .manager
        .register_from_bytes(embedding_meta(), &valid_package(), None)
        .await
        .unwrap();

    let err = h.manager.deploy(&artifact.model_id).await.unwrap_err();
    match err {
        DepotError::PredictorConstruction { device, .. } => assert_eq!(device, "cpu:1"),
        other => panic!("unexpected error: {other}"),
    }

    // Device 0's predictor and both attempted model handles must be closed
    assert_eq!(
        counters
            .models_open
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
    assert_eq!(
        counters
            .predictors_open
            .load(std::sync::atomic::Ordering::SeqCst),
        0
    );
}

#[tokio::test]
async fn test_redeploy_after_undeploy() {
    let h = harness(StubEngine::new(1), 256);

    let artifact = h
        .manager
        .register_from_bytes(embedding_meta(), &valid_package(), None)
        .await
        .unwrap();

    for _ in 0..2 {
        h.manager.deploy(&artifact.model_id).await.unwrap();
        h.manager
            .predict(&artifact.model_id, b"input")
            .await
            .unwrap();
        let outcome = h.manager.undeploy(&artifact.model_id).await.unwrap();
        assert_eq!(outcome, UndeployOutcome::Unloaded);
    }
}

#[tokio::test]
async fn test_concurrent_predicts_spread_evenly() {
    let h = harness(StubEngine::new(4), 256);

    let artifact = h
        .manager
        .register_from_bytes(embedding_meta(), &valid_package(), None)
        .await
        .unwrap();
    h.manager.deploy(&artifact.model_id).await.unwrap();

    let manager = Arc::new(h.manager);
    let mut handles = Vec::new();
    for _ in 0..100 {
        let manager = Arc::clone(&manager);
        let model_id = artifact.model_id.clone();
        handles.push(tokio::spawn(async move {
            manager.predict(&model_id, b"payload").await.unwrap()
        }));
    }

    let outputs: Vec<_> = futures::future::join_all(handles).await;

    // 100 calls over 4 devices: the atomic cursor gives each replica
    // exactly 25, no matter how the tasks interleave.
    let mut counts = std::collections::HashMap::new();
    for output in outputs {
        let output = String::from_utf8(output.unwrap()).unwrap();
        let device = output.split('|').next().unwrap().to_string();
        *counts.entry(device).or_insert(0usize) += 1;
    }
    assert_eq!(counts.len(), 4);
    for (_, count) in counts {
        assert_eq!(count, 25);
    }
}

#[tokio::test]
async fn test_file_backed_store_survives_manager_restart() {
    let temp = TempDir::new().unwrap();
    let mut config = DepotConfig::for_root(temp.path().to_path_buf());
    config.chunk_size_bytes = 256;

    let model_id = {
        let store = Arc::new(depot::FsStore::new(config.store_dir()).unwrap());
        let manager = ModelManager::new(
            config.clone(),
            Arc::clone(&store) as Arc<dyn MetadataStore>,
            store as Arc<dyn ChunkStore>,
            Arc::new(EngineRegistry::with_stub_engines(1)),
        );
        let artifact = manager
            .register_from_bytes(embedding_meta(), &valid_package(), None)
            .await
            .unwrap();
        artifact.model_id
    };

    // A fresh manager over the same root can deploy from the stored chunks
    let store = Arc::new(depot::FsStore::new(config.store_dir()).unwrap());
    let manager = ModelManager::new(
        config,
        Arc::clone(&store) as Arc<dyn MetadataStore>,
        store as Arc<dyn ChunkStore>,
        Arc::new(EngineRegistry::with_stub_engines(1)),
    );

    manager.deploy(&model_id).await.unwrap();
    let output = manager.predict(&model_id, b"restart").await.unwrap();
    assert!(String::from_utf8(output).unwrap().starts_with("cpu:0|"));
}
