//! Integration tests for the insertion pipeline

mod fixtures;

use std::sync::Arc;

use common::bucket_store::{BucketId, BucketStore, MemoryBucketStore, UniquenessScope};
use common::engine::{entry::split_entries, MetadataKind, ProtocolEngine};
use common::ingest::{InsertError, InsertRequest, Inserter, Phase};

use fixtures::{
    client_check, keyed_engine, kinds, setup_inserter, BrokenGenerator, EchoingGenerator,
    FixedGenerator, FlakyEngine, SaturatedStore,
};

async fn bucket_entries<S: BucketStore>(
    inserter: &Inserter<S>,
    username: impl AsRef<[u8]>,
) -> usize {
    let id = inserter.engine().bucket_id(username.as_ref());
    let bucket = inserter.store().get(&id).await.unwrap();
    split_entries(&bucket).unwrap().len()
}

#[tokio::test]
async fn test_breach_record_inserted_once() {
    let (inserter, engine) = setup_inserter(UniquenessScope::Bucket);
    let request = InsertRequest::new("alice", "hunter2", Phase::Breach);

    let first = inserter.insert(&request).await.unwrap();
    assert_eq!(first.appended, 1);
    assert_eq!(first.duplicates, 0);

    let second = inserter.insert(&request).await.unwrap();
    assert_eq!(second.appended, 0);
    assert_eq!(second.duplicates, 1);
    assert_eq!(first.bucket_id, second.bucket_id);

    assert_eq!(bucket_entries(&inserter, "alice").await, 1);
    assert_eq!(inserter.store().record_count(), 1);

    let opened = client_check(&engine, inserter.store(), "alice", "hunter2").await;
    assert_eq!(kinds(&opened), vec![MetadataKind::BreachedPassword]);
}

#[tokio::test]
async fn test_unrelated_credential_opens_nothing() {
    let (inserter, engine) = setup_inserter(UniquenessScope::Bucket);
    inserter
        .insert(&InsertRequest::new("alice", "hunter2", Phase::Breach))
        .await
        .unwrap();

    let opened = client_check(&engine, inserter.store(), "alice", "correct horse").await;
    assert!(opened.is_empty());
}

#[tokio::test]
async fn test_username_variant() {
    let (inserter, engine) = setup_inserter(UniquenessScope::Bucket);
    let mut request = InsertRequest::new("alice", "hunter2", Phase::Breach);
    request.include_username_variant = true;
    request.metadata = "dump-2019".into();

    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 2);
    assert_eq!(bucket_entries(&inserter, "alice").await, 2);

    // a different password still hits the username-only entry
    let opened = client_check(&engine, inserter.store(), "alice", "other").await;
    assert_eq!(kinds(&opened), vec![MetadataKind::BreachedUsername]);
    assert_eq!(opened[0].metadata, b"dump-2019");

    // second dump with a new password: password entry new, username entry duplicate
    request.password = "hunter3".into();
    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 1);
    assert_eq!(report.duplicates, 1);
    assert_eq!(bucket_entries(&inserter, "alice").await, 3);
}

#[tokio::test]
async fn test_similarity_phase_appends_every_variant() {
    let (inserter, engine) = setup_inserter(UniquenessScope::Bucket);
    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.num_variants = 5;

    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 5);
    assert_eq!(report.collisions, 0);
    assert_eq!(bucket_entries(&inserter, "alice").await, 5);
    assert_eq!(inserter.store().record_count(), 5);

    // variants never include the breached password itself
    let opened = client_check(&engine, inserter.store(), "alice", "hunter2").await;
    assert!(opened.is_empty());
}

#[tokio::test]
async fn test_similarity_substitutes_colliding_variant() {
    let (inserter, _) = setup_inserter(UniquenessScope::Bucket);
    let inserter = inserter.with_generator(Arc::new(FixedGenerator(vec![
        b"hunter3".to_vec(),
        b"Hunter2".to_vec(),
    ])));

    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.num_variants = 2;
    request.use_external_generator = true;

    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 2);
    assert_eq!(report.substituted, 0);

    // same variants again: both collide and are replaced by random substitutes
    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 2);
    assert_eq!(report.substituted, 2);
    assert_eq!(report.collisions, 0);
    assert_eq!(bucket_entries(&inserter, "alice").await, 4);
    assert_eq!(inserter.store().record_count(), 4);
}

#[tokio::test]
async fn test_external_variants_drop_password_and_respect_count() {
    let (inserter, engine) = setup_inserter(UniquenessScope::Bucket);
    let inserter = inserter.with_generator(Arc::new(EchoingGenerator(vec![
        b"hunter3".to_vec(),
        b"Hunter2".to_vec(),
        b"hunter2!".to_vec(),
    ])));

    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.num_variants = 2;
    request.use_external_generator = true;

    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 2);
    assert_eq!(bucket_entries(&inserter, "alice").await, 2);

    // the breached password itself is never stored as a similar entry
    assert!(client_check(&engine, inserter.store(), "alice", "hunter2")
        .await
        .is_empty());
    assert_eq!(
        kinds(&client_check(&engine, inserter.store(), "alice", "hunter3").await),
        vec![MetadataKind::SimilarPassword]
    );
    assert!(client_check(&engine, inserter.store(), "alice", "hunter2!")
        .await
        .is_empty());
}

#[tokio::test]
async fn test_non_utf8_credential_round_trips() {
    let (inserter, engine) = setup_inserter(UniquenessScope::Bucket);
    let mut request = InsertRequest::new(&b"m\xfcller"[..], &b"p\xe4ss"[..], Phase::Breach);
    request.metadata = b"latin-1 \xa9".to_vec();

    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 1);

    let opened = client_check(&engine, inserter.store(), b"m\xfcller", b"p\xe4ss").await;
    assert_eq!(kinds(&opened), vec![MetadataKind::BreachedPassword]);
    assert_eq!(opened[0].metadata, b"latin-1 \xa9");

    // the lossy UTF-8 rendering is a different credential
    let lossy = String::from_utf8_lossy(b"p\xe4ss").into_owned();
    assert!(client_check(&engine, inserter.store(), b"m\xfcller", lossy)
        .await
        .is_empty());
}

#[tokio::test]
async fn test_similarity_stores_known_collision_when_attempts_run_out() {
    let store = SaturatedStore::default();
    let inserter = Inserter::new(store, keyed_engine());

    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.num_variants = 2;

    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 2);
    assert_eq!(report.collisions, 2);
    assert_eq!(bucket_entries(&inserter, "alice").await, 2);
}

#[tokio::test]
async fn test_breach_duplicate_is_never_forced() {
    let inserter = Inserter::new(SaturatedStore::default(), keyed_engine());

    let report = inserter
        .insert(&InsertRequest::new("alice", "hunter2", Phase::Breach))
        .await
        .unwrap();
    assert_eq!(report.appended, 0);
    assert_eq!(report.duplicates, 1);
    assert_eq!(bucket_entries(&inserter, "alice").await, 0);
}

#[tokio::test]
async fn test_encryption_failure_keeps_earlier_appends() {
    let store = MemoryBucketStore::default();
    let inserter = Inserter::new(store, Arc::new(FlakyEngine::new(3)));

    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.num_variants = 5;

    let err = inserter.insert(&request).await.unwrap_err();
    assert!(matches!(err, InsertError::Engine(_)));
    assert_eq!(bucket_entries(&inserter, "alice").await, 3);
}

#[tokio::test]
async fn test_external_generator_required_when_requested() {
    let (inserter, _) = setup_inserter(UniquenessScope::Bucket);
    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.use_external_generator = true;

    let err = inserter.insert(&request).await.unwrap_err();
    assert!(matches!(err, InsertError::GeneratorUnavailable));
    assert_eq!(inserter.store().bucket_count(), 0);
}

#[tokio::test]
async fn test_external_generator_failure_aborts_record() {
    let (inserter, _) = setup_inserter(UniquenessScope::Bucket);
    let inserter = inserter.with_generator(Arc::new(BrokenGenerator));
    let mut request = InsertRequest::new("alice", "hunter2", Phase::Similarity);
    request.use_external_generator = true;

    let err = inserter.insert(&request).await.unwrap_err();
    assert!(matches!(err, InsertError::Variants(_)));
    assert!(err.to_string().contains("model not loaded"));
    assert_eq!(inserter.store().bucket_count(), 0);
}

#[tokio::test]
async fn test_invalid_request_rejected() {
    let (inserter, _) = setup_inserter(UniquenessScope::Bucket);
    let err = inserter
        .insert(&InsertRequest::new("", "hunter2", Phase::Breach))
        .await
        .unwrap_err();
    assert!(matches!(err, InsertError::InvalidRequest(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_duplicate_inserts_append_once() {
    let (inserter, _) = setup_inserter(UniquenessScope::Bucket);
    let inserter = Arc::new(inserter);

    let mut handles = Vec::new();
    for _ in 0..16 {
        let inserter = inserter.clone();
        handles.push(tokio::spawn(async move {
            inserter
                .insert(&InsertRequest::new("alice", "hunter2", Phase::Breach))
                .await
                .unwrap()
        }));
    }

    let mut appended = 0;
    for handle in handles {
        appended += handle.await.unwrap().appended;
    }
    assert_eq!(appended, 1);
    assert_eq!(bucket_entries(&inserter, "alice").await, 1);
}

#[tokio::test]
async fn test_global_scope_dedupes_across_buckets() {
    let (inserter, _) = setup_inserter(UniquenessScope::Global);
    let mut request = InsertRequest::new("alice", "hunter2", Phase::Breach);
    inserter.insert(&request).await.unwrap();

    // same credential under another username seals to different bytes
    request.username = "bob".into();
    let report = inserter.insert(&request).await.unwrap();
    assert_eq!(report.appended, 1);

    let a = BucketId::new(vec![1, 2, 3]);
    let b = BucketId::new(vec![4, 5, 6]);
    assert!(inserter.store().append_unique(&a, b"same-bytes").await.unwrap());
    assert!(!inserter.store().append_unique(&b, b"same-bytes").await.unwrap());
    assert!(inserter.store().get(&b).await.unwrap().is_empty());
}
