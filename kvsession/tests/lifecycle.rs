//! Integration tests for opening, closing, destroying and repairing stores.

use std::sync::Arc;

use kvsession::{
    Config, ErrorKind, InMemoryEngine, IteratorOptions, OpenOptions, ReadOptions, Session,
    StorageError, WriteOptions,
};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn should_fail_to_open_destroyed_store_without_create_if_missing() {
    init_tracing();

    // given
    let engine = Arc::new(InMemoryEngine::new());
    let session = Session::open_with_engine(engine.clone(), "/lifecycle/destroy", OpenOptions::create())
        .await
        .unwrap();
    session.put("k", "v", WriteOptions::default()).await.unwrap();
    session.close().await.unwrap();

    // when
    kvsession::destroy_with_engine(engine.clone(), "/lifecycle/destroy")
        .await
        .unwrap();
    let missing =
        Session::open_with_engine(engine.clone(), "/lifecycle/destroy", OpenOptions::default())
            .await;
    let recreated =
        Session::open_with_engine(engine, "/lifecycle/destroy", OpenOptions::create()).await;

    // then
    let err = missing.err().unwrap();
    assert_eq!(err.kind(), ErrorKind::EngineFailure);
    assert!(matches!(
        err,
        kvsession::Error::Engine(StorageError::InvalidArgument(_))
    ));
    let recreated = recreated.unwrap();
    assert_eq!(
        recreated.get("k", ReadOptions::default()).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn should_keep_data_across_close_and_reopen() {
    // given
    let engine = Arc::new(InMemoryEngine::new());
    let session = Session::open_with_engine(engine.clone(), "/lifecycle/reopen", OpenOptions::create())
        .await
        .unwrap();
    session.put("k", "v", WriteOptions::sync()).await.unwrap();
    session.flush().await.unwrap();
    session.close().await.unwrap();

    // when
    let reopened =
        Session::open_with_engine(engine, "/lifecycle/reopen", OpenOptions::default())
            .await
            .unwrap();

    // then
    assert_eq!(
        reopened.get("k", ReadOptions::default()).await.unwrap().unwrap(),
        "v"
    );
}

#[tokio::test]
async fn should_reject_second_open_while_store_is_held() {
    // given
    let engine = Arc::new(InMemoryEngine::new());
    let _held = Session::open_with_engine(engine.clone(), "/lifecycle/lock", OpenOptions::create())
        .await
        .unwrap();

    // when
    let second = Session::open_with_engine(engine.clone(), "/lifecycle/lock", OpenOptions::create()).await;
    let destroyed = kvsession::destroy_with_engine(engine, "/lifecycle/lock").await;

    // then
    assert!(matches!(
        second.err().unwrap(),
        kvsession::Error::Engine(StorageError::Io(_))
    ));
    assert_eq!(destroyed.unwrap_err().kind(), ErrorKind::EngineFailure);
}

#[tokio::test]
async fn should_reject_existing_store_with_error_if_exists() {
    // given
    let engine = Arc::new(InMemoryEngine::new());
    Session::open_with_engine(engine.clone(), "/lifecycle/exists", OpenOptions::create())
        .await
        .unwrap()
        .close()
        .await
        .unwrap();
    let options = OpenOptions {
        error_if_exists: true,
        ..OpenOptions::create()
    };

    // when
    let result = Session::open_with_engine(engine, "/lifecycle/exists", options).await;

    // then
    assert_eq!(result.err().unwrap().kind(), ErrorKind::EngineFailure);
}

#[tokio::test]
async fn should_reject_invalid_open_options_before_reaching_engine() {
    // given
    let engine = Arc::new(InMemoryEngine::new());
    let options = OpenOptions {
        block_size: 0,
        ..OpenOptions::create()
    };

    // when
    let result = Session::open_with_engine(engine.clone(), "/lifecycle/invalid", options).await;

    // then
    assert_eq!(result.err().unwrap().kind(), ErrorKind::InvalidOption);
    assert!(!engine.exists(std::path::Path::new("/lifecycle/invalid")));
}

#[tokio::test]
async fn should_open_from_config_on_global_engine() {
    // given
    let config = Config::from_json(
        r#"{"path": "/lifecycle/global-config", "options": {"createIfMissing": true, "writeBufferSize": 1048576}}"#,
    )
    .unwrap();

    // when
    let session = Session::open_config(config).await.unwrap();
    session.put("k", "v", WriteOptions::default()).await.unwrap();
    session.close().await.unwrap();

    // then
    kvsession::repair("/lifecycle/global-config").await.unwrap();
    kvsession::destroy("/lifecycle/global-config").await.unwrap();
    kvsession::destroy("/lifecycle/global-config").await.unwrap();
    let err = kvsession::repair("/lifecycle/global-config").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EngineFailure);
}

#[tokio::test]
async fn should_invalidate_everything_derived_from_closed_session() {
    init_tracing();

    // given
    let engine = Arc::new(InMemoryEngine::new());
    let session = Session::open_with_engine(engine, "/lifecycle/close", OpenOptions::create())
        .await
        .unwrap();
    session.put("a", "1", WriteOptions::default()).await.unwrap();
    let clone = session.clone();
    let snapshot = session.new_snapshot().await.unwrap();
    let mut iter = session
        .new_iterator(IteratorOptions::default())
        .await
        .unwrap();
    iter.seek_to_first().await.unwrap();

    // when
    session.close().await.unwrap();

    // then
    assert!(clone.is_closed());
    assert_eq!(
        clone
            .get("a", ReadOptions::default())
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        clone
            .put("b", "2", WriteOptions::default())
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        clone.new_snapshot().await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        clone.property("kv.stats").await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        clone.approximate_size("a", "z").await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        snapshot
            .get("a", ReadOptions::default())
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(iter.value().unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(
        iter.seek_to_last().await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
    assert!(clone.close().await.is_ok());

    // and releasing afterwards still balances the books
    iter.release();
    snapshot.release();
    assert_eq!(session.open_iterators(), 0);
    assert_eq!(session.open_snapshots(), 0);
}

#[tokio::test]
async fn should_fail_session_operations_outside_lifetime_of_dropped_session() {
    // given
    let engine = Arc::new(InMemoryEngine::new());
    let session = Session::open_with_engine(engine, "/lifecycle/dropped", OpenOptions::create())
        .await
        .unwrap();
    let snapshot = session.new_snapshot().await.unwrap();
    let mut iter = session
        .new_iterator(IteratorOptions::default())
        .await
        .unwrap();

    // when
    drop(session);

    // then
    assert_eq!(
        snapshot
            .get("a", ReadOptions::default())
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::InvalidState
    );
    assert_eq!(
        iter.seek_to_first().await.unwrap_err().kind(),
        ErrorKind::InvalidState
    );
}
