use std::sync::Arc;

use hush_server::{
    decrypt_message, router, AppState, CreateOptions, HttpStore, HushError, MemoryStore,
    RedbStore, SecretLifecycle, SecretRecord, SecretStore, SecretType,
};
use tempfile::tempdir;

const BASE: &str = "https://hush.example";
const RACERS: usize = 16;

/// Race `RACERS` retrievals of one secret; return (successes, not-found).
async fn race<S: SecretStore + Clone>(hush: SecretLifecycle<S>) -> (usize, usize) {
    let created = hush
        .create_secret("only once", CreateOptions::default())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..RACERS {
        let hush = hush.clone();
        let alias = created.alias.clone();
        let key = created.encryption_key.clone();
        handles.push(tokio::spawn(async move {
            hush.retrieve_secret(&alias, &key).await
        }));
    }

    let (mut ok, mut not_found) = (0, 0);
    for handle in handles {
        match handle.await.unwrap() {
            Ok(payload) => {
                assert_eq!(payload.message, "only once");
                ok += 1;
            }
            Err(HushError::SecretNotFound) => not_found += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    (ok, not_found)
}

#[tokio::test]
async fn end_to_end_scenario() {
    let hush = SecretLifecycle::new(MemoryStore::new(), BASE);

    let created = hush
        .create_secret("I love you!", CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(created.alias.len(), hush_server::ids::URL_ALIAS_LENGTH);
    assert_eq!(
        created.encryption_key.len(),
        hush_server::ids::ENCRYPTION_KEY_LENGTH
    );
    assert!(created.secret_link.starts_with("https://hush.example/l#"));

    let payload = hush
        .retrieve_secret(&created.alias, &created.encryption_key)
        .await
        .unwrap();
    assert_eq!(payload.message, "I love you!");

    let err = hush
        .retrieve_secret(&created.alias, &created.encryption_key)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retrieval_memory_store() {
    let hush = SecretLifecycle::new(MemoryStore::new(), BASE);
    assert_eq!(race(hush).await, (1, RACERS - 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_retrieval_redb_store() {
    let dir = tempdir().unwrap();
    let store = RedbStore::open(&dir.path().join("race.db")).unwrap();
    let hush = SecretLifecycle::new(store, BASE);
    assert_eq!(race(hush).await, (1, RACERS - 1));
}

#[tokio::test]
async fn failed_lookup_changes_nothing() {
    let store = MemoryStore::new();
    let hush = SecretLifecycle::new(store.clone(), BASE);
    let created = hush
        .create_secret("still here", CreateOptions::default())
        .await
        .unwrap();

    assert!(matches!(
        hush.retrieve_secret("doesNotExist42", "key").await,
        Err(HushError::SecretNotFound)
    ));
    assert_eq!(store.len(), 1);
    assert!(store.contains(&created.alias));
}

async fn serve(store: Arc<dyn SecretStore>, max_message_bytes: usize) -> String {
    let app = router(
        AppState {
            store,
            max_message_bytes,
        },
        None,
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn spawn_service(max_message_bytes: usize) -> (String, tempfile::TempDir) {
    let dir = tempdir().unwrap();
    let store = RedbStore::open(&dir.path().join("svc.db")).unwrap();
    (serve(Arc::new(store), max_message_bytes).await, dir)
}

fn raw_record(alias: &str, message: String) -> SecretRecord {
    SecretRecord {
        alias: alias.into(),
        message,
        secret_type: SecretType::Text,
        is_encrypted_with_user_password: false,
        neogram_destruction_message: None,
        neogram_destruction_timeout: None,
        receipt: None,
    }
}

#[tokio::test]
async fn round_trip_through_http_service() {
    let (server, _dir) = spawn_service(1_048_576).await;
    let hush = SecretLifecycle::new(HttpStore::new(&server).unwrap(), BASE);

    let created = hush
        .create_secret(
            "https://example.com/launch-codes",
            CreateOptions {
                password: Some("correct horse".into()),
                secret_type: SecretType::Url,
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let payload = hush.retrieve_link(&created.secret_link).await.unwrap();
    assert_eq!(payload.secret_type, SecretType::Url);
    assert!(payload.is_encrypted_with_user_password);
    assert_eq!(
        decrypt_message(&payload.message, "correct horse").unwrap(),
        "https://example.com/launch-codes"
    );

    assert!(matches!(
        hush.retrieve_link(&created.secret_link).await,
        Err(HushError::SecretNotFound)
    ));
}

#[tokio::test]
async fn http_service_rejects_duplicates_and_oversize() {
    let (server, _dir) = spawn_service(256).await;
    let hush = SecretLifecycle::new(HttpStore::new(&server).unwrap(), BASE);

    let fixed = CreateOptions {
        alias: Some("fixed-alias".into()),
        ..Default::default()
    };
    hush.create_secret("first", fixed.clone()).await.unwrap();
    assert!(matches!(
        hush.create_secret("second", fixed).await,
        Err(HushError::AliasCollision(_))
    ));

    let big = "x".repeat(1024);
    assert!(matches!(
        hush.create_secret(&big, CreateOptions::default()).await,
        Err(HushError::Storage(e)) if e.contains("400")
    ));
}

#[tokio::test]
async fn health_endpoint_responds() {
    let (server, _dir) = spawn_service(1024).await;
    let body: serde_json::Value = reqwest::get(format!("{server}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn configured_limit_above_framework_default_is_honoured() {
    const EIGHT_MIB: usize = 8 * 1024 * 1024;
    let (server, _dir) = spawn_service(EIGHT_MIB).await;
    let client = reqwest::Client::new();

    let three_mib = "A".repeat(3 * 1024 * 1024);
    let resp = client
        .post(format!("{server}/secrets"))
        .json(&raw_record("large-secret", three_mib.clone()))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .delete(format!("{server}/secrets/large-secret"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let record: SecretRecord = resp.json().await.unwrap();
    assert_eq!(record.message.len(), three_mib.len());

    let too_big = "A".repeat(EIGHT_MIB + 1);
    let resp = client
        .post(format!("{server}/secrets"))
        .json(&raw_record("too-large", too_big))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn malformed_body_gets_json_error() {
    let (server, _dir) = spawn_service(1024).await;
    let client = reqwest::Client::new();

    for body in ["{not json", r#"{"alias": "x"}"#] {
        let resp = client
            .post(format!("{server}/secrets"))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
        let err: serde_json::Value = resp.json().await.unwrap();
        assert!(err["error"].is_string(), "body {body:?} gave {err}");
    }

    let resp = client
        .post(format!("{server}/secrets"))
        .body("alias=x")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 415);
    let err: serde_json::Value = resp.json().await.unwrap();
    assert!(err["error"].is_string());
}

#[tokio::test]
async fn service_runs_over_any_store() {
    let store = MemoryStore::new();
    let server = serve(Arc::new(store.clone()), 1024).await;
    let hush = SecretLifecycle::new(HttpStore::new(&server).unwrap(), BASE);

    let created = hush
        .create_secret("kept in memory", CreateOptions::default())
        .await
        .unwrap();
    assert!(store.contains(&created.alias));

    let payload = hush.retrieve_link(&created.secret_link).await.unwrap();
    assert_eq!(payload.message, "kept in memory");
    assert!(store.is_empty());
}
