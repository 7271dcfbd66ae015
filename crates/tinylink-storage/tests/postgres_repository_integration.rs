use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tinylink_storage::{
    PostgresRepository, ReadRepository, Record, Repository, ShortCode, Stats, StorageError,
};
use tinylink_test_infra::postgres::PostgresServer;

struct Fixture {
    _postgres: PostgresServer,
    repo: PostgresRepository,
}

impl Fixture {
    async fn start() -> Self {
        let postgres = PostgresServer::start_default()
            .await
            .expect("start postgres");
        let url = postgres.database_url().await.expect("postgres url");
        let pool = connect_with_retry(&url).await;

        let repo = PostgresRepository::new(pool);
        repo.initialize().await.expect("create schema");

        Self {
            _postgres: postgres,
            repo,
        }
    }
}

async fn connect_with_retry(url: &str) -> sqlx::PgPool {
    let mut last_error = None;

    for _ in 0..20 {
        match PgPoolOptions::new().max_connections(5).connect(url).await {
            Ok(pool) => return pool,
            Err(err) => {
                last_error = Some(err);
                tokio::time::sleep(Duration::from_millis(500)).await;
            }
        }
    }

    panic!("failed to connect postgres: {last_error:?}");
}

fn code(value: &str) -> ShortCode {
    ShortCode::new(value)
}

#[tokio::test]
async fn add_and_get_record() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .add_record(Record::new("https://example.com", "abc123", "alice"))
        .await
        .unwrap();

    let url = fixture.repo.get_record(&code("abc123")).await.unwrap();
    assert_eq!(url, "https://example.com");
    fixture.repo.ping().await.unwrap();
}

#[tokio::test]
async fn get_unknown_code_is_not_found() {
    let fixture = Fixture::start().await;

    let err = fixture.repo.get_record(&code("missing")).await.unwrap_err();
    assert!(matches!(err, StorageError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_url_reports_existing_code() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .add_record(Record::new("https://example.com", "first", "alice"))
        .await
        .unwrap();

    let err = fixture
        .repo
        .add_record(Record::new("https://example.com", "second", "bob"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        StorageError::UniqueViolation {
            existing_code: "first".to_string()
        }
    );
    assert!(matches!(
        fixture.repo.get_record(&code("second")).await,
        Err(StorageError::NotFound(_))
    ));
}

#[tokio::test]
async fn batch_is_all_or_nothing() {
    let fixture = Fixture::start().await;

    // The third code exceeds the 24 character column and fails the batch.
    let err = fixture
        .repo
        .add_records(vec![
            Record::new("https://one.example", "one", "alice"),
            Record::new("https://two.example", "two", "alice"),
            Record::new("https://three.example", "x".repeat(30), "alice"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Query(_)));

    assert!(fixture.repo.get_user_records("alice").await.unwrap().is_empty());
    assert!(matches!(
        fixture.repo.get_record(&code("one")).await,
        Err(StorageError::NotFound(_))
    ));

    fixture
        .repo
        .add_records(vec![
            Record::new("https://one.example", "one", "alice"),
            Record::new("https://two.example", "two", "alice"),
        ])
        .await
        .unwrap();
    assert_eq!(fixture.repo.get_user_records("alice").await.unwrap().len(), 2);
}

#[tokio::test]
async fn batch_with_stored_url_reports_existing_code() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .add_record(Record::new("https://one.example", "first", "alice"))
        .await
        .unwrap();

    let err = fixture
        .repo
        .add_records(vec![
            Record::new("https://two.example", "two", "alice"),
            Record::new("https://one.example", "again", "alice"),
        ])
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StorageError::UniqueViolation {
            existing_code: "first".to_string()
        }
    );

    // nothing from the rejected batch is visible
    for missing in ["two", "again"] {
        assert!(matches!(
            fixture.repo.get_record(&code(missing)).await,
            Err(StorageError::NotFound(_))
        ));
    }
    assert_eq!(
        fixture.repo.get_record(&code("first")).await.unwrap(),
        "https://one.example"
    );
}

#[tokio::test]
async fn batch_repeating_a_url_is_rejected() {
    let fixture = Fixture::start().await;

    let err = fixture
        .repo
        .add_records(vec![
            Record::new("https://one.example", "one", "alice"),
            Record::new("https://one.example", "two", "alice"),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::InvalidData(_)));
    assert!(fixture.repo.get_user_records("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_is_owner_scoped_and_monotonic() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .add_records(vec![
            Record::new("https://one.example", "one", "alice"),
            Record::new("https://two.example", "two", "bob"),
        ])
        .await
        .unwrap();

    fixture
        .repo
        .delete_urls("alice", &[code("one"), code("two"), code("missing")])
        .await
        .unwrap();

    assert!(matches!(
        fixture.repo.get_record(&code("one")).await,
        Err(StorageError::Deleted(_))
    ));
    assert_eq!(
        fixture.repo.get_record(&code("two")).await.unwrap(),
        "https://two.example"
    );

    fixture
        .repo
        .delete_urls("alice", &[code("one")])
        .await
        .unwrap();
    assert!(matches!(
        fixture.repo.get_record(&code("one")).await,
        Err(StorageError::Deleted(_))
    ));
    assert!(fixture.repo.get_user_records("alice").await.unwrap().is_empty());
}

#[tokio::test]
async fn stats_count_live_records() {
    let fixture = Fixture::start().await;

    fixture
        .repo
        .add_records(vec![
            Record::new("https://one.example", "one", "alice"),
            Record::new("https://two.example", "two", "alice"),
            Record::new("https://three.example", "three", "bob"),
        ])
        .await
        .unwrap();
    fixture
        .repo
        .delete_urls("bob", &[code("three")])
        .await
        .unwrap();

    assert_eq!(
        fixture.repo.stats().await.unwrap(),
        Stats { urls: 2, users: 1 }
    );
}

#[tokio::test]
async fn close_is_idempotent() {
    let fixture = Fixture::start().await;

    fixture.repo.close().await.unwrap();
    fixture.repo.close().await.unwrap();
    assert!(fixture.repo.ping().await.is_err());
}

#[tokio::test]
async fn ensure_database_creates_missing_database() {
    let postgres = PostgresServer::start_default()
        .await
        .expect("start postgres");
    // wait until the server accepts connections at all
    let ready = connect_with_retry(&postgres.database_url().await.unwrap()).await;
    ready.close().await;

    let url = postgres.database_url_for("tinylink_created").await.unwrap();
    assert!(PostgresRepository::connect(&url).await.is_err());

    PostgresRepository::ensure_database(&url).await.unwrap();
    // a second run finds the database and does nothing
    PostgresRepository::ensure_database(&url).await.unwrap();

    let repo = PostgresRepository::connect(&url).await.unwrap();
    repo.initialize().await.unwrap();
    repo.add_record(Record::new("https://example.com", "abc", "alice"))
        .await
        .unwrap();
    assert_eq!(
        repo.get_record(&code("abc")).await.unwrap(),
        "https://example.com"
    );
}
