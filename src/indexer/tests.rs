use super::*;
use crate::config::OllamaConfig;
use serde_json::{Value, json};
use tempfile::TempDir;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Embeds text into one of three axes depending on which table it mentions
struct KeywordEmbedder;

fn keyword_vector(text: &str) -> Vec<f32> {
    let text = text.to_lowercase();
    if text.contains("actor") {
        vec![1.0, 0.0, 0.0]
    } else if text.contains("film") {
        vec![0.0, 1.0, 0.0]
    } else {
        vec![0.0, 0.0, 1.0]
    }
}

impl Respond for KeywordEmbedder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = request.body_json().expect("embed request should be json");
        let embeddings: Vec<Vec<f32>> = body["input"]
            .as_array()
            .expect("input should be an array")
            .iter()
            .map(|text| keyword_vector(text.as_str().unwrap_or_default()))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "embeddings": embeddings }))
    }
}

async fn setup(server: &MockServer) -> (Config, TempDir) {
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(KeywordEmbedder)
        .mount(server)
        .await;

    let url = Url::parse(&server.uri()).expect("mock server uri should parse");
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            host: url.host_str().expect("mock server has host").to_string(),
            port: url.port().expect("mock server has port"),
            embedding_dimension: 3,
            ..OllamaConfig::default()
        },
        ..Config::default()
    };
    (config, temp_dir)
}

fn sources() -> Vec<SchemaSource> {
    vec![
        SchemaSource {
            name: "actor".to_string(),
            ddl: "CREATE TABLE actor (actor_id INTEGER, first_name TEXT)".to_string(),
        },
        SchemaSource {
            name: "film".to_string(),
            ddl: "CREATE TABLE film (film_id INTEGER, title TEXT)".to_string(),
        },
        SchemaSource {
            name: "payment".to_string(),
            ddl: "CREATE TABLE payment (payment_id INTEGER, amount REAL)".to_string(),
        },
    ]
}

#[tokio::test]
async fn empty_index_answers_without_embedding() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = setup(&server).await;

    let index = SchemaIndex::open(&config).await.expect("should open index");
    let documents = index.query("How many actors?", 10).await.expect("query");

    assert!(documents.is_empty());
    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn rebuild_then_query_ranks_relevant_table_first() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = setup(&server).await;

    let mut index = SchemaIndex::open(&config).await.expect("should open index");
    let stats = index.rebuild(&sources()).await.expect("should rebuild");
    assert_eq!(
        stats,
        IndexingStats {
            documents_indexed: 3,
            vector_dimension: 3
        }
    );
    assert_eq!(index.document_count().await.expect("count"), 3);

    let documents = index.query("How many actors are there?", 10).await.expect("query");
    assert_eq!(documents.len(), 3);
    assert_eq!(documents[0].id, "actor");
    assert!(documents[0].text.starts_with("CREATE TABLE actor"));
    assert!(documents[0].distance < 1e-4);
    assert!(documents.iter().all(|d| d.distance >= 0.0));
}

#[tokio::test]
async fn rebuild_replaces_previous_documents() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = setup(&server).await;

    let mut index = SchemaIndex::open(&config).await.expect("should open index");
    index.rebuild(&sources()).await.expect("first rebuild");
    index
        .rebuild(&sources()[..1])
        .await
        .expect("second rebuild");

    assert_eq!(index.document_count().await.expect("count"), 1);
}

#[tokio::test]
async fn embedding_failure_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/embed"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let url = Url::parse(&server.uri()).expect("mock server uri should parse");
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ollama: OllamaConfig {
            host: url.host_str().expect("mock server has host").to_string(),
            port: url.port().expect("mock server has port"),
            embedding_dimension: 3,
            ..OllamaConfig::default()
        },
        ..Config::default()
    };

    let mut index = SchemaIndex::new(
        OllamaClient::new(&config)
            .expect("should create client")
            .with_retry_attempts(1),
        VectorStore::new(&config).await.expect("should open store"),
    );
    let result = index.rebuild(&sources()).await;
    assert!(matches!(result, Err(RagError::Embedding(_))));
}

#[tokio::test]
async fn index_database_reads_sqlite_schema() {
    let server = MockServer::start().await;
    let (mut config, temp_dir) = setup(&server).await;

    let db_path = temp_dir.path().join("store.db");
    let options = sqlx::sqlite::SqliteConnectOptions::new()
        .filename(&db_path)
        .create_if_missing(true);
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("should create database");
    for statement in [
        "CREATE TABLE actor (actor_id INTEGER PRIMARY KEY)",
        "CREATE TABLE film (film_id INTEGER PRIMARY KEY)",
    ] {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .expect("should create table");
    }
    pool.close().await;
    config.database.path = "store.db".into();

    let stats = index_database(&config).await.expect("should index database");
    assert_eq!(stats.documents_indexed, 2);
}

#[tokio::test]
async fn index_database_requires_existing_file() {
    let server = MockServer::start().await;
    let (config, _temp_dir) = setup(&server).await;

    let result = index_database(&config).await;
    assert!(matches!(result, Err(RagError::Database(_))));
}
