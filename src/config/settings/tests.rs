use super::*;
use serial_test::serial;
use tempfile::TempDir;

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.completion_model, "llama3.2:3b");
    assert_eq!(config.retrieval.top_k, 10);
    assert!((config.retrieval.distance_threshold - 1.3).abs() < f32::EPSILON);
    assert!((config.retrieval.distance_cutoff - 0.5).abs() < f32::EPSILON);
    assert_eq!(config.database.dialect, "sqlite");
    assert_eq!(config.answer.max_display_rows, 30);
}

#[test]
fn config_validation() {
    let config = Config::default();
    assert!(config.validate().is_ok());

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.completion_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.top_p = 0.0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.distance_threshold = -0.1;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.distance_cutoff = f32::NAN;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.database.dialect = "  ".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.answer.max_display_rows = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_round_trip() {
    let mut config = Config::default();
    config.retrieval.top_k = 4;
    config.database.path = PathBuf::from("/data/chinook.db");

    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_config_uses_defaults() {
    let partial_toml = r#"
        [ollama]
        host = "gpu-box"

        [retrieval]
        distance_cutoff = 0.8
    "#;

    let config: Config = toml::from_str(partial_toml).expect("partial config should parse");
    assert_eq!(config.ollama.host, "gpu-box");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.retrieval.top_k, 10);
    assert!((config.retrieval.distance_cutoff - 0.8).abs() < f32::EPSILON);
    assert_eq!(config.answer, AnswerConfig::default());
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_embedding_model("mxbai-embed-large".to_string()).is_ok());
    assert!(config.set_completion_model("gemma3:27b".to_string()).is_ok());
    assert!(config.set_temperature(0.0).is_ok());
    assert!(config.set_batch_size(128).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_completion_model(String::new()).is_err());
    assert!(config.set_temperature(2.5).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());

    assert_eq!(config.protocol, "https");
    assert_eq!(config.completion_model, "gemma3:27b");
}

#[test]
fn load_missing_file_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let config = Config::load(temp_dir.path()).expect("should load defaults");

    assert_eq!(config.get_base_dir(), temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
}

#[test]
fn save_and_load() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = Config {
        base_dir: temp_dir.path().join("nested"),
        ..Config::default()
    };
    config.ollama.completion_model = "llama3.3:70b".to_string();
    config.answer.max_display_rows = 50;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path().join("nested")).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[retrieval]\ntop_k = 500\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn database_path_resolution() {
    let config = Config {
        base_dir: PathBuf::from("/home/user/.sql-rag"),
        ..Config::default()
    };
    assert_eq!(
        config.database_path(),
        PathBuf::from("/home/user/.sql-rag/sakila.db")
    );
    assert_eq!(
        config.vector_database_path(),
        PathBuf::from("/home/user/.sql-rag/vectors")
    );

    let mut absolute = config;
    absolute.database.path = PathBuf::from("/srv/db/store.db");
    assert_eq!(absolute.database_path(), PathBuf::from("/srv/db/store.db"));
}

#[test]
#[serial]
fn config_dir_honours_env_override() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    // SAFETY: serialized with other env-touching tests
    unsafe { std::env::set_var(CONFIG_DIR_ENV, temp_dir.path()) };
    let dir = Config::config_dir();
    unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

    assert_eq!(dir.expect("should resolve config dir"), temp_dir.path());
}
