use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |name| map.get(name).cloned()
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
    assert_eq!(config.embedding.base_url(), "https://api.openai.com/v1");
    assert_eq!(config.embedding.model, "text-embedding-3-small");
    assert_eq!(config.vector_store.backend, VectorBackend::Pinecone);
    assert_eq!(config.vector_store.namespace, "gita");
    assert_eq!(config.ingest.batch_size, 32);
    assert_eq!(config.ingest.max_attempts, 5);
    assert_eq!(config.ingest.rate_limit_cooldown(), Duration::from_secs(20));
    assert_eq!(config.ingest.pacing_delay(), Duration::from_millis(300));
    assert_eq!(config.ingest.request_timeout(), Duration::from_secs(120));
    assert_eq!(config.retrieval.top_k, 4);

    let families: Vec<RecordFamily> = config.sources.iter().map(|s| s.family).collect();
    assert_eq!(families, RecordFamily::ALL.to_vec());
    assert_eq!(config.sources[0].path, PathBuf::from("data/verses.csv"));
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_provider_uses_local_endpoint() {
    let config: Config = toml::from_str(
        r#"
            [embedding]
            provider = "ollama"
            model = "nomic-embed-text"
        "#,
    )
    .expect("should parse toml successfully");

    assert_eq!(config.embedding.provider, EmbeddingProvider::Ollama);
    assert_eq!(config.embedding.base_url(), "http://localhost:11434");
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.embedding.model = "   ".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidModel(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.ingest.batch_size = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidBatchSize(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.ingest.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ingest.max_attempts = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidMaxAttempts(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.completion.base_url = "ftp://example.com".to_string();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidUrl(_))
    ));

    let mut invalid_config = config.clone();
    invalid_config.embedding.base_url = Some("not a url".to_string());
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.vector_store.namespace = String::new();
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::EmptyNamespace)
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config;
    invalid_config.completion.temperature = 3.5;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn retry_policy_from_ingest_settings() {
    let ingest = IngestConfig {
        max_attempts: 3,
        base_delay_ms: 250,
        max_delay_ms: Some(400),
        max_total_backoff_ms: Some(1000),
        ..IngestConfig::default()
    };

    let policy = ingest.retry_policy();
    assert_eq!(policy.max_attempts, 3);
    assert_eq!(policy.base_delay, Duration::from_millis(250));
    assert_eq!(policy.delay_before_retry(3), Duration::from_millis(400));
    assert_eq!(policy.max_total_delay, Some(Duration::from_secs(1)));
}

#[test]
fn load_missing_config_uses_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");

    let config = Config::load_with(temp_dir.path(), no_env).expect("should load config");

    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.vector_database_path(), temp_dir.path().join("vectors"));
    assert_eq!(config.embedding, EmbeddingConfig::default());
}

#[test]
fn partial_config_keeps_defaults() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        r#"
            [ingest]
            batch_size = 50

            [vector_store]
            backend = "lancedb"
            path = "store"

            [[sources]]
            family = "practices"
            path = "/srv/practices.csv"
        "#,
    )
    .expect("should write config");

    let config = Config::load_with(temp_dir.path(), no_env).expect("should load config");

    assert_eq!(config.ingest.batch_size, 50);
    assert_eq!(config.ingest.max_attempts, 5);
    assert_eq!(config.vector_store.backend, VectorBackend::LanceDb);
    assert_eq!(config.vector_database_path(), temp_dir.path().join("store"));
    assert_eq!(config.sources.len(), 1);
    assert_eq!(config.sources[0].family, RecordFamily::Practices);
}

#[test]
fn invalid_file_is_rejected() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(temp_dir.path().join("config.toml"), "[ingest\nbatch_size = 1")
        .expect("should write config");
    assert!(Config::load_with(temp_dir.path(), no_env).is_err());

    fs::write(
        temp_dir.path().join("config.toml"),
        "[ingest]\nbatch_size = 0\n",
    )
    .expect("should write config");
    assert!(Config::load_with(temp_dir.path(), no_env).is_err());
}

#[test]
fn environment_overrides_file() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[vector_store]\nhost = \"file-host\"\nnamespace = \"file-ns\"\n",
    )
    .expect("should write config");

    let config = Config::load_with(
        temp_dir.path(),
        env_of(&[
            ("PINECONE_HOST", "env-host.pinecone.io"),
            ("GITA_RAG_NAMESPACE", " verses "),
        ]),
    )
    .expect("should load config");

    assert_eq!(
        config.vector_store.host.as_deref(),
        Some("env-host.pinecone.io")
    );
    assert_eq!(config.vector_store.namespace, "verses");
}

#[test]
fn blank_environment_values_are_ignored() {
    let mut config = Config::default();
    config.apply_env_overrides(env_of(&[("GITA_RAG_NAMESPACE", "")]));
    assert_eq!(config.vector_store.namespace, "gita");
}

#[test]
fn save_and_reload() {
    let temp_dir = TempDir::new().expect("should create TempDir successfully");
    let config_dir = temp_dir.path().join("nested");

    let mut config = Config {
        base_dir: config_dir.clone(),
        ..Config::default()
    };
    config.embedding.dimension = Some(1536);
    config.retrieval.top_k = 6;
    config.save().expect("should save config");

    let loaded = Config::load_with(&config_dir, no_env).expect("should load config");
    assert_eq!(loaded, config);
}

#[test]
fn absolute_vector_path_is_kept() {
    let mut config = Config::default();
    config.vector_store.path = Some(PathBuf::from("/var/lib/gita/vectors"));
    assert_eq!(
        config.vector_database_path(),
        PathBuf::from("/var/lib/gita/vectors")
    );
}

#[test]
fn error_display_messages() {
    let errors = vec![
        ConfigError::InvalidBatchSize(0),
        ConfigError::InvalidModel(String::new()),
        ConfigError::InvalidUrl("invalid-url".to_string()),
        ConfigError::EmptyNamespace,
        ConfigError::MissingCredential("OPENAI_API_KEY"),
    ];

    for error in errors {
        let message = format!("{error}");
        assert!(message.len() > 10);
    }
}
