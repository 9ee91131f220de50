// Configuration management module
// Handles TOML configuration for the model server, retrieval policy and target database

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{
    AnswerConfig, Config, ConfigError, DatabaseConfig, OllamaConfig, RetrievalConfig,
};

