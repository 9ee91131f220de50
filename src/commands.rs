use anyhow::{Context, Result};
use console::style;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::config::Config;
use crate::database::sqlite::SqliteEngine;
use crate::indexer::{SchemaIndex, index_database};
use crate::ollama::OllamaClient;
use crate::pipeline::{Pipeline, PipelineSettings, QueryResult, RequestState, Stage};

const STATUS_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

fn spinner(message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}").expect("style template is valid"),
    );
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

/// Rebuild the schema index from the configured database
#[inline]
pub async fn index_schema(config: &Config) -> Result<()> {
    info!(
        "Indexing schema of {}",
        config.database_path().display()
    );

    let bar = spinner("Embedding schema documents...");
    let result = index_database(config).await;
    bar.finish_and_clear();

    let stats = result.context("Failed to index database schema")?;
    println!(
        "{} Indexed {} tables and views ({} dimensions)",
        style("✓").green(),
        stats.documents_indexed,
        stats.vector_dimension
    );
    Ok(())
}

/// Connect every backend named in `config` into a pipeline
#[inline]
pub async fn build_pipeline(config: &Config) -> Result<Pipeline> {
    let index = SchemaIndex::open(config)
        .await
        .context("Failed to open schema index")?;
    let completion = OllamaClient::new(config).context("Failed to initialize Ollama client")?;
    let engine = SqliteEngine::open(config.database_path()).await?;

    Ok(Pipeline::new(
        Arc::new(index),
        Arc::new(completion),
        Arc::new(engine),
        PipelineSettings::from_config(config),
    ))
}

/// One-line progress description for a completed stage
#[inline]
pub fn describe_stage(state: &RequestState) -> Option<String> {
    let description = match state.stage() {
        Stage::Retrieved => format!(
            "Retrieved {} relevant tables: {}",
            state.documents().len(),
            state.documents().iter().map(|doc| doc.id.as_str()).join(", ")
        ),
        Stage::EmptyContext => "No relevant tables found".to_string(),
        Stage::Queried => match state.statement().and_then(|s| s.as_sql()) {
            Some(sql) => format!("Generated query: {}", sql),
            None => "Could not generate a query".to_string(),
        },
        Stage::Executed => match state.result() {
            Some(QueryResult::Rows(rows)) => format!("Query returned {} rows", rows.len()),
            Some(QueryResult::EngineError(message)) => format!("Query failed: {}", message),
            None => return None,
        },
        Stage::Bounded => match state.bounded() {
            Some(bounded) if bounded.truncated => format!(
                "Result truncated for the model ({} rows in total)",
                bounded.full_count.unwrap_or_default()
            ),
            _ => return None,
        },
        Stage::Start | Stage::QueryError | Stage::Answered | Stage::AnsweredError => return None,
    };
    Some(description)
}

/// Answer one question and stream the reply to stdout
#[inline]
pub async fn ask(config: &Config, question: &str, verbose: bool) -> Result<()> {
    let pipeline = build_pipeline(config).await?;

    let report = |state: &RequestState| {
        if verbose {
            if let Some(line) = describe_stage(state) {
                eprintln!("{} {}", style("→").cyan(), style(line).dim());
            }
        }
    };

    let answer = pipeline.answer_observed(question, &report).await?;
    let (_state, mut fragments) = answer.into_parts();

    let mut stdout = std::io::stdout();
    while let Some(fragment) = fragments.next().await {
        write!(stdout, "{}", fragment?)?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}

/// Report the health of every backend
#[inline]
pub async fn show_status(config: &Config) -> Result<()> {
    println!("{}", style("📊 SQL RAG Status Report").bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    println!("🗄️  Database Status:");
    let database_path = config.database_path();
    match SqliteEngine::open(&database_path).await {
        Ok(engine) => match engine.schema_sources().await {
            Ok(sources) => println!(
                "   ✅ SQLite: {} ({} tables and views)",
                database_path.display(),
                sources.len()
            ),
            Err(e) => println!("   ⚠️  SQLite: Opened but unreadable - {:#}", e),
        },
        Err(e) => println!("   ❌ SQLite: {:#}", e),
    }

    println!("🤖 Ollama Status:");
    match OllamaClient::new(config) {
        Ok(client) => match tokio::task::spawn_blocking(move || {
            client
                .with_retry_attempts(1)
                .with_timeout(STATUS_CHECK_TIMEOUT)
                .health_check()
        })
        .await
        {
            Ok(Ok(())) => {
                println!(
                    "   ✅ Ollama: Connected ({}:{})",
                    config.ollama.host, config.ollama.port
                );
                println!("   📋 Embedding model: {}", config.ollama.embedding_model);
                println!("   📋 Completion model: {}", config.ollama.completion_model);
            }
            Ok(Err(e)) => println!("   ⚠️  Ollama: Unhealthy - {:#}", e),
            Err(e) => println!("   ❌ Ollama: Health check failed - {}", e),
        },
        Err(e) => println!("   ❌ Ollama: Failed to initialize - {:#}", e),
    }

    println!("🔍 Vector Database Status:");
    match crate::database::lancedb::VectorStore::new(config).await {
        Ok(store) => match store.count().await {
            Ok(0) => println!("   ⚠️  LanceDB: Empty, run 'sql-rag index' first"),
            Ok(count) => println!("   ✅ LanceDB: {} schema documents indexed", count),
            Err(e) => println!("   ❌ LanceDB: {}", e),
        },
        Err(e) => println!("   ❌ LanceDB: Failed to connect - {}", e),
    }

    Ok(())
}
