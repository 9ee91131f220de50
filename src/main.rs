use clap::{Parser, Subcommand};
use sql_rag::Result;
use sql_rag::commands::{ask, index_schema, show_status};
use sql_rag::config::{Config, run_interactive_config, show_config};

#[derive(Parser, Debug)]
#[command(name = "sql-rag")]
#[command(about = "Answer natural-language questions about a SQL database")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configure Ollama connection, retrieval and database settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Embed the database schema into the vector index
    Index,
    /// Ask a question about the database
    Ask {
        /// The question, in any language
        question: String,
        /// Print retrieval, query and execution progress
        #[arg(long, short)]
        verbose: bool,
    },
    /// Show the status of the database, Ollama and the vector index
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Index => {
            index_schema(&Config::load_default()?).await?;
        }
        Commands::Ask { question, verbose } => {
            ask(&Config::load_default()?, &question, verbose).await?;
        }
        Commands::Status => {
            show_status(&Config::load_default()?).await?;
        }
    }

    Ok(())
}
