use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kb_engine::commands::{
    add_document, delete_source, init_config, list_sources, reindex, search, show_config,
    show_info,
};

#[derive(Parser)]
#[command(name = "kb-engine")]
#[command(about = "A document knowledge base with embedding-backed similarity search")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize or show the configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index a document file into the knowledge base
    Add {
        /// Path to the document (pdf, txt, md, doc/docx, ppt/pptx)
        file: PathBuf,
    },
    /// Search the knowledge base
    Search {
        /// Query text
        query: String,
        /// Number of results to return
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        /// Print similarity scores alongside each result
        #[arg(long)]
        scores: bool,
    },
    /// Re-chunk and re-embed every indexed source from its original file
    Reindex {
        /// Override the configured chunk size (characters)
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Override the configured chunk overlap (characters)
        #[arg(long)]
        chunk_overlap: Option<usize>,
    },
    /// Show collection statistics
    Info,
    /// Delete all chunks stored for a source
    Delete {
        /// Source name to delete
        source: String,
    },
    /// List all indexed sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::Add { file } => {
            add_document(&file).await?;
        }
        Commands::Search { query, k, scores } => {
            search(&query, k, scores).await?;
        }
        Commands::Reindex {
            chunk_size,
            chunk_overlap,
        } => {
            reindex(chunk_size, chunk_overlap).await?;
        }
        Commands::Info => {
            show_info().await?;
        }
        Commands::Delete { source } => {
            delete_source(&source).await?;
        }
        Commands::Sources => {
            list_sources().await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["kb-engine", "sources"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            matches!(parsed.command, Commands::Sources);
        }
    }

    #[test]
    fn add_command_with_file() {
        let cli = Cli::try_parse_from(["kb-engine", "add", "notes.txt"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Add { file } = parsed.command {
                assert_eq!(file, PathBuf::from("notes.txt"));
            }
        }
    }

    #[test]
    fn search_command_defaults() {
        let cli = Cli::try_parse_from(["kb-engine", "search", "opportunity cost"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, k, scores } = parsed.command {
                assert_eq!(query, "opportunity cost");
                assert_eq!(k, 5);
                assert!(!scores);
            }
        }
    }

    #[test]
    fn search_command_with_options() {
        let cli = Cli::try_parse_from(["kb-engine", "search", "inflation", "-k", "3", "--scores"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search { query, k, scores } = parsed.command {
                assert_eq!(query, "inflation");
                assert_eq!(k, 3);
                assert!(scores);
            }
        }
    }

    #[test]
    fn reindex_command_with_overrides() {
        let cli = Cli::try_parse_from([
            "kb-engine",
            "reindex",
            "--chunk-size",
            "1500",
            "--chunk-overlap",
            "100",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Reindex {
                chunk_size,
                chunk_overlap,
            } = parsed.command
            {
                assert_eq!(chunk_size, Some(1500));
                assert_eq!(chunk_overlap, Some(100));
            }
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["kb-engine", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["kb-engine", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["kb-engine", "--help"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        }
    }
}
