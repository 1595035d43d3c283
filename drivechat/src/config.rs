//! Command-line and environment configuration.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Value of `--qdrant-url` that selects the in-process store.
pub const IN_MEMORY_STORE: &str = ":memory:";

#[derive(Debug, Parser)]
#[command(name = "drivechat")]
#[command(
    about = "Ask questions about your Google Drive documents.",
    long_about = "Indexes the documents in your Google Drive with Gemini embeddings and \
                  answers questions about them, either in an interactive terminal loop or \
                  through a small web front end."
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub app: AppArgs,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the drive and start an interactive question loop
    Chat,
    /// Serve the web front end
    Serve(ServeArgs),
}

/// Settings shared by both front ends.
#[derive(Debug, Clone, Args)]
pub struct AppArgs {
    /// Gemini API key (falls back to GEMINI_API_KEY)
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true, global = true)]
    pub api_key: Option<String>,

    /// Qdrant server URL, or ":memory:" for the in-process store
    #[arg(long, env = "QDRANT_URL", default_value = IN_MEMORY_STORE, global = true)]
    pub qdrant_url: String,

    /// OAuth client secrets downloaded from the Google Cloud console
    #[arg(long, env = "DRIVECHAT_CREDENTIALS", default_value = "credentials.json", global = true)]
    pub credentials: PathBuf,

    /// Where the OAuth token is persisted between runs
    #[arg(long, env = "DRIVECHAT_TOKEN", default_value = "token.json", global = true)]
    pub token: PathBuf,

    /// Local port that receives the OAuth consent redirect
    #[arg(long, env = "DRIVECHAT_REDIRECT_PORT", default_value_t = 8000, global = true)]
    pub redirect_port: u16,

    /// Print the consent URL instead of opening a browser
    #[arg(long, global = true)]
    pub no_browser: bool,

    /// Files requested per Drive listing page
    #[arg(long, env = "DRIVECHAT_PAGE_SIZE", default_value_t = 100, global = true)]
    pub page_size: u32,

    /// Stop listing the drive after this many pages
    #[arg(long, env = "DRIVECHAT_MAX_PAGES", global = true)]
    pub max_pages: Option<usize>,

    /// Gemini embedding model, e.g. "models/text-embedding-004"
    #[arg(long, env = "EMBEDDING_MODEL", global = true)]
    pub embedding_model: Option<String>,

    /// Gemini generation model, e.g. "models/gemini-2.5-flash-lite"
    #[arg(long, env = "GENERATION_MODEL", global = true)]
    pub generation_model: Option<String>,
}

impl AppArgs {
    pub fn uses_in_memory_store(&self) -> bool {
        self.qdrant_url == IN_MEMORY_STORE
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address to bind
    #[arg(long, env = "DRIVECHAT_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "DRIVECHAT_PORT", default_value_t = 8501)]
    pub port: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_accepts_host_and_port() {
        let cli = Cli::try_parse_from(["drivechat", "serve", "--port", "9000"]).unwrap();
        match cli.command {
            Command::Serve(args) => assert_eq!(args.port, 9000),
            Command::Chat => panic!("expected serve"),
        }
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli =
            Cli::try_parse_from(["drivechat", "chat", "--qdrant-url", "http://localhost:6334"])
                .unwrap();
        assert!(!cli.app.uses_in_memory_store());
        assert!(matches!(cli.command, Command::Chat));
    }

    #[test]
    fn drive_paging_and_models_are_configurable() {
        let cli = Cli::try_parse_from([
            "drivechat",
            "chat",
            "--max-pages",
            "3",
            "--page-size",
            "50",
            "--embedding-model",
            "models/embedding-001",
        ])
        .unwrap();
        assert_eq!(cli.app.max_pages, Some(3));
        assert_eq!(cli.app.page_size, 50);
        assert_eq!(cli.app.embedding_model.as_deref(), Some("models/embedding-001"));
    }
}
