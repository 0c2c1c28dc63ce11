use clap::{Parser, Subcommand};

/// prlens: AI-assisted review of pull request pages
#[derive(Parser, Debug, Clone)]
#[command(name = "prlens", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Path to config file (default: .prlens/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Model API key (overrides PRLENS_API_KEY / GEMINI_API_KEY / config)
    #[arg(long, global = true)]
    pub api_key: Option<String>,

    /// Model to review with
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Review depth (quick, standard, thorough)
    #[arg(long, global = true)]
    pub depth: Option<String>,

    /// Comma-separated focus areas (bugs, security, performance, style, naming, docs, tests)
    #[arg(long, global = true)]
    pub focus: Option<String>,

    /// Access token for the remote content API
    #[arg(long, global = true)]
    pub access_token: Option<String>,

    /// State directory (default: .prlens)
    #[arg(long, global = true)]
    pub state_dir: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Review a captured page snapshot, or a pull request URL directly
    Review {
        /// Path to a page snapshot JSON file
        #[arg(long)]
        snapshot: Option<String>,

        /// Page address (defaults to the snapshot's own URL)
        #[arg(long)]
        url: Option<String>,

        /// What to review (current, all, selected)
        #[arg(long, default_value = "all")]
        scope: String,
    },

    /// Serve the inbound command protocol on stdin/stdout
    Serve,

    /// Print accumulated review statistics
    Stats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_review_defaults() {
        let cli = Cli::parse_from(["prlens", "review", "--snapshot", "page.json"]);
        match cli.command {
            Command::Review {
                snapshot,
                url,
                scope,
            } => {
                assert_eq!(snapshot.as_deref(), Some("page.json"));
                assert!(url.is_none());
                assert_eq!(scope, "all");
            }
            _ => panic!("expected review subcommand"),
        }
    }

    #[test]
    fn test_parse_review_url_only() {
        let cli = Cli::parse_from([
            "prlens",
            "review",
            "--url",
            "https://dev.azure.com/o/p/_git/r/pullrequest/1",
            "--scope",
            "current",
        ]);
        match cli.command {
            Command::Review { url, scope, .. } => {
                assert!(url.unwrap().contains("pullrequest/1"));
                assert_eq!(scope, "current");
            }
            _ => panic!("expected review subcommand"),
        }
    }

    #[test]
    fn test_parse_global_args_after_subcommand() {
        let cli = Cli::parse_from([
            "prlens", "serve", "--api-key", "k", "--depth", "quick", "--model", "m",
        ]);
        assert!(matches!(cli.command, Command::Serve));
        assert_eq!(cli.api_key.as_deref(), Some("k"));
        assert_eq!(cli.depth.as_deref(), Some("quick"));
        assert_eq!(cli.model.as_deref(), Some("m"));
    }

    #[test]
    fn test_parse_stats() {
        let cli = Cli::parse_from(["prlens", "stats", "--state-dir", "/tmp/s"]);
        assert!(matches!(cli.command, Command::Stats));
        assert_eq!(cli.state_dir.as_deref(), Some("/tmp/s"));
    }
}
