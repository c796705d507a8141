use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mcphub_collect::ProgressEmitter;
use mcphub_core::CollectRequest;
use mcphub_storage::{Favorites, JsonFileFavoriteStore};
use mcphub_web::{ExportFormat, HubConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "mcphub-cli")]
#[command(about = "MCP Resource Hub command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the HTTP API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one collection and print or write the export.
    Collect {
        #[command(flatten)]
        request: RequestArgs,
        #[arg(long, default_value = "json")]
        format: ExportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Print the simulated progress events as JSON lines.
    Progress {
        #[command(flatten)]
        request: RequestArgs,
    },
    Favorites {
        #[arg(long)]
        file: Option<PathBuf>,
        #[command(subcommand)]
        action: FavoritesAction,
    },
}

#[derive(Debug, clap::Args)]
struct RequestArgs {
    /// Search term; repeat for several. Defaults to the built-in list.
    #[arg(long = "term", short = 't')]
    terms: Vec<String>,
    /// Skip the GitHub repository search.
    #[arg(long)]
    no_github: bool,
}

impl RequestArgs {
    fn to_request(&self) -> Result<CollectRequest> {
        Ok(CollectRequest::new(&self.terms, !self.no_github)?)
    }
}

#[derive(Debug, Subcommand)]
enum FavoritesAction {
    List,
    Add { url: String },
    Remove { url: String },
    Toggle { url: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mcphub=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = HubConfig::from_env();

    match cli.command.unwrap_or(Commands::Serve { port: None }) {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.port = port;
            }
            mcphub_web::serve(config).await?;
        }
        Commands::Collect {
            request,
            format,
            out,
        } => {
            let request = request.to_request()?;
            let result = config.build_collector()?.collect(&request).await;
            let rendered = format.render(&result)?;
            match out {
                Some(path) => {
                    tokio::fs::write(&path, rendered)
                        .await
                        .with_context(|| format!("writing {}", path.display()))?;
                    info!(
                        resources = result.resources.len(),
                        path = %path.display(),
                        "collection exported"
                    );
                }
                None => println!("{rendered}"),
            }
        }
        Commands::Progress { request } => {
            let request = request.to_request()?;
            let mut emitter = ProgressEmitter::new(&request, config.emitter_config());
            while let Some(event) = emitter.next().await {
                println!("{}", serde_json::to_string(&event)?);
            }
        }
        Commands::Favorites { file, action } => {
            let path = file.unwrap_or(config.favorites_path);
            let favorites = Favorites::new(JsonFileFavoriteStore::new(path));
            match action {
                FavoritesAction::List => {
                    for url in favorites.list().await? {
                        println!("{url}");
                    }
                }
                FavoritesAction::Add { url } => {
                    let added = favorites.add(&url).await?;
                    println!("{}", if added { "added" } else { "already a favorite" });
                }
                FavoritesAction::Remove { url } => {
                    let removed = favorites.remove(&url).await?;
                    println!("{}", if removed { "removed" } else { "not a favorite" });
                }
                FavoritesAction::Toggle { url } => {
                    let now_favorite = favorites.toggle(&url).await?;
                    println!("{}", if now_favorite { "added" } else { "removed" });
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_flags_build_a_request() {
        let cli = Cli::try_parse_from([
            "mcphub-cli",
            "collect",
            "-t",
            "MCP tutorial",
            "--term",
            "Anthropic MCP",
            "--no-github",
            "--format",
            "csv",
        ])
        .unwrap();
        let Some(Commands::Collect { request, format, out }) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(format, ExportFormat::Csv);
        assert!(out.is_none());
        let request = request.to_request().unwrap();
        assert_eq!(request.terms(), ["MCP tutorial", "Anthropic MCP"]);
        assert!(!request.include_secondary_source());
    }

    #[test]
    fn progress_without_terms_uses_defaults() {
        let cli = Cli::try_parse_from(["mcphub-cli", "progress"]).unwrap();
        let Some(Commands::Progress { request }) = cli.command else {
            panic!("expected progress");
        };
        assert_eq!(request.to_request().unwrap().total_steps(), 10);
    }

    #[test]
    fn unknown_export_format_is_rejected() {
        assert!(Cli::try_parse_from(["mcphub-cli", "collect", "--format", "xml"]).is_err());
    }

    #[test]
    fn favorites_subcommands_parse() {
        let cli = Cli::try_parse_from([
            "mcphub-cli",
            "favorites",
            "--file",
            "/tmp/favs.json",
            "toggle",
            "https://mcp.so/",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Favorites {
                action: FavoritesAction::Toggle { .. },
                ..
            })
        ));
    }
}
