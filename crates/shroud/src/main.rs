use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "shroud", about = "Shroud: one-time encrypted secret links", version)]
struct Cli {
    /// Shroud server URL (default: http://localhost:8080 or $SHROUD_SERVER)
    #[arg(long, env = "SHROUD_SERVER", default_value = "http://localhost:8080")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Shroud HTTP server
    Serve {
        /// Port to listen on (default: $SHROUD_PORT or 8080)
        #[arg(long, env = "SHROUD_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $SHROUD_HOST or 0.0.0.0)
        #[arg(long, env = "SHROUD_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Base URL used when building share links ($SHROUD_PUBLIC_URL)
        #[arg(long, env = "SHROUD_PUBLIC_URL")]
        public_url: Option<String>,
        /// Keep shares in memory only
        #[arg(long)]
        in_memory: bool,
    },
    /// Create a one-time share and print its link
    Create {
        /// Secret text; read from --file or stdin when omitted
        text: Option<String>,
        /// Lifetime, e.g. 5m, 30m, 1h, 6h, 24h
        #[arg(long, default_value = "30m")]
        ttl: String,
        /// Read the secret from a file
        #[arg(long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },
    /// Open a share (consumes it) and print the secret
    Open {
        /// Share id or full share URL
        target: String,
    },
    /// Show the most recently created shares (id prefixes only)
    Recent,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Commands::Serve { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SHROUD_LOG_LEVEL")
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Serve {
            port,
            host,
            public_url,
            in_memory,
        } => cmd_serve(host, port, public_url, in_memory).await,

        Commands::Create { text, ttl, file } => {
            let content = read_content(text, file.as_ref())?;
            cmd_create(&cli.server, &content, &ttl).await
        }

        Commands::Open { target } => cmd_open(&cli.server, &target).await,

        Commands::Recent => cmd_recent(&cli.server).await,
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(
    host: String,
    port: u16,
    public_url: Option<String>,
    in_memory: bool,
) -> Result<()> {
    let defaults = shroud_server::ServerConfig::default();
    let cfg = shroud_server::ServerConfig {
        host,
        port,
        public_url,
        in_memory: in_memory || defaults.in_memory,
        ..defaults
    };

    shroud_server::run(cfg).await
}

async fn cmd_create(server: &str, content: &str, ttl: &str) -> Result<()> {
    let expires_at = expiry_from_ttl(ttl, Utc::now())?;

    let resp = Client::new()
        .post(format!("{}/shares", server.trim_end_matches('/')))
        .json(&serde_json::json!({
            "content": content,
            "expiresAt": expires_at.to_rfc3339(),
        }))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!("server returned {status}: {}", error_message(&json));
    }

    let url = json["url"].as_str().context("response missing url")?;
    println!("{url}");
    eprintln!("expires {} (one view only)", json["expiresAt"].as_str().unwrap_or("?"));
    Ok(())
}

async fn cmd_open(server: &str, target: &str) -> Result<()> {
    let id = share_id_from(target);
    let resp = Client::new()
        .get(format!("{}/shares/{}", server.trim_end_matches('/'), id))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        print!("{}", json["content"].as_str().unwrap_or(""));
        if !json["content"].as_str().unwrap_or("").ends_with('\n') {
            println!();
        }
        Ok(())
    } else {
        anyhow::bail!("{}", error_message(&json))
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecentItem {
    secret_prefix: String,
    created_at: DateTime<Utc>,
}

async fn cmd_recent(server: &str) -> Result<()> {
    let resp = Client::new()
        .get(format!("{}/shares/recent", server.trim_end_matches('/')))
        .send()
        .await
        .context("HTTP request failed")?;

    if !resp.status().is_success() {
        let status = resp.status();
        anyhow::bail!("server returned {status}");
    }

    let json: Value = resp.json().await?;
    let items: Vec<RecentItem> =
        serde_json::from_value(json["shares"].clone()).context("parse recent shares")?;

    if items.is_empty() {
        println!("(no shares yet)");
        return Ok(());
    }
    let now = Utc::now();
    for item in &items {
        let age = (now - item.created_at).to_std().unwrap_or_default();
        println!("  {}…  {} ago", item.secret_prefix, format_age(age.as_secs()));
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn read_content(text: Option<String>, file: Option<&PathBuf>) -> Result<String> {
    let content = match (text, file) {
        (Some(t), _) => t,
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?,
        (None, None) => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("read secret from stdin")?;
            buf
        }
    };
    if content.is_empty() {
        anyhow::bail!("refusing to share an empty secret");
    }
    Ok(content)
}

/// Turn a human duration ("30m", "6h") into an absolute expiry.
fn expiry_from_ttl(ttl: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let d: humantime::Duration = ttl
        .parse()
        .with_context(|| format!("invalid duration: {ttl}"))?;
    let d = chrono::Duration::from_std(d.into()).context("duration out of range")?;
    now.checked_add_signed(d).context("duration out of range")
}

/// Accept either a bare id or a link whose last path segment is the id.
fn share_id_from(target: &str) -> &str {
    let trimmed = target.trim().trim_end_matches('/');
    let trimmed = trimmed.split(['?', '#']).next().unwrap_or(trimmed);
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn error_message(json: &Value) -> &str {
    json["error"].as_str().unwrap_or("unknown error")
}

fn format_age(secs: u64) -> String {
    if secs >= 86400 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}
