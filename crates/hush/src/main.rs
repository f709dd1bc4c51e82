use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use hush_server::{
    file::{self, FileReference},
    CreateOptions, HttpStore, HushError, ReceiptRouting, SecretLifecycle, SecretPayload,
    SecretType,
};
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hush", about = "hush: one-time secret links", version)]
struct Cli {
    /// hush service URL (default: http://localhost:8080 or $HUSH_SERVER)
    #[arg(long, env = "HUSH_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Base for share links (default: the service URL)
    #[arg(long, env = "HUSH_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the hush service
    Serve {
        /// Port to listen on (default: $HUSH_PORT or 8080)
        #[arg(long, env = "HUSH_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $HUSH_HOST or 0.0.0.0)
        #[arg(long, env = "HUSH_HOST", default_value = "0.0.0.0")]
        host: String,
        /// Drop unread secrets after this long, e.g. 7d
        #[arg(long, env = "HUSH_RETENTION")]
        retention: Option<String>,
    },
    /// Create a one-time secret and print its link
    Create {
        /// Message to share (read from stdin when omitted)
        message: Option<String>,
        /// Also encrypt with a password the recipient must know
        #[arg(long)]
        password: Option<String>,
        /// text, url or neogram
        #[arg(long = "type", default_value = "text")]
        secret_type: SecretType,
        /// Use a custom alias instead of a random one
        #[arg(long)]
        alias: Option<String>,
        /// Neogram only: text shown during the countdown
        #[arg(long)]
        neogram_message: Option<String>,
        /// Neogram only: countdown in seconds
        #[arg(long)]
        neogram_timeout: Option<u32>,
        /// Encrypted read-receipt email token
        #[arg(long)]
        receipt_email: Option<String>,
        /// Encrypted read-receipt phone token
        #[arg(long)]
        receipt_phone: Option<String>,
    },
    /// Encrypt a file, write the blob, and share a link to it
    CreateFile {
        /// File to share
        path: PathBuf,
        /// Where to write the encrypted blob
        #[arg(long)]
        blob_out: PathBuf,
        /// Where the recipient will find the blob (defaults to --blob-out)
        #[arg(long)]
        location: Option<String>,
        #[arg(long)]
        mime_type: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Open a share link. The secret is destroyed on the server.
    Retrieve {
        /// Share link or alias/key
        link: String,
        /// Password for secrets created with --password
        #[arg(long)]
        password: Option<String>,
        /// File secrets: the downloaded encrypted blob
        #[arg(long, requires = "out")]
        blob: Option<PathBuf>,
        /// File secrets: where to write the decrypted file
        #[arg(long, requires = "blob")]
        out: Option<PathBuf>,
    },
    /// Remove a password layer from ciphertext printed by `retrieve`
    Decrypt {
        ciphertext: String,
        #[arg(long)]
        password: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("HUSH_LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let base_url = cli.base_url.clone().unwrap_or_else(|| cli.server.clone());

    match cli.command {
        Commands::Serve {
            port,
            host,
            retention,
        } => cmd_serve(host, port, retention.as_deref()).await,

        Commands::Create {
            message,
            password,
            secret_type,
            alias,
            neogram_message,
            neogram_timeout,
            receipt_email,
            receipt_phone,
        } => {
            let message = match message {
                Some(m) => m,
                None => read_stdin()?,
            };
            let receipt = ReceiptRouting {
                email: receipt_email,
                phone_number: receipt_phone,
            };
            let options = CreateOptions {
                alias,
                password,
                secret_type,
                neogram_destruction_message: neogram_message,
                neogram_destruction_timeout: neogram_timeout,
                receipt: Some(receipt),
                ..Default::default()
            };
            cmd_create(&cli.server, &base_url, &message, options).await
        }

        Commands::CreateFile {
            path,
            blob_out,
            location,
            mime_type,
            password,
        } => {
            cmd_create_file(
                &cli.server,
                &base_url,
                &path,
                &blob_out,
                location,
                mime_type.as_deref(),
                password,
            )
            .await
        }

        Commands::Retrieve {
            link,
            password,
            blob,
            out,
        } => cmd_retrieve(&cli.server, &link, password.as_deref(), blob.zip(out)).await,

        Commands::Decrypt {
            ciphertext,
            password,
        } => {
            let plaintext = hush_server::decrypt_message(&ciphertext, &password)
                .context("wrong password or damaged ciphertext")?;
            println!("{plaintext}");
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16, retention: Option<&str>) -> Result<()> {
    let cfg = hush_server::ServerConfig {
        host,
        port,
        retention: retention.map(parse_duration).transpose()?,
        ..Default::default()
    };

    hush_server::run(cfg).await
}

fn lifecycle(server: &str, base_url: &str) -> Result<SecretLifecycle<HttpStore>> {
    Ok(SecretLifecycle::new(HttpStore::new(server)?, base_url))
}

async fn cmd_create(
    server: &str,
    base_url: &str,
    message: &str,
    options: CreateOptions,
) -> Result<()> {
    let created = lifecycle(server, base_url)?
        .create_secret(message, options)
        .await?;
    println!("{}", created.secret_link);
    Ok(())
}

async fn cmd_create_file(
    server: &str,
    base_url: &str,
    path: &Path,
    blob_out: &Path,
    location: Option<String>,
    mime_type: Option<&str>,
    password: Option<String>,
) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .context("file name is not valid UTF-8")?;
    let location = location.unwrap_or_else(|| blob_out.display().to_string());

    let (blob, reference) = file::seal_file(&data, name, mime_type, &location)?;
    std::fs::write(blob_out, &blob)
        .with_context(|| format!("write blob {}", blob_out.display()))?;

    let options = CreateOptions {
        password,
        secret_type: SecretType::File,
        ..Default::default()
    };
    let created = lifecycle(server, base_url)?
        .create_secret(&reference.to_message()?, options)
        .await?;

    eprintln!("✓ encrypted blob written to {}", blob_out.display());
    println!("{}", created.secret_link);
    Ok(())
}

async fn cmd_retrieve(
    server: &str,
    link: &str,
    password: Option<&str>,
    file_paths: Option<(PathBuf, PathBuf)>,
) -> Result<()> {
    // The base URL only matters for creating links.
    let payload = match lifecycle(server, server)?.retrieve_link(link).await {
        Ok(p) => p,
        Err(HushError::SecretNotFound) => {
            anyhow::bail!("this secret no longer exists: it was already viewed or never created")
        }
        Err(e) => return Err(e.into()),
    };

    let message = match (payload.is_encrypted_with_user_password, password) {
        (false, _) => payload.message.clone(),
        (true, Some(pw)) => payload.decrypt_with_password(pw).map_err(|_| {
            anyhow::anyhow!(
                "wrong password; the secret is already destroyed, keep this ciphertext to retry \
                 with `hush decrypt`:\n{}",
                payload.message
            )
        })?,
        (true, None) => {
            eprintln!("this secret is password protected; decrypt it with `hush decrypt --password …`");
            println!("{}", payload.message);
            return Ok(());
        }
    };

    print_payload(&payload, &message, file_paths)
}

fn print_payload(
    payload: &SecretPayload,
    message: &str,
    file_paths: Option<(PathBuf, PathBuf)>,
) -> Result<()> {
    match payload.secret_type {
        SecretType::Text | SecretType::Url => println!("{message}"),
        SecretType::Neogram => {
            println!("{message}");
            if let (Some(text), Some(secs)) = (
                &payload.neogram_destruction_message,
                payload.neogram_destruction_timeout,
            ) {
                eprintln!("{text} {secs}s");
            }
        }
        SecretType::File => {
            let reference = FileReference::from_message(message)?;
            match file_paths {
                Some((blob_path, out)) => {
                    let blob = std::fs::read(&blob_path)
                        .with_context(|| format!("read blob {}", blob_path.display()))?;
                    let data = file::open_file(&reference, &blob)?;
                    std::fs::write(&out, data)
                        .with_context(|| format!("write {}", out.display()))?;
                    eprintln!("✓ wrote {} ({} bytes)", out.display(), reference.size);
                }
                None => {
                    eprintln!(
                        "file secret: fetch the blob from {} and rerun with --blob/--out, \
                         or keep this reference",
                        reference.location
                    );
                    println!("{}", serde_json::to_string_pretty(&reference)?);
                }
            }
        }
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("read message from stdin")?;
    Ok(buf.trim_end_matches(['\r', '\n']).to_owned())
}

/// Parse human duration strings like "1h", "30m", "7d" into a `Duration`.
fn parse_duration(s: &str) -> Result<std::time::Duration> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    Ok(d.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_retention_durations() {
        assert_eq!(parse_duration("7d").unwrap().as_secs(), 7 * 86400);
        assert_eq!(parse_duration("30m").unwrap().as_secs(), 1800);
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn cli_parses_create_options() {
        let cli = Cli::try_parse_from([
            "hush",
            "create",
            "hello",
            "--type",
            "neogram",
            "--neogram-timeout",
            "10",
        ])
        .unwrap();
        match cli.command {
            Commands::Create {
                message,
                secret_type,
                neogram_timeout,
                ..
            } => {
                assert_eq!(message.as_deref(), Some("hello"));
                assert_eq!(secret_type, SecretType::Neogram);
                assert_eq!(neogram_timeout, Some(10));
            }
            _ => panic!("expected create"),
        }
    }

    #[test]
    fn retrieve_requires_blob_and_out_together() {
        assert!(Cli::try_parse_from(["hush", "retrieve", "a/b", "--blob", "x"]).is_err());
        assert!(
            Cli::try_parse_from(["hush", "retrieve", "a/b", "--blob", "x", "--out", "y"]).is_ok()
        );
    }
}
