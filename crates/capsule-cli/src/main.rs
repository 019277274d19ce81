//! The `gemini` command: a Gemini client and a per-domain static file
//! server built on the capsule crates.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use capsule_client::{Client, Response};
use capsule_core::cancel_scope;
use capsule_server::files::FileSystemHandler;
use capsule_server::{DomainHandler, Handler, Server};
use capsule_tls::Identity;
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use tokio::io::AsyncBufReadExt;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use config::{parse_duration, DomainConfig, ServerConfig};

#[derive(Parser, Debug)]
#[command(
    name = "gemini",
    version,
    about = "Fetch Gemini URLs and serve Gemini content",
    propagate_version = true
)]
struct Cli {
    /// Increase log verbosity (-v, -vv).
    #[arg(short = 'v', action = ArgAction::Count, global = true)]
    log_verbosity: u8,

    /// Log output format.
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request a Gemini URL and print the response.
    Request(RequestArgs),
    /// Serve file trees over Gemini, one per domain.
    Serve(ServeArgs),
    /// Print the build version.
    Version,
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// Allow any server certificate.
    #[arg(long)]
    insecure: bool,

    /// Connect without TLS and skip certificate handling entirely.
    #[arg(long = "noTLS")]
    no_tls: bool,

    /// Path to a client certificate file (requires keyFile).
    #[arg(long = "certFile")]
    cert_file: Option<PathBuf>,

    /// Path to a client key file (requires certFile).
    #[arg(long = "keyFile")]
    key_file: Option<PathBuf>,

    /// Print both headers and body.
    #[arg(long)]
    verbose: bool,

    /// Print only the headers.
    #[arg(long)]
    headers: bool,

    /// Allow printing non-text responses to the console.
    #[arg(long = "allowBinary")]
    allow_binary: bool,

    /// Network read timeout, e.g. 5s or 1m.
    #[arg(long = "readTimeout", default_value = "5s", value_parser = parse_duration)]
    read_timeout: Duration,

    /// Network write timeout, e.g. 5s or 1m.
    #[arg(long = "writeTimeout", default_value = "5s", value_parser = parse_duration)]
    write_timeout: Duration,

    /// The gemini:// URL to request.
    #[arg(value_name = "URL")]
    url: String,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Path to a TOML config file; overrides the other flags.
    #[arg(long)]
    config: Option<PathBuf>,

    /// The domain to serve.
    #[arg(long, env = "DOMAIN", default_value = "localhost")]
    domain: String,

    /// Path to the server certificate file.
    #[arg(long = "certFile")]
    cert_file: Option<PathBuf>,

    /// Path to the server key file.
    #[arg(long = "keyFile")]
    key_file: Option<PathBuf>,

    /// Directory containing the content to serve.
    #[arg(long, default_value = ".")]
    path: PathBuf,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = config::DEFAULT_PORT)]
    port: u16,

    /// Request read timeout, e.g. 5s or 1m.
    #[arg(long = "readTimeout", default_value = "5s", value_parser = parse_duration)]
    read_timeout: Duration,

    /// Response write timeout, e.g. 10s or 1m.
    #[arg(long = "writeTimeout", default_value = "10s", value_parser = parse_duration)]
    write_timeout: Duration,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_verbosity, cli.log_format);
    let outcome = match cli.command {
        Command::Request(args) => run_request(args).await,
        Command::Serve(args) => run_serve(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
    };
    match outcome {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbosity: u8, format: LogFormat) {
    let default_directive = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Cancels the returned scope when Ctrl-C arrives.
fn scope_until_interrupt() -> capsule_core::CancelScope {
    let (canceller, scope) = cancel_scope();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!(target: "gemini::cli", "shutting down");
            canceller.cancel();
        }
    });
    scope
}

async fn run_request(args: RequestArgs) -> Result<ExitCode> {
    let url = Url::parse(&args.url)
        .with_context(|| format!("failed to parse gemini URL {:?}", args.url))?;

    let mut client = Client::new();
    client.read_timeout = args.read_timeout;
    client.write_timeout = args.write_timeout;
    client.insecure = args.insecure;
    if let Some(cert_file) = &args.cert_file {
        let key_file = args
            .key_file
            .as_deref()
            .context("certFile requires keyFile")?;
        let identity = Identity::from_pem_files(cert_file, key_file)
            .context("failed to parse certFile / keyFile")?;
        client.add_client_certificate("", identity);
    }

    let scope = scope_until_interrupt();
    if args.no_tls {
        let response = client
            .request_no_tls(&scope, &url)
            .await
            .context("request failed")?;
        return print_response(response, &args).await;
    }

    let fetch = client
        .request_url(&scope, &url)
        .await
        .context("request failed")?;
    if !fetch.trusted && !args.insecure {
        println!("Unexpected certificates provided by server.");
        for certificate in &fetch.certificates {
            println!("  {certificate}");
        }
        return Ok(ExitCode::FAILURE);
    }
    if args.cert_file.is_some() && !fetch.authenticated {
        println!("Authentication failed, the certificate was rejected by the server.");
        return Ok(ExitCode::FAILURE);
    }
    let response = fetch.response.context("server sent no response")?;
    print_response(response, &args).await
}

async fn print_response(mut response: Response, args: &RequestArgs) -> Result<ExitCode> {
    let header = response.header.clone();
    if args.verbose || args.headers {
        print!("{} {}\r\n", header.status, header.meta);
    }
    let failed = header.status.is_error();
    if !args.headers && !failed {
        if header.meta.starts_with("text/") {
            let mut lines = tokio::io::BufReader::new(response.body).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .context("error reading response body")?
            {
                println!("{line}");
            }
        } else if args.allow_binary {
            tokio::io::copy(&mut response.body, &mut tokio::io::stdout())
                .await
                .context("error reading binary response body")?;
        } else {
            println!("Binary output skipped, set allowBinary to allow.");
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(if failed {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

async fn run_serve(args: ServeArgs) -> Result<ExitCode> {
    let config = match &args.config {
        Some(path) => config::load_config_file(path).context("invalid config")?,
        None => {
            let (Some(cert_file), Some(key_file)) = (&args.cert_file, &args.key_file) else {
                bail!("require certFile and keyFile flags to create server");
            };
            ServerConfig {
                port: args.port,
                read_timeout: args.read_timeout,
                write_timeout: args.write_timeout,
                domains: [(
                    args.domain.clone(),
                    DomainConfig {
                        path: args.path.display().to_string(),
                        cert_file_path: cert_file.display().to_string(),
                        key_file_path: key_file.display().to_string(),
                    },
                )]
                .into_iter()
                .collect(),
            }
        }
    };

    let mut domains = Vec::new();
    for (name, domain) in &config.domains {
        let identity = Identity::from_pem_files(
            Path::new(&domain.cert_file_path),
            Path::new(&domain.key_file_path),
        )
        .with_context(|| format!("failed to load certificates for domain {name:?}"))?;
        let handler: Arc<dyn Handler> = Arc::new(FileSystemHandler::new(&domain.path));
        domains.push(DomainHandler::new(name.clone(), identity, handler));
    }

    let scope = scope_until_interrupt();
    let mut server = Server::new(scope, format!("0.0.0.0:{}", config.port), domains);
    server.read_timeout = config.read_timeout;
    server.write_timeout = config.write_timeout;
    server.listen_and_serve().await.context("server failed")?;
    Ok(ExitCode::SUCCESS)
}
