//! ajp-probe: send one request or probe to an AJP backend
//!
//! A thin wrapper around the ajp-connector library that:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Builds a worker from arguments, environment or a JSON worker file
//! 4. Runs the chosen command and prints the result

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use ajp_connector::{AjpWorker, MemoryService, WorkerConfig};
use ajp_wire::{ForwardRequest, Protocol};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "ajp-probe", version, about = "Talk to an AJP13/AJP14 backend")]
struct Args {
    /// JSON worker file; other connection flags override its values
    #[arg(long, env = "AJP_WORKER_FILE")]
    worker: Option<PathBuf>,

    /// Backend host
    #[arg(long, env = "AJP_HOST")]
    host: Option<String>,

    /// Backend port
    #[arg(long, env = "AJP_PORT")]
    port: Option<u16>,

    /// Protocol variant (ajp13 or ajp14)
    #[arg(long, env = "AJP_PROTOCOL")]
    protocol: Option<Protocol>,

    /// AJP14 login secret
    #[arg(long, env = "AJP_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// AJP13 request secret
    #[arg(long, env = "AJP_SECRET", hide_env_values = true)]
    secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forward one HTTP request and print the response
    Request {
        /// Request URI
        uri: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Extra header as `name: value`; repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short = 'd', long)]
        data: Option<String>,
    },
    /// Send CPING and wait for CPONG
    Cping {
        /// Reply timeout in milliseconds
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,
    },
    /// List the contexts an AJP14 backend serves
    Contexts {
        /// Virtual host, `*` for all
        #[arg(default_value = "*")]
        virtual_host: String,
    },
}

impl Args {
    fn worker_config(&self) -> Result<WorkerConfig> {
        let mut config = match &self.worker {
            Some(path) => WorkerConfig::from_json_file(path)?,
            None => WorkerConfig::from_env()?,
        };

        if let Some(protocol) = self.protocol {
            if self.port.is_none() && config.protocol != protocol {
                config.port = protocol.default_port();
            }
            config.protocol = protocol;
        }
        if let Some(host) = &self.host {
            config.host.clone_from(host);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if self.secret_key.is_some() {
            config.secret_key.clone_from(&self.secret_key);
        }
        if self.secret.is_some() {
            config.secret.clone_from(&self.secret);
        }
        Ok(config)
    }
}

fn parse_header(line: &str) -> Result<(String, String)> {
    let Some((name, value)) = line.split_once(':') else {
        bail!("header `{line}` is not `name: value`");
    };
    Ok((name.trim().to_ascii_lowercase(), value.trim().to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = args.worker_config()?;
    let worker = AjpWorker::new(config.clone())
        .with_context(|| format!("invalid worker configuration for {}", config.address()))?;

    match args.command {
        Command::Request {
            uri,
            method,
            headers,
            data,
        } => {
            let mut request = ForwardRequest::new(method, uri);
            request.server_name.clone_from(&config.host);
            request.server_port = config.port;
            for line in &headers {
                let (name, value) = parse_header(line)?;
                request.headers.push((name, value));
            }
            if request.header_value("host").is_none() {
                request.headers.push(("host".to_string(), config.host.clone()));
            }

            let mut service = MemoryService::new(request, data.unwrap_or_default());
            worker.service(&mut service).await?;

            let mut stdout = std::io::stdout().lock();
            if let Some(head) = service.response() {
                writeln!(stdout, "{} {}", head.status, head.reason)?;
                for (name, value) in &head.headers {
                    writeln!(stdout, "{name}: {value}")?;
                }
                writeln!(stdout)?;
            }
            stdout.write_all(service.body())?;
            stdout.flush()?;
        }
        Command::Cping { timeout_ms } => {
            let rtt = worker.cping(Duration::from_millis(timeout_ms)).await?;
            println!("CPONG from {} in {rtt:?}", config.address());
        }
        Command::Contexts { virtual_host } => {
            let info = worker.discover_contexts(&virtual_host).await?;
            println!("virtual host {}", info.virtual_host);
            for context in &info.contexts {
                println!("  {}", context.name);
                for uri in &context.uris {
                    println!("    {uri}");
                }
            }
        }
    }

    Ok(())
}
