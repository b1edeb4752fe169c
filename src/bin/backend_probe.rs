//! Establish one backend connection and report how it went.
//!
//! Useful for checking from a proxy host that a backend is reachable, accepts
//! TLS and takes the startup message:
//!
//! ```bash
//! RUST_LOG=sqlproxy_backend=debug backend-probe \
//!     --address 10.0.0.12:26257 --user root --database defaultdb --sslmode require
//! ```

use clap::Parser;
use sqlproxy_backend::connection::SslMode;
use sqlproxy_backend::{
    BackendAddress, BackendConnector, DialerConfig, StartupParameters, TlsConfig,
};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "backend-probe", version, about)]
struct Args {
    /// Backend address, host[:port]
    #[arg(long)]
    address: String,

    /// Role to present in the startup message (default: current OS user)
    #[arg(long)]
    user: Option<String>,

    /// Database to present in the startup message
    #[arg(long)]
    database: Option<String>,

    /// Extra startup parameter, key=value (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// TLS mode: disable, require, or verify-full
    #[arg(long, default_value = "disable")]
    sslmode: SslMode,

    /// CA certificate (PEM) used to verify the backend
    #[arg(long)]
    ca_cert: Option<String>,

    /// Dial timeout in milliseconds
    #[arg(long, default_value_t = 5000)]
    timeout_ms: u64,

    /// Bound on the whole handshake in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,
}

fn startup_parameters(args: &Args) -> sqlproxy_backend::Result<StartupParameters> {
    let user = args.user.clone().unwrap_or_else(whoami::username);
    let mut builder = StartupParameters::builder().user(user);
    if let Some(database) = &args.database {
        builder = builder.database(database.clone());
    }
    for param in &args.params {
        let (key, value) = param.split_once('=').ok_or_else(|| {
            sqlproxy_backend::Error::Config(format!("expected KEY=VALUE, got '{}'", param))
        })?;
        builder = builder.param(key, value);
    }
    builder.build()
}

async fn probe(args: Args) -> sqlproxy_backend::Result<()> {
    let address = BackendAddress::parse(&args.address)?;
    let params = startup_parameters(&args)?;
    let tls = TlsConfig::for_mode(args.sslmode, args.ca_cert.as_deref())?;

    let connector = BackendConnector::new(
        DialerConfig::builder()
            .connect_timeout(Duration::from_millis(args.timeout_ms))
            .build(),
    );

    let mut transport = match args.deadline_ms {
        Some(ms) => {
            let deadline = tokio::time::Instant::now() + Duration::from_millis(ms);
            connector
                .establish_with_deadline(&params, &address, tls.as_ref(), deadline)
                .await?
        }
        None => connector.establish(&params, &address, tls.as_ref()).await?,
    };

    println!(
        "connected to {} ({} -> {}, {}), startup message relayed for user '{}'",
        address,
        transport.local_addr()?,
        transport.peer_addr()?,
        if transport.is_tls() { "tls" } else { "plaintext" },
        params.user()
    );
    transport.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match probe(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(sqlproxy_backend::Error::Dial(err)) => {
            eprintln!("{}: {}", err.code(), err.display_chain());
            eprintln!("kind: {}", err.kind());
            ExitCode::FAILURE
        }
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::from(2)
        }
    }
}
