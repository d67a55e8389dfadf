use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use splitsocks::{Cipher, Ingress, Method, Relay, Router, Server, TableCipher, Timeouts};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "A split-routing SOCKS5 proxy with an obfuscated relay hop",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Mode,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the local SOCKS5 listener
    Local(LocalArgs),
    /// Run the upstream relay
    Relay(RelayArgs),
}

#[derive(Args, Debug)]
struct LocalArgs {
    /// Listener address
    #[arg(short, long, default_value = "127.0.0.1:1080")]
    listen: String,

    /// Upstream relay address
    #[arg(short, long)]
    relay: String,

    /// Extra pattern to dial directly (repeatable)
    #[arg(short, long = "allow")]
    allow: Vec<String>,

    /// File of direct patterns, one per line
    #[arg(long)]
    allow_list: Option<PathBuf>,

    /// Start from an empty allow-list instead of the built-in one
    #[arg(long, action)]
    no_default_allow: bool,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct RelayArgs {
    /// Listener address
    #[arg(short, long, default_value = "0.0.0.0:8388")]
    listen: String,

    #[command(flatten)]
    common: CommonArgs,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Passphrase shared by local and relay
    #[arg(short, long)]
    password: String,

    /// Substitution method: shift or permutation
    #[arg(short, long, default_value = "permutation")]
    method: String,

    /// Seconds allowed for each outbound dial
    #[arg(long)]
    dial_timeout: Option<u64>,

    /// Seconds allowed for each SOCKS5 handshake
    #[arg(long)]
    handshake_timeout: Option<u64>,
}

impl CommonArgs {
    fn cipher(&self) -> Result<Arc<dyn Cipher>> {
        let method: Method = self.method.parse()?;
        let cipher = TableCipher::new(method, &self.password)?;
        info!("relay hop obfuscation: {}", method);
        Ok(Arc::new(cipher))
    }

    fn timeouts(&self) -> Timeouts {
        Timeouts {
            dial: self.dial_timeout.map(Duration::from_secs),
            handshake: self.handshake_timeout.map(Duration::from_secs),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let cli = Cli::parse();

    // Initialize tracing subscriber
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Mode::Local(args) => run_local(args).await,
        Mode::Relay(args) => run_relay(args).await,
    }
}

async fn run_local(args: LocalArgs) -> Result<()> {
    let cipher = args.common.cipher()?;

    // Fail at startup rather than on the first relayed session
    if tokio::net::lookup_host(&args.relay)
        .await
        .with_context(|| format!("[ERR] cannot resolve relay address {}", args.relay))?
        .next()
        .is_none()
    {
        bail!("[ERR] relay address {} resolved to nothing", args.relay);
    }

    let mut router = if args.no_default_allow {
        Router::with_allow_list(Vec::<String>::new())
    } else {
        Router::default()
    };
    for pattern in args.allow {
        router = router.allow(pattern);
    }
    if let Some(path) = &args.allow_list {
        router = router.load_allow_list(path)?;
    }
    info!("{} direct routing rules loaded", router.rules().len());

    let ingress = Ingress::new(args.relay.clone(), cipher)
        .with_router(router)
        .with_timeouts(args.common.timeouts());

    // Instantiate server
    let mut server = Server::new(args.listen, ingress);

    // Run it
    info!("Starting SOCKS5 ingress: {} (relay {})", server.listen_addr, args.relay);
    server.run().await
}

async fn run_relay(args: RelayArgs) -> Result<()> {
    let cipher = args.common.cipher()?;
    let relay = Relay::new(cipher).with_timeouts(args.common.timeouts());

    let mut server = Server::new(args.listen, relay);

    info!("Starting relay: {}", server.listen_addr);
    server.run().await
}
