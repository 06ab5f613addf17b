//! TR-069 device agent
//!
//! Serves the device parameter tree over a Unix command socket and,
//! optionally, a local TCP port. A client sending `quitquitquit` stops the
//! process with exit status 123.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cwmp_agent::config::Settings;
use cwmp_agent::device::{build_tree, wl_surface};
use cwmp_agent::hooks::{ExternalInstaller, ExternalWakeup};
use cwmp_agent::protocol::{bind_unix, Dispatcher, Server};
use cwmp_agent::tree::SessionCache;

/// Exit status after a client asked the agent to stop
const EXIT_QUITQUITQUIT: i32 = 123;

/// TR-069 device agent
#[derive(Parser, Debug)]
#[command(name = "cwmp-agent")]
#[command(version, about = "TR-069 device agent command socket")]
struct Args {
    /// Configuration file path
    #[arg(short, long, env = "CWMP_AGENT_CONFIG")]
    config: Option<PathBuf>,

    /// Unix command socket path
    #[arg(long, env = "CWMP_AGENT_UNIX_SOCKET")]
    unix_socket: Option<PathBuf>,

    /// TCP command listener address
    #[arg(long, env = "CWMP_AGENT_TCP_LISTEN")]
    tcp_listen: Option<String>,

    /// Do not listen on TCP
    #[arg(long)]
    no_tcp: bool,

    /// Enable debug logging
    #[arg(short, long, env = "CWMP_AGENT_DEBUG")]
    debug: bool,

    /// Print the device tree as JSON and exit
    #[arg(long)]
    dump: bool,

    /// Check the device tree against its schemas and exit
    #[arg(long)]
    validate: bool,

    /// Write the effective settings as TOML to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_config: Option<PathBuf>,
}

fn settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::load(args.config.as_deref())?;

    if let Some(path) = &args.unix_socket {
        settings.unix_socket = path.clone();
    }
    if let Some(addr) = &args.tcp_listen {
        settings.tcp_listen = Some(addr.clone());
    }
    if args.no_tcp {
        settings.tcp_listen = None;
    }
    settings.debug |= args.debug;

    Ok(settings)
}

fn dispatcher(settings: &Settings) -> Result<Dispatcher> {
    let tree = build_tree(settings, |ifname| wl_surface(settings, ifname))
        .context("Failed to build device tree")?;

    let mut dispatcher = Dispatcher::new(tree);
    if let Some(program) = &settings.installer {
        dispatcher = dispatcher.with_downloader(Arc::new(ExternalInstaller::new(program)));
    }
    if let Some(argv) = &settings.wakeup_command {
        dispatcher = dispatcher.with_session_trigger(Arc::new(ExternalWakeup::new(argv.clone())?));
    }
    Ok(dispatcher)
}

async fn serve(settings: &Settings, server: Server) -> Result<i32> {
    let unix = bind_unix(&settings.unix_socket).with_context(|| {
        format!("Failed to bind {}", settings.unix_socket.display())
    })?;

    let tcp = match &settings.tcp_listen {
        Some(addr) => {
            let listener = TcpListener::bind(addr)
                .await
                .with_context(|| format!("Failed to bind {}", addr))?;
            tracing::info!(addr = %addr, "Listening on TCP");
            Some(listener)
        }
        None => None,
    };
    let serve_tcp = async {
        match tcp {
            Some(listener) => server.serve_tcp(listener).await,
            None => std::future::pending().await,
        }
    };

    let code = tokio::select! {
        result = server.serve_unix(unix) => {
            result.context("Unix command socket failed")?;
            0
        }
        result = serve_tcp => {
            result.context("TCP command socket failed")?;
            0
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted");
            0
        }
        _ = server.shutdown_requested() => EXIT_QUITQUITQUIT,
    };

    if let Err(e) = std::fs::remove_file(&settings.unix_socket) {
        tracing::debug!(error = %e, "Failed to remove command socket");
    }
    Ok(code)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();
    let settings = settings(&args);

    // Initialize logging
    let debug = args.debug || settings.as_ref().map_or(false, |s| s.debug);
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = settings?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        radios = settings.wlan.len(),
        "Starting cwmp-agent"
    );

    if let Some(path) = &args.write_config {
        settings.save(path).await?;
        tracing::info!(path = %path.display(), "Settings written");
        return Ok(());
    }

    let mut dispatcher = dispatcher(&settings)?;

    if args.validate {
        dispatcher.tree().validate_exports("")?;
        tracing::info!("Device tree is valid");
        return Ok(());
    }
    if args.dump {
        let mut cache = SessionCache::new();
        let dump = dispatcher.tree_mut().dump(&mut cache)?;
        println!("{}", serde_json::to_string_pretty(&dump)?);
        return Ok(());
    }

    let code = serve(&settings, Server::new(dispatcher)).await?;
    if code != 0 {
        tracing::info!(code, "Exiting on client request");
        std::process::exit(code);
    }
    Ok(())
}
