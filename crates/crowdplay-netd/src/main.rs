use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{Level, info, warn};
use tracing_subscriber::FmtSubscriber;

use crowdplay_netd::config::Config;
use crowdplay_netd::dispatch::{Command, Verb, run_worker};
use crowdplay_netd::net::ws::run_listener;
use crowdplay_netd::server::{ServerCore, register_heartbeat};

/// Collaborative emulator server
#[derive(Parser, Debug)]
#[command(name = "crowdplay-netd")]
#[command(about = "Multi-user libretro emulator server over WebSocket", long_about = None)]
struct Args {
    /// WebSocket bind address
    #[arg(short, long, default_value = "0.0.0.0:5610")]
    bind: String,

    /// JSON config file; defaults apply when the file is missing
    #[arg(short, long, default_value = "crowdplay.json")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    /// Host an emulator at startup, as `<id>:<corePath>:<romPath>`.
    /// May be given multiple times.
    #[arg(long)]
    emu: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = Config::load(&args.config)?;
    let (server, cmd_rx) = ServerCore::new(config);
    register_heartbeat(&server);

    let worker = {
        let server = Arc::clone(&server);
        std::thread::Builder::new()
            .name("dispatch".to_string())
            .spawn(move || run_worker(server, cmd_rx))?
    };

    // Operator-provided emulators go through the same queue as client
    // `add` commands; connection id 0 is never allocated to a socket.
    for spec in &args.emu {
        let parts: Vec<&str> = spec.splitn(3, ':').collect();
        let [id, core, rom] = parts.as_slice() else {
            warn!(%spec, "ignoring malformed --emu (want id:core:rom)");
            continue;
        };
        server.enqueue(Command::Client {
            conn: 0,
            verb: Verb::Add,
            params: vec![id.to_string(), core.to_string(), rom.to_string()],
        });
    }

    let listener = TcpListener::bind(&args.bind).await?;
    info!("listening on {}", args.bind);

    tokio::select! {
        res = run_listener(listener, Arc::clone(&server)) => res?,
        _ = tokio::signal::ctrl_c() => info!("interrupt received"),
    }

    server.shutdown();
    let _ = worker.join();
    server.sched.stop();
    Ok(())
}
