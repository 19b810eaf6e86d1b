//! Simulated ingest - drives the core without a real RTMP transport
//!
//! Run with: cargo run --example simulated_ingest -- [--fake] [CONFIG_JSON]
//!
//! Plays the transport's part: a handful of publish handshakes, a duplicate,
//! a malformed path, a disconnect. Lifecycle events are printed as they
//! arrive and the active station report is printed as JSON.
//!
//! Without `--fake` the configured transcoder (ffmpeg) is launched for real
//! and pulls from `rtmp://127.0.0.1:<port>`; with nothing publishing there it
//! exits shortly after starting. `--fake` swaps in a shell script that just
//! sleeps (unix only).

use std::time::Duration;

use live_ingest::{ConnectionId, Decision, IngestConfig, IngestServer, PublishMetadata};

fn print_usage() {
    eprintln!("Usage: simulated_ingest [--fake] [CONFIG_JSON]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  --fake         Use a sleeping shell script instead of ffmpeg");
    eprintln!("  CONFIG_JSON    Configuration file (default: built-in defaults)");
}

#[cfg(unix)]
fn fake_transcoder(dir: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("fake-ffmpeg");
    std::fs::write(&path, "#!/bin/sh\nexec sleep 3600\n")?;
    let mut perms = std::fs::metadata(&path)?.permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms)?;
    Ok(path)
}

async fn publish(server: &IngestServer, conn: u64, path: &str) {
    let conn = ConnectionId::new(conn);
    let metadata = PublishMetadata::new()
        .with("audiocodecid", 10.0)
        .with("audiodatarate", 128.0)
        .with("audiosamplerate", 44_100.0)
        .with("stereo", true);

    match server.on_publish_attempt(conn, path, &metadata).await {
        Decision::Accept(key) => match server.on_publish_started(conn, &key, metadata).await {
            Ok(session) => println!("[{}] {} is live (session {})", conn, key, session.session_id),
            Err(e) => println!("[{}] {} failed: {} -> closing connection", conn, key, e),
        },
        Decision::Reject(reason) => println!("[{}] {} rejected: {} -> closing connection", conn, path, reason),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_usage();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("live_ingest=info".parse()?),
        )
        .init();

    let mut config = match args.iter().find(|a| !a.starts_with("--")) {
        Some(path) => IngestConfig::from_json_file(path)?,
        None => IngestConfig::default(),
    };

    let workdir = tempfile::tempdir()?;
    config = config.media_root(workdir.path().join("media"));

    if args.iter().any(|a| a == "--fake") {
        #[cfg(unix)]
        {
            config = config.transcoder(fake_transcoder(workdir.path())?);
        }
        #[cfg(not(unix))]
        {
            eprintln!("--fake is only available on unix");
            std::process::exit(1);
        }
    }

    let server = IngestServer::new(config)?;

    let mut events = server.subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => println!("  event: {}", json),
                Err(e) => eprintln!("  event not serializable: {}", e),
            }
        }
    });

    println!("=== Publishing ===");
    publish(&server, 1, "/live/station1").await;
    publish(&server, 2, "/live/station2").await;
    publish(&server, 3, "/live/station1").await;
    publish(&server, 4, "/vod/station1").await;
    publish(&server, 5, "/live/a/b").await;

    tokio::time::sleep(Duration::from_millis(500)).await;

    println!();
    println!("=== Active stations ===");
    let stations = server.list_active_stations().await;
    println!("{}", serde_json::to_string_pretty(&stations)?);

    println!();
    println!("=== Station 2 disconnects ===");
    server.on_connection_closed(ConnectionId::new(2)).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    println!("{}", serde_json::to_string_pretty(&server.list_active_stations().await)?);

    println!();
    println!("=== Shutdown ===");
    server.shutdown().await;
    println!("{}", serde_json::to_string_pretty(&server.stats().await)?);

    drop(server);
    printer.abort();
    Ok(())
}
