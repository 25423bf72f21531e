/// Lectern - audiobook and podcast playback from the command line
use anyhow::Context;
use clap::{Parser, Subcommand};
use lectern_core::{progress_key, DeviceInfo, ProgressStore, RemoteSessionApi, SessionOptions};
use lectern_playback::{PlayerEvent, PlayerService, SimulatedBackend};
use lectern_server_client::LecternServerClient;
use lectern_storage::SqliteProgressStore;
use lectern_sync::{reconcile, ProgressSyncer};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::LecternConfig;

#[derive(Parser)]
#[command(name = "lectern")]
#[command(about = "Audiobook and podcast playback with server progress sync", long_about = None)]
struct Cli {
    /// Configuration file path (default: ./lectern.toml)
    #[arg(short, long, global = true, env = "LECTERN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a session and play it on the simulated local backend
    Play {
        /// Library item (book or podcast) id
        item: String,
        /// Podcast episode id
        #[arg(short, long)]
        episode: Option<String>,
        /// Stop after this many seconds of playback
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,
        /// Playback speed
        #[arg(long, default_value_t = 1.0)]
        speed: f32,
        /// Ask the server for a transcoded stream
        #[arg(long)]
        transcode: bool,
    },
    /// Upload sessions queued while offline
    Sync,
    /// Show local and server progress for a work
    Progress {
        /// Library item (book or podcast) id
        item: String,
        /// Podcast episode id
        #[arg(short, long)]
        episode: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "lectern=info,lectern_playback=info,lectern_sync=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = LecternConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Play {
            item,
            episode,
            seconds,
            speed,
            transcode,
        } => {
            play(config, &item, episode.as_deref(), seconds, speed, transcode).await?;
        }
        Commands::Sync => {
            sync(config).await?;
        }
        Commands::Progress { item, episode } => {
            show_progress(config, &item, episode.as_deref()).await?;
        }
    }

    Ok(())
}

async fn connect(config: &LecternConfig) -> anyhow::Result<(Arc<dyn RemoteSessionApi>, Arc<dyn ProgressStore>)> {
    config.validate()?;

    let client = LecternServerClient::new(config.server.clone())?;
    tracing::info!("Server: {}", config.server.url);

    let pool = lectern_storage::create_pool(&config.storage.database_url)
        .await
        .with_context(|| format!("Failed to open {}", config.storage.database_url))?;
    lectern_storage::run_migrations(&pool).await?;
    tracing::info!("Progress database ready");

    Ok((Arc::new(client), Arc::new(SqliteProgressStore::new(pool))))
}

async fn play(
    config: LecternConfig,
    item: &str,
    episode: Option<&str>,
    seconds: u64,
    speed: f32,
    transcode: bool,
) -> anyhow::Result<()> {
    let (remote, store) = connect(&config).await?;
    let device = DeviceInfo::new(config.device.device_id.clone());

    let options = if transcode {
        SessionOptions::transcode()
    } else {
        SessionOptions::default()
    };
    let session = remote
        .create_session(item, episode, &device, &options)
        .await
        .context("Failed to open a playback session")?;
    println!("Session {} - {}", session.id, session.display_title);

    let (service, player) = PlayerService::new(
        Box::new(SimulatedBackend::local()),
        remote,
        store,
        device,
        config.playback,
        config.sync,
    );
    let task = service.spawn();
    let mut events = player.subscribe();

    player.prepare(session, true, speed).await?;

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            () = &mut deadline => break,
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(event) => {
                    if print_event(&event) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Event printer lagging");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    player.shutdown();
    task.await?;
    Ok(())
}

/// Print a player event; returns `true` when playback is over
fn print_event(event: &PlayerEvent) -> bool {
    match event {
        PlayerEvent::PlaybackSession(session) => {
            println!(
                "Ready: {} at {} ({:?})",
                session.display_title,
                format_ms(session.current_time_ms),
                session.play_method
            );
            false
        }
        PlayerEvent::PlayingUpdate { is_playing } => {
            println!("{}", if *is_playing { "Playing" } else { "Paused" });
            false
        }
        PlayerEvent::Metadata {
            duration_ms,
            current_time_ms,
            state,
        } => {
            tracing::debug!(?state, "{} / {}", format_ms(*current_time_ms), format_ms(*duration_ms));
            matches!(state, lectern_playback::SessionState::Ended)
        }
        PlayerEvent::PlaybackFailed { message } => {
            eprintln!("Playback failed: {message}");
            true
        }
        PlayerEvent::BackendChanged { kind } => {
            println!("Now playing on {kind}");
            false
        }
        PlayerEvent::ProgressSyncFailing => {
            eprintln!("Progress sync failing, saving offline");
            false
        }
        PlayerEvent::ProgressSyncSuccess => {
            println!("Progress sync recovered");
            false
        }
    }
}

async fn sync(config: LecternConfig) -> anyhow::Result<()> {
    let (remote, store) = connect(&config).await?;

    let pending = store.pending().await?;
    if pending.is_empty() {
        println!("Nothing to sync");
        return Ok(());
    }
    println!("Uploading {} offline session(s)", pending.len());

    let (syncer, _outcomes) = ProgressSyncer::new(remote, store, config.sync);
    let report = syncer.queue_sync().run().await?;

    println!("Synced: {}", report.pushed);
    if report.collapsed > 0 {
        println!("Dropped {} superseded snapshot(s)", report.collapsed);
    }
    for reason in &report.rejected {
        println!("  rejected: {reason}");
    }
    Ok(())
}

async fn show_progress(config: LecternConfig, item: &str, episode: Option<&str>) -> anyhow::Result<()> {
    let (remote, store) = connect(&config).await?;

    let local = store.get_progress(&progress_key(item, episode)).await?;
    let server = remote.get_progress(item, episode).await?;

    match &local {
        Some(p) => println!(
            "Local:  {} / {}{}",
            format_ms(p.current_time_ms),
            format_ms(p.duration_ms),
            if p.is_finished { " (finished)" } else { "" }
        ),
        None => println!("Local:  none"),
    }
    match &server {
        Some(p) => println!(
            "Server: {} / {}{}",
            format_ms(p.current_time_ms),
            format_ms(p.duration_ms),
            if p.is_finished { " (finished)" } else { "" }
        ),
        None => println!("Server: none"),
    }

    if let Some(local) = local {
        let result = reconcile(
            local.current_time_ms,
            local.last_update,
            server.as_ref(),
            config.sync.remote_progress_threshold_ms,
        );
        println!(
            "Resume: {} ({:?})",
            format_ms(result.current_time_ms),
            result.source
        );
    }
    Ok(())
}

fn format_ms(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
}
