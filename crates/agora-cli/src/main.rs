use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use nostr_sdk::prelude::*;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use agora_core::error::FetchError;
use agora_core::forum::{self, ThreadDraft};
use agora_core::models::Profile;
use agora_core::views::{bell_summary, NotificationView};
use agora_core::{
    CoreConfig, Database, EventSource, IdentityProvider, NotificationStore, NotificationSync,
    RelayPool,
};

#[derive(Parser)]
#[command(name = "agora")]
#[command(about = "Nostr forum client")]
struct Cli {
    /// Data directory (defaults to the platform data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Relay URL override (can be given multiple times)
    #[arg(long = "relay")]
    relays: Vec<String>,

    /// Password for an encrypted stored key
    #[arg(long, short)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with an nsec (or raw hex key), or generate a fresh keypair
    Login {
        /// Secret key, bech32 nsec or raw hex
        #[arg(long, conflicts_with = "generate")]
        nsec: Option<String>,
        /// Generate a new keypair instead of importing one
        #[arg(long)]
        generate: bool,
    },
    /// Log out and clear the stored key
    Logout,
    /// Show the current identity
    Whoami,
    /// List cached notifications
    Notifications {
        /// Only unread
        #[arg(long)]
        unread: bool,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Mark one notification as read
    Read { id: i64 },
    /// Mark all notifications as read
    ReadAll,
    /// Delete one notification
    Delete { id: i64 },
    /// Delete all notifications
    Clear,
    /// Show or change notification settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// List known boards
    Boards,
    /// List threads on a board
    Threads {
        board: String,
        #[arg(long, default_value_t = 30)]
        limit: usize,
    },
    /// List comments under a thread
    Comments { thread_id: String },
    /// Publish a new thread
    Post {
        #[arg(long)]
        title: String,
        #[arg(long)]
        board: String,
        content: String,
    },
    /// Publish a comment under a thread
    Reply {
        thread_id: String,
        content: String,
        /// Comment id this replies to, for threaded replies
        #[arg(long)]
        reply_to: Option<String>,
    },
    /// Run the notification sync loop in the foreground
    Watch,
}

#[derive(Subcommand)]
enum SettingsAction {
    Show,
    Set {
        /// One of: mentions, replies, zaps, follows
        category: String,
        /// on or off
        state: String,
    },
}

/// Event source for commands that never touch the network: profile
/// resolution falls back to defaults, fetches return nothing.
struct Offline;

#[async_trait]
impl EventSource for Offline {
    async fn get_events(&self, _filter: Filter) -> Result<Vec<Event>, FetchError> {
        Ok(Vec::new())
    }
    async fn get_user_profile(&self, _pk: PublicKey) -> Result<Option<Profile>, FetchError> {
        Ok(None)
    }
}

fn build_config(cli: &Cli) -> Result<CoreConfig> {
    let data_dir = match &cli.data_dir {
        Some(dir) => dir.clone(),
        None => dirs::data_dir()
            .ok_or_else(|| anyhow!("could not determine a data directory, pass --data-dir"))?
            .join("agora"),
    };
    let mut config = CoreConfig::new(data_dir);
    if !cli.relays.is_empty() {
        config.relay_urls = cli.relays.clone();
    }
    Ok(config)
}

/// Restore the persisted session, erroring out when nobody is logged in.
async fn require_identity(
    provider: &IdentityProvider,
    source: &dyn EventSource,
    password: Option<&str>,
) -> Result<agora_core::AuthenticatedIdentity> {
    provider
        .restore_session(source, password)
        .await
        .context("could not restore session")?
        .ok_or_else(|| anyhow!("not logged in, run `agora login` first"))
}

fn print_notifications(views: &[NotificationView]) {
    if views.is_empty() {
        println!("no notifications");
        return;
    }
    for view in views {
        let marker = if view.is_read { " " } else { "*" };
        println!(
            "{marker} {:>6}  {} {:<60}  {}",
            view.id, view.glyph, view.message, view.age
        );
    }
}

fn now_secs() -> u64 {
    Timestamp::now().as_u64()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;
    debug!(data_dir = %config.data_dir.display(), "opening database");
    let db = Database::open(&config.data_dir)?;
    let store = NotificationStore::new(db.clone());
    let provider = Arc::new(IdentityProvider::new(db));
    let password = cli.password.as_deref();

    match &cli.command {
        Commands::Login { nsec, generate } => {
            let pool = RelayPool::connect(&config).await?;
            if *generate {
                let (identity, nsec) = provider.login_with_generated(&pool, password).await?;
                println!("logged in as {}", identity.npub);
                println!("secret key (shown once, back it up): {nsec}");
            } else {
                let nsec = nsec
                    .as_deref()
                    .ok_or_else(|| anyhow!("pass --nsec <key> or --generate"))?;
                let identity = provider.login_with_nsec(&pool, nsec, password).await?;
                println!("logged in as {} ({})", identity.display_name, identity.npub);
            }
        }

        Commands::Logout => {
            provider.logout()?;
            println!("logged out");
        }

        Commands::Whoami => {
            let identity = require_identity(&provider, &Offline, password).await?;
            println!("{}", identity.npub);
            println!("name:   {}", identity.display_name);
            if let Some(nip05) = &identity.nip05 {
                println!("nip05:  {nip05}");
            }
            if let Some(lud16) = &identity.lud16 {
                println!("zaps:   {lud16}");
            }
        }

        Commands::Notifications { unread, limit } => {
            let identity = require_identity(&provider, &Offline, password).await?;
            let owner = identity.public_key.to_hex();
            if *unread {
                let records = store.get_notifications(&owner, *limit, true)?;
                let now = now_secs();
                let views: Vec<NotificationView> = records
                    .iter()
                    .map(|r| NotificationView::from_record(r, now))
                    .collect();
                print_notifications(&views);
            } else {
                let summary = bell_summary(&store, &owner, *limit, now_secs())?;
                println!("{} unread", summary.unread);
                print_notifications(&summary.items);
            }
        }

        Commands::Read { id } => {
            let identity = require_identity(&provider, &Offline, password).await?;
            store.mark_read(&identity.public_key.to_hex(), *id)?;
        }

        Commands::ReadAll => {
            let identity = require_identity(&provider, &Offline, password).await?;
            store.mark_all_read(&identity.public_key.to_hex())?;
        }

        Commands::Delete { id } => {
            let identity = require_identity(&provider, &Offline, password).await?;
            store.delete(&identity.public_key.to_hex(), *id)?;
        }

        Commands::Clear => {
            let identity = require_identity(&provider, &Offline, password).await?;
            store.clear(&identity.public_key.to_hex())?;
        }

        Commands::Settings { action } => {
            let identity = require_identity(&provider, &Offline, password).await?;
            let owner = identity.public_key.to_hex();
            match action {
                SettingsAction::Show => {
                    let s = store.settings_or_default(&owner)?;
                    println!("mentions: {}", if s.mentions { "on" } else { "off" });
                    println!("replies:  {}", if s.replies { "on" } else { "off" });
                    println!("zaps:     {}", if s.zaps { "on" } else { "off" });
                    println!("follows:  {}", if s.follows { "on" } else { "off" });
                }
                SettingsAction::Set { category, state } => {
                    let enabled = match state.as_str() {
                        "on" => true,
                        "off" => false,
                        other => bail!("expected on or off, got {other}"),
                    };
                    let mut settings = store.settings_or_default(&owner)?;
                    if !settings.set(category, enabled) {
                        bail!("unknown category: {category}");
                    }
                    store.put_settings(&owner, settings)?;
                }
            }
        }

        Commands::Boards => {
            for board in forum::list_boards() {
                println!("{board}");
            }
        }

        Commands::Threads { board, limit } => {
            let pool = RelayPool::connect(&config).await?;
            let threads = forum::fetch_threads(&pool, board, *limit).await?;
            if threads.is_empty() {
                println!("no threads on {board}");
            }
            for thread in threads {
                println!("{}  {}", thread.id, thread.title_or_excerpt());
            }
        }

        Commands::Comments { thread_id } => {
            let pool = RelayPool::connect(&config).await?;
            let id = EventId::parse(thread_id).context("invalid thread id")?;
            for comment in forum::fetch_comments(&pool, id, 200).await? {
                let when = chrono::DateTime::from_timestamp(comment.created_at as i64, 0)
                    .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("{}  [{}] {}", when, &comment.author[..8], comment.content);
            }
        }

        Commands::Post {
            title,
            board,
            content,
        } => {
            let pool = RelayPool::connect(&config).await?;
            let identity = require_identity(&provider, &pool, password).await?;
            let signer = provider
                .signer()
                .ok_or_else(|| anyhow!("not logged in"))?;
            let draft = ThreadDraft {
                title: title.clone(),
                board: board.clone(),
                content: content.clone(),
            };
            let (thread_id, event_id) =
                forum::publish_thread(&pool, &signer, identity.public_key, &draft).await?;
            println!("published thread {thread_id} (event {})", event_id.to_hex());
        }

        Commands::Reply {
            thread_id,
            content,
            reply_to,
        } => {
            let pool = RelayPool::connect(&config).await?;
            let identity = require_identity(&provider, &pool, password).await?;
            let signer = provider
                .signer()
                .ok_or_else(|| anyhow!("not logged in"))?;
            let thread = EventId::parse(thread_id).context("invalid thread id")?;
            let reply_to = reply_to
                .as_deref()
                .map(EventId::parse)
                .transpose()
                .context("invalid reply id")?;
            let event_id = forum::publish_comment(
                &pool,
                &signer,
                identity.public_key,
                thread,
                reply_to,
                None,
                content,
            )
            .await?;
            println!("published comment {}", event_id.to_hex());
        }

        Commands::Watch => {
            let pool = Arc::new(RelayPool::connect(&config).await?);
            let identity = require_identity(&provider, pool.as_ref(), password).await?;
            let owner = identity.public_key.to_hex();
            println!(
                "watching notifications for {} (ctrl-c to stop)",
                identity.npub
            );

            // Print records as they arrive; the snapshot callback replays the
            // full window, so remember the newest id already shown.
            let last_seen = Mutex::new(0i64);
            let _sub = store.live_notifications(&owner, 20, move |records| {
                let mut last = last_seen.lock().unwrap();
                for record in records.iter().rev() {
                    if record.id > *last {
                        *last = record.id;
                        let view = NotificationView::from_record(record, now_secs());
                        println!("{} {} ({})", view.glyph, view.message, view.age);
                    }
                }
            })?;

            let sync = NotificationSync::new(
                pool,
                store.clone(),
                identity.public_key,
                config.lookback,
            );
            let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
            let mut loop_handle = tokio::spawn(sync.run(
                provider.clone(),
                config.poll_interval,
                shutdown_rx,
            ));

            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = shutdown_tx.send(true);
                    let _ = loop_handle.await;
                }
                // The loop stops on its own when the identity goes away
                _ = &mut loop_handle => {
                    println!("session ended, stopping watch");
                }
            }
        }
    }

    Ok(())
}
