use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::sync::Arc;
use tracing::info;

use murmur::bus::{Event, Topic};
use murmur::client::http::HttpApi;
use murmur::client::{MembershipCache, PushChannel, Session, ToggleOutcome};
use murmur::config::Config;
use murmur::db::models::RelationKind;
use murmur::db::Database;

/// murmur: interaction sync and notification fan-out for a social feed.
///
/// Keeps like/repost/comment counters consistent, makes relation toggles
/// idempotent, and fans interactions out as notifications.
#[derive(Parser)]
#[command(name = "murmur", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Start the REST + SSE server
    #[cfg(feature = "web")]
    Serve {
        /// Port to listen on (default: MURMUR_PORT or 8080)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default: MURMUR_BIND or 127.0.0.1)
        #[arg(long)]
        bind: Option<String>,
    },

    /// Show database status and recent posts
    Status,

    /// Recompute all counters from relation rows and fix drift
    Reconcile,

    /// Mint a session token for a user (development)
    #[cfg(feature = "web")]
    Token {
        /// The user the token authenticates as
        user_id: i64,
    },

    /// Create a user
    AddUser {
        username: String,
    },

    /// Create a post
    AddPost {
        /// Author's user id
        author_id: i64,
        content: String,
    },

    /// List a user's notifications, newest first
    Notifications {
        user_id: i64,

        /// Only this type (like, comment, follow, repost, transaction)
        #[arg(long = "type")]
        kind: Option<String>,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: u32,

        /// Mark everything read after listing
        #[arg(long)]
        mark_read: bool,
    },

    /// Like/unlike or repost/unrepost a post on the server (client side)
    Toggle {
        #[arg(value_enum)]
        kind: ToggleKind,
        post_id: i64,
    },

    /// Comment on a post on the server (client side)
    Comment { post_id: i64, content: String },

    /// Rebuild the local membership cache from the server
    Sync,

    /// Print live events from the server until interrupted: notifications
    /// by default, or one post's comment and counter events
    Watch {
        #[arg(long)]
        post: Option<i64>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ToggleKind {
    Like,
    Repost,
}

impl From<ToggleKind> for RelationKind {
    fn from(kind: ToggleKind) -> Self {
        match kind {
            ToggleKind::Like => RelationKind::Like,
            ToggleKind::Repost => RelationKind::Repost,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("murmur=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init => {
            info!("Initializing murmur database...");
            let config = Config::load()?;
            let db = init_database(&config).await?;
            let table_count = db.table_count().await?;
            println!("Database initialized at: {}", db_display(&config));
            println!("Tables created: {table_count}");
            println!("\nmurmur is ready. Next: set MURMUR_SESSION_SECRET in your .env file");
            println!("\nThen run: cargo run -- serve");
        }

        #[cfg(feature = "web")]
        Commands::Serve { port, bind } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let port = port.unwrap_or(config.port);
            let bind = bind.unwrap_or_else(|| config.bind.clone());
            murmur::web::run_server(config, db, port, &bind).await?;
        }

        Commands::Status => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            murmur::status::show(&db, &db_display(&config), !config.uses_postgres()).await?;
        }

        Commands::Reconcile => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let counters = murmur::counters::CounterReconciler::new(db, murmur::bus::EventBus::new());
            let drifts = counters.reconcile().await?;
            if drifts.is_empty() {
                println!("{}", "All counters consistent.".green());
            } else {
                println!("Corrected {} counter(s):", drifts.len());
                for d in &drifts {
                    println!(
                        "  post #{} {}: {} → {}",
                        d.post_id,
                        d.field.column(),
                        d.stored.to_string().red(),
                        d.actual.to_string().green()
                    );
                }
            }
        }

        #[cfg(feature = "web")]
        Commands::Token { user_id } => {
            let config = Config::load()?;
            config.require_session_secret()?;
            let db = open_database(&config).await?;
            if !db.user_exists(user_id).await? {
                anyhow::bail!("User {user_id} not found. Create one with `murmur add-user`.");
            }
            println!("{}", murmur::web::auth::create_token(&config.session_secret, user_id));
        }

        Commands::AddUser { username } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let id = db.create_user(username.trim()).await?;
            println!("Created user {} with id {}", username.bold(), id);
        }

        Commands::AddPost { author_id, content } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            if !db.user_exists(author_id).await? {
                anyhow::bail!("User {author_id} not found.");
            }
            let post = db.create_post(author_id, &content).await?;
            println!("Created post #{} at {}", post.id, post.created_at);
        }

        Commands::Notifications {
            user_id,
            kind,
            page,
            mark_read,
        } => {
            let config = Config::load()?;
            let db = open_database(&config).await?;
            let kind = match kind.as_deref() {
                None => None,
                Some(raw) => Some(
                    murmur::db::models::NotificationKind::parse(raw)
                        .ok_or_else(|| anyhow::anyhow!("Unknown notification type '{raw}'"))?,
                ),
            };

            let notifier = murmur::notify::Notifier::new(db, murmur::bus::EventBus::new());
            let listing = notifier
                .list(user_id, kind, page, murmur::notify::DEFAULT_PER_PAGE)
                .await?;

            println!(
                "{}",
                format!("=== Notifications ({} unread) ===", listing.unread_count).bold()
            );
            if listing.notifications.is_empty() {
                println!("Nothing here.");
            }
            for n in &listing.notifications {
                let marker = if n.is_read { " ".normal() } else { "●".cyan() };
                println!(
                    "{} [{}] {} (from user {}, {})",
                    marker,
                    n.kind.to_string().yellow(),
                    n.message,
                    n.actor_id,
                    n.created_at.dimmed()
                );
            }

            if mark_read {
                let updated = notifier.mark_all_read(user_id).await?;
                println!("\nMarked {updated} notification(s) read.");
            }
        }

        Commands::Toggle { kind, post_id } => {
            let config = Config::load()?;
            let session = client_session(&config)?;
            let kind = RelationKind::from(kind);
            match session.toggle(kind, post_id).await? {
                ToggleOutcome::Applied { active, count } => {
                    let state = if active { "on".green() } else { "off".yellow() };
                    println!("{kind} {state} for post #{post_id} (count: {count})");
                }
                ToggleOutcome::Debounced { active } => {
                    println!("{kind} unchanged for post #{post_id} (currently {active})");
                }
            }
        }

        Commands::Comment { post_id, content } => {
            let config = Config::load()?;
            let session = client_session(&config)?;
            let submitted = session.api().submit_comment(post_id, &content).await?;
            println!(
                "Comment #{} posted on #{} ({} comment(s))",
                submitted.comment.id, submitted.comment.post_id, submitted.count
            );
        }

        Commands::Sync => {
            let config = Config::load()?;
            let session = client_session(&config)?;
            session.sync_memberships().await?;
            println!(
                "Synced: {} liked, {} reposted",
                session.memberships().ids(RelationKind::Like).len(),
                session.memberships().ids(RelationKind::Repost).len()
            );
        }

        Commands::Watch { post } => {
            let config = Config::load()?;
            let session = client_session(&config)?;
            let (channel, topic) = match post {
                Some(post_id) => {
                    let canonical = session.api().post_counts(post_id).await?.post_id;
                    (PushChannel::Post(canonical), Topic::Post(canonical))
                }
                None => {
                    let user_id = token_user_id(config.require_token()?)?;
                    (PushChannel::Notifications, Topic::User(user_id))
                }
            };

            let _subscription = session.bus().subscribe(topic, print_event);
            let _push = session
                .listen(channel)
                .context("This client has no push channel")?;
            println!("{}", "Watching for events (Ctrl-C to stop)...".dimmed());
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}

/// The user id a session token was minted for. The server checks the
/// signature; the client only reads the claim to pick its local topic.
fn token_user_id(token: &str) -> Result<i64> {
    token
        .split('.')
        .next()
        .and_then(|id| id.parse().ok())
        .context("MURMUR_TOKEN is malformed. Mint a new one with `murmur token <user_id>`.")
}

fn print_event(event: &Event) {
    match event {
        Event::NewComment(c) => {
            println!("{} #{} {}: {}", "comment".green(), c.post_id, c.author.bold(), c.content)
        }
        Event::CommentDeleted(c) => {
            println!("{} #{} comment {}", "deleted".yellow(), c.post_id, c.id)
        }
        Event::Counters(c) => println!(
            "{} #{} likes {} reposts {} comments {}",
            "counts".cyan(),
            c.post_id,
            c.likes,
            c.retweets,
            c.comments
        ),
        Event::Notification(n) => {
            println!("{} [{}] {}", "●".cyan(), n.kind.to_string().yellow(), n.message)
        }
    }
}

/// Human-readable store location. For PostgreSQL, redact the password from
/// the connection URL before printing it.
fn db_display(config: &Config) -> String {
    match config.database_url.as_deref() {
        Some(url) if config.uses_postgres() => match url.find('@') {
            Some(at) => {
                let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
                format!("{}****@{}", &url[..scheme_end], &url[at + 1..])
            }
            None => url.to_string(),
        },
        _ => config.db_path.clone(),
    }
}

/// A client session against MURMUR_API_URL, with the membership cache
/// persisted at MURMUR_SESSION_FILE.
fn client_session(config: &Config) -> Result<Session> {
    let api = HttpApi::new(&config.api_url, config.require_token()?)?;
    Ok(Session::new(
        Arc::new(api),
        MembershipCache::load(&config.session_file),
        murmur::bus::EventBus::new(),
        config.debounce,
    ))
}

/// Open an existing database, choosing the backend from DATABASE_URL.
async fn open_database(config: &Config) -> Result<Arc<dyn Database>> {
    if config.uses_postgres() {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            let url = config.database_url.as_deref().unwrap_or_default();
            return murmur::db::connect_postgres(url).await;
        }
        #[cfg(not(feature = "postgres"))]
        anyhow::bail!(
            "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
             Rebuild with: cargo build --features postgres"
        );
    }
    murmur::db::open_sqlite(&config.db_path)
}

/// Initialize the database (create if needed).
async fn init_database(config: &Config) -> Result<Arc<dyn Database>> {
    if config.uses_postgres() {
        #[cfg(feature = "postgres")]
        {
            info!("Using PostgreSQL backend");
            let url = config.database_url.as_deref().unwrap_or_default();
            return murmur::db::connect_postgres(url).await;
        }
        #[cfg(not(feature = "postgres"))]
        anyhow::bail!(
            "DATABASE_URL points to PostgreSQL but the 'postgres' feature is not compiled in.\n\
             Rebuild with: cargo build --features postgres"
        );
    }
    murmur::db::initialize_sqlite(&config.db_path)
}
