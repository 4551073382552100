//! # board-admin
//!
//! Operator entry point for the moderation engine. Each invocation runs one
//! action (or reads one audit page), prints the result as JSON on stdout and
//! waits for background cleanup before exiting. Logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use secrecy::ExposeSecret;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use configs::Settings;
use domains::{
    Actor, AuditCategory, BoardId, DomainError, ImageId, PostNum, TagId, ThreadId, UserId,
};
use services::moderation::{BanRequest, ImageTagRef, PostRef, TagRef, TagUpdate, ThreadRef};
use services::{
    Action, AuditLogService, EngineSettings, MediaLayout, ModerationDeps, ModerationService,
    TagLimits,
};
use storage_adapters::postgres::{
    self, PgAuditLog, PgAuditSink, PgAuthorizer, PgModerationStore, PgPool,
};
use storage_adapters::redis_cache::RedisCache;
use storage_adapters::s3::S3ObjectStore;
use storage_adapters::LocalMediaFiles;

#[cfg(feature = "edge-cloudflare")]
use storage_adapters::cloudflare::CloudflareFirewall;

const DEFAULT_LOG_FILTER: &str = "board_admin=info,services=info,storage_adapters=info";

#[derive(Parser, Debug)]
#[command(author, version, about = "Board moderation tool", long_about = None)]
struct Cli {
    /// User id of the moderator performing the action
    #[arg(long, global = true, default_value_t = 0)]
    actor: UserId,

    /// Client address recorded in the audit trail
    #[arg(long, global = true)]
    ip: Option<String>,

    /// Config file to use instead of the default lookup
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct ThreadArgs {
    #[arg(long)]
    board: BoardId,
    #[arg(long)]
    thread: ThreadId,
}

#[derive(Args, Debug)]
struct PostArgs {
    #[arg(long)]
    board: BoardId,
    #[arg(long)]
    thread: ThreadId,
    #[arg(long)]
    post: PostNum,
}

#[derive(Args, Debug)]
struct BanArgs {
    #[command(flatten)]
    post: PostArgs,
    #[arg(long)]
    reason: String,
}

#[derive(Args, Debug)]
struct TagArgs {
    #[arg(long)]
    board: BoardId,
    #[arg(long)]
    tag: TagId,
}

#[derive(Args, Debug)]
struct LogArgs {
    #[arg(long)]
    board: BoardId,
    #[arg(long, default_value_t = 1)]
    page: i64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ban the address a post was made from
    BanIp(BanArgs),
    /// Ban the file attached to a post
    BanFile(BanArgs),
    CloseThread(ThreadArgs),
    StickyThread(ThreadArgs),
    DeleteThread(ThreadArgs),
    DeletePost(PostArgs),
    DeleteTag(TagArgs),
    DeleteImageTag {
        #[arg(long)]
        board: BoardId,
        #[arg(long)]
        image: ImageId,
        #[arg(long)]
        tag: TagId,
    },
    /// Permanently remove a thread and its media
    PurgeThread(ThreadArgs),
    /// Permanently remove a post and its media
    PurgePost(PostArgs),
    UpdateTag {
        #[command(flatten)]
        tag: TagArgs,
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        tag_type: i64,
    },
    /// Staff moderation log
    ModLog(LogArgs),
    /// Public board log
    BoardLog(LogArgs),
    /// Apply pending schema migrations
    Migrate,
}

impl From<ThreadArgs> for ThreadRef {
    fn from(args: ThreadArgs) -> Self {
        ThreadRef { board: args.board, thread: args.thread }
    }
}

impl From<PostArgs> for PostRef {
    fn from(args: PostArgs) -> Self {
        PostRef { board: args.board, thread: args.thread, post: args.post }
    }
}

impl From<BanArgs> for BanRequest {
    fn from(args: BanArgs) -> Self {
        BanRequest { post: args.post.into(), reason: args.reason }
    }
}

impl From<TagArgs> for TagRef {
    fn from(args: TagArgs) -> Self {
        TagRef { board: args.board, tag: args.tag }
    }
}

/// What a single invocation asks for once the arguments are parsed.
enum Request {
    Act(Action),
    Log(AuditCategory, LogArgs),
    Migrate,
}

impl From<Commands> for Request {
    fn from(command: Commands) -> Self {
        match command {
            Commands::BanIp(args) => Request::Act(Action::BanIp(args.into())),
            Commands::BanFile(args) => Request::Act(Action::BanFile(args.into())),
            Commands::CloseThread(args) => Request::Act(Action::CloseThread(args.into())),
            Commands::StickyThread(args) => Request::Act(Action::StickyThread(args.into())),
            Commands::DeleteThread(args) => Request::Act(Action::DeleteThread(args.into())),
            Commands::DeletePost(args) => Request::Act(Action::DeletePost(args.into())),
            Commands::DeleteTag(args) => Request::Act(Action::DeleteTag(args.into())),
            Commands::DeleteImageTag { board, image, tag } => {
                Request::Act(Action::DeleteImageTag(ImageTagRef { board, image, tag }))
            }
            Commands::PurgeThread(args) => Request::Act(Action::PurgeThread(args.into())),
            Commands::PurgePost(args) => Request::Act(Action::PurgePost(args.into())),
            Commands::UpdateTag { tag, name, tag_type } => {
                let TagRef { board, tag } = tag.into();
                Request::Act(Action::UpdateTag(TagUpdate { board, tag, name, tag_type }))
            }
            Commands::ModLog(args) => Request::Log(AuditCategory::ModLog, args),
            Commands::BoardLog(args) => Request::Log(AuditCategory::UserLog, args),
            Commands::Migrate => Request::Migrate,
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Client errors keep their message; internal detail stays in the logs.
fn refused(err: DomainError) -> anyhow::Error {
    anyhow::anyhow!(err.public_message())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = match &cli.config {
        Some(path) => Settings::from_file(path),
        None => Settings::load(),
    }
    .context("loading configuration")?;
    init_tracing(settings.log.json);

    // 1. Initialize Database Implementation
    let db = postgres::connect(
        settings.database.url.expose_secret(),
        settings.database.max_connections,
    )
    .await
    .context("connecting to postgres")?;

    let mut actor = Actor::new(cli.actor);
    if let Some(ip) = cli.ip {
        actor = actor.with_ip(ip);
    }

    let result = match Request::from(cli.command) {
        Request::Migrate => postgres::migrate(&db)
            .await
            .map(|()| info!("migrations applied"))
            .context("applying migrations"),
        Request::Log(category, args) => {
            let log = AuditLogService::new(
                Arc::new(PgAuditLog::new(db.clone())),
                settings.limits.audit_per_page,
            );
            match log.page(args.board, category, args.page).await {
                Ok(page) => print_json(&page),
                Err(err) => Err(refused(err)),
            }
        }
        Request::Act(action) => run_action(&settings, db.clone(), &actor, action).await,
    };

    db.close().await;
    result
}

async fn run_action(
    settings: &Settings,
    db: PgPool,
    actor: &Actor,
    action: Action,
) -> anyhow::Result<()> {
    // 2. Initialize Cache Implementation
    let cache = RedisCache::connect(
        settings.redis.url.expose_secret(),
        settings.redis.max_connections,
    )
    .context("building redis pool")?;

    // 3. Initialize Storage Implementation
    let storage = &settings.storage;
    let objects =
        S3ObjectStore::connect(&storage.bucket, &storage.region, storage.endpoint.as_deref()).await;

    // 4. Initialize Edge Firewall Implementation
    #[cfg(feature = "edge-cloudflare")]
    let firewall: Option<Arc<dyn domains::EdgeFirewall>> = if settings.cloudflare.enabled {
        let firewall = CloudflareFirewall::new(
            settings.cloudflare.email.clone(),
            settings.cloudflare.api_key.clone(),
        )
        .context("building cloudflare client")?;
        Some(Arc::new(firewall))
    } else {
        None
    };
    #[cfg(not(feature = "edge-cloudflare"))]
    let firewall = None;

    // 5. Assemble the engine (dynamic dispatch over every port)
    let deps = ModerationDeps {
        store: Arc::new(PgModerationStore::new(db.clone())),
        cache: Arc::new(cache),
        objects: Arc::new(objects),
        files: Arc::new(LocalMediaFiles),
        authorizer: Arc::new(PgAuthorizer::new(db.clone())),
        audit: Arc::new(PgAuditSink::new(db)),
        firewall,
    };
    let engine_settings = EngineSettings {
        media: MediaLayout {
            source_prefix: storage.source_prefix.clone(),
            thumbnail_prefix: storage.thumbnail_prefix.clone(),
            image_dir: settings.directories.image_dir.clone(),
            thumbnail_dir: settings.directories.thumbnail_dir.clone(),
        },
        tag_limits: TagLimits {
            min_length: settings.limits.tag_min_length,
            max_length: settings.limits.tag_max_length,
        },
        max_background_jobs: settings.background.max_concurrency,
    };
    let engine = ModerationService::new(deps, engine_settings);

    let result = match engine.execute(actor, action).await {
        Ok(outcome) => print_json(&outcome),
        Err(err) => Err(refused(err)),
    };

    // Reclamation, audit and edge blocks run after the response; let them drain.
    engine.pool().wait_idle().await;
    let reclaimed = engine.reclaim_totals();
    if reclaimed.failed > 0 {
        warn!(
            attempted = reclaimed.attempted,
            failed = reclaimed.failed,
            "some media could not be reclaimed"
        );
    }
    result
}
