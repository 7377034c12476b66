//! quest-gateway - social quest verification and crediting

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use quest_gateway::{
    auth::JwtValidator,
    config::Args,
    db::{schemas::Mission, MemoryStore, MongoClient, MongoStore},
    logging::{init_tracing, GrantLogger},
    server::{self, AppState},
    services::{
        PeriodClock, QuestService, QuestSettings, Stores, Upstreams, VisitService, VisitTokens,
    },
    upstream::{
        credentials::CredentialPool, discord::DiscordClient, http_client,
        telegram::TelegramClient, titan::TitanClient, utools::UToolsClient,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    init_tracing(&args.log_level, &args.log_format);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  quest-gateway {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Period offset: {}, week starts {}", args.period_utc_offset, args.week_starts_on);
    info!("UTools keys: {}", args.utools_keys().len());
    info!("======================================");

    // Stores: MongoDB, or memory in dev mode when it is unreachable
    let (mongo, stores) = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            let store = MongoStore::new(&client)
                .await
                .context("failed to prepare MongoDB collections")?;
            (Some(client), Stores::shared(Arc::new(store)))
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using memory store): {}", e);
            let store = MemoryStore::new();
            if let Some(path) = &args.mission_seed_path {
                let raw = tokio::fs::read(path)
                    .await
                    .with_context(|| format!("failed to read {}", path.display()))?;
                let missions: Vec<Mission> =
                    serde_json::from_slice(&raw).context("invalid mission seed file")?;
                info!("Seeded {} missions from {}", missions.len(), path.display());
                for mission in missions {
                    store.put_mission(mission);
                }
            }
            (None, Stores::shared(Arc::new(store)))
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let http = http_client(Duration::from_millis(args.request_timeout_ms))
        .context("failed to build HTTP client")?;
    let up = &args.upstream;
    let upstreams = Upstreams {
        social: Arc::new(UToolsClient::new(
            http.clone(),
            up.utools_base_url.clone(),
            CredentialPool::new(args.utools_keys()),
        )),
        telegram: Arc::new(TelegramClient::new(
            http.clone(),
            up.telegram_api_url.clone(),
            up.telegram_bot_token.clone(),
        )),
        discord: Arc::new(DiscordClient::new(
            http.clone(),
            up.discord_api_url.clone(),
            up.discord_bot_token.clone(),
        )),
        referrals: Arc::new(TitanClient::new(
            http,
            up.titan_api_url.clone(),
            up.titan_api_key.clone(),
        )),
    };

    let offset = args.utc_offset().map_err(anyhow::Error::msg)?;
    let week_start = args.week_start().map_err(anyhow::Error::msg)?;
    let settings = QuestSettings {
        clock: PeriodClock::new(offset, week_start),
        commission_percent: args.referral_commission_percent as i64,
        official_twitter_id: up.official_twitter_user_id.clone(),
    };

    let grant_log = GrantLogger::new();
    if let Some(path) = &args.grant_log_path {
        grant_log
            .init_file(path.clone())
            .await
            .with_context(|| format!("failed to open grant log {}", path.display()))?;
        info!("Grant log: {}", path.display());
    }

    let quests = Arc::new(QuestService::new(stores, upstreams, settings).with_grant_logger(grant_log));

    let visit_key = args.visit_key().map_err(anyhow::Error::msg)?;
    let visits = Arc::new(VisitService::new(
        VisitTokens::new(visit_key),
        Arc::clone(&quests),
        args.visit.visit_dwell_seconds,
        args.visit.official_website_uri.clone(),
    ));

    let jwt = match args.jwt_secret() {
        Some(secret) => JwtValidator::new(secret, args.jwt_expiry_seconds)?,
        None => JwtValidator::new_dev(),
    };

    let state = Arc::new(AppState::new(args, mongo, quests, visits, jwt));

    server::run(state).await?;

    Ok(())
}
