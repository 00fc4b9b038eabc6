//! turan-hw library interface
//!
//! Homework assessment and reward pipeline: intake of recorded readings,
//! asynchronous scoring, teacher review, the coin ledger, leaderboards and
//! the periodic deadline sweeps.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult, HomeworkError, HwResult};

use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use turan_common::events::EventBus;

use crate::config::SettingsHandle;
use crate::services::scoring::{scoring_channel, ScoringJob, ScoringWorker, Transcriber, WorkerPool};
use crate::services::{
    Authorizer, AudioStore, CoinLedger, DbAuthorizer, HomeworkAssigner, LeaderboardRanker,
    ReviewService, SubmissionIntake, SweepIntervals, SweepScheduler,
};

/// Events buffered per SSE subscriber before the oldest are dropped
pub const EVENT_BUS_CAPACITY: usize = 256;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub event_bus: EventBus,
    pub settings: SettingsHandle,
    pub authorizer: Arc<dyn Authorizer>,
    pub ledger: Arc<CoinLedger>,
    pub intake: Arc<SubmissionIntake>,
    pub review: Arc<ReviewService>,
    pub assigner: Arc<HomeworkAssigner>,
    pub ranker: Arc<LeaderboardRanker>,
    pub scheduler: Arc<SweepScheduler>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Most recent 5xx, surfaced by `/health`
    pub last_error: Arc<RwLock<Option<String>>>,
}

/// Wired services that have not started running yet
pub struct Assembly {
    pub state: AppState,
    pub worker: Arc<ScoringWorker>,
    pub jobs: mpsc::Receiver<ScoringJob>,
    pub scheduler: Arc<SweepScheduler>,
}

/// Background tasks owned by a running service
pub struct BackgroundTasks {
    pub scoring: JoinHandle<()>,
    pub scheduler: JoinHandle<()>,
}

impl Assembly {
    /// Wire every service against `db`
    ///
    /// Audio is stored under `root_folder`. Worker count and queue capacity
    /// come from the settings table as loaded here.
    pub async fn new(
        db: SqlitePool,
        root_folder: &Path,
        transcriber: Arc<dyn Transcriber>,
        intervals: SweepIntervals,
    ) -> HwResult<Self> {
        let settings = SettingsHandle::load(db.clone()).await?;
        let snapshot = settings.current();
        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let authorizer: Arc<dyn Authorizer> = Arc::new(DbAuthorizer::new(db.clone()));
        let audio = AudioStore::new(root_folder);

        let ledger = Arc::new(CoinLedger::new(db.clone(), event_bus.clone()));
        let ranker = Arc::new(LeaderboardRanker::new(db.clone(), event_bus.clone()));
        let (queue, jobs) = scoring_channel(snapshot.scoring_queue_capacity);

        let intake = Arc::new(SubmissionIntake::new(
            db.clone(),
            settings.clone(),
            audio.clone(),
            queue,
            event_bus.clone(),
        ));
        let worker = Arc::new(ScoringWorker::new(
            db.clone(),
            settings.clone(),
            Arc::clone(&ledger),
            transcriber,
            audio,
            event_bus.clone(),
        ));
        let review = Arc::new(ReviewService::new(
            db.clone(),
            settings.clone(),
            Arc::clone(&ledger),
            Arc::clone(&authorizer),
            event_bus.clone(),
        ));
        let assigner = Arc::new(HomeworkAssigner::new(
            db.clone(),
            settings.clone(),
            Arc::clone(&authorizer),
            event_bus.clone(),
        ));
        let scheduler = Arc::new(SweepScheduler::new(
            db.clone(),
            settings.clone(),
            Arc::clone(&ranker),
            event_bus.clone(),
            intervals,
        ));

        let state = AppState {
            db,
            event_bus,
            settings,
            authorizer,
            ledger,
            intake,
            review,
            assigner,
            ranker,
            scheduler: Arc::clone(&scheduler),
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        };

        Ok(Self {
            state,
            worker,
            jobs,
            scheduler,
        })
    }

    /// Start the scoring pool and the sweep scheduler
    ///
    /// Records left in `submitted` by a previous run are queued once the
    /// pool is consuming.
    pub async fn start(self, cancel: CancellationToken) -> HwResult<(AppState, BackgroundTasks)> {
        let workers = self.state.settings.current().scoring_workers;
        let scoring = WorkerPool::spawn(self.worker, self.jobs, workers, cancel.clone());
        let scheduler = self.scheduler.start(cancel)?;

        let requeued = self.state.intake.requeue_pending().await?;
        info!(workers, requeued, "Background services started");

        Ok((self.state, BackgroundTasks { scoring, scheduler }))
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::{middleware, routing::get};

    Router::new()
        .merge(api::homework_routes())
        .merge(api::coin_routes())
        .merge(api::leaderboard_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(middleware::from_fn_with_state(state.clone(), api::track_server_errors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
