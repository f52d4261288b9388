use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::audit::{EntityKind, EventActor, RequestEvent, StatusLog};
use crate::models::status::{OfferStatus, RideStatus};
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    Requests,
    Offers,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requests => "request",
            Self::Offers => "offer",
        }
    }
}

/// Expires every `requested` request past its deadline. Each row is expired
/// in its own transaction with a conditional update, so a row already handled
/// by another instance is skipped and one failing row does not stop the pass.
pub async fn sweep_expired_requests(state: &AppState) -> Result<usize, AppError> {
    let now = state.clock.now();
    let due = state.store.due_requests(now).await?;
    if due.is_empty() {
        debug!("no ride requests due for expiry");
        return Ok(0);
    }

    let mut expired = 0;
    for request_id in due {
        match expire_request(state, request_id, now).await {
            Ok(true) => {
                expired += 1;
                warn!(request_id = %request_id, "ride request expired without confirmation");
            }
            Ok(false) => debug!(request_id = %request_id, "ride request no longer due"),
            Err(err) => error!(request_id = %request_id, error = %err, "failed to expire ride request"),
        }
    }

    state
        .metrics
        .sweeper_expired_total
        .with_label_values(&[SweepKind::Requests.as_str()])
        .inc_by(expired as u64);

    Ok(expired)
}

async fn expire_request(state: &AppState, request_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
    let mut tx = state.store.begin().await?;
    if !tx.expire_request_if_due(request_id, now).await? {
        return Ok(false);
    }

    tx.append_status_log(&StatusLog::new(
        EntityKind::Request,
        request_id,
        RideStatus::Expired.as_str(),
        "request expired",
        None,
        now,
    ))
    .await?;
    tx.append_event(&RequestEvent::new(
        request_id,
        "request_expired",
        EventActor::System,
        None,
        json!({ "expired_at": now }),
        now,
    ))
    .await?;
    tx.commit().await?;

    Ok(true)
}

/// Expires every `active` offer past its deadline, independently of the
/// request it belongs to.
pub async fn sweep_expired_offers(state: &AppState) -> Result<usize, AppError> {
    let now = state.clock.now();
    let due = state.store.due_offers(now).await?;
    if due.is_empty() {
        debug!("no driver offers due for expiry");
        return Ok(0);
    }

    let mut expired = 0;
    for offer_id in due {
        match expire_offer(state, offer_id, now).await {
            Ok(Some(request_id)) => {
                expired += 1;
                warn!(offer_id = %offer_id, request_id = %request_id, "driver offer expired");
            }
            Ok(None) => debug!(offer_id = %offer_id, "driver offer no longer due"),
            Err(err) => error!(offer_id = %offer_id, error = %err, "failed to expire driver offer"),
        }
    }

    state
        .metrics
        .sweeper_expired_total
        .with_label_values(&[SweepKind::Offers.as_str()])
        .inc_by(expired as u64);

    Ok(expired)
}

async fn expire_offer(state: &AppState, offer_id: Uuid, now: DateTime<Utc>) -> Result<Option<Uuid>, AppError> {
    let mut tx = state.store.begin().await?;
    let Some(offer) = tx.expire_offer_if_due(offer_id, now).await? else {
        return Ok(None);
    };

    tx.append_status_log(&StatusLog::new(
        EntityKind::Offer,
        offer.id,
        OfferStatus::Expired.as_str(),
        "offer expired",
        None,
        now,
    ))
    .await?;
    tx.commit().await?;

    Ok(Some(offer.request_id))
}

/// Running sweeper tasks and the switch that stops them.
pub struct SweeperHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(err) = task.await {
                error!(error = %err, "sweeper task ended abnormally");
            }
        }
    }
}

pub fn spawn_sweepers(state: Arc<AppState>) -> SweeperHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let tasks = [SweepKind::Requests, SweepKind::Offers]
        .into_iter()
        .map(|kind| tokio::spawn(run_sweeper(state.clone(), kind, shutdown_rx.clone())))
        .collect();

    SweeperHandle { shutdown_tx, tasks }
}

async fn run_sweeper(state: Arc<AppState>, kind: SweepKind, mut shutdown_rx: watch::Receiver<bool>) {
    let period = Duration::from_secs(state.settings.sweep_interval_secs.max(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(kind = kind.as_str(), interval_secs = period.as_secs(), "expiry sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = match kind {
                    SweepKind::Requests => sweep_expired_requests(&state).await,
                    SweepKind::Offers => sweep_expired_offers(&state).await,
                };
                if let Err(err) = result {
                    error!(kind = kind.as_str(), error = %err, "expiry sweep failed");
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }

    info!(kind = kind.as_str(), "expiry sweeper stopped");
}
