//! Multi-account transport connection manager.
//!
//! Owns one supervision task per account: load credentials, connect,
//! drive the connection's event stream, and reconnect with linear backoff
//! on recoverable drops. Terminal closures (logout, ban) stop the account
//! for good; logout additionally wipes the stored session so the next
//! start pairs fresh. Normalized inbound messages are forwarded to the
//! conversation pipeline over a bounded channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use vendly_types::config::EngineConfig;
use vendly_types::event::EngineEvent;
use vendly_types::session::CredentialState;
use vendly_types::transport::{
    AccountStatus, DisconnectReason, InboundMessage, TransportError, TransportEvent,
};

use crate::event::EventBus;
use crate::repository::session::SessionRepository;
use crate::session::{SecretSealer, SessionStore};

use super::connector::{BoxTransportHandle, TransportConnector};
use super::normalize::normalize;
use super::rate_limit::RateLimiter;

/// Connection and send tuning for the manager.
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub max_accounts: usize,
    pub send_timeout: Duration,
    pub media_timeout: Duration,
    pub reconnect_base_delay: Duration,
    pub reconnect_max_attempts: u32,
    pub rate_limit_window: Duration,
    pub rate_limit_max_sends: usize,
    pub max_rate_entries: usize,
    pub shutdown_grace: Duration,
}

impl ManagerSettings {
    pub fn from_engine_config(config: &EngineConfig) -> Self {
        Self {
            max_accounts: config.max_accounts,
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            media_timeout: Duration::from_millis(config.media_timeout_ms),
            reconnect_base_delay: Duration::from_millis(config.reconnect_base_delay_ms),
            reconnect_max_attempts: config.reconnect_max_attempts,
            rate_limit_window: Duration::from_millis(config.rate_limit_window_ms),
            rate_limit_max_sends: config.rate_limit_max_sends,
            max_rate_entries: config.max_rate_entries,
            shutdown_grace: Duration::from_millis(config.shutdown_grace_ms),
        }
    }
}

/// Per-account supervision state held in the account map.
struct AccountSlot {
    status: watch::Receiver<AccountStatus>,
    handle: Arc<tokio::sync::RwLock<Option<BoxTransportHandle>>>,
    /// Unix millis of the last successful send or inbound message; 0 = never.
    last_activity: Arc<AtomicI64>,
    cancel: CancellationToken,
    task: tokio::task::JoinHandle<()>,
}

pub struct ConnectionManager<C, R, V> {
    connector: Arc<C>,
    sessions: Arc<SessionStore<R, V>>,
    bus: EventBus,
    limiter: RateLimiter,
    inbound_tx: mpsc::Sender<InboundMessage>,
    accounts: DashMap<Uuid, AccountSlot>,
    cancel: CancellationToken,
    settings: ManagerSettings,
}

impl<C, R, V> ConnectionManager<C, R, V>
where
    C: TransportConnector + 'static,
    R: SessionRepository + Send + Sync + 'static,
    V: SecretSealer + 'static,
{
    pub fn new(
        connector: Arc<C>,
        sessions: Arc<SessionStore<R, V>>,
        bus: EventBus,
        inbound_tx: mpsc::Sender<InboundMessage>,
        settings: ManagerSettings,
    ) -> Self {
        let limiter = RateLimiter::new(
            settings.rate_limit_window,
            settings.rate_limit_max_sends,
            settings.max_rate_entries,
        );
        Self {
            connector,
            sessions,
            bus,
            limiter,
            inbound_tx,
            accounts: DashMap::new(),
            cancel: CancellationToken::new(),
            settings,
        }
    }

    /// Start supervising an account. Re-initializing an already-managed
    /// account tears the existing handle down first, so there is never
    /// more than one live handle per account.
    pub async fn start_account(&self, account_id: Uuid) -> Result<(), TransportError> {
        if let Some((_, slot)) = self.accounts.remove(&account_id) {
            tracing::info!(%account_id, "Account already managed, restarting");
            slot.cancel.cancel();
            if let Some(handle) = slot.handle.write().await.take() {
                handle.close().await;
            }
            let _ = slot.task.await;
        }
        if self.accounts.len() >= self.settings.max_accounts {
            return Err(TransportError::AccountLimitReached(
                self.settings.max_accounts,
            ));
        }

        let (status_tx, status_rx) = watch::channel(AccountStatus::Connecting);
        let handle = Arc::new(tokio::sync::RwLock::new(None));
        let last_activity = Arc::new(AtomicI64::new(0));
        let cancel = self.cancel.child_token();

        let task = tokio::spawn(run_account(
            account_id,
            self.connector.clone(),
            self.sessions.clone(),
            self.bus.clone(),
            self.inbound_tx.clone(),
            status_tx,
            handle.clone(),
            last_activity.clone(),
            cancel.clone(),
            self.settings.reconnect_base_delay,
            self.settings.reconnect_max_attempts,
        ));

        self.accounts.insert(
            account_id,
            AccountSlot {
                status: status_rx,
                handle,
                last_activity,
                cancel,
                task,
            },
        );
        tracing::info!(%account_id, "Account supervision started");
        Ok(())
    }

    /// Stop supervising an account and close its connection. Stopping an
    /// unmanaged account is a no-op.
    pub async fn stop_account(&self, account_id: Uuid) {
        let Some((_, slot)) = self.accounts.remove(&account_id) else {
            tracing::debug!(%account_id, "Account not managed, ignoring stop");
            return;
        };
        slot.cancel.cancel();
        if let Some(handle) = slot.handle.write().await.take() {
            handle.close().await;
        }
        let _ = slot.task.await;
        tracing::info!(%account_id, "Account supervision stopped");
    }

    /// Send a text reply from an account, subject to the per-recipient
    /// rate limit and the send deadline.
    pub async fn send_text(
        &self,
        account_id: Uuid,
        recipient: &str,
        body: &str,
    ) -> Result<(), TransportError> {
        let (handle, last_activity) = {
            let slot = self
                .accounts
                .get(&account_id)
                .ok_or(TransportError::UnknownAccount(account_id))?;
            (slot.handle.clone(), slot.last_activity.clone())
        };

        let guard = handle.read().await;
        let conn = guard
            .as_ref()
            .ok_or(TransportError::NotConnected(account_id))?;

        // Quota is consumed only by a delivered send; a timed-out or
        // failed attempt leaves the recipient's window untouched.
        if !self.limiter.admits(recipient) {
            return Err(TransportError::RateLimited(recipient.to_string()));
        }

        let timeout_ms = self.settings.send_timeout.as_millis() as u64;
        tokio::time::timeout(self.settings.send_timeout, conn.send_text(recipient, body))
            .await
            .map_err(|_| TransportError::SendTimeout(timeout_ms))??;

        self.limiter.record(recipient);
        last_activity.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        Ok(())
    }

    /// Download inbound media to a local file, bounded by the media
    /// deadline. Failures degrade to `None`; the message is still
    /// processed without its attachment.
    pub async fn download_media(
        &self,
        account_id: Uuid,
        media: &vendly_types::transport::MediaRef,
    ) -> Option<std::path::PathBuf> {
        let handle = self.handle_for(&account_id).ok()?;
        let guard = handle.read().await;
        let conn = guard.as_ref()?;

        match tokio::time::timeout(self.settings.media_timeout, conn.download_media(media)).await
        {
            Ok(Ok(path)) => Some(path),
            Ok(Err(err)) => {
                tracing::warn!(%account_id, media_id = %media.id, error = %err, "Media download failed");
                None
            }
            Err(_) => {
                tracing::warn!(%account_id, media_id = %media.id, "Media download timed out");
                None
            }
        }
    }

    /// Current status of every managed account.
    pub fn statuses(&self) -> Vec<(Uuid, AccountStatus)> {
        self.accounts
            .iter()
            .map(|entry| (*entry.key(), *entry.value().status.borrow()))
            .collect()
    }

    /// Current status of one account, or `None` if it is not managed.
    pub fn connection_state(&self, account_id: &Uuid) -> Option<AccountStatus> {
        self.accounts
            .get(account_id)
            .map(|slot| *slot.status.borrow())
    }

    pub fn is_connected(&self, account_id: &Uuid) -> bool {
        self.connection_state(account_id) == Some(AccountStatus::Connected)
    }

    /// When the account last saw traffic (a delivered send or an inbound
    /// message), or `None` before any activity.
    pub fn last_activity(&self, account_id: &Uuid) -> Option<DateTime<Utc>> {
        let millis = self
            .accounts
            .get(account_id)?
            .last_activity
            .load(Ordering::Relaxed);
        if millis == 0 {
            return None;
        }
        DateTime::from_timestamp_millis(millis)
    }

    /// Stop all accounts, waiting up to the configured grace for their
    /// supervision tasks to settle.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let ids: Vec<Uuid> = self.accounts.iter().map(|entry| *entry.key()).collect();
        let mut tasks = Vec::new();
        for account_id in ids {
            if let Some((_, slot)) = self.accounts.remove(&account_id) {
                if let Some(handle) = slot.handle.write().await.take() {
                    handle.close().await;
                }
                tasks.push(slot.task);
            }
        }

        let drain = async {
            for task in tasks {
                let _ = task.await;
            }
        };
        if tokio::time::timeout(self.settings.shutdown_grace, drain)
            .await
            .is_err()
        {
            tracing::warn!("Shutdown grace elapsed with account tasks still running");
        }
        tracing::info!("Connection manager shut down");
    }

    fn handle_for(
        &self,
        account_id: &Uuid,
    ) -> Result<Arc<tokio::sync::RwLock<Option<BoxTransportHandle>>>, TransportError> {
        self.accounts
            .get(account_id)
            .map(|slot| slot.handle.clone())
            .ok_or(TransportError::UnknownAccount(*account_id))
    }
}

// --- Supervision loop ---

enum LoopOutcome {
    Cancelled,
    Terminal(DisconnectReason),
    Dropped(String),
}

#[allow(clippy::too_many_arguments)]
async fn run_account<C, R, V>(
    account_id: Uuid,
    connector: Arc<C>,
    sessions: Arc<SessionStore<R, V>>,
    bus: EventBus,
    inbound_tx: mpsc::Sender<InboundMessage>,
    status_tx: watch::Sender<AccountStatus>,
    handle_slot: Arc<tokio::sync::RwLock<Option<BoxTransportHandle>>>,
    last_activity: Arc<AtomicI64>,
    cancel: CancellationToken,
    base_delay: Duration,
    max_attempts: u32,
) where
    C: TransportConnector,
    R: SessionRepository + Send + Sync,
    V: SecretSealer,
{
    let mut attempt: u32 = 0;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        set_status(&status_tx, &bus, account_id, AccountStatus::Connecting);

        let credentials = match sessions.load(&account_id).await {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!(%account_id, error = %err, "Credential load failed, pairing fresh");
                CredentialState::fresh()
            }
        };

        let connected = tokio::select! {
            _ = cancel.cancelled() => break,
            result = connector.connect(account_id, credentials) => result,
        };

        let outcome = match connected {
            Ok(connection) => {
                *handle_slot.write().await = Some(connection.handle);
                let outcome = drive_events(
                    account_id,
                    connection.events,
                    &bus,
                    &sessions,
                    &inbound_tx,
                    &status_tx,
                    &last_activity,
                    &cancel,
                    &mut attempt,
                )
                .await;
                if let Some(handle) = handle_slot.write().await.take() {
                    handle.close().await;
                }
                outcome
            }
            Err(err) => LoopOutcome::Dropped(err.to_string()),
        };

        match outcome {
            LoopOutcome::Cancelled => break,
            LoopOutcome::Terminal(reason) => {
                if reason == DisconnectReason::LoggedOut {
                    if let Err(err) = sessions.clear(&account_id).await {
                        tracing::error!(%account_id, error = %err, "Failed to clear session after logout");
                    }
                }
                let final_status = if reason == DisconnectReason::Banned {
                    AccountStatus::Banned
                } else {
                    AccountStatus::Disconnected
                };
                tracing::warn!(%account_id, ?reason, "Connection closed terminally");
                set_status(&status_tx, &bus, account_id, final_status);
                bus.publish(EngineEvent::AccountDisconnected {
                    account_id,
                    reason: format!("{reason:?}"),
                });
                break;
            }
            LoopOutcome::Dropped(detail) => {
                attempt += 1;
                if attempt > max_attempts {
                    tracing::error!(
                        %account_id,
                        attempts = max_attempts,
                        detail,
                        "Reconnect attempts exhausted"
                    );
                    set_status(&status_tx, &bus, account_id, AccountStatus::Disconnected);
                    bus.publish(EngineEvent::AccountDisconnected {
                        account_id,
                        reason: "reconnect attempts exhausted".to_string(),
                    });
                    break;
                }
                let delay = base_delay * attempt;
                tracing::info!(%account_id, attempt, delay_ms = delay.as_millis() as u64, detail, "Reconnecting");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn drive_events<R, V>(
    account_id: Uuid,
    mut events: mpsc::Receiver<TransportEvent>,
    bus: &EventBus,
    sessions: &SessionStore<R, V>,
    inbound_tx: &mpsc::Sender<InboundMessage>,
    status_tx: &watch::Sender<AccountStatus>,
    last_activity: &AtomicI64,
    cancel: &CancellationToken,
    attempt: &mut u32,
) -> LoopOutcome
where
    R: SessionRepository + Send + Sync,
    V: SecretSealer,
{
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => return LoopOutcome::Cancelled,
            event = events.recv() => event,
        };

        let Some(event) = event else {
            return LoopOutcome::Dropped("event stream ended".to_string());
        };

        match event {
            TransportEvent::PairingCode(code) => {
                tracing::info!(%account_id, "Pairing code issued");
                bus.publish(EngineEvent::PairingCode { account_id, code });
            }
            TransportEvent::Connected => {
                *attempt = 0;
                set_status(status_tx, bus, account_id, AccountStatus::Connected);
                tracing::info!(%account_id, "Transport connected");
            }
            TransportEvent::CredentialsUpdated(state) => {
                if let Err(err) = sessions.save(&account_id, &state).await {
                    // Connection stays up; the cost is a re-pair on next restart.
                    tracing::error!(%account_id, error = %err, "Failed to persist rotated credentials");
                }
            }
            TransportEvent::Message(raw) => {
                last_activity.store(Utc::now().timestamp_millis(), Ordering::Relaxed);
                let message = normalize(account_id, raw);
                if inbound_tx.send(message).await.is_err() {
                    tracing::warn!(%account_id, "Inbound channel closed, stopping event loop");
                    return LoopOutcome::Cancelled;
                }
            }
            TransportEvent::Closed(reason) => {
                if reason.is_terminal() {
                    return LoopOutcome::Terminal(reason);
                }
                let detail = match reason {
                    DisconnectReason::Recoverable(detail) => detail,
                    _ => String::new(),
                };
                return LoopOutcome::Dropped(detail);
            }
        }
    }
}

fn set_status(
    status_tx: &watch::Sender<AccountStatus>,
    bus: &EventBus,
    account_id: Uuid,
    status: AccountStatus,
) {
    let changed = status_tx.send_if_modified(|current| {
        if *current == status {
            false
        } else {
            *current = status;
            true
        }
    });
    if changed {
        bus.publish(EngineEvent::ConnectionState { account_id, status });
    }
}
