//! Notification service trait and implementations.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;

/// A delivery attempt the notifier could not complete.
#[derive(Debug, Clone, Error)]
#[error("Notification delivery failed: {0}")]
pub struct NotificationError(pub String);

/// What happened to the reservation being reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Cancelled,
    Removed,
    Expired,
    PurchaseConfirmed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Cancelled => "reservation_cancelled",
            NotificationKind::Removed => "reservation_removed",
            NotificationKind::Expired => "reservation_expired",
            NotificationKind::PurchaseConfirmed => "purchase_confirmed",
        }
    }
}

/// Outbound messages to guest reservers.
///
/// Delivery is best effort: callers log failures and carry on.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Tells a guest their reservation was cancelled.
    async fn notify_reservation_cancelled(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError>;

    /// Tells a guest the owner removed the item they had reserved.
    async fn notify_reservation_removed(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError>;

    /// Tells a guest their reservation lapsed.
    async fn notify_reservation_expired(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError>;

    /// Confirms to a guest that their purchase was recorded.
    async fn notify_purchase_confirmed(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError>;
}

/// Notifier that only logs what it would send.
///
/// Email delivery lives in another service; this is the default when none
/// is wired in.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LogNotifier {
    fn log(kind: NotificationKind, item_name: &str, list_title: &str) {
        tracing::info!(
            notification = kind.as_str(),
            item = item_name,
            list = list_title,
            "notification queued"
        );
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_reservation_cancelled(
        &self,
        _email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        Self::log(NotificationKind::Cancelled, item_name, list_title);
        Ok(())
    }

    async fn notify_reservation_removed(
        &self,
        _email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        Self::log(NotificationKind::Removed, item_name, list_title);
        Ok(())
    }

    async fn notify_reservation_expired(
        &self,
        _email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        Self::log(NotificationKind::Expired, item_name, list_title);
        Ok(())
    }

    async fn notify_purchase_confirmed(
        &self,
        _email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        Self::log(NotificationKind::PurchaseConfirmed, item_name, list_title);
        Ok(())
    }
}

/// A notification captured by [`InMemoryNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentNotification {
    pub kind: NotificationKind,
    pub email: String,
    pub item_name: String,
    pub list_title: String,
}

#[derive(Debug, Default)]
struct InMemoryNotifierState {
    sent: Vec<SentNotification>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<InMemoryNotifierState>>,
}

impl InMemoryNotifier {
    /// Creates a new in-memory notifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures every following delivery to fail.
    pub fn set_fail(&self, fail: bool) {
        self.lock().fail = fail;
    }

    /// Returns the notifications delivered so far.
    pub fn sent(&self) -> Vec<SentNotification> {
        self.lock().sent.clone()
    }

    /// Returns how many notifications of `kind` were delivered.
    pub fn count(&self, kind: NotificationKind) -> usize {
        self.lock().sent.iter().filter(|n| n.kind == kind).count()
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryNotifierState> {
        // Recording state stays usable after a panicking test thread
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(
        &self,
        kind: NotificationKind,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        let mut state = self.lock();
        if state.fail {
            return Err(NotificationError(format!(
                "mailbox unavailable for {}",
                kind.as_str()
            )));
        }
        state.sent.push(SentNotification {
            kind,
            email: email.to_string(),
            item_name: item_name.to_string(),
            list_title: list_title.to_string(),
        });
        Ok(())
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn notify_reservation_cancelled(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        self.record(NotificationKind::Cancelled, email, item_name, list_title)
    }

    async fn notify_reservation_removed(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        self.record(NotificationKind::Removed, email, item_name, list_title)
    }

    async fn notify_reservation_expired(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        self.record(NotificationKind::Expired, email, item_name, list_title)
    }

    async fn notify_purchase_confirmed(
        &self,
        email: &str,
        item_name: &str,
        list_title: &str,
    ) -> Result<(), NotificationError> {
        self.record(
            NotificationKind::PurchaseConfirmed,
            email,
            item_name,
            list_title,
        )
    }
}
