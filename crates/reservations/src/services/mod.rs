//! Collaborators the coordinator talks to outside the store.

pub mod notifier;

pub use notifier::{
    InMemoryNotifier, LogNotifier, NotificationError, NotificationKind, Notifier,
    SentNotification,
};
