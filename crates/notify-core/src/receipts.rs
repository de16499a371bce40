//! ReadReceiptService trait: the single mutation the engine may request.

use crate::record::{NotificationId, UserId};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReceiptError {
    #[error("Notification not found: {0}")]
    NotFound(NotificationId),
}

pub type Result<T> = std::result::Result<T, ReceiptError>;

/// Adds users to a notification's `readBy` set.
///
/// `union_read_by` has set-union semantics: calling it again for the same
/// pair succeeds and changes nothing.
#[async_trait]
pub trait ReadReceiptService: Send + Sync {
    async fn union_read_by(&self, id: &NotificationId, user: &UserId) -> Result<()>;
}
