//! Notification records as delivered by the feed.
//!
//! Deserialization is total: a record whose `category`, `message`,
//! `timestamp` or `readBy` is missing, null or of the wrong type still
//! parses, with that field falling back to its default. Only a missing `id`
//! is rejected.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;
use web_time::{SystemTime, UNIX_EPOCH};

/// Opaque, stable identifier of a notification. Never reused by a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    /// Generate a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for NotificationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NotificationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Opaque identifier of a viewing user (an email address in practice).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Kind of notification, used only to pick an alert glyph.
///
/// Anything unrecognized (including a non-string value) degrades to `Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "CategoryRepr")]
pub enum Category {
    #[default]
    Info,
    Alert,
    Success,
}

impl Category {
    pub fn parse(s: &str) -> Self {
        match s {
            "alert" => Self::Alert,
            "success" => Self::Success,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Alert => "alert",
            Self::Success => "success",
        }
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape accepted for `category`: a string, or anything else at all.
#[derive(Deserialize)]
#[serde(untagged)]
enum CategoryRepr {
    Text(String),
    Other(serde::de::IgnoredAny),
}

impl From<CategoryRepr> for Category {
    fn from(repr: CategoryRepr) -> Self {
        match repr {
            CategoryRepr::Text(s) => Category::parse(&s),
            CategoryRepr::Other(_) => Category::Info,
        }
    }
}

/// A single notification as stored and delivered by the feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RecordRepr")]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub message: String,
    pub category: Category,
    /// Creation time in milliseconds since Unix epoch. Ordering only.
    pub timestamp: u64,
    /// Users who acknowledged this record. Grows, never shrinks.
    pub read_by: BTreeSet<UserId>,
}

/// Wire shape of a record. Older writers used `type` instead of `category`;
/// when both are present `category` wins.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordRepr {
    id: NotificationId,
    #[serde(default, deserialize_with = "lenient")]
    message: Option<String>,
    #[serde(default)]
    category: Option<Category>,
    #[serde(default, rename = "type")]
    kind: Option<Category>,
    #[serde(default)]
    timestamp: Option<TimestampRepr>,
    #[serde(default, deserialize_with = "lenient")]
    read_by: Option<BTreeSet<UserId>>,
}

impl From<RecordRepr> for NotificationRecord {
    fn from(repr: RecordRepr) -> Self {
        Self {
            id: repr.id,
            message: repr.message.unwrap_or_default(),
            category: repr.category.or(repr.kind).unwrap_or_default(),
            timestamp: repr.timestamp.map(TimestampRepr::millis).unwrap_or(0),
            read_by: repr.read_by.unwrap_or_default(),
        }
    }
}

/// Wire shape accepted for `timestamp`. Anything that is not a non-negative
/// number sorts as the epoch.
#[derive(Deserialize)]
#[serde(untagged)]
enum TimestampRepr {
    Millis(u64),
    Fractional(f64),
    Other(serde::de::IgnoredAny),
}

impl TimestampRepr {
    fn millis(self) -> u64 {
        match self {
            Self::Millis(ms) => ms,
            Self::Fractional(ms) if ms.is_finite() && ms >= 0.0 => ms as u64,
            _ => 0,
        }
    }
}

impl NotificationRecord {
    pub fn new(
        id: impl Into<NotificationId>,
        message: impl Into<String>,
        category: Category,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            category,
            timestamp,
            read_by: BTreeSet::new(),
        }
    }

    /// Builder-style helper for records that already carry read receipts.
    pub fn with_read_by<I, U>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UserId>,
    {
        self.read_by.extend(users.into_iter().map(Into::into));
        self
    }

    pub fn is_read_by(&self, user: &UserId) -> bool {
        self.read_by.contains(user)
    }

    /// Set-union `user` into `read_by`. Returns false if already present.
    pub fn mark_read_by(&mut self, user: UserId) -> bool {
        self.read_by.insert(user)
    }
}

/// Number of records in `snapshot` that `user` has not acknowledged.
pub fn unread_count(snapshot: &[NotificationRecord], user: &UserId) -> usize {
    snapshot.iter().filter(|r| !r.is_read_by(user)).count()
}

/// Current wall-clock time in milliseconds since Unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// `None` for null or for a value of the wrong shape, instead of an error.
fn lenient<'de, D, T>(d: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Lenient<T> {
        Value(T),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Lenient::<T>::deserialize(d)? {
        Lenient::Value(value) => Some(value),
        Lenient::Other(_) => None,
    })
}
