use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Identifier assigned by the store, unique for the store's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct NotificationId(pub u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visual treatment requested by the producer; the store never inspects it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Default,
    Success,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub variant: Variant,
    /// Time until automatic removal; zero means "only on explicit removal"
    #[serde(serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub open: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn is_persistent(&self) -> bool {
        self.duration.is_zero()
    }
}

/// Request to show a notification
#[derive(Debug, Clone, Default)]
pub struct NewNotification {
    /// Reuse a known id; a fresh one is generated when absent
    pub id: Option<NotificationId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub variant: Variant,
    /// Falls back to the store's default duration when absent
    pub duration: Option<Duration>,
}

impl NewNotification {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn variant(mut self, variant: Variant) -> Self {
        self.variant = variant;
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Never removed automatically
    pub fn persistent(self) -> Self {
        self.duration(Duration::ZERO)
    }

    pub fn with_id(mut self, id: NotificationId) -> Self {
        self.id = Some(id);
        self
    }
}

/// Partial update merged into an existing notification
#[derive(Debug, Clone, Default)]
pub struct NotificationUpdate {
    pub id: Option<NotificationId>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub variant: Option<Variant>,
    pub duration: Option<Duration>,
    pub open: Option<bool>,
}

impl NotificationUpdate {
    pub fn for_id(id: NotificationId) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub(crate) fn apply_to(self, notification: &mut Notification) {
        if let Some(title) = self.title {
            notification.title = Some(title);
        }
        if let Some(description) = self.description {
            notification.description = Some(description);
        }
        if let Some(variant) = self.variant {
            notification.variant = variant;
        }
        if let Some(duration) = self.duration {
            notification.duration = duration;
        }
        if let Some(open) = self.open {
            notification.open = open;
        }
    }
}

/// Whole milliseconds, saturating at `u64::MAX`
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(saturating_millis(*duration))
}
