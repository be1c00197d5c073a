use serde::{Deserialize, Serialize};

/// Lifecycle transition names delivered to notification consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransitionKind {
    Created,
    Approved,
    Assigned,
    Diagnosed,
    Started,
    Completed,
    Canceled,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Created => "CREATED",
            TransitionKind::Approved => "APPROVED",
            TransitionKind::Assigned => "ASSIGNED",
            TransitionKind::Diagnosed => "DIAGNOSED",
            TransitionKind::Started => "STARTED",
            TransitionKind::Completed => "COMPLETED",
            TransitionKind::Canceled => "CANCELED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "CREATED" => Some(TransitionKind::Created),
            "APPROVED" => Some(TransitionKind::Approved),
            "ASSIGNED" => Some(TransitionKind::Assigned),
            "DIAGNOSED" => Some(TransitionKind::Diagnosed),
            "STARTED" => Some(TransitionKind::Started),
            "COMPLETED" => Some(TransitionKind::Completed),
            "CANCELED" => Some(TransitionKind::Canceled),
            _ => None,
        }
    }
}

/// One recorded lifecycle transition, as broadcast to SSE subscribers and
/// handed to the notification dispatcher.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionEvent {
    pub id: i64,
    pub user_id: i64,
    pub booking_id: i64,
    pub transition: TransitionKind,
    pub created_at: String,
}
