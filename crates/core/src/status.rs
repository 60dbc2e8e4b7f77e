//! Task status enum mapping to the `task_statuses` SMALLINT lookup table.
//!
//! Each variant's discriminant matches the seed data order (1-based) in the
//! `task_statuses` table. The only legal path through the statuses is
//! `pending -> processing -> completed | failed`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

/// Processing status of an image task.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending = 1,
    Processing = 2,
    Completed = 3,
    Failed = 4,
}

impl TaskStatus {
    /// Every status, in seed data order.
    pub const ALL: [TaskStatus; 4] = [
        TaskStatus::Pending,
        TaskStatus::Processing,
        TaskStatus::Completed,
        TaskStatus::Failed,
    ];

    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Lowercase name, as stored in `task_statuses.name` and used in JSON.
    pub fn name(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Look up a status by its database ID.
    pub fn from_id(id: StatusId) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.id() == id)
    }

    /// `completed` and `failed` accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Statuses a task may be in immediately before entering `self`.
    ///
    /// `pending` has no predecessor: a task is only ever created pending.
    pub fn predecessors(self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[],
            Self::Processing => &[Self::Pending],
            Self::Completed | Self::Failed => &[Self::Processing],
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        next.predecessors().contains(&self)
    }
}

impl From<TaskStatus> for StatusId {
    fn from(value: TaskStatus) -> Self {
        value as StatusId
    }
}

impl TryFrom<StatusId> for TaskStatus {
    type Error = CoreError;

    fn try_from(id: StatusId) -> Result<Self, Self::Error> {
        Self::from_id(id)
            .ok_or_else(|| CoreError::Validation(format!("Unknown task status id {id}")))
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
