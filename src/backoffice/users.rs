use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backoffice::Backoffice;
use crate::backoffice::error::{BackofficeError, Result};
use crate::backoffice::store::ChatStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Supervisor,
    Staff,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Supervisor => write!(f, "supervisor"),
            Role::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "supervisor" => Ok(Role::Supervisor),
            "staff" => Ok(Role::Staff),
            _ => Err(format!("Invalid role: {}", s)),
        }
    }
}

/// Which roles each role may open a chat with.
const COUNTERPART_RULES: &[(Role, &[Role])] = &[
    (Role::Admin, &[Role::Admin, Role::Supervisor, Role::Staff]),
    (Role::Supervisor, &[Role::Admin, Role::Supervisor]),
    (Role::Staff, &[Role::Admin, Role::Supervisor]),
];

impl Role {
    /// Roles allowed to read soft-deleted messages of any conversation.
    pub fn can_audit(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        let now = Utc::now();
        User {
            id: id.into(),
            display_name: display_name.into(),
            role,
            created_at: now,
            updated_at: now,
        }
    }

    /// User ids are joined with `_` to build conversation ids, so they may not contain one.
    pub(crate) fn validate_id(id: &str) -> Result<()> {
        if id.trim().is_empty() || id.contains('_') || id != id.trim() {
            return Err(BackofficeError::InvalidUserId(id.to_string()));
        }
        Ok(())
    }
}

/// Static allow-list: admins see everyone, everyone else sees admins and supervisors.
/// Nobody lists themselves.
pub fn can_list_counterpart(viewer: &User, counterpart: &User) -> bool {
    if viewer.id == counterpart.id {
        return false;
    }
    COUNTERPART_RULES
        .iter()
        .find(|(role, _)| *role == viewer.role)
        .is_some_and(|(_, allowed)| allowed.contains(&counterpart.role))
}

impl Backoffice {
    /// Registers a user, or updates the display name and role of an existing one.
    pub async fn register_user(&self, id: &str, display_name: &str, role: Role) -> Result<User> {
        User::validate_id(id)?;
        let user = User::new(id, display_name, role);
        let saved = self.store.upsert_user(&user).await?;
        tracing::debug!(
            target: "backoffice_chat::users::register_user",
            "Registered user {} with role {}",
            saved.id,
            saved.role
        );
        Ok(saved)
    }

    pub async fn find_user(&self, id: &str) -> Result<User> {
        self.store
            .find_user(id)
            .await?
            .ok_or_else(|| BackofficeError::UserNotFound(id.to_string()))
    }

    /// Lists the users `viewer_id` may chat with, ordered by display name.
    pub async fn list_counterparts(&self, viewer_id: &str) -> Result<Vec<User>> {
        let viewer = self.find_user(viewer_id).await?;
        let users = self.store.list_users().await?;
        Ok(users
            .into_iter()
            .filter(|u| can_list_counterpart(&viewer, u))
            .collect())
    }
}
