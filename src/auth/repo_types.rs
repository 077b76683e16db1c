use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Account role. `User` is the standard job seeker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    #[serde(alias = "standard-user")]
    User,
    Employer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Employer => "employer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" | "standard-user" => Ok(Role::User),
            "employer" => Ok(Role::Employer),
            other => Err(format!("Please select correct role (got '{other}')")),
        }
    }
}

/// Stored digest of an outstanding password-reset token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetDigest {
    pub hash: String,
    pub expires_at: OffsetDateTime,
}

/// User account as held by the credential store.
#[derive(Debug, Clone, Serialize)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, not exposed in JSON
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(skip_serializing)]
    pub reset: Option<ResetDigest>,
}

/// Raw `users` row.
#[derive(Debug, FromRow)]
pub struct AccountRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
    pub reset_token_hash: Option<String>,
    pub reset_expires_at: Option<OffsetDateTime>,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(anyhow::Error::msg)?;
        let reset = match (row.reset_token_hash, row.reset_expires_at) {
            (Some(hash), Some(expires_at)) => Some(ResetDigest { hash, expires_at }),
            _ => None,
        };
        Ok(Account {
            id: row.id,
            name: row.name,
            email: row.email,
            role,
            password_hash: row.password_hash,
            created_at: row.created_at,
            reset,
        })
    }
}

/// Fields required to create an account. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub password_hash: String,
}

/// Partial update. `reset: Some(None)` clears a stored reset digest.
#[derive(Debug, Clone, Default)]
pub struct AccountPatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub reset: Option<Option<ResetDigest>>,
}

impl AccountPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.password_hash.is_none()
            && self.reset.is_none()
    }
}
