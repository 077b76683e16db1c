use axum::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    auth::repo_types::{Account, AccountPatch, AccountRow, NewAccount},
    error::StoreError,
};

const ACCOUNT_COLUMNS: &str =
    "id, name, email, role, password_hash, created_at, reset_token_hash, reset_expires_at";

/// Persistence of user accounts. Email uniqueness is enforced here.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;
    /// Fails with `Conflict` when the email is taken.
    async fn create(&self, account: NewAccount) -> Result<Account, StoreError>;
    /// Fails with `NotFound` when no account has `id`.
    async fn update_by_id(&self, id: Uuid, patch: AccountPatch) -> Result<Account, StoreError>;
    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError>;
    /// Atomically replace the password of the account holding `digest` with an
    /// expiry after `now`, clearing the digest. `None` when nothing matched.
    async fn consume_reset_digest(
        &self,
        digest: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Account>, StoreError>;
}

#[derive(Clone)]
pub struct PgCredentialStore {
    db: PgPool,
}

impl PgCredentialStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_account(row: AccountRow) -> Result<Account, StoreError> {
    Account::try_from(row).map_err(StoreError::Backend)
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_account).transpose()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_account).transpose()
    }

    async fn create(&self, account: NewAccount) -> Result<Account, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            INSERT INTO users (id, name, email, role, password_hash)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&account.name)
        .bind(&account.email)
        .bind(account.role.as_str())
        .bind(&account.password_hash)
        .fetch_one(&self.db)
        .await
        .map_err(|e| match StoreError::from(e) {
            StoreError::Conflict(_) => StoreError::Conflict("Email already registered".into()),
            other => other,
        })?;
        into_account(row)
    }

    async fn update_by_id(&self, id: Uuid, patch: AccountPatch) -> Result<Account, StoreError> {
        if patch.is_empty() {
            return self.find_by_id(id).await?.ok_or(StoreError::NotFound);
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE users SET ");
        let mut set = qb.separated(", ");
        if let Some(name) = patch.name {
            set.push("name = ").push_bind_unseparated(name);
        }
        if let Some(email) = patch.email {
            set.push("email = ").push_bind_unseparated(email);
        }
        if let Some(hash) = patch.password_hash {
            set.push("password_hash = ").push_bind_unseparated(hash);
        }
        if let Some(reset) = patch.reset {
            let (hash, expires_at) = match reset {
                Some(d) => (Some(d.hash), Some(d.expires_at)),
                None => (None, None),
            };
            set.push("reset_token_hash = ").push_bind_unseparated(hash);
            set.push("reset_expires_at = ").push_bind_unseparated(expires_at);
        }
        qb.push(" WHERE id = ").push_bind(id);
        qb.push(format!(" RETURNING {ACCOUNT_COLUMNS}"));

        let row = qb
            .build_query_as::<AccountRow>()
            .fetch_optional(&self.db)
            .await
            .map_err(|e| match StoreError::from(e) {
                StoreError::Conflict(_) => {
                    StoreError::Conflict("Email already registered".into())
                }
                other => other,
            })?
            .ok_or(StoreError::NotFound)?;
        into_account(row)
    }

    async fn delete_by_id(&self, id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn consume_reset_digest(
        &self,
        digest: &str,
        now: OffsetDateTime,
        password_hash: &str,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query_as::<_, AccountRow>(&format!(
            r#"
            UPDATE users
               SET password_hash = $1, reset_token_hash = NULL, reset_expires_at = NULL
             WHERE reset_token_hash = $2 AND reset_expires_at > $3
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(password_hash)
        .bind(digest)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        row.map(into_account).transpose()
    }
}
