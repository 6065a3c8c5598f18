//! Narrow interface to the persistence/auth service.
//!
//! Every component that needs the backend receives an `Arc<dyn Backend>` so
//! tests can substitute the in-memory double.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::models::{
    IncidentRecord, LookupRecord, LookupTable, NewReport, Profile, Role, Session, UserEmail,
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgBackend;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Invalid login credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("{0}")]
    Query(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("session file error: {0}")]
    SessionFile(#[from] io::Error),
}

/// Stream of session replacements. `None` means the user signed out.
pub type SessionChanges = broadcast::Receiver<Option<Session>>;

#[async_trait]
pub trait Backend: Send + Sync {
    /// Resumes the persisted session, if any.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;

    /// Subscribes to session changes. Dropping the receiver unsubscribes.
    fn on_session_change(&self) -> SessionChanges;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;

    async fn sign_out(&self) -> Result<(), BackendError>;

    async fn profile_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError>;

    /// Every report, newest first.
    async fn query_reports(&self) -> Result<Vec<IncidentRecord>, BackendError>;

    async fn fetch_report(&self, id: Uuid) -> Result<Option<IncidentRecord>, BackendError>;

    /// First row of `table` whose id contains `fragment`, ignoring case.
    async fn find_by_id(
        &self,
        table: LookupTable,
        fragment: &str,
    ) -> Result<Option<LookupRecord>, BackendError>;

    async fn insert_report(&self, report: &NewReport) -> Result<(), BackendError>;

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, BackendError>;

    /// Account emails for the given identities.
    async fn user_emails(&self, ids: &[Uuid]) -> Result<Vec<UserEmail>, BackendError>;
}

/// Role stored on a profile row, if it names a known role.
pub fn profile_role(profile: &Profile) -> Option<Role> {
    profile.role.as_deref().and_then(|value| value.parse().ok())
}
