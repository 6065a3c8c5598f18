//! In-memory backend used as a test double.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{Backend, BackendError, SessionChanges};
use crate::models::{
    IncidentRecord, LookupRecord, LookupTable, NewReport, Profile, Session, User, UserEmail,
};

#[derive(Default)]
pub struct Failures {
    pub get_session: bool,
    pub query_reports: bool,
    pub profiles: bool,
    pub emails: bool,
    pub insert: bool,
    pub lookup: bool,
}

pub struct MemoryBackend {
    pub session: Mutex<Option<Session>>,
    pub accounts: Mutex<Vec<(User, String)>>,
    pub profiles: Mutex<HashMap<Uuid, Profile>>,
    pub emails: Mutex<HashMap<Uuid, String>>,
    pub reports: Mutex<Vec<IncidentRecord>>,
    pub inserted: Mutex<Vec<NewReport>>,
    pub lookups: Mutex<Vec<(LookupTable, String, LookupRecord)>>,
    /// Artificial latency per looked-up fragment.
    pub lookup_delays: Mutex<HashMap<String, Duration>>,
    pub failures: Mutex<Failures>,
    pub profile_calls: AtomicUsize,
    pub lookup_calls: AtomicUsize,
    changes: broadcast::Sender<Option<Session>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            session: Mutex::new(None),
            accounts: Mutex::new(Vec::new()),
            profiles: Mutex::new(HashMap::new()),
            emails: Mutex::new(HashMap::new()),
            reports: Mutex::new(Vec::new()),
            inserted: Mutex::new(Vec::new()),
            lookups: Mutex::new(Vec::new()),
            lookup_delays: Mutex::new(HashMap::new()),
            failures: Mutex::new(Failures::default()),
            profile_calls: AtomicUsize::new(0),
            lookup_calls: AtomicUsize::new(0),
            changes,
        }
    }
}

impl MemoryBackend {
    pub fn with_session(session: Session) -> Self {
        let backend = Self::default();
        *backend.session.lock().unwrap() = Some(session);
        backend
    }

    /// Pushes a change notification as the service would.
    pub fn emit(&self, session: Option<Session>) {
        *self.session.lock().unwrap() = session.clone();
        let _ = self.changes.send(session);
    }

    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    fn fail(&self, pick: impl Fn(&Failures) -> bool) -> Result<(), BackendError> {
        if pick(&self.failures.lock().unwrap()) {
            Err(BackendError::Query("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        self.fail(|f| f.get_session)?;
        Ok(self.session.lock().unwrap().clone())
    }

    fn on_session_change(&self) -> SessionChanges {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let user = self
            .accounts
            .lock()
            .unwrap()
            .iter()
            .find(|(user, secret)| user.email == email && secret == password)
            .map(|(user, _)| user.clone())
            .ok_or(BackendError::InvalidCredentials)?;

        let session = Session {
            user,
            access_token: Uuid::new_v4(),
        };
        self.emit(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.emit(None);
        Ok(())
    }

    async fn profile_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        self.fail(|f| f.profiles)?;
        Ok(self.profiles.lock().unwrap().get(&user_id).cloned())
    }

    async fn query_reports(&self) -> Result<Vec<IncidentRecord>, BackendError> {
        self.fail(|f| f.query_reports)?;
        let mut reports = self.reports.lock().unwrap().clone();
        reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(reports)
    }

    async fn fetch_report(&self, id: Uuid) -> Result<Option<IncidentRecord>, BackendError> {
        self.fail(|f| f.query_reports)?;
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .find(|record| record.id == id)
            .cloned())
    }

    async fn find_by_id(
        &self,
        table: LookupTable,
        fragment: &str,
    ) -> Result<Option<LookupRecord>, BackendError> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.lookup_delays.lock().unwrap().get(fragment).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.fail(|f| f.lookup)?;
        let needle = fragment.to_lowercase();
        Ok(self
            .lookups
            .lock()
            .unwrap()
            .iter()
            .find(|(t, id, _)| *t == table && id.to_lowercase().contains(&needle))
            .map(|(_, _, record)| record.clone()))
    }

    async fn insert_report(&self, report: &NewReport) -> Result<(), BackendError> {
        self.fail(|f| f.insert)?;
        self.inserted.lock().unwrap().push(report.clone());
        Ok(())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, BackendError> {
        self.fail(|f| f.profiles)?;
        let profiles = self.profiles.lock().unwrap();
        Ok(ids.iter().filter_map(|id| profiles.get(id).cloned()).collect())
    }

    async fn user_emails(&self, ids: &[Uuid]) -> Result<Vec<UserEmail>, BackendError> {
        self.fail(|f| f.emails)?;
        let emails = self.emails.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| {
                emails.get(id).map(|email| UserEmail {
                    id: *id,
                    email: email.clone(),
                })
            })
            .collect())
    }
}
