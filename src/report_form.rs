//! New-incident form: draft validation, submission and the patient/device
//! side panels that follow what the reporter types.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError};
use crate::debounce::Debouncer;
use crate::models::{LookupRecord, LookupTable, NewReport, Session, DEPARTMENTS};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("Invalid incident date: {0}")]
    InvalidDate(String),

    #[error("Invalid incident time: {0}")]
    InvalidTime(String),

    #[error("Unknown department: {0}")]
    UnknownDepartment(String),
}

/// Raw form fields as typed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportDraft {
    pub incident_date: String,
    pub incident_time: String,
    pub patient_id: String,
    pub device_id: String,
    pub device_report_details: String,
    pub patient_symptoms: String,
    pub advice_given: String,
    pub concerned_department: String,
}

impl ReportDraft {
    pub fn to_new_report(&self, reporter_id: uuid::Uuid) -> Result<NewReport, DraftError> {
        let date = self.incident_date.trim();
        if date.is_empty() {
            return Err(DraftError::Missing("Incident Date"));
        }
        let incident_date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|_| DraftError::InvalidDate(date.to_string()))?;

        let time = self.incident_time.trim();
        if time.is_empty() {
            return Err(DraftError::Missing("Incident Time"));
        }
        let incident_time = NaiveTime::parse_from_str(time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(time, "%H:%M:%S"))
            .map_err(|_| DraftError::InvalidTime(time.to_string()))?;

        let department = self.concerned_department.trim();
        if department.is_empty() {
            return Err(DraftError::Missing("Concerned Department"));
        }
        if !DEPARTMENTS.contains(&department) {
            return Err(DraftError::UnknownDepartment(department.to_string()));
        }

        Ok(NewReport {
            reporter_id,
            incident_date: Some(incident_date),
            incident_time: Some(incident_time),
            patient_id: optional(&self.patient_id),
            device_id: optional(&self.device_id),
            device_report_details: optional(&self.device_report_details),
            patient_symptoms: optional(&self.patient_symptoms),
            advice_given: optional(&self.advice_given),
            concerned_department: Some(department.to_string()),
        })
    }
}

fn optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[derive(Debug, Default)]
pub struct ReportForm {
    pub draft: ReportDraft,
    pub success: Option<String>,
    pub error: Option<String>,
}

impl ReportForm {
    pub fn new(draft: ReportDraft) -> Self {
        Self {
            draft,
            ..Self::default()
        }
    }

    /// On failure the draft is left untouched so the user can retry.
    pub async fn submit(&mut self, backend: &dyn Backend, session: Option<&Session>) -> bool {
        self.error = None;
        self.success = None;

        let outcome = match session {
            None => Err(BackendError::NotAuthenticated.to_string()),
            Some(session) => match self.draft.to_new_report(session.user.id) {
                Err(err) => Err(err.to_string()),
                Ok(report) => backend
                    .insert_report(&report)
                    .await
                    .map_err(|err| err.to_string()),
            },
        };

        match outcome {
            Ok(()) => {
                info!("incident report submitted");
                self.success = Some("Report submitted successfully".to_string());
                self.draft = ReportDraft::default();
                true
            }
            Err(message) => {
                warn!(error = %message, "incident report rejected");
                self.error = Some(message);
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupState {
    /// Nothing typed yet.
    Empty,
    Found(LookupRecord),
    NotFound,
}

/// Debounced id lookup. Results for an input that has since changed are
/// dropped on arrival.
pub struct IdLookup {
    table: LookupTable,
    backend: Arc<dyn Backend>,
    delay: Duration,
    debouncer: Debouncer,
    generation: Arc<AtomicU64>,
    state: Arc<watch::Sender<LookupState>>,
}

impl IdLookup {
    pub fn new(table: LookupTable, backend: Arc<dyn Backend>, delay: Duration) -> Self {
        let (state, _) = watch::channel(LookupState::Empty);
        Self {
            table,
            backend,
            delay,
            debouncer: Debouncer::new(),
            generation: Arc::new(AtomicU64::new(0)),
            state: Arc::new(state),
        }
    }

    pub fn input(&mut self, text: &str) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;

        if text.is_empty() {
            self.debouncer.cancel();
            self.state.send_replace(LookupState::Empty);
            return;
        }

        let table = self.table;
        let backend = Arc::clone(&self.backend);
        let latest = Arc::clone(&self.generation);
        let state = Arc::clone(&self.state);
        self.debouncer
            .schedule_async(text.to_string(), self.delay, move |fragment| async move {
                let result = backend.find_by_id(table, &fragment).await;
                if latest.load(Ordering::SeqCst) != generation {
                    debug!(table = table.label(), %fragment, "discarding stale lookup");
                    return;
                }
                let next = match result {
                    Ok(Some(record)) => LookupState::Found(record),
                    Ok(None) => LookupState::NotFound,
                    Err(err) => {
                        warn!(table = table.label(), error = %err, "id lookup failed");
                        LookupState::NotFound
                    }
                };
                state.send_replace(next);
            });
    }

    pub fn state(&self) -> LookupState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LookupState> {
        self.state.subscribe()
    }

    pub fn table(&self) -> LookupTable {
        self.table
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::backend::memory::MemoryBackend;
    use crate::models::{Patient, User};

    fn session() -> Session {
        Session {
            user: User {
                id: Uuid::new_v4(),
                email: "reporter@medical.com".to_string(),
                app_metadata: json!({"role": "reporter"}),
            },
            access_token: Uuid::new_v4(),
        }
    }

    fn draft() -> ReportDraft {
        ReportDraft {
            incident_date: "2024-03-01".to_string(),
            incident_time: "14:30".to_string(),
            patient_id: "P12345".to_string(),
            device_id: String::new(),
            device_report_details: "Alarm silent".to_string(),
            patient_symptoms: String::new(),
            advice_given: String::new(),
            concerned_department: "Cardiology".to_string(),
        }
    }

    fn patient(id: &str) -> LookupRecord {
        LookupRecord::Patient(Patient {
            patient_id: id.to_string(),
            full_name: format!("Patient {id}"),
            date_of_birth: NaiveDate::from_ymd_opt(1980, 1, 1).unwrap(),
            gender: "Female".to_string(),
        })
    }

    #[test]
    fn draft_maps_blank_fields_to_none() {
        let report = draft().to_new_report(Uuid::nil()).unwrap();
        assert_eq!(report.device_id, None);
        assert_eq!(report.patient_id.as_deref(), Some("P12345"));
        assert_eq!(report.incident_time, NaiveTime::from_hms_opt(14, 30, 0));
    }

    #[test]
    fn draft_requires_date_time_and_known_department() {
        let mut d = draft();
        d.incident_date.clear();
        assert_eq!(d.to_new_report(Uuid::nil()), Err(DraftError::Missing("Incident Date")));

        let mut d = draft();
        d.incident_time = "25:00".to_string();
        assert!(matches!(d.to_new_report(Uuid::nil()), Err(DraftError::InvalidTime(_))));

        let mut d = draft();
        d.concerned_department = "Dermatology".to_string();
        assert!(matches!(
            d.to_new_report(Uuid::nil()),
            Err(DraftError::UnknownDepartment(_))
        ));
    }

    #[tokio::test]
    async fn successful_submit_resets_draft() {
        let backend = MemoryBackend::default();
        let session = session();
        let mut form = ReportForm::new(draft());

        assert!(form.submit(&backend, Some(&session)).await);
        assert_eq!(form.success.as_deref(), Some("Report submitted successfully"));
        assert_eq!(form.draft, ReportDraft::default());
        let inserted = backend.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].reporter_id, session.user.id);
    }

    #[tokio::test]
    async fn failed_submit_keeps_draft() {
        let backend = MemoryBackend::default();
        backend.failures.lock().unwrap().insert = true;
        let mut form = ReportForm::new(draft());

        assert!(!form.submit(&backend, Some(&session())).await);
        assert_eq!(form.error.as_deref(), Some("injected failure"));
        assert_eq!(form.draft, draft());
    }

    #[tokio::test]
    async fn submit_without_session_is_rejected() {
        let backend = MemoryBackend::default();
        let mut form = ReportForm::new(draft());
        assert!(!form.submit(&backend, None).await);
        assert_eq!(form.error.as_deref(), Some("Not authenticated"));
        assert!(backend.inserted.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_resolves_after_delay() {
        let backend = Arc::new(MemoryBackend::default());
        backend
            .lookups
            .lock()
            .unwrap()
            .push((LookupTable::Patients, "P12345".to_string(), patient("P12345")));
        let mut lookup = IdLookup::new(LookupTable::Patients, backend.clone(), Duration::from_millis(300));

        lookup.input("p123");
        assert_eq!(lookup.state(), LookupState::Empty);

        tokio::time::sleep(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        assert_eq!(lookup.state(), LookupState::Found(patient("P12345")));

        lookup.input("zzz");
        tokio::time::sleep(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        assert_eq!(lookup.state(), LookupState::NotFound);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_input_clears_immediately_and_cancels() {
        let backend = Arc::new(MemoryBackend::default());
        backend
            .lookups
            .lock()
            .unwrap()
            .push((LookupTable::Patients, "P1".to_string(), patient("P1")));
        let mut lookup = IdLookup::new(LookupTable::Patients, backend.clone(), Duration::from_millis(300));

        lookup.input("P1");
        tokio::time::sleep(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        assert_eq!(lookup.state(), LookupState::Found(patient("P1")));

        lookup.input("P");
        lookup.input("");
        assert_eq!(lookup.state(), LookupState::Empty);

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(lookup.state(), LookupState::Empty);
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_results_do_not_clobber_newer_input() {
        let backend = Arc::new(MemoryBackend::default());
        {
            let mut lookups = backend.lookups.lock().unwrap();
            lookups.push((LookupTable::Patients, "P1".to_string(), patient("P1")));
            lookups.push((LookupTable::Patients, "P2".to_string(), patient("P2")));
        }
        backend
            .lookup_delays
            .lock()
            .unwrap()
            .insert("P1".to_string(), Duration::from_millis(1_000));
        let mut lookup = IdLookup::new(LookupTable::Patients, backend.clone(), Duration::from_millis(300));

        lookup.input("P1");
        tokio::time::sleep(Duration::from_millis(350)).await;
        lookup.input("P2");
        tokio::time::sleep(Duration::from_millis(350)).await;
        tokio::task::yield_now().await;
        assert_eq!(lookup.state(), LookupState::Found(patient("P2")));

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        tokio::task::yield_now().await;
        assert_eq!(lookup.state(), LookupState::Found(patient("P2")));
        assert_eq!(backend.lookup_calls.load(Ordering::SeqCst), 2);
    }
}
