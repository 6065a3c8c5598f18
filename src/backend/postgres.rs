use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Backend, BackendError, SessionChanges};
use crate::models::{
    Device, IncidentRecord, LookupRecord, LookupTable, NewReport, Patient, Profile, Session,
    User, UserEmail,
};

const REPORT_COLUMNS: &str = "id, created_at, reporter_id, incident_date, incident_time, \
     patient_id, device_id, device_report_details, patient_symptoms, advice_given, \
     concerned_department";

/// Postgres-backed service. The access token of the signed-in user is kept
/// in `session_file` so a later invocation resumes the same session.
pub struct PgBackend {
    pool: PgPool,
    session_file: PathBuf,
    changes: broadcast::Sender<Option<Session>>,
}

impl PgBackend {
    pub fn new(pool: PgPool, session_file: impl Into<PathBuf>) -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            pool,
            session_file: session_file.into(),
            changes,
        }
    }

    fn stored_token(&self) -> Result<Option<Uuid>, BackendError> {
        let raw = match std::fs::read_to_string(&self.session_file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        match Uuid::parse_str(raw.trim()) {
            Ok(token) => Ok(Some(token)),
            Err(_) => {
                warn!(path = %self.session_file.display(), "ignoring malformed session file");
                Ok(None)
            }
        }
    }

    fn clear_token(&self) -> Result<(), BackendError> {
        match std::fs::remove_file(&self.session_file) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }

    fn notify(&self, session: Option<Session>) {
        // No receivers is not an error: nobody is watching yet.
        let _ = self.changes.send(session);
    }
}

pub async fn init_db(pool: &PgPool) -> Result<(), BackendError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool) -> Result<(), BackendError> {
    let users = vec![
        (
            Uuid::parse_str("6a1f3c52-1d0e-4b55-9f3a-2f6c8e0d4a11").map_err(query_err)?,
            "admin@medical.com",
            "Dana Whitfield",
            serde_json::json!({ "role": "admin" }),
            "admin",
        ),
        (
            Uuid::parse_str("b7e2d9a4-5c3f-4e61-8a20-7d4b1f9c6e22").map_err(query_err)?,
            "reporter@medical.com",
            "Ravi Menon",
            // Role only on the profile: resolved through the profile fallback.
            serde_json::json!({}),
            "reporter",
        ),
        (
            Uuid::parse_str("c3a8f1e5-9b2d-4f70-b6c1-0e5a7d3b8f33").map_err(query_err)?,
            "nurse.shah@medical.com",
            "Priya Shah",
            serde_json::json!({ "role": "reporter" }),
            "reporter",
        ),
    ];

    for (id, email, full_name, app_metadata, role) in &users {
        sqlx::query(
            r#"
            INSERT INTO incident_desk.users (id, email, password_hash, app_metadata)
            VALUES ($1, $2, crypt('password123', gen_salt('bf')), $3)
            ON CONFLICT (email) DO UPDATE SET app_metadata = EXCLUDED.app_metadata
            "#,
        )
        .bind(id)
        .bind(email)
        .bind(app_metadata)
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO incident_desk.profiles (id, full_name, email, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET full_name = EXCLUDED.full_name, email = EXCLUDED.email, role = EXCLUDED.role
            "#,
        )
        .bind(id)
        .bind(full_name)
        .bind(email)
        .bind(role)
        .execute(pool)
        .await?;
    }

    let patients = vec![
        ("P12345", "Maya Iyer", seed_date(1984, 4, 12)?, "Female"),
        ("P23456", "Tom Becker", seed_date(1957, 11, 3)?, "Male"),
        ("P34567", "Lena Okafor", seed_date(2011, 7, 28)?, "Female"),
    ];

    for (patient_id, full_name, date_of_birth, gender) in patients {
        sqlx::query(
            r#"
            INSERT INTO incident_desk.patients (patient_id, full_name, date_of_birth, gender)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (patient_id) DO NOTHING
            "#,
        )
        .bind(patient_id)
        .bind(full_name)
        .bind(date_of_birth)
        .bind(gender)
        .execute(pool)
        .await?;
    }

    let devices = vec![
        ("D-ECG-08", "ECG Monitor", "Philips", "PageWriter TC70"),
        ("D-INF-21", "Infusion Pump", "Baxter", "Sigma Spectrum"),
        ("D-VEN-03", "Ventilator", "Draeger", "Evita V500"),
    ];

    for (device_id, device_name, manufacturer, model) in devices {
        sqlx::query(
            r#"
            INSERT INTO incident_desk.devices (device_id, device_name, manufacturer, model)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (device_id) DO NOTHING
            "#,
        )
        .bind(device_id)
        .bind(device_name)
        .bind(manufacturer)
        .bind(model)
        .execute(pool)
        .await?;
    }

    let reporter = users[1].0;
    let nurse = users[2].0;
    let reports = vec![
        (
            Uuid::parse_str("0f3b6f1a-7c1e-4d0b-9a55-3e9d2c7b1a01").map_err(query_err)?,
            reporter,
            seed_date(2026, 1, 28)?,
            seed_time(9, 15)?,
            "P12345",
            "D-ECG-08",
            "Cardiology",
            "Lead disconnect alarm did not sound",
        ),
        (
            Uuid::parse_str("5d2a9e4c-3b7f-4a19-8c60-1f4e7b2d9c02").map_err(query_err)?,
            nurse,
            seed_date(2026, 2, 2)?,
            seed_time(22, 40)?,
            "P23456",
            "D-INF-21",
            "Emergency",
            "Occlusion alarm triggered repeatedly",
        ),
        (
            Uuid::parse_str("9b8c7d6e-5f4a-4b3c-8d2e-1a0f9e8d7c03").map_err(query_err)?,
            reporter,
            seed_date(2026, 2, 5)?,
            seed_time(14, 5)?,
            "P34567",
            "D-VEN-03",
            "Pediatrics",
            "Tidal volume drift during transport",
        ),
    ];

    for (id, reporter_id, incident_date, incident_time, patient_id, device_id, department, details) in
        reports
    {
        sqlx::query(
            r#"
            INSERT INTO incident_desk.reports
            (id, reporter_id, incident_date, incident_time, patient_id, device_id,
             concerned_department, device_report_details)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(id)
        .bind(reporter_id)
        .bind(incident_date)
        .bind(incident_time)
        .bind(patient_id)
        .bind(device_id)
        .bind(department)
        .bind(details)
        .execute(pool)
        .await?;
    }

    info!("seeded demo accounts, patients, devices and reports");
    Ok(())
}

fn seed_date(year: i32, month: u32, day: u32) -> Result<NaiveDate, BackendError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| BackendError::Query(format!("invalid seed date {year}-{month}-{day}")))
}

fn seed_time(hour: u32, minute: u32) -> Result<NaiveTime, BackendError> {
    NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| BackendError::Query(format!("invalid seed time {hour}:{minute}")))
}

fn query_err(err: impl std::fmt::Display) -> BackendError {
    BackendError::Query(err.to_string())
}

fn record_from_row(row: &PgRow) -> Result<IncidentRecord, sqlx::Error> {
    Ok(IncidentRecord {
        id: row.try_get("id")?,
        created_at: row.try_get("created_at")?,
        reporter_id: row.try_get("reporter_id")?,
        incident_date: row.try_get("incident_date")?,
        incident_time: row.try_get("incident_time")?,
        patient_id: row.try_get("patient_id")?,
        device_id: row.try_get("device_id")?,
        device_report_details: row.try_get("device_report_details")?,
        patient_symptoms: row.try_get("patient_symptoms")?,
        advice_given: row.try_get("advice_given")?,
        concerned_department: row.try_get("concerned_department")?,
    })
}

fn profile_from_row(row: &PgRow) -> Result<Profile, sqlx::Error> {
    Ok(Profile {
        id: row.try_get("id")?,
        full_name: row.try_get("full_name")?,
        email: row.try_get("email")?,
        role: row.try_get("role")?,
    })
}

fn user_from_row(row: &PgRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        app_metadata: row.try_get("app_metadata")?,
    })
}

#[async_trait]
impl Backend for PgBackend {
    async fn get_session(&self) -> Result<Option<Session>, BackendError> {
        let Some(token) = self.stored_token()? else {
            return Ok(None);
        };

        let row = sqlx::query(
            r#"
            SELECT u.id, u.email, u.app_metadata
            FROM incident_desk.sessions s
            JOIN incident_desk.users u ON u.id = s.user_id
            WHERE s.access_token = $1
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(Session {
                user: user_from_row(&row)?,
                access_token: token,
            })),
            None => {
                // Revoked server side; forget the stale token.
                self.clear_token()?;
                Ok(None)
            }
        }
    }

    fn on_session_change(&self) -> SessionChanges {
        self.changes.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let row = sqlx::query(
            r#"
            SELECT id, email, app_metadata
            FROM incident_desk.users
            WHERE email = $1 AND password_hash = crypt($2, password_hash)
            "#,
        )
        .bind(email)
        .bind(password)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(BackendError::InvalidCredentials)?;

        let user = user_from_row(&row)?;
        let access_token = Uuid::new_v4();

        sqlx::query("INSERT INTO incident_desk.sessions (access_token, user_id) VALUES ($1, $2)")
            .bind(access_token)
            .bind(user.id)
            .execute(&self.pool)
            .await?;

        std::fs::write(&self.session_file, access_token.to_string())?;

        let session = Session { user, access_token };
        self.notify(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if let Some(token) = self.stored_token()? {
            sqlx::query("DELETE FROM incident_desk.sessions WHERE access_token = $1")
                .bind(token)
                .execute(&self.pool)
                .await?;
        }
        self.clear_token()?;
        self.notify(None);
        Ok(())
    }

    async fn profile_by_id(&self, user_id: Uuid) -> Result<Option<Profile>, BackendError> {
        let row = sqlx::query(
            "SELECT id, full_name, email, role FROM incident_desk.profiles WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(profile_from_row).transpose()?)
    }

    async fn query_reports(&self) -> Result<Vec<IncidentRecord>, BackendError> {
        let query =
            format!("SELECT {REPORT_COLUMNS} FROM incident_desk.reports ORDER BY created_at DESC");

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            records.push(record_from_row(row)?);
        }
        Ok(records)
    }

    async fn fetch_report(&self, id: Uuid) -> Result<Option<IncidentRecord>, BackendError> {
        let query = format!("SELECT {REPORT_COLUMNS} FROM incident_desk.reports WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn find_by_id(
        &self,
        table: LookupTable,
        fragment: &str,
    ) -> Result<Option<LookupRecord>, BackendError> {
        let record = match table {
            LookupTable::Patients => {
                let row = sqlx::query(
                    r#"
                    SELECT patient_id, full_name, date_of_birth, gender
                    FROM incident_desk.patients
                    WHERE patient_id ILIKE '%' || $1 || '%'
                    ORDER BY patient_id
                    LIMIT 1
                    "#,
                )
                .bind(fragment)
                .fetch_optional(&self.pool)
                .await?;

                match row {
                    Some(row) => Some(LookupRecord::Patient(Patient {
                        patient_id: row.try_get("patient_id")?,
                        full_name: row.try_get("full_name")?,
                        date_of_birth: row.try_get("date_of_birth")?,
                        gender: row.try_get("gender")?,
                    })),
                    None => None,
                }
            }
            LookupTable::Devices => {
                let row = sqlx::query(
                    r#"
                    SELECT device_id, device_name, manufacturer, model
                    FROM incident_desk.devices
                    WHERE device_id ILIKE '%' || $1 || '%'
                    ORDER BY device_id
                    LIMIT 1
                    "#,
                )
                .bind(fragment)
                .fetch_optional(&self.pool)
                .await?;

                match row {
                    Some(row) => Some(LookupRecord::Device(Device {
                        device_id: row.try_get("device_id")?,
                        device_name: row.try_get("device_name")?,
                        manufacturer: row.try_get("manufacturer")?,
                        model: row.try_get("model")?,
                    })),
                    None => None,
                }
            }
        };

        Ok(record)
    }

    async fn insert_report(&self, report: &NewReport) -> Result<(), BackendError> {
        sqlx::query(
            r#"
            INSERT INTO incident_desk.reports
            (id, reporter_id, incident_date, incident_time, patient_id, device_id,
             device_report_details, patient_symptoms, advice_given, concerned_department)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(report.reporter_id)
        .bind(report.incident_date)
        .bind(report.incident_time)
        .bind(&report.patient_id)
        .bind(&report.device_id)
        .bind(&report.device_report_details)
        .bind(&report.patient_symptoms)
        .bind(&report.advice_given)
        .bind(&report.concerned_department)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn profiles_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Profile>, BackendError> {
        let rows = sqlx::query(
            "SELECT id, full_name, email, role FROM incident_desk.profiles WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        let mut profiles = Vec::with_capacity(rows.len());
        for row in &rows {
            profiles.push(profile_from_row(row)?);
        }
        Ok(profiles)
    }

    async fn user_emails(&self, ids: &[Uuid]) -> Result<Vec<UserEmail>, BackendError> {
        let rows = sqlx::query("SELECT id, email FROM incident_desk.users WHERE id = ANY($1)")
            .bind(ids.to_vec())
            .fetch_all(&self.pool)
            .await?;

        let mut emails = Vec::with_capacity(rows.len());
        for row in &rows {
            emails.push(UserEmail {
                id: row.try_get("id")?,
                email: row.try_get("email")?,
            });
        }
        Ok(emails)
    }
}
