use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEPARTMENTS: [&str; 7] = [
    "Cardiology",
    "Neurology",
    "Orthopedics",
    "General Medicine",
    "Emergency",
    "Oncology",
    "Pediatrics",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reporter,
    Admin,
}

impl Role {
    /// Landing route for a signed-in user holding this role.
    pub fn entry_route(self) -> &'static str {
        match self {
            Role::Reporter => "/report/new",
            Role::Admin => "/admin",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Reporter => "reporter",
            Role::Admin => "admin",
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

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "reporter" => Ok(Role::Reporter),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub app_metadata: serde_json::Value,
}

impl User {
    /// Role carried in the identity payload itself, if any.
    pub fn role_claim(&self) -> Option<Role> {
        self.app_metadata
            .get("role")
            .and_then(serde_json::Value::as_str)
            .and_then(|value| value.parse().ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user: User,
    pub access_token: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentRecord {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reporter_id: Uuid,
    pub incident_date: Option<NaiveDate>,
    pub incident_time: Option<NaiveTime>,
    pub patient_id: Option<String>,
    pub device_id: Option<String>,
    pub device_report_details: Option<String>,
    pub patient_symptoms: Option<String>,
    pub advice_given: Option<String>,
    pub concerned_department: Option<String>,
}

impl IncidentRecord {
    /// Incident date when known, otherwise the day the report was filed.
    pub fn effective_date(&self) -> NaiveDate {
        self.incident_date
            .unwrap_or_else(|| self.created_at.date_naive())
    }

    pub fn incident_date_text(&self) -> String {
        self.incident_date
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default()
    }

    pub fn incident_time_text(&self) -> String {
        self.incident_time
            .map(|time| time.format("%H:%M:%S").to_string())
            .unwrap_or_default()
    }

    pub fn created_at_text(&self) -> String {
        self.created_at.to_rfc3339()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmail {
    pub id: Uuid,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patient {
    pub patient_id: String,
    pub full_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub device_id: String,
    pub device_name: String,
    pub manufacturer: String,
    pub model: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTable {
    Patients,
    Devices,
}

impl LookupTable {
    pub fn label(self) -> &'static str {
        match self {
            LookupTable::Patients => "Patient",
            LookupTable::Devices => "Device",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum LookupRecord {
    Patient(Patient),
    Device(Device),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewReport {
    pub reporter_id: Uuid,
    pub incident_date: Option<NaiveDate>,
    pub incident_time: Option<NaiveTime>,
    pub patient_id: Option<String>,
    pub device_id: Option<String>,
    pub device_report_details: Option<String>,
    pub patient_symptoms: Option<String>,
    pub advice_given: Option<String>,
    pub concerned_department: Option<String>,
}
