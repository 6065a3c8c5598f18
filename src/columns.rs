use clap::ValueEnum;

use crate::models::IncidentRecord;
use crate::names::ReporterDirectory;

/// Dashboard table columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum Column {
    Reporter,
    IncidentDate,
    IncidentTime,
    PatientId,
    DeviceId,
    Department,
    CreatedAt,
}

impl Column {
    /// Columns offered as multi-select facets.
    pub const FACETS: [Column; 4] = [
        Column::Reporter,
        Column::PatientId,
        Column::DeviceId,
        Column::Department,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Column::Reporter => "Reporter",
            Column::IncidentDate => "Incident Date",
            Column::IncidentTime => "Incident Time",
            Column::PatientId => "Patient ID",
            Column::DeviceId => "Device ID",
            Column::Department => "Concerned Department",
            Column::CreatedAt => "Created At",
        }
    }

    /// Short label used on filter chips.
    pub fn chip_label(self) -> &'static str {
        match self {
            Column::Reporter => "Reporter",
            Column::PatientId => "Patient",
            Column::DeviceId => "Device",
            Column::Department => "Dept",
            other => other.label(),
        }
    }

    /// Cell value as text; absent fields read as "".
    pub fn value_of(self, record: &IncidentRecord, names: &ReporterDirectory) -> String {
        match self {
            Column::Reporter => names.display_name(record.reporter_id),
            Column::IncidentDate => record.incident_date_text(),
            Column::IncidentTime => record.incident_time_text(),
            Column::PatientId => record.patient_id.clone().unwrap_or_default(),
            Column::DeviceId => record.device_id.clone().unwrap_or_default(),
            Column::Department => record.concerned_department.clone().unwrap_or_default(),
            Column::CreatedAt => record.created_at_text(),
        }
    }
}
