use std::collections::HashMap;
use std::fmt::Write;

use serde::Serialize;
use uuid::Uuid;

use crate::columns::Column;
use crate::filter::FilterChip;
use crate::models::IncidentRecord;
use crate::names::ReporterDirectory;
use crate::sort::SortSpec;

const TABLE_COLUMNS: [Column; 7] = [
    Column::Reporter,
    Column::IncidentDate,
    Column::IncidentTime,
    Column::PatientId,
    Column::DeviceId,
    Column::Department,
    Column::CreatedAt,
];

#[derive(Debug, Clone, PartialEq)]
pub struct DepartmentSummary {
    pub department: String,
    pub count: usize,
}

pub fn summarize_by_department(records: &[IncidentRecord]) -> Vec<DepartmentSummary> {
    let mut map: HashMap<String, usize> = HashMap::new();

    for record in records {
        let department = record
            .concerned_department
            .clone()
            .unwrap_or_else(|| "Unassigned".to_string());
        *map.entry(department).or_insert(0) += 1;
    }

    let mut summaries: Vec<DepartmentSummary> = map
        .into_iter()
        .map(|(department, count)| DepartmentSummary { department, count })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.department.cmp(&b.department)));
    summaries
}

/// Aligned plain-text table with the sort arrow on the active header.
pub fn render_table(records: &[IncidentRecord], sort: SortSpec, names: &ReporterDirectory) -> String {
    let mut header: Vec<String> = vec!["Report ID".to_string()];
    header.extend(
        TABLE_COLUMNS
            .iter()
            .map(|column| format!("{}{}", column.label(), sort.indicator(*column))),
    );

    let rows: Vec<Vec<String>> = records
        .iter()
        .map(|record| {
            let mut row = vec![record.id.to_string()];
            row.extend(TABLE_COLUMNS.iter().map(|column| column.value_of(record, names)));
            row
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut output = String::new();
    for line in std::iter::once(&header).chain(rows.iter()) {
        let cells: Vec<String> = line
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        let _ = writeln!(output, "{}", cells.join("  ").trim_end());
    }
    output
}

pub fn build_report(
    records: &[IncidentRecord],
    chips: &[FilterChip],
    total: usize,
    names: &ReporterDirectory,
) -> String {
    let summaries = summarize_by_department(records);
    let mut output = String::new();

    let _ = writeln!(output, "# Incident Dashboard Report");
    let filters = if chips.is_empty() {
        "no filters".to_string()
    } else {
        chips.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    };
    let _ = writeln!(output, "Showing {} of {} reports ({})", records.len(), total, filters);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Department Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No reports match these filters.");
    } else {
        for summary in &summaries {
            let _ = writeln!(output, "- {}: {} reports", summary.department, summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Reports");
    if records.is_empty() {
        let _ = writeln!(output, "No results found. Try adjusting your filters.");
    } else {
        let _ = writeln!(
            output,
            "| {} |",
            TABLE_COLUMNS.map(Column::label).join(" | ")
        );
        let _ = writeln!(output, "|{}", "---|".repeat(TABLE_COLUMNS.len()));
        for record in records {
            let cells: Vec<String> = TABLE_COLUMNS
                .iter()
                .map(|column| column.value_of(record, names).replace('|', "\\|"))
                .collect();
            let _ = writeln!(output, "| {} |", cells.join(" | "));
        }
    }

    let mut recent: Vec<&IncidentRecord> = records
        .iter()
        .filter(|record| record.device_report_details.is_some())
        .collect();
    recent.sort_by(|a, b| b.effective_date().cmp(&a.effective_date()));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Recent Incident Notes");

    if recent.is_empty() {
        let _ = writeln!(output, "No device notes recorded for these reports.");
    } else {
        for record in recent.iter().take(5) {
            let _ = writeln!(
                output,
                "- {} ({}) on {}: {}",
                names.display_name(record.reporter_id),
                record.concerned_department.as_deref().unwrap_or("Unassigned"),
                record.effective_date(),
                record.device_report_details.as_deref().unwrap_or_default()
            );
        }
    }

    output
}

#[derive(Serialize)]
struct ExportRow<'a> {
    id: Uuid,
    reporter: String,
    incident_date: String,
    incident_time: String,
    patient_id: &'a str,
    device_id: &'a str,
    concerned_department: &'a str,
    created_at: String,
}

fn export_rows<'a>(
    records: &'a [IncidentRecord],
    names: &ReporterDirectory,
) -> Vec<ExportRow<'a>> {
    records
        .iter()
        .map(|record| ExportRow {
            id: record.id,
            reporter: names.display_name(record.reporter_id),
            incident_date: record.incident_date_text(),
            incident_time: record.incident_time_text(),
            patient_id: record.patient_id.as_deref().unwrap_or_default(),
            device_id: record.device_id.as_deref().unwrap_or_default(),
            concerned_department: record.concerned_department.as_deref().unwrap_or_default(),
            created_at: record.created_at_text(),
        })
        .collect()
}

pub fn write_csv<W: std::io::Write>(
    writer: W,
    records: &[IncidentRecord],
    names: &ReporterDirectory,
) -> anyhow::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    for row in export_rows(records, names) {
        csv.serialize(row)?;
    }
    csv.flush()?;
    Ok(())
}

pub fn render_json(records: &[IncidentRecord], names: &ReporterDirectory) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(&export_rows(records, names))?)
}

/// Full single-report view, free-text sections included.
pub fn render_details(record: &IncidentRecord, names: &ReporterDirectory) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Report Details");
    let _ = writeln!(output, "Report ID: {}", record.id);
    let _ = writeln!(output, "Reporter: {}", names.display_name(record.reporter_id));
    let _ = writeln!(output, "Created At: {}", record.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(output, "Incident Date: {}", record.incident_date_text());
    let _ = writeln!(output, "Incident Time: {}", record.incident_time_text());
    let _ = writeln!(output, "Patient ID: {}", record.patient_id.as_deref().unwrap_or_default());
    let _ = writeln!(output, "Device ID: {}", record.device_id.as_deref().unwrap_or_default());
    let _ = writeln!(
        output,
        "Concerned Department: {}",
        record.concerned_department.as_deref().unwrap_or_default()
    );

    for (title, body) in [
        ("Incident Device Report", &record.device_report_details),
        ("Patient Symptoms Noted", &record.patient_symptoms),
        ("Advice Given", &record.advice_given),
    ] {
        let _ = writeln!(output);
        let _ = writeln!(output, "{title}");
        let _ = writeln!(output, "{}", body.as_deref().unwrap_or_default());
    }

    output
}
