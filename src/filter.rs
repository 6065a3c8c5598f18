//! Client-side filtering of the fetched incident set.
//!
//! Every predicate is optional and they combine with AND. Within one
//! multi-select column the chosen values combine with OR.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use clap::ValueEnum;

use crate::columns::Column;
use crate::models::IncidentRecord;
use crate::names::ReporterDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DatePreset {
    #[value(name = "7d")]
    Last7Days,
    #[value(name = "30d")]
    Last30Days,
    #[value(name = "ytd")]
    ThisYear,
    #[value(name = "all")]
    AllTime,
}

impl DatePreset {
    pub const ALL: [DatePreset; 4] = [
        DatePreset::Last7Days,
        DatePreset::Last30Days,
        DatePreset::ThisYear,
        DatePreset::AllTime,
    ];

    pub fn key(self) -> &'static str {
        match self {
            DatePreset::Last7Days => "7d",
            DatePreset::Last30Days => "30d",
            DatePreset::ThisYear => "ytd",
            DatePreset::AllTime => "all",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            DatePreset::Last7Days => "Last 7 Days",
            DatePreset::Last30Days => "Last 30 Days",
            DatePreset::ThisYear => "This Year",
            DatePreset::AllTime => "All Time",
        }
    }

    /// Inclusive bounds relative to `today`.
    pub fn bounds(self, today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        match self {
            DatePreset::Last7Days => (Some(today - Duration::days(7)), Some(today)),
            DatePreset::Last30Days => (Some(today - Duration::days(30)), Some(today)),
            DatePreset::ThisYear => (NaiveDate::from_ymd_opt(today.year(), 1, 1), Some(today)),
            DatePreset::AllTime => (None, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterChip {
    Search(String),
    Selected(Column, String),
    DateRange {
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    },
}

impl fmt::Display for FilterChip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterChip::Search(query) => write!(f, "Search: {query}"),
            FilterChip::Selected(column, value) => write!(f, "{}: {value}", column.chip_label()),
            FilterChip::DateRange { from, to } => {
                let side = |d: &Option<NaiveDate>| d.map_or_else(|| "…".to_string(), |d| d.to_string());
                write!(f, "Date: {} → {}", side(from), side(to))
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterCriteria {
    /// Committed search text, already trimmed and lowercased.
    query: String,
    text: BTreeMap<Column, String>,
    selected: BTreeMap<Column, Vec<String>>,
    date_from: Option<NaiveDate>,
    date_to: Option<NaiveDate>,
}

impl FilterCriteria {
    pub fn commit_query(&mut self, raw: &str) {
        self.query = raw.trim().to_lowercase();
    }

    /// Case-insensitive substring filter on one column.
    pub fn set_text(&mut self, column: Column, value: &str) {
        if value.trim().is_empty() {
            self.text.remove(&column);
        } else {
            self.text.insert(column, value.trim().to_lowercase());
        }
    }

    pub fn selected(&self, column: Column) -> &[String] {
        self.selected.get(&column).map_or(&[][..], Vec::as_slice)
    }

    pub fn select(&mut self, column: Column, value: impl Into<String>) {
        let value = value.into();
        let values = self.selected.entry(column).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }

    pub fn deselect(&mut self, column: Column, value: &str) {
        if let Some(values) = self.selected.get_mut(&column) {
            values.retain(|v| v != value);
            if values.is_empty() {
                self.selected.remove(&column);
            }
        }
    }

    pub fn toggle(&mut self, column: Column, value: &str) {
        if self.selected(column).iter().any(|v| v == value) {
            self.deselect(column, value);
        } else {
            self.select(column, value);
        }
    }

    pub fn set_date_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        self.date_from = from;
        self.date_to = to;
    }

    /// Choosing a preset overwrites any explicit bounds.
    pub fn apply_preset(&mut self, preset: DatePreset, today: NaiveDate) {
        let (from, to) = preset.bounds(today);
        self.set_date_range(from, to);
    }

    pub fn chips(&self) -> Vec<FilterChip> {
        let mut chips = Vec::new();
        if !self.query.is_empty() {
            chips.push(FilterChip::Search(self.query.clone()));
        }
        for (column, values) in &self.selected {
            for value in values {
                chips.push(FilterChip::Selected(*column, value.clone()));
            }
        }
        if self.date_from.is_some() || self.date_to.is_some() {
            chips.push(FilterChip::DateRange {
                from: self.date_from,
                to: self.date_to,
            });
        }
        chips
    }

    pub fn remove_chip(&mut self, chip: &FilterChip) {
        match chip {
            FilterChip::Search(_) => self.query.clear(),
            FilterChip::Selected(column, value) => self.deselect(*column, value),
            FilterChip::DateRange { .. } => self.set_date_range(None, None),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn matches(&self, record: &IncidentRecord, names: &ReporterDirectory) -> bool {
        let reporter = names.display_name(record.reporter_id);
        let value = |column: Column| match column {
            Column::Reporter => reporter.clone(),
            other => other.value_of(record, names),
        };

        if !self.query.is_empty() && !haystack(record, &reporter).contains(&self.query) {
            return false;
        }

        for (column, needle) in &self.text {
            if !value(*column).to_lowercase().contains(needle.as_str()) {
                return false;
            }
        }

        for (column, values) in &self.selected {
            let actual = value(*column);
            if !values.is_empty() && !values.iter().any(|v| *v == actual) {
                return false;
            }
        }

        let effective = record.effective_date();
        if self.date_from.is_some_and(|from| effective < from) {
            return false;
        }
        if self.date_to.is_some_and(|to| effective > to) {
            return false;
        }

        true
    }
}

fn haystack(record: &IncidentRecord, reporter: &str) -> String {
    [
        record.id.to_string(),
        reporter.to_string(),
        record.incident_date_text(),
        record.incident_time_text(),
        record.patient_id.clone().unwrap_or_default(),
        record.device_id.clone().unwrap_or_default(),
        record.concerned_department.clone().unwrap_or_default(),
        record.created_at_text(),
    ]
    .iter()
    .map(|part| part.to_lowercase())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Records passing `criteria`, in their original order.
pub fn filter(
    records: &[IncidentRecord],
    criteria: &FilterCriteria,
    names: &ReporterDirectory,
) -> Vec<IncidentRecord> {
    records
        .iter()
        .filter(|record| criteria.matches(record, names))
        .cloned()
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{DateTime, NaiveTime, Utc};
    use uuid::Uuid;

    use super::*;

    pub(crate) fn record(date: Option<&str>, department: Option<&str>) -> IncidentRecord {
        IncidentRecord {
            id: Uuid::new_v4(),
            created_at: DateTime::parse_from_rfc3339("2024-02-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc),
            reporter_id: Uuid::new_v4(),
            incident_date: date.map(|d| d.parse().unwrap()),
            incident_time: NaiveTime::from_hms_opt(9, 0, 0),
            patient_id: None,
            device_id: None,
            device_report_details: None,
            patient_symptoms: None,
            advice_given: None,
            concerned_department: department.map(str::to_string),
        }
    }

    fn day(value: &str) -> NaiveDate {
        value.parse().unwrap()
    }

    fn january() -> Vec<IncidentRecord> {
        (1..=10)
            .map(|d| record(Some(&format!("2024-01-{d:02}")), None))
            .collect()
    }

    #[test]
    fn empty_criteria_keep_everything_in_order() {
        let records = january();
        let out = filter(&records, &FilterCriteria::default(), &ReporterDirectory::default());
        assert_eq!(out, records);
    }

    #[test]
    fn last_seven_days_is_inclusive() {
        let records = january();
        let mut criteria = FilterCriteria::default();
        criteria.apply_preset(DatePreset::Last7Days, day("2024-01-10"));

        let out = filter(&records, &criteria, &ReporterDirectory::default());
        let dates: Vec<String> = out.iter().map(IncidentRecord::incident_date_text).collect();
        let expected: Vec<String> = (3..=10).map(|d| format!("2024-01-{d:02}")).collect();
        assert_eq!(dates, expected);
    }

    #[test]
    fn presets_overwrite_explicit_bounds() {
        let mut criteria = FilterCriteria::default();
        criteria.set_date_range(Some(day("2020-01-01")), Some(day("2020-12-31")));
        criteria.apply_preset(DatePreset::ThisYear, day("2024-05-20"));
        assert_eq!(
            criteria.chips(),
            vec![FilterChip::DateRange {
                from: Some(day("2024-01-01")),
                to: Some(day("2024-05-20")),
            }]
        );

        criteria.apply_preset(DatePreset::AllTime, day("2024-05-20"));
        assert!(criteria.chips().is_empty());
    }

    #[test]
    fn missing_incident_date_uses_created_at_day() {
        let records = vec![record(None, None)];
        let mut criteria = FilterCriteria::default();
        criteria.set_date_range(Some(day("2024-02-01")), Some(day("2024-02-01")));
        assert_eq!(filter(&records, &criteria, &ReporterDirectory::default()).len(), 1);

        criteria.set_date_range(Some(day("2024-02-02")), None);
        assert!(filter(&records, &criteria, &ReporterDirectory::default()).is_empty());
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let records = vec![
            record(Some("2024-01-01"), Some("Cardiology")),
            record(Some("2024-01-02"), Some("Neurology")),
        ];
        let mut criteria = FilterCriteria::default();
        criteria.commit_query("  CARDIO ");

        let out = filter(&records, &criteria, &ReporterDirectory::default());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].concerned_department.as_deref(), Some("Cardiology"));
    }

    #[test]
    fn selections_are_or_within_and_across_columns() {
        let mut records = vec![
            record(Some("2024-01-01"), Some("Cardiology")),
            record(Some("2024-01-02"), Some("Neurology")),
            record(Some("2024-01-03"), Some("Oncology")),
        ];
        records[0].device_id = Some("D-1".to_string());
        records[1].device_id = Some("D-2".to_string());
        records[2].device_id = Some("D-1".to_string());
        let names = ReporterDirectory::default();

        let mut criteria = FilterCriteria::default();
        criteria.select(Column::Department, "Cardiology");
        assert_eq!(filter(&records, &criteria, &names).len(), 1);

        criteria.select(Column::Department, "Oncology");
        assert_eq!(filter(&records, &criteria, &names).len(), 2);

        criteria.select(Column::DeviceId, "D-2");
        assert!(filter(&records, &criteria, &names).is_empty());
    }

    #[test]
    fn selection_match_is_exact_and_case_sensitive() {
        let records = vec![record(None, Some("Cardiology"))];
        let mut criteria = FilterCriteria::default();
        criteria.select(Column::Department, "cardiology");
        assert!(filter(&records, &criteria, &ReporterDirectory::default()).is_empty());
    }

    #[test]
    fn enlarging_a_selection_never_shrinks_results() {
        let records = vec![
            record(None, Some("Cardiology")),
            record(None, Some("Neurology")),
            record(None, None),
        ];
        let names = ReporterDirectory::default();
        let mut criteria = FilterCriteria::default();
        let mut previous = 0;
        for value in ["Cardiology", "Neurology", "Pediatrics"] {
            criteria.select(Column::Department, value);
            let count = filter(&records, &criteria, &names).len();
            assert!(count >= previous);
            previous = count;
        }
    }

    #[test]
    fn text_filter_matches_display_name() {
        let mut records = vec![record(None, None), record(None, None)];
        let named = records[0].reporter_id;
        records[1].reporter_id = Uuid::new_v4();
        let names = ReporterDirectory::new(
            vec![],
            vec![crate::models::UserEmail {
                id: named,
                email: "ravi@medical.com".to_string(),
            }],
        );
        let mut criteria = FilterCriteria::default();
        criteria.set_text(Column::Reporter, "RAVI");
        let out = filter(&records, &criteria, &names);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].reporter_id, named);
    }

    #[test]
    fn chips_describe_and_clear_filters() {
        let mut criteria = FilterCriteria::default();
        criteria.commit_query("pump");
        criteria.select(Column::Department, "Emergency");
        criteria.set_date_range(Some(day("2024-01-01")), None);

        let chips = criteria.chips();
        let labels: Vec<String> = chips.iter().map(ToString::to_string).collect();
        assert_eq!(
            labels,
            vec!["Search: pump", "Dept: Emergency", "Date: 2024-01-01 → …"]
        );

        for chip in &chips {
            criteria.remove_chip(chip);
        }
        assert!(criteria.chips().is_empty());
    }

    #[test]
    fn toggle_flips_membership() {
        let mut criteria = FilterCriteria::default();
        criteria.toggle(Column::PatientId, "P1");
        assert_eq!(criteria.selected(Column::PatientId), ["P1".to_string()]);
        criteria.toggle(Column::PatientId, "P1");
        assert!(criteria.selected(Column::PatientId).is_empty());
    }
}
