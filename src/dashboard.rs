use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::watch;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::columns::Column;
use crate::debounce::DebouncedValue;
use crate::facets;
use crate::filter::{self, DatePreset, FilterChip, FilterCriteria};
use crate::models::IncidentRecord;
use crate::names::ReporterDirectory;
use crate::sort::{self, SortSpec};

/// Owns the fetched record set and everything derived from it. Filtering
/// and sorting are recomputed from scratch on every `visible` call.
pub struct Dashboard {
    backend: Arc<dyn Backend>,
    records: Vec<IncidentRecord>,
    names: ReporterDirectory,
    criteria: FilterCriteria,
    sort: SortSpec,
    search: DebouncedValue<String>,
    error: Option<String>,
    loading: bool,
}

impl Dashboard {
    pub fn new(backend: Arc<dyn Backend>, search_delay: Duration) -> Self {
        Self {
            backend,
            records: Vec::new(),
            names: ReporterDirectory::default(),
            criteria: FilterCriteria::default(),
            sort: SortSpec::default(),
            search: DebouncedValue::new(String::new(), search_delay),
            error: None,
            loading: true,
        }
    }

    /// Fetches the record set once, then enriches reporter names.
    pub async fn load(&mut self) {
        self.loading = true;
        self.error = None;

        self.records = match self.backend.query_reports().await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, "dashboard fetch failed");
                self.error = Some(format!("Failed to load reports: {err}"));
                Vec::new()
            }
        };
        self.names = resolve_names(self.backend.as_ref(), &self.records).await;
        self.loading = false;
        info!(records = self.records.len(), "dashboard loaded");
    }

    pub fn records(&self) -> &[IncidentRecord] {
        &self.records
    }

    pub fn names(&self) -> &ReporterDirectory {
        &self.names
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn criteria(&self) -> FilterCriteria {
        let mut criteria = self.criteria.clone();
        criteria.commit_query(&self.search.committed());
        criteria
    }

    pub fn sort_spec(&self) -> SortSpec {
        self.sort
    }

    pub fn set_sort(&mut self, sort: SortSpec) {
        self.sort = sort;
    }

    pub fn toggle_sort(&mut self, column: Column) {
        self.sort.toggle(column);
    }

    /// Raw keystrokes; the filter sees them after the quiet period.
    pub fn set_search_input(&mut self, raw: &str) {
        self.search.set(raw.to_string());
    }

    /// Committed search values, one per quiet period.
    pub fn search_changes(&self) -> watch::Receiver<String> {
        self.search.subscribe()
    }

    pub fn search_pending(&self) -> bool {
        self.search.is_pending()
    }

    pub fn commit_search(&mut self, raw: &str) {
        self.search.commit_now(raw.to_string());
    }

    pub fn toggle_value(&mut self, column: Column, value: &str) {
        self.criteria.toggle(column, value);
    }

    pub fn select_value(&mut self, column: Column, value: &str) {
        self.criteria.select(column, value);
    }

    pub fn set_text_filter(&mut self, column: Column, value: &str) {
        self.criteria.set_text(column, value);
    }

    pub fn set_date_range(&mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) {
        self.criteria.set_date_range(from, to);
    }

    pub fn apply_preset(&mut self, preset: DatePreset, today: NaiveDate) {
        self.criteria.apply_preset(preset, today);
    }

    pub fn chips(&self) -> Vec<FilterChip> {
        self.criteria().chips()
    }

    pub fn remove_chip(&mut self, chip: &FilterChip) {
        if let FilterChip::Search(_) = chip {
            self.search.commit_now(String::new());
        }
        self.criteria.remove_chip(chip);
    }

    pub fn reset_filters(&mut self) {
        self.search.commit_now(String::new());
        self.criteria.reset();
    }

    pub fn facets(&self, column: Column) -> Vec<String> {
        facets::options_for(&self.records, column, &self.names)
    }

    /// Filtered, then sorted.
    pub fn visible(&self) -> Vec<IncidentRecord> {
        let filtered = filter::filter(&self.records, &self.criteria(), &self.names);
        sort::sort(&filtered, self.sort, &self.names)
    }

    /// Message shown instead of rows, if any.
    pub fn empty_message(&self, visible: &[IncidentRecord]) -> Option<&'static str> {
        if self.loading {
            Some("Loading reports…")
        } else if self.error.is_none() && self.records.is_empty() {
            Some("No reports found.")
        } else if visible.is_empty() {
            Some("No results found. Try adjusting your filters.")
        } else {
            None
        }
    }
}

/// Profiles and account emails for every reporter in `records`. Both lookups
/// are optional: a failure only costs readability.
pub async fn resolve_names(backend: &dyn Backend, records: &[IncidentRecord]) -> ReporterDirectory {
    let ids: Vec<Uuid> = records
        .iter()
        .map(|record| record.reporter_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if ids.is_empty() {
        return ReporterDirectory::default();
    }

    let profiles = match backend.profiles_by_ids(&ids).await {
        Ok(profiles) => profiles,
        Err(err) => {
            warn!(error = %err, "profiles fetch failed; falling back to reporter ids");
            Vec::new()
        }
    };
    let emails = match backend.user_emails(&ids).await {
        Ok(emails) => emails,
        Err(err) => {
            warn!(error = %err, "email lookup failed; continuing without account emails");
            Vec::new()
        }
    };

    ReporterDirectory::new(profiles, emails)
}
