use std::collections::BTreeSet;

use crate::columns::Column;
use crate::filter::DatePreset;
use crate::models::IncidentRecord;
use crate::names::ReporterDirectory;

/// Distinct non-empty values of `column` across the full record set, in
/// ascending code-point order. Active filters play no part here.
///
/// Code-point order matches UTF-16 code-unit order everywhere except for
/// characters above U+FFFF, which sort after U+E000..U+FFFF here.
pub fn options_for(
    records: &[IncidentRecord],
    column: Column,
    names: &ReporterDirectory,
) -> Vec<String> {
    records
        .iter()
        .map(|record| column.value_of(record, names))
        .filter(|value| !value.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The fixed single-choice date menu as `(key, label)` pairs.
pub fn date_preset_options() -> Vec<(&'static str, &'static str)> {
    DatePreset::ALL
        .iter()
        .map(|preset| (preset.key(), preset.label()))
        .collect()
}
