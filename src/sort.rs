use std::cmp::Ordering;

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::columns::Column;
use crate::models::IncidentRecord;
use crate::names::ReporterDirectory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortSpec {
    pub column: Column,
    pub ascending: bool,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: Column::CreatedAt,
            ascending: false,
        }
    }
}

impl SortSpec {
    /// Header click: the active column flips direction, another column
    /// becomes active in ascending order.
    pub fn toggle(&mut self, column: Column) {
        if self.column == column {
            self.ascending = !self.ascending;
        } else {
            self.column = column;
            self.ascending = true;
        }
    }

    /// Arrow shown next to a header.
    pub fn indicator(&self, column: Column) -> &'static str {
        match (self.column == column, self.ascending) {
            (false, _) => "",
            (true, true) => " ▲",
            (true, false) => " ▼",
        }
    }
}

/// Natural-language ordering in three passes: base letters ignoring accents
/// and case, then accents (unaccented first), then case (lowercase first).
/// Decomposed code points break any remaining tie.
pub fn locale_cmp(a: &str, b: &str) -> Ordering {
    base_letters(a)
        .cmp(base_letters(b))
        .then_with(|| accents(a).cmp(&accents(b)))
        .then_with(|| case_order(a, b))
        .then_with(|| a.nfd().cmp(b.nfd()))
}

fn base_letters(s: &str) -> impl Iterator<Item = char> + '_ {
    s.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
}

/// Combining marks attached to each base character, in order.
fn accents(s: &str) -> Vec<Vec<char>> {
    let mut marks: Vec<Vec<char>> = Vec::new();
    for c in s.nfd() {
        if !is_combining_mark(c) {
            marks.push(Vec::new());
        } else if let Some(last) = marks.last_mut() {
            last.push(c);
        } else {
            marks.push(vec![c]);
        }
    }
    marks
}

fn case_order(a: &str, b: &str) -> Ordering {
    for (x, y) in a.nfd().zip(b.nfd()) {
        if x == y {
            continue;
        }
        match (x.is_lowercase(), y.is_lowercase()) {
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
    }
    Ordering::Equal
}

/// Returns a new, stably ordered copy of `records`.
pub fn sort(
    records: &[IncidentRecord],
    spec: SortSpec,
    names: &ReporterDirectory,
) -> Vec<IncidentRecord> {
    let mut keyed: Vec<(String, &IncidentRecord)> = records
        .iter()
        .map(|record| (spec.column.value_of(record, names), record))
        .collect();

    keyed.sort_by(|(a, _), (b, _)| {
        if spec.ascending {
            locale_cmp(a, b)
        } else {
            locale_cmp(b, a)
        }
    });

    keyed.into_iter().map(|(_, record)| record.clone()).collect()
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::filter::tests::record;
    use crate::models::UserEmail;

    fn departments(records: &[IncidentRecord]) -> Vec<String> {
        records
            .iter()
            .map(|r| r.concerned_department.clone().unwrap_or_default())
            .collect()
    }

    #[test]
    fn default_is_created_at_descending() {
        assert_eq!(
            SortSpec::default(),
            SortSpec {
                column: Column::CreatedAt,
                ascending: false
            }
        );
    }

    #[test]
    fn locale_order_ignores_case_first() {
        let mut words = vec!["banana", "Apple", "apple", "Cherry"];
        words.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(words, vec!["apple", "Apple", "banana", "Cherry"]);
    }

    #[test]
    fn accented_names_sort_with_their_base_letter() {
        let mut names = vec!["Frank", "Émile", "Zoe", "Álvaro", "Bob"];
        names.sort_by(|a, b| locale_cmp(a, b));
        assert_eq!(names, vec!["Álvaro", "Bob", "Émile", "Frank", "Zoe"]);
    }

    #[test]
    fn accent_outranks_case_on_equal_letters() {
        assert_eq!(locale_cmp("Emile", "émile"), Ordering::Less);
        assert_eq!(locale_cmp("émile", "Émile"), Ordering::Less);
        assert_eq!(locale_cmp("re\u{301}sume\u{301}", "résumé"), Ordering::Equal);
    }

    #[test]
    fn sorts_by_department_and_reverses_cleanly() {
        let records = vec![
            record(None, Some("Neurology")),
            record(None, Some("cardiology")),
            record(None, Some("Oncology")),
        ];
        let names = ReporterDirectory::default();
        let asc = sort(
            &records,
            SortSpec {
                column: Column::Department,
                ascending: true,
            },
            &names,
        );
        assert_eq!(departments(&asc), vec!["cardiology", "Neurology", "Oncology"]);

        let desc = sort(
            &records,
            SortSpec {
                column: Column::Department,
                ascending: false,
            },
            &names,
        );
        let mut reversed = asc.clone();
        reversed.reverse();
        assert_eq!(desc, reversed);
    }

    #[test]
    fn sorting_is_idempotent_and_does_not_touch_input() {
        let records = vec![
            record(Some("2024-01-03"), None),
            record(Some("2024-01-01"), None),
            record(Some("2024-01-02"), None),
        ];
        let snapshot = records.clone();
        let spec = SortSpec {
            column: Column::IncidentDate,
            ascending: true,
        };
        let names = ReporterDirectory::default();
        let once = sort(&records, spec, &names);
        assert_eq!(sort(&once, spec, &names), once);
        assert_eq!(records, snapshot);
    }

    #[test]
    fn ties_keep_input_order_in_both_directions() {
        let records = vec![
            record(None, Some("Emergency")),
            record(None, Some("Emergency")),
            record(None, Some("Emergency")),
        ];
        let names = ReporterDirectory::default();
        for ascending in [true, false] {
            let out = sort(
                &records,
                SortSpec {
                    column: Column::Department,
                    ascending,
                },
                &names,
            );
            assert_eq!(out, records);
        }
    }

    #[test]
    fn reporter_column_sorts_by_display_name() {
        let mut records = vec![record(None, None), record(None, None)];
        records[0].reporter_id = Uuid::new_v4();
        records[1].reporter_id = Uuid::new_v4();
        let names = ReporterDirectory::new(
            vec![],
            vec![
                UserEmail {
                    id: records[0].reporter_id,
                    email: "zoe@medical.com".to_string(),
                },
                UserEmail {
                    id: records[1].reporter_id,
                    email: "adam@medical.com".to_string(),
                },
            ],
        );
        let out = sort(
            &records,
            SortSpec {
                column: Column::Reporter,
                ascending: true,
            },
            &names,
        );
        assert_eq!(out[0].reporter_id, records[1].reporter_id);
    }

    #[test]
    fn toggle_follows_header_clicks() {
        let mut spec = SortSpec::default();
        spec.toggle(Column::CreatedAt);
        assert!(spec.ascending);
        spec.toggle(Column::PatientId);
        assert_eq!(spec.column, Column::PatientId);
        assert!(spec.ascending);
        spec.toggle(Column::PatientId);
        assert!(!spec.ascending);
        assert_eq!(spec.indicator(Column::PatientId), " ▼");
        assert_eq!(spec.indicator(Column::DeviceId), "");
    }
}
