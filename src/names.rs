use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{Profile, UserEmail};

/// Best-effort mapping from reporter identity to something a human can read.
#[derive(Debug, Clone, Default)]
pub struct ReporterDirectory {
    profiles: HashMap<Uuid, Profile>,
    emails: HashMap<Uuid, String>,
}

impl ReporterDirectory {
    pub fn new(profiles: Vec<Profile>, emails: Vec<UserEmail>) -> Self {
        Self {
            profiles: profiles.into_iter().map(|p| (p.id, p)).collect(),
            emails: emails.into_iter().map(|e| (e.id, e.email)).collect(),
        }
    }

    /// Account email, then profile name, then profile email, then the raw id.
    /// Empty strings count as missing.
    pub fn display_name(&self, reporter_id: Uuid) -> String {
        let profile = self.profiles.get(&reporter_id);
        self.emails
            .get(&reporter_id)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
            .or_else(|| non_empty(profile.and_then(|p| p.full_name.as_deref())))
            .or_else(|| non_empty(profile.and_then(|p| p.email.as_deref())))
            .map(str::to_string)
            .unwrap_or_else(|| reporter_id.to_string())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
