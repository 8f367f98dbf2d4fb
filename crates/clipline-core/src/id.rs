//! Job identifiers.

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A job identifier of the form `job-YYYYMMDD-<tenant>-NNNN`.
///
/// Not a UUID: it embeds the calendar date and per-day sequence number the
/// Job Allocator assigned, so the id alone (plus a known tenant) is enough
/// to locate the job directory on disk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[display("{_0}")]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Build a job id from its constituent parts. `sequence` is zero-padded
    /// to at least four digits.
    pub fn new(date: chrono::NaiveDate, tenant: &str, sequence: u32) -> Self {
        Self(format!(
            "job-{}-{}-{:04}",
            date.format("%Y%m%d"),
            tenant,
            sequence
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recover the job directory's path relative to an output root
    /// (`YYYY/MM/DD/<tenant>/<sequence>`). The tenant segment of the id
    /// itself is not parsed back out — a tenant slug may contain `-`, which
    /// would make splitting it from the fixed-width date and sequence
    /// segments ambiguous — so the caller supplies `tenant` directly (the
    /// allocator call that produced this id already knew it).
    pub fn job_relative_path(&self, tenant: &str) -> Option<std::path::PathBuf> {
        let rest = self.0.strip_prefix("job-")?;
        let date_part = rest.get(0..8)?;
        let sequence_part = rest.rsplit('-').next()?;
        let sequence: u32 = sequence_part.parse().ok()?;
        Some(
            std::path::PathBuf::from(&date_part[0..4])
                .join(&date_part[4..6])
                .join(&date_part[6..8])
                .join(tenant)
                .join(sequence.to_string()),
        )
    }
}

impl std::str::FromStr for JobId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_string()))
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_relative_path_round_trips_through_allocation() {
        let date = chrono::NaiveDate::from_ymd_opt(2026, 7, 26).unwrap();
        let id = JobId::new(date, "acme-media", 7);
        assert_eq!(id.as_str(), "job-20260726-acme-media-0007");
        let path = id.job_relative_path("acme-media").unwrap();
        assert_eq!(
            path,
            std::path::PathBuf::from("2026/07/26/acme-media/7")
        );
    }
}
