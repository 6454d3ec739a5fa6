use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use super::state::JobStatus;
use crate::error::{BoardError, Result};

/// Opaque job identifier, `job_<uuid>` for jobs created by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(format!("job_{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An amount of money held as whole cents.
///
/// Serialized as a decimal number (`12.5` for 1250 cents) so stored and
/// transmitted jobs keep the plain numeric `bounty` field. The decimal form is
/// an `f64`, which holds every whole cent only up to 2^53, so amounts built
/// from decimals or sums are capped at [`Money::MAX_CENTS`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest magnitude, in cents, that survives the decimal encoding exactly.
    pub const MAX_CENTS: i64 = 1 << 53;

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Convert a decimal amount, rounding to the nearest cent.
    /// Returns `None` for NaN, infinities and anything beyond
    /// [`Money::MAX_CENTS`].
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents.abs() > Self::MAX_CENTS as f64 {
            return None;
        }
        Some(Self(cents as i64))
    }

    pub fn as_decimal(self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// The portion of this amount given by `bps` basis points, rounded to the
    /// nearest cent with halves rounded away from zero.
    pub fn share_bps(self, bps: i64) -> Money {
        let scaled = i128::from(self.0) * i128::from(bps);
        let half = if scaled >= 0 { 5_000 } else { -5_000 };
        Money(((scaled + half) / 10_000) as i64)
    }

    /// Sum of two amounts, or `None` past [`Money::MAX_CENTS`].
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0
            .checked_add(other.0)
            .filter(|cents| cents.abs() <= Self::MAX_CENTS)
            .map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_f64(self.as_decimal())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let amount = f64::deserialize(deserializer)?;
        Money::from_decimal(amount)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid money amount: {amount}")))
    }
}

/// Format of the requested edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    ShortForm,
    LongForm,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ShortForm => "short-form",
            JobKind::LongForm => "long-form",
        }
    }

    pub fn parse(s: &str) -> Option<JobKind> {
        match s {
            "short-form" => Some(JobKind::ShortForm),
            "long-form" => Some(JobKind::LongForm),
            _ => None,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields a creator supplies when posting a job.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewJob {
    pub title: String,
    pub description: String,
    pub long_description: Option<String>,
    pub bounty: f64,
    pub video_url: String,
    #[serde(rename = "type")]
    pub kind: Option<JobKind>,
    pub deadline: Option<NaiveDate>,
    pub requirements: Vec<String>,
}

/// A unit of editing work posted on the board.
///
/// Fields are public for reading; mutation goes through
/// [`StateMachine::apply`](super::StateMachine::apply) so the invariants
/// checked by [`Job::check_invariants`] hold for every stored job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    pub creator_id: String,
    pub editor_id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub long_description: Option<String>,
    pub bounty: Money,
    pub status: JobStatus,
    #[serde(rename = "type", default)]
    pub kind: Option<JobKind>,
    #[serde(default)]
    pub deadline: Option<NaiveDate>,
    #[serde(default)]
    pub requirements: Vec<String>,
    pub video_url: String,
    pub submission_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Validate `fields` and build a fresh OPEN job owned by `creator_id`.
    pub fn new(creator_id: &str, fields: NewJob) -> Result<Self> {
        let creator_id = creator_id.trim();
        let title = fields.title.trim();
        let description = fields.description.trim();
        let video_url = fields.video_url.trim();

        let mut problems = Vec::new();
        if creator_id.is_empty() {
            problems.push("creatorId is required".to_string());
        }
        if title.is_empty() {
            problems.push("title is required".to_string());
        }
        if description.is_empty() {
            problems.push("description is required".to_string());
        }
        if video_url.is_empty() {
            problems.push("videoUrl is required".to_string());
        }
        let bounty = match Money::from_decimal(fields.bounty) {
            Some(amount) if amount > Money::ZERO => Some(amount),
            _ => {
                problems.push(format!("bounty must be positive, got {}", fields.bounty));
                None
            }
        };

        let Some(bounty) = bounty.filter(|_| problems.is_empty()) else {
            return Err(BoardError::Validation(problems.join("; ")));
        };

        let now = Utc::now();
        Ok(Self {
            id: JobId::generate(),
            creator_id: creator_id.to_string(),
            editor_id: None,
            title: title.to_string(),
            description: description.to_string(),
            long_description: fields
                .long_description
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            bounty,
            status: JobStatus::Open,
            kind: fields.kind,
            deadline: fields.deadline,
            requirements: fields
                .requirements
                .iter()
                .map(|r| r.trim())
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect(),
            video_url: video_url.to_string(),
            submission_url: None,
            created_at: now,
            updated_at: now,
            claimed_at: None,
            submitted_at: None,
            approved_at: None,
        })
    }

    /// Check the field invariants tied to `status`.
    pub fn check_invariants(&self) -> std::result::Result<(), String> {
        let claimed = self.status >= JobStatus::Claimed;
        let submitted = self.status >= JobStatus::Submitted;
        let approved = self.status >= JobStatus::Approved;

        let checks = [
            (self.editor_id.is_some() == claimed, "editorId"),
            (self.claimed_at.is_some() == claimed, "claimedAt"),
            (self.submission_url.is_some() == submitted, "submissionUrl"),
            (self.submitted_at.is_some() == submitted, "submittedAt"),
            (self.approved_at.is_some() == approved, "approvedAt"),
        ];
        for (ok, field) in checks {
            if !ok {
                return Err(format!(
                    "job {}: {field} does not match status {}",
                    self.id, self.status
                ));
            }
        }
        if self.bounty <= Money::ZERO {
            return Err(format!("job {}: bounty must be positive", self.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> NewJob {
        NewJob {
            title: "Edit clip".into(),
            description: "...".into(),
            bounty: 100.0,
            video_url: "https://x/raw.mp4".into(),
            ..Default::default()
        }
    }

    #[test]
    fn job_creation_defaults() {
        let job = Job::new("creator-1", fields()).unwrap();
        assert_eq!(job.status, JobStatus::Open);
        assert_eq!(job.creator_id, "creator-1");
        assert!(job.editor_id.is_none());
        assert!(job.submission_url.is_none());
        assert_eq!(job.bounty, Money::from_cents(10_000));
        assert!(job.id.as_str().starts_with("job_"));
        assert_eq!(job.created_at, job.updated_at);
        assert!(job.check_invariants().is_ok());
    }

    #[test]
    fn job_ids_are_unique() {
        let a = Job::new("c", fields()).unwrap();
        let b = Job::new("c", fields()).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn zero_bounty_is_rejected() {
        let err = Job::new("c", NewJob { bounty: 0.0, ..fields() }).unwrap_err();
        assert!(matches!(err, BoardError::Validation(ref msg) if msg.contains("bounty")));
    }

    #[test]
    fn negative_and_nan_bounty_are_rejected() {
        assert!(Job::new("c", NewJob { bounty: -5.0, ..fields() }).is_err());
        assert!(Job::new("c", NewJob { bounty: f64::NAN, ..fields() }).is_err());
        // Rounds to zero cents.
        assert!(Job::new("c", NewJob { bounty: 0.004, ..fields() }).is_err());
    }

    #[test]
    fn missing_fields_are_all_reported() {
        let err = Job::new(
            " ",
            NewJob {
                title: "  ".into(),
                video_url: String::new(),
                ..fields()
            },
        )
        .unwrap_err();
        let BoardError::Validation(msg) = err else {
            panic!("expected validation error");
        };
        assert!(msg.contains("creatorId"));
        assert!(msg.contains("title"));
        assert!(msg.contains("videoUrl"));
        assert!(!msg.contains("description"));
    }

    #[test]
    fn text_fields_are_trimmed_and_blank_tags_dropped() {
        let job = Job::new(
            "creator-1",
            NewJob {
                title: "  Edit clip ".into(),
                long_description: Some("   ".into()),
                requirements: vec![" Premiere Pro ".into(), "".into(), "Captions".into()],
                ..fields()
            },
        )
        .unwrap();
        assert_eq!(job.title, "Edit clip");
        assert!(job.long_description.is_none());
        assert_eq!(job.requirements, vec!["Premiere Pro", "Captions"]);
    }

    #[test]
    fn money_rounds_to_nearest_cent() {
        assert_eq!(Money::from_decimal(12.346), Some(Money::from_cents(1235)));
        assert_eq!(Money::from_decimal(0.1 + 0.2), Some(Money::from_cents(30)));
        assert_eq!(Money::from_decimal(f64::INFINITY), None);
    }

    #[test]
    fn money_beyond_exact_float_cents_is_rejected() {
        assert_eq!(
            Money::from_decimal(90_000_000_000_000.0),
            Some(Money::from_cents(9_000_000_000_000_000))
        );
        assert_eq!(Money::from_decimal(1e14), None);
        assert_eq!(Money::from_decimal(-1e14), None);

        let top = Money::from_cents(Money::MAX_CENTS);
        assert_eq!(top.checked_add(Money::ZERO), Some(top));
        assert_eq!(top.checked_add(Money::from_cents(1)), None);

        assert!(serde_json::from_value::<Money>(serde_json::json!(1e14)).is_err());
        assert_eq!(
            serde_json::from_value::<Money>(serde_json::json!(85.0)).unwrap(),
            Money::from_cents(8_500)
        );
    }

    #[test]
    fn money_share_rounds_half_up() {
        assert_eq!(Money::from_cents(10_000).share_bps(8_500), Money::from_cents(8_500));
        assert_eq!(Money::from_cents(3).share_bps(8_500), Money::from_cents(3));
        assert_eq!(Money::from_cents(1).share_bps(8_500), Money::from_cents(1));
        assert_eq!(Money::from_cents(2_999).share_bps(8_500), Money::from_cents(2_549));
    }

    #[test]
    fn money_display() {
        assert_eq!(Money::from_cents(8_500).to_string(), "85.00");
        assert_eq!(Money::from_cents(5).to_string(), "0.05");
        assert_eq!(Money::from_cents(-150).to_string(), "-1.50");
    }

    #[test]
    fn job_serializes_with_nullable_fields() {
        let job = Job::new(
            "creator-1",
            NewJob {
                kind: Some(JobKind::ShortForm),
                deadline: NaiveDate::from_ymd_opt(2026, 10, 20),
                ..fields()
            },
        )
        .unwrap();
        let value = serde_json::to_value(&job).unwrap();
        assert_eq!(value["status"], "OPEN");
        assert_eq!(value["creatorId"], "creator-1");
        assert!(value["editorId"].is_null());
        assert!(value["submissionUrl"].is_null());
        assert_eq!(value["bounty"], 100.0);
        assert_eq!(value["type"], "short-form");
        assert_eq!(value["deadline"], "2026-10-20");
        assert_eq!(value["videoUrl"], "https://x/raw.mp4");
    }

    #[test]
    fn new_job_deserializes_camel_case_with_defaults() {
        let json = r#"{"title":"T","description":"D","bounty":12.5,"videoUrl":"u","type":"long-form"}"#;
        let parsed: NewJob = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.bounty, 12.5);
        assert_eq!(parsed.kind, Some(JobKind::LongForm));
        assert!(parsed.requirements.is_empty());
        assert!(parsed.deadline.is_none());
    }

    #[test]
    fn invariant_check_flags_open_job_with_editor() {
        let mut job = Job::new("c", fields()).unwrap();
        job.editor_id = Some("editor-1".into());
        let err = job.check_invariants().unwrap_err();
        assert!(err.contains("editorId"));
    }

    #[test]
    fn job_kind_parse() {
        assert_eq!(JobKind::parse("short-form"), Some(JobKind::ShortForm));
        assert_eq!(JobKind::parse("medium"), None);
        assert_eq!(JobKind::LongForm.to_string(), "long-form");
    }
}
