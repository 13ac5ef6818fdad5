use std::path::PathBuf;
use std::str::FromStr;

use tracing::warn;

/// What approving a reservation does when an approved reservation already
/// holds one of its slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Fail the approval with `EngineError::Conflict`.
    #[default]
    Reject,
    /// Approve anyway; availability simply treats both as holding the slot.
    Allow,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(ConflictPolicy::Reject),
            "allow" => Ok(ConflictPolicy::Allow),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    /// Semester stamped on requests that do not name one.
    pub current_semester: String,
    /// Accepted requester email suffixes, e.g. `@uefs.br`.
    pub email_domains: Vec<String>,
    pub conflict_policy: ConflictPolicy,
    /// Lab wall-clock offset from UTC; decides "today" and the live status.
    pub utc_offset_minutes: i32,
    /// WAL appends after which the background compactor rewrites the log.
    pub compact_threshold: u64,
}

pub const DEFAULT_EMAIL_DOMAINS: [&str; 3] = ["@uefs.br", "@aluno.uefs.br", "@docente.uefs.br"];

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            current_semester: "2025.2".to_string(),
            email_domains: DEFAULT_EMAIL_DOMAINS.iter().map(|d| d.to_string()).collect(),
            conflict_policy: ConflictPolicy::Reject,
            utc_offset_minutes: -180,
            compact_threshold: 1000,
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring invalid {key}={raw:?}, using default");
            None
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from a key lookup; unset or unparsable keys keep
    /// their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut settings = Self::default();
        if let Some(dir) = lookup("LABDESK_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        settings.metrics_port = parsed(&lookup, "LABDESK_METRICS_PORT");
        if let Some(semester) = lookup("LABDESK_SEMESTER").filter(|s| !s.trim().is_empty()) {
            settings.current_semester = semester.trim().to_string();
        }
        if let Some(domains) = lookup("LABDESK_EMAIL_DOMAINS") {
            let domains: Vec<String> = domains
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| if d.starts_with('@') { d.to_string() } else { format!("@{d}") })
                .collect();
            if domains.is_empty() {
                warn!("LABDESK_EMAIL_DOMAINS is empty, using defaults");
            } else {
                settings.email_domains = domains;
            }
        }
        if let Some(policy) = parsed(&lookup, "LABDESK_CONFLICT_POLICY") {
            settings.conflict_policy = policy;
        }
        if let Some(offset) = parsed::<i32>(&lookup, "LABDESK_UTC_OFFSET_MINUTES") {
            if offset.abs() < 24 * 60 {
                settings.utc_offset_minutes = offset;
            } else {
                warn!("ignoring out-of-range LABDESK_UTC_OFFSET_MINUTES={offset}");
            }
        }
        if let Some(threshold) = parsed(&lookup, "LABDESK_COMPACT_THRESHOLD") {
            settings.compact_threshold = threshold;
        }
        settings
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("labdesk.wal")
    }

    pub fn is_institutional_email(&self, email: &str) -> bool {
        self.email_domains.iter().any(|domain| email.ends_with(domain.as_str()))
    }
}
