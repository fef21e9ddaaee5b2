use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use directories::{BaseDirs, ProjectDirs};
use std::path::PathBuf;

/// Profile mode for the application (dev or prod)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Dev,
    Prod,
}

impl Profile {
    fn app_name(self) -> &'static str {
        match self {
            Profile::Dev => "todo-dev",
            Profile::Prod => "todo",
        }
    }
}

/// Get the configuration directory path
/// If profile is Dev, uses "todo-dev" instead of "todo"
pub fn get_config_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "todo", profile.app_name())
        .map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the data directory path
/// If profile is Dev, uses "todo-dev" instead of "todo"
pub fn get_data_dir(profile: Profile) -> Option<PathBuf> {
    ProjectDirs::from("com", "todo", profile.app_name())
        .map(|dirs| dirs.data_dir().to_path_buf())
}

/// Expand `~` in a path string to the user's home directory
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Generate a fresh record identifier (UUID v4, lowercase, hyphenated)
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time as an ISO 8601 UTC string with millisecond precision
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Next modification stamp after `previous`.
///
/// Never returns a time earlier than `previous`, so modification stamps stay
/// non-decreasing even if the wall clock steps backwards.
pub fn advance_timestamp(previous: &str) -> String {
    let now = Utc::now();
    match parse_timestamp(previous) {
        Some(prev) if prev > now => format_timestamp(prev),
        _ => format_timestamp(now),
    }
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parse a due date.
///
/// Accepts RFC 3339 timestamps, local date-times as produced by date-time
/// inputs (`YYYY-MM-DDTHH:MM[:SS]`, read as UTC) and bare dates (`YYYY-MM-DD`,
/// midnight UTC).
pub fn parse_due(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Some(at) = parse_timestamp(value) {
        return Some(at);
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Parse a due date and restate it in the stored timestamp format.
pub fn normalize_due(value: &str) -> Option<String> {
    parse_due(value).map(format_timestamp)
}

/// Format a stored timestamp for display using a chrono format string.
/// Values that do not parse are returned unchanged.
pub fn format_for_display(value: &str, format: &str) -> String {
    match parse_due(value) {
        Some(at) => at.format(format).to_string(),
        None => value.to_string(),
    }
}
