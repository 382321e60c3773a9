use std::fmt::Display;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use indexmap::IndexMap;
pub use serde_json::Value as JsonValue;

pub use anyhow::{anyhow, bail, Context, Result};
pub use std::result::Result as StdResult;

pub use posix_cli_utils::*;

pub mod fieldname {
    pub const JOB_STATE: &'static str = "JobState";
    pub const JOB_NAME: &'static str = "JobName";
    pub const USER_ID: &'static str = "UserId";
    pub const PARTITION: &'static str = "Partition";
    pub const TRES_PER_NODE: &'static str = "TresPerNode";
    pub const TIME_LIMIT: &'static str = "TimeLimit";
    pub const RUN_TIME: &'static str = "RunTime";

    pub const TRES: &'static str = "TRES";
    pub const TRES_BILLING_WEIGHTS: &'static str = "TRESBillingWeights";

    /// Key inside `TRESBillingWeights`
    pub const BILLING_GPU: &'static str = "GRES/gpu";
    /// Key inside `TRES`
    pub const TRES_GPU: &'static str = "gres/gpu";
}

/// The job states which take part in GPU accounting.  Every other Slurm state is ignored.
#[derive(Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Pending,
    Running,
}

impl JobState {
    /// Display order: running before pending.
    pub const ALL: [JobState; 2] = [JobState::Running, JobState::Pending];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(JobState::Pending),
            "RUNNING" => Some(JobState::Running),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            JobState::Pending => "PENDING",
            JobState::Running => "RUNNING",
        }
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Slurm numeric job id
pub type JobId = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Duration(String),
    EntityId(String),
    GpuCount(String),
    TimeWindow(String),
}

pub type ParseResult<T> = StdResult<T, ParseError>;

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use ParseError::*;
        match self {
            Duration(s) => write!(f, "unable to parse duration ({})", s),
            EntityId(s) => write!(f, "unable to parse entity id ({})", s),
            GpuCount(s) => write!(f, "unable to parse GPU count ({})", s),
            TimeWindow(s) => write!(
                f,
                "invalid time window ({}), expected \"<int> <unit>\" with unit one of m, h, d",
                s
            ),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parse a Slurm duration of the form `HH:MM:SS` or `D-HH:MM:SS` into seconds.
pub fn parse_duration(s: &str) -> ParseResult<u64> {
    lazy_static::lazy_static! {
        static ref FORMAT: Regex =
            Regex::new(r"^((?P<days>\d+)\-)?(?P<hours>\d\d?):(?P<mins>\d\d?):(?P<secs>\d\d?)$")
                .unwrap();
    }
    let make_error = || ParseError::Duration(s.to_string());

    let captures = FORMAT.captures(s).ok_or_else(make_error)?;

    let parse_int = |s: &str| {
        let s = s.trim_start_matches('0');
        if s.is_empty() {
            Ok(0)
        } else {
            s.parse::<u64>().map_err(|_| make_error())
        }
    };

    let parse_field = |n| {
        captures
            .name(n)
            .map(|s| parse_int(s.as_str()))
            .unwrap_or(Ok(0))
    };

    let days = parse_field("days")?;
    let hrs = parse_field("hours")?;
    let min = parse_field("mins")?;
    let secs = parse_field("secs")?;

    days.checked_mul(24)
        .and_then(|h| h.checked_add(hrs))
        .and_then(|h| h.checked_mul(60))
        .and_then(|m| m.checked_add(min))
        .and_then(|m| m.checked_mul(60))
        .and_then(|s| s.checked_add(secs))
        .ok_or_else(make_error)
}

/// Inverse of [`parse_duration`]; the day prefix is only written when non-zero.
pub fn format_duration(secs: u64) -> String {
    let days = secs / 86_400;
    let hrs = (secs / 3600) % 24;
    let min = (secs / 60) % 60;
    let secs = secs % 60;
    if days > 0 {
        format!("{}-{:02}:{:02}:{:02}", days, hrs, min, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hrs, min, secs)
    }
}

mod config;
pub use config::*;

pub mod aggregate;
pub mod model;
pub mod ranges;
pub mod ranking;
pub mod release;
pub mod render;
pub mod report;
pub mod scontrol;
pub mod users;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing() {
        const M: u64 = 60;
        const H: u64 = 60 * M;
        const D: u64 = 24 * H;

        assert_eq!(parse_duration("00:00:00"), Ok(0));
        assert_eq!(parse_duration("00:00:01"), Ok(1));
        assert_eq!(parse_duration("01:00:00"), Ok(H));
        assert_eq!(parse_duration("1-00:00:01"), Ok(1 * D + 1));
        assert_eq!(
            parse_duration("10-12:45:10"),
            Ok(10 * D + 12 * H + 45 * M + 10)
        );
        assert_eq!(parse_duration("0:68:0"), Ok(68 * M));

        assert!(parse_duration("5:0").is_err());
        assert!(parse_duration("00:00.900").is_err());
        assert!(parse_duration("UNLIMITED").is_err());
        assert!(parse_duration("-00:00:00").is_err());
        assert!(parse_duration("").is_err());
        assert!(parse_duration("300000000000000000-00:00:00").is_err());
        assert!(parse_duration("99999999999999999999-00:00:00").is_err());
    }

    #[test]
    fn duration_formatting() {
        assert_eq!(format_duration(0), "00:00:00");
        assert_eq!(format_duration(15 * 60), "00:15:00");
        assert_eq!(format_duration(86_400 + 3723), "1-01:02:03");
        for s in ["00:15:00", "23:59:59", "3-04:05:06"] {
            assert_eq!(format_duration(parse_duration(s).unwrap()), s);
        }
    }

    #[test]
    fn job_states() {
        assert_eq!(JobState::parse("RUNNING"), Some(JobState::Running));
        assert_eq!(JobState::parse("PENDING"), Some(JobState::Pending));
        assert_eq!(JobState::parse("COMPLETED"), None);
        assert_eq!(JobState::parse("running"), None);
        assert_eq!(
            serde_json::to_value(JobState::Running).unwrap(),
            JsonValue::from("RUNNING")
        );
    }
}
