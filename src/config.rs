use dirs;
use std::path::PathBuf;
use crate::*;

/// Seconds per unit accepted in a time window argument.
static WINDOW_UNITS: phf::Map<&'static str, u64> = phf::phf_map! {
    "m" => 60,
    "h" => 60 * 60,
    "d" => 24 * 60 * 60,
};

pub const DEFAULT_TIME_WINDOW: &'static str = "5 m";
pub const USER_FILE_NAME: &'static str = "users.csv";

pub fn config_directory() -> Result<PathBuf> {
    let mut p = dirs::config_dir()
        .ok_or_else(|| anyhow!("unable to determine user config directory"))?;
    p.push("speek");
    std::fs::create_dir_all(&p)
        .with_context(|| format!("failed to create speek config subdirectory: {:?}", &p))?;
    Ok(p)
}

/// The user directory file to use when none is given explicitly, if one exists.
pub fn default_user_file() -> Option<PathBuf> {
    let mut p = config_directory().ok()?;
    p.push(USER_FILE_NAME);
    p.exists().then(|| p)
}

/// Parse a release window width such as `"5 m"`, `"2 h"` or `"1 d"` into seconds.
pub fn parse_time_window(s: &str) -> ParseResult<u64> {
    let make_error = || ParseError::TimeWindow(s.to_string());
    let mut parts = s.split_whitespace();
    let (width, unit) = match (parts.next(), parts.next(), parts.next()) {
        (Some(w), Some(u), None) => (w, u),
        _ => return Err(make_error()),
    };
    let width: u64 = width.parse().map_err(|_| make_error())?;
    let unit = WINDOW_UNITS.get(unit).ok_or_else(make_error)?;
    match width.checked_mul(*unit) {
        None | Some(0) => Err(make_error()),
        Some(w) => Ok(w),
    }
}

/// Everything a single pipeline pass needs to know about its caller.
#[derive(Clone, Debug)]
pub struct Config {
    /// Highlighted user, whose jobs are broken down in the report.
    pub me: String,
    /// Release window width in seconds.
    pub window: u64,
    /// CSV file of display names.
    pub user_file: Option<PathBuf>,
}

impl Config {
    pub fn new(me: Option<String>, window: u64, user_file: Option<PathBuf>) -> Self {
        Config {
            me: me.unwrap_or_else(whoami::username),
            window,
            user_file: user_file.or_else(default_user_file),
        }
    }
}
