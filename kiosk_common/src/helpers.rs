use std::{env, str::FromStr, time::Duration};

/// Parse a boolean flag from a string value, or return the given default value otherwise.
pub fn parse_boolean_flag(value: Option<String>, default: bool) -> bool {
    let value = match value {
        Some(v) => v,
        None => return default,
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

/// Reads `name` from the environment and parses it. Returns `Ok(None)` if the variable is unset, and the raw value
/// alongside the parse error if it is set but invalid, so that callers can log something useful before falling back.
pub fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, (String, T::Err)> {
    match env::var(name) {
        Ok(s) => s.trim().parse::<T>().map(Some).map_err(|e| (s, e)),
        Err(_) => Ok(None),
    }
}

/// Like [`env_parse`], but interprets the value as a number of seconds.
pub fn env_secs(name: &str) -> Result<Option<Duration>, (String, std::num::ParseIntError)> {
    env_parse::<u64>(name).map(|v| v.map(Duration::from_secs))
}

/// Like [`env_parse`], but interprets the value as a number of milliseconds.
pub fn env_millis(name: &str) -> Result<Option<Duration>, (String, std::num::ParseIntError)> {
    env_parse::<u64>(name).map(|v| v.map(Duration::from_millis))
}
