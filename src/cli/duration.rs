use std::time::Duration;

/// Parses a timeout given as bare seconds (`30`) or in human-friendly form
/// (`30s`, `2m`, `1h 30m`).
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(value).map_err(|err| format!("{value:?}: {err}"))
}

/// Renders a duration back into the form [`parse_duration`] accepts.
pub fn format_duration(value: Duration) -> String {
    humantime::format_duration(value).to_string()
}
