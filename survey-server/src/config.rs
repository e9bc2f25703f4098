use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Idle TTL applied to sessions when the environment does not say
/// otherwise: half an hour covers any plausible pause mid-survey.
const DEFAULT_SESSION_IDLE_TTL_SECS: i64 = 1800;

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    /// Directory for persistent state (SQLite database).
    /// Defaults to current working directory.
    pub state_dir: PathBuf,
    /// Seconds of inactivity after which a session is pruned.
    pub session_idle_ttl_secs: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        let state_dir = env::var("STATE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let session_idle_ttl_secs = parse_session_ttl(env::var("SESSION_IDLE_TTL_SECS").ok())?;

        Ok(Config {
            port,
            state_dir,
            session_idle_ttl_secs,
        })
    }
}

/// Parse SESSION_IDLE_TTL_SECS from an optional string value.
///
/// Missing values fall back to the default; zero and negative values are
/// rejected because they would prune every session on the next sweep.
fn parse_session_ttl(value: Option<String>) -> Result<i64> {
    match value {
        None => Ok(DEFAULT_SESSION_IDLE_TTL_SECS),
        Some(raw) => {
            let ttl = raw
                .parse::<i64>()
                .context("SESSION_IDLE_TTL_SECS must be a valid number")?;
            anyhow::ensure!(ttl > 0, "SESSION_IDLE_TTL_SECS must be positive");
            Ok(ttl)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_session_ttl_default() {
        assert_eq!(
            parse_session_ttl(None).unwrap(),
            DEFAULT_SESSION_IDLE_TTL_SECS
        );
    }

    #[test]
    fn test_parse_session_ttl_valid() {
        assert_eq!(parse_session_ttl(Some("600".to_string())).unwrap(), 600);
    }

    #[test]
    fn test_parse_session_ttl_rejects_nonsense() {
        assert!(parse_session_ttl(Some("soon".to_string())).is_err());
        assert!(parse_session_ttl(Some("0".to_string())).is_err());
        assert!(parse_session_ttl(Some("-5".to_string())).is_err());
    }
}
