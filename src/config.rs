use anyhow::Context;
use chrono::FixedOffset;

use crate::schedule;

/// Process settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database_url: String,
    /// Offset that defines "today" and anchors stored timestamps.
    pub utc_offset: FixedOffset,
    pub max_connections: u32,
    pub log_json: bool,
    pub operator_name: String,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;

        let utc_offset = match lookup("DESK_UTC_OFFSET") {
            Some(raw) => schedule::parse_offset(&raw).context("DESK_UTC_OFFSET")?,
            None => schedule::utc_offset(),
        };

        let max_connections = match lookup("DESK_MAX_CONNECTIONS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|value| *value > 0)
                .with_context(|| format!("DESK_MAX_CONNECTIONS must be a positive integer, got `{raw}`"))?,
            None => 5,
        };

        Ok(Self {
            database_url,
            utc_offset,
            max_connections,
            log_json: lookup("DESK_LOG_JSON").map(|raw| parse_bool(&raw)).unwrap_or(false),
            operator_name: lookup("DESK_OPERATOR")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "operator".to_string()),
        })
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn init_tracing(log_json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> anyhow::Result<Settings> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let settings = settings(&[("DATABASE_URL", "postgres://localhost/desk")]).unwrap();
        assert_eq!(settings.utc_offset, schedule::utc_offset());
        assert_eq!(settings.max_connections, 5);
        assert!(!settings.log_json);
        assert_eq!(settings.operator_name, "operator");
    }

    #[test]
    fn database_url_is_required() {
        assert!(settings(&[]).is_err());
    }

    #[test]
    fn reads_overrides() {
        let settings = settings(&[
            ("DATABASE_URL", "postgres://localhost/desk"),
            ("DESK_UTC_OFFSET", "-03:00"),
            ("DESK_MAX_CONNECTIONS", "2"),
            ("DESK_LOG_JSON", "true"),
            ("DESK_OPERATOR", "rita"),
        ])
        .unwrap();
        assert_eq!(settings.utc_offset.local_minus_utc(), -3 * 3600);
        assert_eq!(settings.max_connections, 2);
        assert!(settings.log_json);
        assert_eq!(settings.operator_name, "rita");
    }

    #[test]
    fn rejects_bad_values() {
        let base = ("DATABASE_URL", "postgres://localhost/desk");
        assert!(settings(&[base, ("DESK_MAX_CONNECTIONS", "0")]).is_err());
        assert!(settings(&[base, ("DESK_UTC_OFFSET", "mars")]).is_err());
    }
}
