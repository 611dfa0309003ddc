use std::net::SocketAddr;

use crate::util::MAX_NODE_ID;

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: time::Duration,
    pub node_id: u16,
    pub session_purge_interval: std::time::Duration,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot retrieve {0} from environment variable.")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let listen_addr = parse_or(&lookup, "LISTEN_ADDR", SocketAddr::from(([0, 0, 0, 0], 8088)))?;

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|it| !it.is_empty())
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let token_ttl_hours: i64 = parse_or(&lookup, "TOKEN_TTL_HOURS", 24)?;
        if token_ttl_hours <= 0 {
            return Err(ConfigError::Invalid {
                name: "TOKEN_TTL_HOURS",
                reason: "must be positive".to_string(),
            });
        }

        let node_id: u16 = parse_or(&lookup, "NODE_ID", 1)?;
        if node_id > MAX_NODE_ID {
            return Err(ConfigError::Invalid {
                name: "NODE_ID",
                reason: format!("must be at most {MAX_NODE_ID}"),
            });
        }

        let purge_secs: u64 = parse_or(&lookup, "SESSION_PURGE_SECS", 300)?;
        if purge_secs == 0 {
            return Err(ConfigError::Invalid {
                name: "SESSION_PURGE_SECS",
                reason: "must be positive".to_string(),
            });
        }

        Ok(Self {
            listen_addr,
            jwt_secret,
            token_ttl: time::Duration::hours(token_ttl_hours),
            node_id,
            session_purge_interval: std::time::Duration::from_secs(purge_secs),
        })
    }
}

fn parse_or<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}
