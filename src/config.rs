use crate::event_sourcing::error::StoreError;

// ============================================================================
// Store Configuration - Environment Surface
// ============================================================================
//
// The deployment environment selects backends purely through environment
// variables; nothing here opens a connection. Endpoints:
//
//   CASSANDRA_HOSTS  comma-separated ScyllaDB/Cassandra contact points
//   MYSQL_HOST / MYSQL_PORT / MYSQL_USER / MYSQL_PASSWORD / MYSQL_DATABASE
//   REDIS_HOST / REDIS_PORT
//
// A backend is "configured" when its host variable is present. User and
// password are mandatory once MYSQL_HOST is set; ports and database name
// have defaults.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MysqlConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreConfig {
    pub cassandra_hosts: Option<Vec<String>>,
    pub mysql: Option<MysqlConfig>,
    pub redis: Option<RedisConfig>,
}

impl StoreConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary lookup (testable seam).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StoreError> {
        let cassandra_hosts = lookup("CASSANDRA_HOSTS").map(|raw| {
            raw.split(',')
                .map(|host| host.trim().to_string())
                .filter(|host| !host.is_empty())
                .collect::<Vec<_>>()
        });

        if let Some(hosts) = &cassandra_hosts {
            if hosts.is_empty() {
                return Err(StoreError::Config(
                    "CASSANDRA_HOSTS is set but contains no hosts".to_string(),
                ));
            }
        }

        let mysql = match lookup("MYSQL_HOST") {
            Some(host) => {
                let user = lookup("MYSQL_USER").ok_or_else(|| {
                    StoreError::Config("MYSQL_HOST is set but MYSQL_USER is missing".to_string())
                })?;
                let password = lookup("MYSQL_PASSWORD").ok_or_else(|| {
                    StoreError::Config(
                        "MYSQL_HOST is set but MYSQL_PASSWORD is missing".to_string(),
                    )
                })?;

                Some(MysqlConfig {
                    host,
                    port: parse_port(&lookup, "MYSQL_PORT", 3306)?,
                    user,
                    password,
                    database: lookup("MYSQL_DATABASE")
                        .unwrap_or_else(|| "event_store".to_string()),
                })
            }
            None => None,
        };

        let redis = match lookup("REDIS_HOST") {
            Some(host) => Some(RedisConfig {
                host,
                port: parse_port(&lookup, "REDIS_PORT", 6379)?,
            }),
            None => None,
        };

        Ok(Self {
            cassandra_hosts,
            mysql,
            redis,
        })
    }
}

fn parse_port(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u16,
) -> Result<u16, StoreError> {
    match lookup(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| StoreError::Config(format!("{name} is not a valid port: '{raw}'"))),
        None => Ok(default),
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
