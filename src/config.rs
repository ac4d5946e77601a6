//! Database-wide defaults.

use std::time::Duration;
use crate::{
    bulk::BulkLimits,
    failover::FailoverStrategy,
    write::WriteConcern,
    error::{ Error, ErrorKind, Result, ResultExt },
};

/// Defaults inherited by every collection of a database.
///
/// Every field is optional when deserializing; durations are
/// given in milliseconds.
/// ```
/// # use std::time::Duration;
/// # use drupe::config::Config;
/// # use drupe::error::Result;
/// # fn main() -> Result<()> {
/// let config = Config::from_json(r#"{
///     "failover": { "retries": 2 },
///     "bulk": { "bulk_size": 500 },
///     "tail_poll_interval": 250
/// }"#)?;
///
/// assert_eq!(config.failover.retries, 2);
/// assert_eq!(config.failover.initial_delay, Duration::from_millis(500));
/// assert_eq!(config.bulk.bulk_size, 500);
/// assert_eq!(config.tail_poll_interval, Duration::from_millis(250));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The failover strategy of queries and writes.
    pub failover: FailoverStrategy,
    /// The write concern of checked writes.
    pub write_concern: WriteConcern,
    /// Batching limits of bulk insertion.
    pub bulk: BulkLimits,
    /// How long a tailable cursor waits before asking for new data
    /// after receiving an empty batch.
    #[serde(with = "millis")]
    pub tail_poll_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            failover: FailoverStrategy::default(),
            write_concern: WriteConcern::default(),
            bulk: BulkLimits::default(),
            tail_poll_interval: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Parses and validates a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json).chain("can't parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is within its permitted range.
    pub fn validate(&self) -> Result<()> {
        if self.bulk.bulk_size == 0 {
            return Err(Error::new(ErrorKind::Configuration, "`bulk_size` must be positive"));
        }
        if self.bulk.bulk_byte_size == 0 {
            return Err(Error::new(ErrorKind::Configuration, "`bulk_byte_size` must be positive"));
        }
        if !self.failover.backoff_factor.is_finite() || self.failover.backoff_factor < 0.0 {
            return Err(Error::new(
                ErrorKind::Configuration,
                format!("invalid `backoff_factor`: {}", self.failover.backoff_factor)
            ));
        }

        Ok(())
    }
}

/// (De)serializes a `Duration` as a whole number of milliseconds.
pub(crate) mod millis {
    use std::convert::TryFrom;
    use std::time::Duration;
    use serde::{ Serializer, Deserialize, Deserializer };

    /// Writes the duration as milliseconds, saturating at `u64::MAX`.
    pub fn serialize<S: Serializer>(duration: &Duration, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Reads a number of milliseconds.
    pub fn deserialize<'a, D: Deserializer<'a>>(de: D) -> Result<Duration, D::Error> {
        u64::deserialize(de).map(Duration::from_millis)
    }
}
