//! [`PgStream`][crate::PgStream] configuration.
use std::env::var;

const DEFAULT_BUF_CAPACITY: usize = 1024;

/// Buffer configuration for [`PgStream`][crate::PgStream].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub(crate) read_capacity: usize,
    pub(crate) write_capacity: usize,
}

impl Config {
    /// Retrieve configuration from environment variable.
    ///
    /// It reads:
    /// - `POSTRO_READ_BUFFER`
    /// - `POSTRO_WRITE_BUFFER`
    ///
    /// Missing or invalid value fallback to default value.
    pub fn from_env() -> Config {
        macro_rules! env {
            ($name:literal) => {
                match var($name).ok().and_then(|e|e.parse().ok()) {
                    Some(ok) => ok,
                    None => DEFAULT_BUF_CAPACITY,
                }
            };
        }

        Self {
            read_capacity: env!("POSTRO_READ_BUFFER"),
            write_capacity: env!("POSTRO_WRITE_BUFFER"),
        }
    }

    /// Set initial read buffer capacity.
    pub fn read_capacity(mut self, value: usize) -> Self {
        self.read_capacity = value;
        self
    }

    /// Set initial write buffer capacity.
    ///
    /// Copy data is buffered here until flushed, so larger chunks grow the buffer.
    pub fn write_capacity(mut self, value: usize) -> Self {
        self.write_capacity = value;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_capacity: DEFAULT_BUF_CAPACITY,
            write_capacity: DEFAULT_BUF_CAPACITY,
        }
    }
}
