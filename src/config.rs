//! Connection configuration.

use std::time::Duration;

use crate::protocol::{MAX_PACKET_SIZE, capabilities, charset};

/// Connection parameters.
#[derive(Debug, Clone)]
pub struct Config {
    /// Hostname or IP address
    pub host: String,
    /// Port number (default: 3306)
    pub port: u16,
    /// Username for authentication
    pub user: String,
    /// Database name to select at connect time (optional)
    pub database: Option<String>,
    /// Character set (default: utf8mb4)
    pub charset: u8,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Largest inbound packet payload accepted before the connection faults
    pub max_packet_size: usize,
    /// Byte parameters larger than this are streamed with send-long-data
    pub long_data_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3306,
            user: String::new(),
            database: None,
            charset: charset::UTF8MB4_GENERAL_CI,
            connect_timeout: Duration::from_secs(30),
            max_packet_size: MAX_PACKET_SIZE,
            long_data_threshold: 1023,
        }
    }
}

impl Config {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the hostname.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the username.
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Set the database.
    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    /// Set the character set.
    pub fn charset(mut self, charset: u8) -> Self {
        self.charset = charset;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the inbound packet size limit.
    pub fn max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Set the long parameter streaming threshold.
    pub fn long_data_threshold(mut self, threshold: usize) -> Self {
        self.long_data_threshold = threshold;
        self
    }

    /// `host:port` for address resolution.
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Capability flags to advertise in the handshake response.
    pub fn capability_flags(&self) -> u32 {
        let mut flags = capabilities::DEFAULT_CLIENT_FLAGS;
        if self.database.is_some() {
            flags |= capabilities::CLIENT_CONNECT_WITH_DB;
        }
        flags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_chain() {
        let config = Config::new()
            .host("db.internal")
            .port(3307)
            .user("app")
            .database("shop")
            .connect_timeout(Duration::from_secs(5));

        assert_eq!(config.socket_addr(), "db.internal:3307");
        assert_eq!(config.user, "app");
        assert_ne!(
            config.capability_flags() & capabilities::CLIENT_CONNECT_WITH_DB,
            0
        );
    }

    #[test]
    fn no_database_means_no_connect_with_db() {
        let config = Config::new();
        assert_eq!(
            config.capability_flags() & capabilities::CLIENT_CONNECT_WITH_DB,
            0
        );
    }
}
