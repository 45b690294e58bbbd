//! Environment-driven server configuration.

use std::net::SocketAddr;

use crate::auth::jwt::JwtConfig;

/// Runtime settings for the HTTP server. Everything except the JWT
/// secret has a local-development default.
///
/// | Env var                | Default                 |
/// |------------------------|-------------------------|
/// | `HOST`                 | `0.0.0.0`               |
/// | `PORT`                 | `3000`                  |
/// | `CORS_ORIGINS`         | `http://localhost:5173` |
/// | `REQUEST_TIMEOUT_SECS` | `30`                    |
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins (comma separated in the env var).
    pub cors_origins: Vec<String>,
    pub request_timeout_secs: u64,
    pub jwt: JwtConfig,
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

impl ServerConfig {
    /// Read the configuration from the environment.
    ///
    /// # Panics
    ///
    /// Panics on unparseable numeric values and on a missing
    /// `JWT_SECRET`, so a misconfigured deployment dies at startup
    /// instead of serving requests.
    pub fn from_env() -> Self {
        let port: u16 = env_or("PORT", "3000")
            .parse()
            .expect("PORT must be a valid u16");
        let request_timeout_secs: u64 = env_or("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let cors_origins: Vec<String> = env_or("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            host: env_or("HOST", "0.0.0.0"),
            port,
            cors_origins,
            request_timeout_secs,
            jwt: JwtConfig::from_env(),
        }
    }

    /// The socket address the server binds to.
    ///
    /// # Panics
    ///
    /// Panics if `HOST` is not a parseable IP address.
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(
            self.host.parse().expect("HOST must be a valid IP address"),
            self.port,
        )
    }
}
