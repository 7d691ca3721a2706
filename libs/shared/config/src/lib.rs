use std::env;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_port: u16,
    pub jwt_secret: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            server_port: env::var("SERVER_PORT")
                .ok()
                .and_then(|raw| match raw.parse() {
                    Ok(port) => Some(port),
                    Err(_) => {
                        warn!("SERVER_PORT is not a valid port number, using default");
                        None
                    }
                })
                .unwrap_or(3000),
            jwt_secret: env::var("APP_JWT_SECRET").unwrap_or_else(|_| {
                warn!("APP_JWT_SECRET not set, using empty value");
                String::new()
            }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.jwt_secret.is_empty()
    }
}
