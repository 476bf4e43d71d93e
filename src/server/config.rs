use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub database_url: String,
    pub jwt_secret: String,

    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Prefix of the absolute image URLs handed to clients.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    #[serde(default = "default_media_dir")]
    pub media_dir: String,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    database_url: Option<String>,
    jwt_secret: Option<String>,
    listen_addr: Option<String>,
    public_base_url: Option<String>,
    media_dir: Option<String>,
    log_dir: Option<String>,
    db_max_connections: Option<u32>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_media_dir() -> String {
    "media".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

impl ServerConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self, String> {
        dotenv::dotenv().ok();

        // 1. Load from file (optional)
        let file_config: PartialServerConfig = match config_path.map(Path::new) {
            Some(path) if path.exists() => {
                let contents = fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read config file at {path:?}: {e}"))?;
                toml::from_str(&contents)
                    .map_err(|e| format!("Failed to parse TOML from config file at {path:?}: {e}"))?
            }
            _ => PartialServerConfig::default(),
        };

        // 2. Load from environment variables
        let env_config: PartialServerConfig = envy::from_env::<PartialServerConfig>()
            .map_err(|e| format!("Failed to load config from environment: {e}"))?;

        // 3. Merge: environment overrides file
        Self::merge(env_config, file_config)
    }

    fn merge(
        env_config: PartialServerConfig,
        file_config: PartialServerConfig,
    ) -> Result<Self, String> {
        Ok(ServerConfig {
            database_url: env_config
                .database_url
                .or(file_config.database_url)
                .ok_or("DATABASE_URL is required")?,
            jwt_secret: env_config
                .jwt_secret
                .or(file_config.jwt_secret)
                .ok_or("JWT_SECRET is required")?,
            listen_addr: env_config
                .listen_addr
                .or(file_config.listen_addr)
                .unwrap_or_else(default_listen_addr),
            public_base_url: env_config
                .public_base_url
                .or(file_config.public_base_url)
                .unwrap_or_else(default_public_base_url),
            media_dir: env_config
                .media_dir
                .or(file_config.media_dir)
                .unwrap_or_else(default_media_dir),
            log_dir: env_config
                .log_dir
                .or(file_config.log_dir)
                .unwrap_or_else(default_log_dir),
            db_max_connections: env_config
                .db_max_connections
                .or(file_config.db_max_connections)
                .unwrap_or_else(default_db_max_connections),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_overrides_file() {
        let file: PartialServerConfig = toml::from_str(
            r#"
            database_url = "postgres://file/db"
            jwt_secret = "file-secret"
            media_dir = "/srv/media"
            "#,
        )
        .unwrap();
        let env = PartialServerConfig {
            jwt_secret: Some("env-secret".to_string()),
            db_max_connections: Some(4),
            ..Default::default()
        };

        let config = ServerConfig::merge(env, file).unwrap();
        assert_eq!(config.database_url, "postgres://file/db");
        assert_eq!(config.jwt_secret, "env-secret");
        assert_eq!(config.media_dir, "/srv/media");
        assert_eq!(config.db_max_connections, 4);
        assert_eq!(config.listen_addr, "0.0.0.0:8000");
        assert_eq!(config.public_base_url, "http://localhost:8000");
        assert_eq!(config.log_dir, "logs");
    }

    #[test]
    fn test_required_keys() {
        let missing_secret = PartialServerConfig {
            database_url: Some("postgres://x".to_string()),
            ..Default::default()
        };
        let err = ServerConfig::merge(missing_secret, PartialServerConfig::default()).unwrap_err();
        assert_eq!(err, "JWT_SECRET is required");

        let err =
            ServerConfig::merge(PartialServerConfig::default(), PartialServerConfig::default())
                .unwrap_err();
        assert_eq!(err, "DATABASE_URL is required");
    }
}
