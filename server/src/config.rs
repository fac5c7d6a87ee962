use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// StudyHub realtime server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(
    name = "studyhub-realtime",
    version,
    about = "StudyHub realtime delivery hub and voice-room signaling server"
)]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "STUDYHUB_PORT", default_value = "8090")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "STUDYHUB_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./studyhub.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "STUDYHUB_JSON_LOGS")]
    pub json_logs: bool,

    /// Maximum concurrent members per voice room
    #[arg(long, env = "STUDYHUB_ROOM_CAPACITY", default_value = "2")]
    pub room_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8090,
            bind_address: "0.0.0.0".to_string(),
            config: "./studyhub.toml".to_string(),
            json_logs: false,
            room_capacity: 2,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (STUDYHUB_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("STUDYHUB_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}
