use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::game::GameFormat;

/// Arena game server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "arena-server", version, about = "Arena matchmaking and regeneration server")]
pub struct Config {
    /// Port to listen on (spectator feed)
    #[arg(long, env = "ARENA_PORT", default_value = "3030")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "ARENA_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./arena.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "ARENA_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (SQLite database)
    #[arg(long, env = "ARENA_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Regeneration settings (loaded from [regeneration] section in TOML).
    /// Not serialized, so the CLI layer cannot mask TOML values with defaults.
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub regeneration: RegenerationConfig,

    /// Matchmaking settings (loaded from [matchmaking] section in TOML)
    #[arg(skip)]
    #[serde(default, skip_serializing)]
    pub matchmaking: MatchmakingConfig,
}

/// Configuration for the health regeneration scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegenerationConfig {
    /// Milliseconds between ticks (default: 1000)
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,

    /// Seconds to regenerate from zero to full health before bonuses (default: 1800)
    #[serde(default = "default_base_duration")]
    pub base_duration_secs: f64,
}

impl Default for RegenerationConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            base_duration_secs: default_base_duration(),
        }
    }
}

fn default_tick_interval() -> u64 {
    1000
}

fn default_base_duration() -> f64 {
    1800.0
}

/// Allowed level distance between a candidate and a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelGap {
    pub min: u32,
    pub max: u32,
}

/// Per-format matchmaking configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchmakingConfig {
    #[serde(default = "default_single_gap")]
    pub single: LevelGap,
    #[serde(default = "default_teams_gap")]
    pub teams: LevelGap,
    #[serde(default = "default_royal_gap")]
    pub royal: LevelGap,
}

impl MatchmakingConfig {
    pub fn level_gap(&self, format: GameFormat) -> LevelGap {
        match format {
            GameFormat::Single => self.single,
            GameFormat::Teams => self.teams,
            GameFormat::Royal => self.royal,
        }
    }
}

impl Default for MatchmakingConfig {
    fn default() -> Self {
        Self {
            single: default_single_gap(),
            teams: default_teams_gap(),
            royal: default_royal_gap(),
        }
    }
}

fn default_single_gap() -> LevelGap {
    LevelGap { min: 0, max: 0 }
}

fn default_teams_gap() -> LevelGap {
    LevelGap { min: 0, max: 2 }
}

fn default_royal_gap() -> LevelGap {
    LevelGap { min: 0, max: 3 }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3030,
            bind_address: "0.0.0.0".to_string(),
            config: "./arena.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            regeneration: RegenerationConfig::default(),
            matchmaking: MatchmakingConfig::default(),
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (ARENA_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("ARENA_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Arena Server Configuration
# Place this file at ./arena.toml or specify with --config <path>
# All settings can be overridden via environment variables (ARENA_PORT, etc.)
# or CLI flags (--port, etc.)

# Spectator feed port (default: 3030)
# port = 3030

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database
# data_dir = "./data"

# ---- Health Regeneration ----
# [regeneration]
# tick_interval_ms = 1000
# base_duration_secs = 1800   # light/effect bonuses shorten this by percent

# ---- Matchmaking ----
# Level gaps per format. Single combat requires an exact level match.
# [matchmaking]
# single = { min = 0, max = 0 }
# teams = { min = 0, max = 2 }
# royal = { min = 0, max = 3 }
"#
    .to_string()
}
