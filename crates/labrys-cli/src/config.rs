//! CLI configuration: flags with environment fallbacks.

use clap::Args;

/// Where the matchmaking API lives
#[derive(Debug, Clone, Args)]
pub struct Config {
    /// Base URL of the game API
    #[arg(long, env = "LABRYS_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Login path on the API
    #[arg(long, env = "LABRYS_LOGIN_PATH", default_value = "/auth/login")]
    pub login_path: String,

    /// Registration path on the API
    #[arg(long, env = "LABRYS_REGISTER_PATH", default_value = "/auth/register")]
    pub register_path: String,

    /// Matchmaking path on the API
    #[arg(long, env = "LABRYS_MATCH_PATH", default_value = "/match")]
    pub match_path: String,
}
