use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(version, author, about)]
/// Storage and query service for crypto crowdfunding campaigns.
pub struct Config {
    #[clap(long)]
    /// Postgres connection string
    pub pg_url: String,
    #[clap(default_value_t = String::from("0.0.0.0"), long)]
    /// Bind address for the webserver
    pub bind: String,
    #[clap(default_value_t = 3000, long)]
    /// Port for the webserver
    pub port: u16,
    #[clap(default_value_t = 16, long)]
    /// Maximum number of pooled database connections
    pub max_connections: u32,
    #[clap(long)]
    /// Insert the test user on startup
    pub seed: bool,
}
