use clap::{Args, Parser, Subcommand};

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "tokenkeep",
    about = "Encrypted storage for OAuth tokens and service configuration",
    version,
    propagate_version = true
)]
pub struct Cli {
    /// Optional subcommand; defaults to listing known handles.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Round-trip a probe token through cipher and storage.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Store or read access tokens.
    #[command(subcommand)]
    Token(TokenCommand),
    /// Store or read service configuration.
    #[command(subcommand)]
    Params(ParamsCommand),
    /// Delete every record of a handle.
    Remove { handle: String },
    /// Delete every known handle.
    RemoveAll,
    /// List known handles.
    List,
    /// Remove handles unused past the retention period, then exit.
    Sweep,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum TokenCommand {
    /// Save a token; omitting both tokens stores an empty record.
    Save(TokenArgs),
    /// Print the decrypted token for a handle.
    Load { handle: String },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct TokenArgs {
    pub handle: String,
    #[arg(long)]
    pub access: Option<String>,
    #[arg(long)]
    pub refresh: Option<String>,
    #[arg(long)]
    pub token_type: Option<String>,
    /// Access token lifetime in seconds.
    #[arg(long)]
    pub expires_in: Option<i64>,
    #[arg(long)]
    pub scope: Option<String>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ParamsCommand {
    Save(ParamsArgs),
    Load { handle: String },
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ParamsArgs {
    pub handle: String,
    #[arg(long)]
    pub token_url: String,
    #[arg(long)]
    pub client_id: String,
    #[arg(long)]
    pub authorization_url: Option<String>,
    #[arg(long)]
    pub client_secret: Option<String>,
    #[arg(long)]
    pub scope: Option<String>,
    #[arg(long)]
    pub redirect_uri: Option<String>,
    #[arg(long)]
    pub supports_basic_auth: bool,
}
