use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "octofhir-conformance")]
#[command(about = "Check a FHIR server against US Core and SMART App Launch")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML config file (defaults to ./octofhir-conformance.toml)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Server base URL (overrides config and OCTOFHIR_URL env var)
    #[arg(short, long, global = true, env = "OCTOFHIR_URL")]
    pub server: Option<String>,

    /// Bearer token sent with every FHIR request
    #[arg(long, global = true, env = "OCTOFHIR_TOKEN")]
    pub token: Option<String>,

    /// Test session name; launch state and tokens are kept per session
    #[arg(long, global = true, default_value = "default")]
    pub session: String,

    /// Output format
    #[arg(short, long, global = true)]
    pub format: Option<OutputFormat>,
}

#[derive(Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the profiles that can be checked
    Resources,
    /// Run the US Core resource suites
    Run(RunArgs),
    /// SMART App Launch checks
    Launch(LaunchArgs),
    /// Check access with the token from the last launch
    Restricted,
}

#[derive(clap::Args)]
pub struct RunArgs {
    /// Patient id to search with (repeatable)
    #[arg(short, long = "patient")]
    pub patients: Vec<String>,
    /// Resource type or profile name to run (repeatable, default: all)
    #[arg(short, long = "resource")]
    pub resources: Vec<String>,
}

#[derive(clap::Args)]
pub struct LaunchArgs {
    #[command(subcommand)]
    pub command: LaunchCommands,
}

#[derive(Subcommand)]
pub enum LaunchCommands {
    /// Print the authorization URL to open in a browser
    Authorize(AuthorizeArgs),
    /// Validate the redirect and the token exchange
    Callback(CallbackArgs),
}

#[derive(clap::Args)]
pub struct AuthorizeArgs {
    /// `launch` value for an EHR launch
    #[arg(long)]
    pub launch: Option<String>,
}

#[derive(clap::Args)]
pub struct CallbackArgs {
    /// Full URL the authorization server redirected to
    pub redirect_url: String,
}
