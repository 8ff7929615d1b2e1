use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crm_tag_sync::config::Settings;
use crm_tag_sync::io::mailchimp::{MailchimpClient, select_audience};
use crm_tag_sync::sync::{self, SnapshotOptions};
use crm_tag_sync::{Result, SyncError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging().and_then(|()| run(cli)) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| SyncError::Logging(err.to_string()))
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Sync(args) => execute_sync(args),
        Command::Audiences(args) => execute_audiences(args),
    }
}

fn execute_sync(args: SyncArgs) -> Result<()> {
    let settings = args.settings.load()?;
    let snapshots = SnapshotOptions {
        dir: args.snapshot_dir,
        keep: args.keep_snapshots,
    };
    let summary = sync::run(&settings, &snapshots)?;
    println!("{summary}");
    Ok(())
}

fn execute_audiences(args: SettingsArgs) -> Result<()> {
    let settings = args.load()?;
    let client = MailchimpClient::new(&settings)?;
    let audiences = client.list_audiences()?;
    for audience in &audiences {
        println!("{}\t{}", audience.id, audience.name);
    }
    let selected = select_audience(audiences, settings.mailchimp_audience.as_deref())?;
    println!("selected: {} (id: {})", selected.name, selected.id);
    Ok(())
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Keep Mailchimp members tagged like their Follow Up Boss leads."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile every lead email against the Mailchimp audience.
    Sync(SyncArgs),
    /// List Mailchimp audiences and show which one a sync would use.
    Audiences(SettingsArgs),
}

#[derive(clap::Args)]
struct SettingsArgs {
    /// Settings file (TOML).
    #[arg(long, default_value = "settings.toml")]
    settings: PathBuf,

    /// Secrets file (TOML), layered over the settings file.
    #[arg(long, default_value = ".secrets.toml")]
    secrets: PathBuf,

    /// Environment file; process variables take precedence over its entries.
    #[arg(long, default_value = ".env")]
    dotenv: PathBuf,

    /// Audience name, overriding `mailchimp_audience`.
    #[arg(long)]
    audience: Option<String>,
}

impl SettingsArgs {
    fn load(&self) -> Result<Settings> {
        let mut settings = Settings::load(&self.settings, &self.secrets, &self.dotenv)?;
        if let Some(audience) = &self.audience {
            settings.mailchimp_audience = Some(audience.clone());
        }
        Ok(settings)
    }
}

#[derive(clap::Args)]
struct SyncArgs {
    #[command(flatten)]
    settings: SettingsArgs,

    /// Directory holding the lead and member snapshots.
    #[arg(long, default_value = ".")]
    snapshot_dir: PathBuf,

    /// Leave the snapshots in place after a successful run.
    #[arg(long)]
    keep_snapshots: bool,
}
