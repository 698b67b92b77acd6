use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use staffsync_protocol::api::{
    ChangeDetectionMode, ChangeDetectionRequest, RetryRequest, SyncMode, SyncRequest,
    TimelineProcessRequest,
};

mod client;
mod output;

use client::{CliError, EngineClient};

const DEFAULT_ENGINE_URL: &str = "http://localhost:8080/";

#[derive(Parser)]
#[command(name = "staffsync")]
#[command(about = "staffsync - payroll sync, change detection and employee timelines", long_about = None)]
struct Cli {
    /// Base URL of the staffsync engine
    #[arg(long, global = true, env = "STAFFSYNC_URL", default_value = DEFAULT_ENGINE_URL)]
    url: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect upstream data and build timelines
    Sync(SyncArgs),
    /// Retry partial snapshots left by failed collections
    Retry(RetryArgs),
    /// Derive change records from the latest snapshots
    Detect(DetectArgs),
    /// Build or inspect employee timelines
    #[command(subcommand)]
    Timeline(TimelineCommands),
    /// List recorded changes for one employee
    Changes {
        employee_id: String,
    },
    /// Show version information
    Version,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    Interactive,
    Background,
}

impl From<ModeArg> for SyncMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Interactive => SyncMode::Interactive,
            ModeArg::Background => SyncMode::Background,
        }
    }
}

#[derive(Args)]
struct SyncArgs {
    #[arg(long, value_enum, default_value_t = ModeArg::Interactive)]
    mode: ModeArg,
    /// Label recorded as the origin of the sync
    #[arg(long, default_value = "cli")]
    source: String,
    #[arg(long)]
    triggered_by: Option<String>,
    /// Restrict the sync to these employees (repeatable)
    #[arg(long = "employee-id")]
    employee_ids: Vec<String>,
}

impl SyncArgs {
    fn into_request(self) -> SyncRequest {
        SyncRequest {
            source: self.source,
            mode: self.mode.into(),
            triggered_by: self.triggered_by,
            employee_ids: (!self.employee_ids.is_empty()).then_some(self.employee_ids),
        }
    }
}

#[derive(Args)]
struct RetryArgs {
    #[arg(long)]
    limit: Option<u32>,
    #[arg(long)]
    max_retry_count: Option<u32>,
}

#[derive(Args)]
struct DetectArgs {
    /// Only inspect these employees
    #[arg(long, num_args = 1..)]
    scoped: Option<Vec<String>>,
}

impl DetectArgs {
    fn into_request(self) -> ChangeDetectionRequest {
        match self.scoped {
            Some(ids) => ChangeDetectionRequest {
                mode: ChangeDetectionMode::Scoped,
                employee_ids: Some(ids),
            },
            None => ChangeDetectionRequest::default(),
        }
    }
}

#[derive(Subcommand)]
enum TimelineCommands {
    /// Derive timeline events for the given employees
    Process {
        #[arg(required = true)]
        employee_ids: Vec<String>,
        #[arg(long, default_value = "manual")]
        source: String,
    },
    /// Print the stored timeline of one employee
    Show { employee_id: String },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("{} {err}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    if let Commands::Version = cli.command {
        println!("staffsync v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let client = EngineClient::new(&cli.url)?;
    match cli.command {
        Commands::Sync(args) => {
            let response = client.sync(&args.into_request()).await?;
            output::print_sync(&response);
        }
        Commands::Retry(args) => {
            let request = RetryRequest {
                limit: args.limit,
                max_retry_count: args.max_retry_count,
            };
            let response = client.retry(&request).await?;
            output::print_retry(&response);
        }
        Commands::Detect(args) => {
            let response = client.detect(&args.into_request()).await?;
            output::print_detection(&response);
        }
        Commands::Timeline(TimelineCommands::Process {
            employee_ids,
            source,
        }) => {
            let request = TimelineProcessRequest {
                employee_ids,
                source,
            };
            let response = client.process_timeline(&request).await?;
            output::print_timeline_run(&response);
        }
        Commands::Timeline(TimelineCommands::Show { employee_id }) => {
            let events = client.employee_timeline(&employee_id).await?;
            output::print_events(&employee_id, &events);
        }
        Commands::Changes { employee_id } => {
            let changes = client.employee_changes(&employee_id).await?;
            output::print_changes(&employee_id, &changes);
        }
        Commands::Version => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("staffsync").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn sync_defaults_to_interactive_full_run() {
        let cli = parse(&["sync"]);
        assert_eq!(cli.url, DEFAULT_ENGINE_URL);
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let request = args.into_request();
        assert_eq!(request.mode, SyncMode::Interactive);
        assert_eq!(request.source, "cli");
        assert!(request.employee_ids.is_none());
    }

    #[test]
    fn sync_accepts_background_mode_and_scope() {
        let cli = parse(&[
            "--url",
            "http://engine:9000/",
            "sync",
            "--mode",
            "background",
            "--triggered-by",
            "ops",
            "--employee-id",
            "e-1",
            "--employee-id",
            "e-2",
        ]);
        assert_eq!(cli.url, "http://engine:9000/");
        let Commands::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let request = args.into_request();
        assert_eq!(request.mode, SyncMode::Background);
        assert_eq!(request.triggered_by.as_deref(), Some("ops"));
        assert_eq!(
            request.employee_ids,
            Some(vec!["e-1".to_string(), "e-2".to_string()])
        );
    }

    #[test]
    fn detect_scoped_collects_ids() {
        let Commands::Detect(args) = parse(&["detect", "--scoped", "e-1", "e-2"]).command else {
            panic!("expected detect");
        };
        let request = args.into_request();
        assert_eq!(request.mode, ChangeDetectionMode::Scoped);
        assert_eq!(request.employee_ids.map(|ids| ids.len()), Some(2));

        let Commands::Detect(args) = parse(&["detect"]).command else {
            panic!("expected detect");
        };
        assert_eq!(args.into_request().mode, ChangeDetectionMode::Full);
    }

    #[test]
    fn timeline_process_requires_ids() {
        assert!(Cli::try_parse_from(["staffsync", "timeline", "process"]).is_err());
        let Commands::Timeline(TimelineCommands::Process { employee_ids, source }) =
            parse(&["timeline", "process", "e-1"]).command
        else {
            panic!("expected timeline process");
        };
        assert_eq!(employee_ids, vec!["e-1".to_string()]);
        assert_eq!(source, "manual");
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Cli::try_parse_from(["staffsync", "sync", "--mode", "eventually"]).is_err());
    }
}
