use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use youtube_rss::config::Config;
use youtube_rss::{RunOptions, error};

#[derive(Parser, Debug)]
#[command(
    name = "youtube-rss",
    version,
    about = "Mirror your YouTube subscriptions into a Tiny Tiny RSS category"
)]
struct Args {
    /// Configuration file
    #[arg(short, long, value_name = "FILE", default_value = Config::DEFAULT_PATH, global = true)]
    config: PathBuf,

    /// Show what would change without changing anything
    #[arg(long)]
    dry_run: bool,

    /// Log debug output (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Authorize access to your YouTube account and store the credentials
    Authorize {
        /// OAuth client id of a Google Cloud "Desktop app" client
        #[arg(long, env = "YOUTUBE_RSS_CLIENT_ID")]
        client_id: String,

        /// OAuth client secret belonging to the client id
        #[arg(long, env = "YOUTUBE_RSS_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_ansi(std::io::stdout().is_terminal())
        .init();

    let result = match args.command {
        None => youtube_rss::run(&RunOptions {
            config_path: args.config,
            dry_run: args.dry_run,
        })
        .await
        .map(|summary| {
            if summary.dry_run {
                println!(
                    "dry run: would subscribe {} and unsubscribe {} feed(s), {} unchanged",
                    summary.added, summary.removed, summary.unchanged
                );
            }
        }),
        Some(Command::Authorize {
            client_id,
            client_secret,
        }) => youtube_rss::authorize(&args.config, &client_id, client_secret)
            .await
            .map(|path| println!("Stored YouTube credentials in {}", path.display())),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(report) => {
            eprintln!("Error: {report:?}");
            ExitCode::from(error::exit_code(&report))
        }
    }
}
