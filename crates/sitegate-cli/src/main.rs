use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

mod commands;

#[derive(Parser)]
#[command(name = "sitegate-cli", version, about = "Sitegate CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Site registration and budgets
    Site {
        #[command(subcommand)]
        action: commands::site::SiteAction,
    },
    /// Evaluate a URL against today's usage
    Status {
        url: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record an open for a URL, honoring the open-limit pre-check
    Open { url: String },
    /// Show usage records for a day
    Usage {
        /// Date key (YYYY-MM-DD); defaults to today
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Site { action } => commands::site::run(action),
        Commands::Status { url, json } => commands::status::run(&url, json),
        Commands::Open { url } => commands::open::run(&url),
        Commands::Usage { date, json } => commands::usage::run(date.as_deref(), json),
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(err) = result {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
