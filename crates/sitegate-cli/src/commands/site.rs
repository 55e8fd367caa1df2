use clap::Subcommand;
use sitegate_core::{Database, SiteStore};

#[derive(Subcommand)]
pub enum SiteAction {
    /// Register a site pattern with optional budgets
    Add {
        /// Hostname substring, e.g. "example.com"
        pattern: String,
        /// Daily time budget in minutes
        #[arg(long)]
        time_limit_min: Option<u64>,
        /// Daily open-count budget
        #[arg(long)]
        open_limit: Option<u64>,
    },
    /// List registered sites
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a site by id
    Remove { id: String },
    /// Enable a site by id
    Enable { id: String },
    /// Disable a site by id
    Disable { id: String },
}

pub fn run(action: SiteAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = Database::open()?;

    match action {
        SiteAction::Add {
            pattern,
            time_limit_min,
            open_limit,
        } => {
            let site = db.add_site(
                &pattern,
                time_limit_min.unwrap_or(0) * 60,
                open_limit.unwrap_or(0),
            )?;
            println!("Site added: {} ({})", site.url_pattern, site.id);
        }
        SiteAction::List { json } => {
            let sites = db.distracting_sites()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&sites)?);
            } else if sites.is_empty() {
                println!("No sites registered");
            } else {
                for site in sites {
                    let state = if site.enabled { "enabled" } else { "disabled" };
                    let time = match site.daily_limit_seconds {
                        0 => "-".to_string(),
                        secs => format!("{}min", secs / 60),
                    };
                    let opens = match site.daily_open_limit {
                        0 => "-".to_string(),
                        n => n.to_string(),
                    };
                    println!(
                        "{}  {}  time: {}  opens: {}  [{}]",
                        site.id, site.url_pattern, time, opens, state
                    );
                }
            }
        }
        SiteAction::Remove { id } => {
            if db.remove_site(&id)? {
                println!("Site removed: {id}");
            } else {
                println!("No site with id {id}");
            }
        }
        SiteAction::Enable { id } => {
            if db.set_enabled(&id, true)? {
                println!("Site enabled: {id}");
            } else {
                println!("No site with id {id}");
            }
        }
        SiteAction::Disable { id } => {
            if db.set_enabled(&id, false)? {
                println!("Site disabled: {id}");
            } else {
                println!("No site with id {id}");
            }
        }
    }
    Ok(())
}
