use std::io::Read;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use usagedw::{Catalog, ClickEvent, Database, DateWindow, QueryParams, UsageDW};

#[derive(Parser)]
#[command(name = "usagedw", about = "Usage data warehouse CLI")]
struct Cli {
    /// Database path (default: ~/.usagedw/usagedw.db)
    #[arg(long)]
    db: Option<String>,

    /// Catalog file overriding the built-in activity constants
    #[arg(long)]
    catalog: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Home dashboard sections
    Home {
        #[command(subcommand)]
        section: HomeSection,
    },
    /// Free-trials dashboard sections
    Trials {
        #[command(subcommand)]
        section: TrialsSection,
    },
    /// Import a replication export (JSON) into the warehouse
    Import {
        /// Path to the export file, or '-' for stdin
        file: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Show warehouse status
    Status,
}

/// The date range and ad-hoc exclusions shared by all dashboard sections.
#[derive(Args)]
struct WindowArgs {
    /// Window start (YYYY-MM-DD, inclusive)
    #[arg(long)]
    start: String,
    /// Window end (YYYY-MM-DD, inclusive)
    #[arg(long)]
    end: String,
    /// Organization ids to exclude, in addition to the persisted list
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<i64>,
}

#[derive(Subcommand)]
enum HomeSection {
    /// Active organizations per day, total and per product
    ActiveOrgs(WindowArgs),
    /// New free trials per day, current vs previous period
    NewTrials(WindowArgs),
    /// Organizations exceeding their concurrent VisitReport licenses
    Concurrent(WindowArgs),
    /// Most active touchless organizations
    Touchless(WindowArgs),
    /// Organizations with users slipping away
    Slipping {
        /// Organization ids to exclude, in addition to the persisted list
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<i64>,
    },
    /// Licenses assigned per day, per product family
    Licenses(WindowArgs),
    /// The most affected organization per error type
    TopErrors(WindowArgs),
    /// Error overview: counts per type plus the detail rows
    Errors(WindowArgs),
    /// Resolve a click on the error overview (JSON event on stdin)
    ErrorsClick(WindowArgs),
}

#[derive(Subcommand)]
enum TrialsSection {
    /// Active users per product and trial day
    Products(WindowArgs),
    /// Events per activity and trial day
    Activities(WindowArgs),
    /// Activity volume per product category
    ByProduct(WindowArgs),
    /// Most frequent trial activities
    Frequent(WindowArgs),
    /// Product combinations per trial organization
    Mix(WindowArgs),
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Get a config value
    Get { key: String },
    /// Set a config value
    Set { key: String, value: String },
    /// List all config values
    List,
}

impl WindowArgs {
    fn window(&self) -> anyhow::Result<DateWindow> {
        Ok(DateWindow::parse(&self.start, &self.end)?)
    }

    async fn query_params(&self, dw: &UsageDW) -> anyhow::Result<QueryParams> {
        let params = dw.query_params(self.window()?).await?;
        Ok(params.exclude_orgs(self.exclude.iter().copied()))
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_stdin() -> anyhow::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let db = match &cli.db {
        Some(path) => Database::open_at(path).await?,
        None => Database::open().await?,
    };
    let catalog = match &cli.catalog {
        Some(path) => Catalog::load(std::path::Path::new(path))?,
        None => Catalog::default(),
    };
    let dw = UsageDW::new(db, catalog);

    match cli.command {
        Commands::Home { section } => handle_home(&dw, section).await?,
        Commands::Trials { section } => handle_trials(&dw, section).await?,
        Commands::Import { file } => handle_import(&dw, &file).await?,
        Commands::Config { action } => handle_config(&dw, action).await?,
        Commands::Status => print_status(&dw).await?,
    }

    Ok(())
}

async fn handle_home(dw: &UsageDW, section: HomeSection) -> anyhow::Result<()> {
    match section {
        HomeSection::ActiveOrgs(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.active_orgs_by_day(&query).await?)?;
        }
        HomeSection::NewTrials(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.new_trials(&query).await?)?;
        }
        HomeSection::Concurrent(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.concurrent_license_exceeders(&query).await?)?;
        }
        HomeSection::Touchless(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.most_active_touchless_orgs(&query).await?)?;
        }
        HomeSection::Slipping { exclude } => {
            let mut excluded = dw.excluded_org_ids().await?;
            excluded.extend(exclude);
            let rows = usagedw::dashboards::home::slipping_away_orgs(
                dw.db(),
                &excluded,
                dw.catalog(),
            )
            .await?;
            print_json(&rows)?;
        }
        HomeSection::Licenses(args) => {
            print_json(&dw.assigned_licenses_by_day(args.window()?).await?)?;
        }
        HomeSection::TopErrors(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.top_error_orgs(&query).await?)?;
        }
        HomeSection::Errors(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.error_overview(&query).await?)?;
        }
        HomeSection::ErrorsClick(args) => {
            let event = ClickEvent::parse(&read_stdin()?)?;
            let table = dw.errors_click_table(&event);
            let pair = dw.errors_click_period_pair(&event, args.window()?)?;
            print_json(&serde_json::json!({ "table": table, "periods": pair }))?;
        }
    }
    Ok(())
}

async fn handle_trials(dw: &UsageDW, section: TrialsSection) -> anyhow::Result<()> {
    match section {
        TrialsSection::Products(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.product_usage_by_trial_day(&query).await?)?;
        }
        TrialsSection::Activities(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.activities_by_trial_day(&query).await?)?;
        }
        TrialsSection::ByProduct(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.activities_by_product(&query).await?)?;
        }
        TrialsSection::Frequent(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.frequent_trial_activities(&query).await?)?;
        }
        TrialsSection::Mix(args) => {
            let query = args.query_params(dw).await?;
            print_json(&dw.product_mix_per_org(&query).await?)?;
        }
    }
    Ok(())
}

async fn handle_import(dw: &UsageDW, file: &str) -> anyhow::Result<()> {
    let raw = if file == "-" {
        read_stdin()?
    } else {
        std::fs::read_to_string(file)?
    };
    let batch: usagedw::ImportBatch = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("invalid import file: {e}"))?;

    let stats = dw.import(batch).await?;
    println!("Imported:");
    println!("  Organizations:      {}", stats.organizations);
    println!("  Users:              {}", stats.users);
    println!("  Subscription types: {}", stats.subscription_types);
    println!("  Org subscriptions:  {}", stats.org_subscriptions);
    println!("  Licenses:           {}", stats.licenses);
    println!("  Activities:         {}", stats.activities);
    Ok(())
}

async fn handle_config(dw: &UsageDW, action: ConfigAction) -> anyhow::Result<()> {
    match action {
        ConfigAction::Get { key } => match dw.config_get(&key).await? {
            Some(v) => println!("{key} = {v}"),
            None => println!("{key} is not set"),
        },
        ConfigAction::Set { key, value } => {
            dw.config_set(&key, &value).await?;
            println!("Config updated.");
        }
        ConfigAction::List => {
            let items = dw.config_list().await?;
            if items.is_empty() {
                println!("No configuration set.");
            } else {
                for (k, v) in items {
                    println!("{k} = {v}");
                }
            }
        }
    }
    Ok(())
}

async fn print_status(dw: &UsageDW) -> anyhow::Result<()> {
    let stats = dw
        .db()
        .reader()
        .call(|conn| {
            let orgs: i64 =
                conn.query_row("SELECT COUNT(*) FROM dim_organizations", [], |row| row.get(0))?;
            let users: i64 =
                conn.query_row("SELECT COUNT(*) FROM dim_users", [], |row| row.get(0))?;
            let subscriptions: i64 = conn.query_row(
                "SELECT COUNT(*) FROM fact_org_subscriptions",
                [],
                |row| row.get(0),
            )?;
            let licenses: i64 = conn.query_row("SELECT COUNT(*) FROM fact_user_licenses", [], |row| {
                row.get(0)
            })?;
            let activities: i64 =
                conn.query_row("SELECT COUNT(*) FROM fact_activities", [], |row| row.get(0))?;
            let last_activity: Option<String> = conn
                .query_row("SELECT MAX(created) FROM fact_activities", [], |row| {
                    row.get(0)
                })
                .ok()
                .flatten();
            Ok::<_, rusqlite::Error>((orgs, users, subscriptions, licenses, activities, last_activity))
        })
        .await?;

    let (orgs, users, subscriptions, licenses, activities, last_activity) = stats;
    println!("Warehouse Status");
    println!("  Organizations: {orgs}");
    println!("  Users:         {users}");
    println!("  Subscriptions: {subscriptions}");
    println!("  Licenses:      {licenses}");
    println!("  Activities:    {activities}");
    println!(
        "  Last activity: {}",
        last_activity.unwrap_or_else(|| "never".to_string())
    );
    Ok(())
}
