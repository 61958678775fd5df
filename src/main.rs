use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod alerts;
mod api;
mod auth;
mod config;
mod db;
mod models;
mod report;
mod stats;

use crate::auth::{Argon2Hasher, GatewayAuthorizer};
use crate::config::DashboardConfig;
use crate::db::{PgRepository, Repository};

#[derive(Parser)]
#[command(name = "department-dashboard")]
#[command(about = "Academic department dashboard: marks analytics, alerts and faculty records", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to listen on, overrides configuration
        #[arg(long)]
        bind: Option<String>,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import marks from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print grade bands and alerts
    Overview {
        #[arg(long)]
        department: Option<String>,
    },
    /// Print department statistics
    Stats {
        #[arg(long)]
        department: Option<String>,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        department: Option<String>,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let config = DashboardConfig::load()?;
    let database_url = config.database_url()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    let repository = PgRepository::new(pool);

    match cli.command {
        Commands::Serve { bind } => {
            let bind_addr = bind.unwrap_or_else(|| config.bind_addr.clone());
            let state = Arc::new(api::AppState::new(
                repository,
                Arc::new(GatewayAuthorizer),
                Arc::new(Argon2Hasher),
                config.thresholds.clone(),
                config.default_faculty_password.clone(),
            ));
            api::serve(&bind_addr, state).await?;
            info!("dashboard API stopped");
        }
        Commands::InitDb => {
            db::init_db(repository.pool()).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(
                repository.pool(),
                &Argon2Hasher,
                &config.default_faculty_password,
            )
            .await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_marks_csv(repository.pool(), &Argon2Hasher, &csv).await?;
            println!("Inserted {inserted} marks from {}.", csv.display());
        }
        Commands::Overview { department } => {
            let records = repository.marks_for_department(department.as_deref()).await?;
            let faculty_count = repository.faculty_count(department.as_deref()).await?;
            let overview =
                alerts::build_overview_now(&records, faculty_count, &config.thresholds);

            let bands = &overview.grade_distribution;
            println!(
                "Grades: A {} / B {} / C {} / D {} / F {} ({} faculty)",
                bands.a, bands.b, bands.c, bands.d, bands.f, overview.faculty_count
            );
            for alert in &overview.alerts {
                println!("- [{}] {}", alert.severity, alert.message);
            }
        }
        Commands::Stats { department } => {
            let records = repository.marks_for_department(department.as_deref()).await?;
            let stats = stats::department_stats(&records, &config.thresholds);

            if stats.total_students == 0 {
                println!("No marks found for this department.");
                return Ok(());
            }

            println!(
                "{} students, average {:.1}, pass rate {:.1}%, {} at risk",
                stats.total_students, stats.average, stats.pass_percentage, stats.at_risk_count
            );
        }
        Commands::Report { department, out } => {
            let records = repository.marks_for_department(department.as_deref()).await?;
            let faculty_count = repository.faculty_count(department.as_deref()).await?;
            let overview =
                alerts::build_overview_now(&records, faculty_count, &config.thresholds);
            let stats = stats::department_stats(&records, &config.thresholds);
            let report = report::build_report(department.as_deref(), &overview, &stats);
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
