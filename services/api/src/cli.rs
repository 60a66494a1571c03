use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use policy_outreach::error::AppError;

use crate::demo::{run_demo, run_match, run_screening};
use crate::server;

#[derive(Parser, Debug)]
#[command(
    name = "Policy Outreach Engine",
    about = "Grade district companies against policy programs and run the outreach workflow",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Screen the seeded district against one program and print the grades
    Screen(ScreenArgs),
    /// Rank incubator partners for a free-text demand
    Match(MatchArgs),
    /// Walk one company from screening through diagnosis
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Caseworker roster CSV (id,name,specialty_tags,conversion_rate,open_load)
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct ScreenArgs {
    /// Program to screen for
    #[arg(long, default_value = "high_tech_enterprise")]
    pub(crate) program: String,
    /// Snapshot date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug)]
pub(crate) struct MatchArgs {
    /// Demand text; separate sub-tasks with ';'
    pub(crate) text: String,
    /// Reference date for recency (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Snapshot date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Caseworker roster CSV; the bundled roster is used otherwise
    #[arg(long)]
    pub(crate) roster: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Screen(args) => run_screening(args).await,
        Command::Match(args) => run_match(args).await,
        Command::Demo(args) => run_demo(args).await,
    }
}
