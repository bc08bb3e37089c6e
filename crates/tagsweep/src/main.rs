//! tagsweep: reclaim stale AWS resources left behind by CI runs
//!
//! `scan` lists candidates, `plan` shows the staged deletion order, `sweep`
//! executes it (dry run unless `--execute`).

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL_CONDENSED};
use std::fs::File;
use std::io::{self, BufWriter};
use std::sync::Arc;
use tagsweep::aws::{AwsCloud, AwsContext};
use tagsweep::config::{KindNameFilter, parse_kinds};
use tagsweep::discovery::Discovered;
use tagsweep::report::{self, JsonLinesSink, ReportSink, outcome_table, summary_table};
use tagsweep::{Plan, Resource, SweepConfig, Sweeper};
use tagsweep_common::defaults::{
    DEFAULT_CONCURRENCY, DEFAULT_MIN_AGE_HOURS, DEFAULT_QUEUE_CAPACITY, DEFAULT_REGION,
    MAX_MIN_AGE_HOURS,
};
use tagsweep_common::tags::{DEFAULT_AGE_KEY, DEFAULT_OWNER_KEY, DEFAULT_OWNER_PREFIX};
use tagsweep_common::{EligibilityConfig, ResourceKind, min_age_from_hours};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit code when `--fail-on-errors` is set and some targets failed
const EXIT_TARGETS_FAILED: i32 = 2;

#[derive(Parser, Debug)]
#[command(name = "tagsweep")]
#[command(about = "Tag-scoped, dependency-aware cleanup of stale AWS resources")]
#[command(version)]
struct Args {
    /// Log line format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover stale resources and print them
    Scan(CommonArgs),

    /// Discover stale resources and print the staged deletion plan
    Plan(CommonArgs),

    /// Discover, plan and delete (dry run unless --execute)
    Sweep(SweepArgs),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Args, Debug)]
struct CommonArgs {
    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = DEFAULT_REGION)]
    region: String,

    /// AWS profile to use
    #[arg(long, env = "AWS_PROFILE")]
    profile: Option<String>,

    /// Tag key holding the origin marker
    #[arg(long, default_value = DEFAULT_OWNER_KEY)]
    owner_key: String,

    /// Required prefix of the origin marker value
    #[arg(long, default_value = DEFAULT_OWNER_PREFIX)]
    owner_prefix: String,

    /// Tag key holding the Unix-seconds creation time
    #[arg(long, default_value = DEFAULT_AGE_KEY)]
    age_key: String,

    /// Minimum age in hours before a resource is reclaimed
    #[arg(
        long,
        default_value_t = DEFAULT_MIN_AGE_HOURS,
        value_parser = clap::value_parser!(u64).range(..=MAX_MIN_AGE_HOURS)
    )]
    min_age_hours: u64,

    /// Name narrowing per kind, e.g. `iam-role=ci-*` or `log-group=*build*`
    #[arg(long = "name-filter", value_name = "KIND=PATTERN")]
    name_filters: Vec<KindNameFilter>,

    /// Comma-separated kinds to discover (default: all but iam-role)
    #[arg(long)]
    kinds: Option<String>,

    /// Also walk IAM roles (slow on large accounts)
    #[arg(long)]
    include_iam: bool,

    /// Discovery merge queue capacity
    #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
    queue_capacity: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
}

#[derive(clap::Args, Debug)]
struct SweepArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Actually delete resources (default is dry run)
    #[arg(long)]
    execute: bool,

    /// Concurrent deletions per stage
    #[arg(long, default_value_t = DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Write a JSON-lines report here (`-` for stdout)
    #[arg(long)]
    report: Option<String>,

    /// Exit with status 2 if any target failed or was skipped
    #[arg(long)]
    fail_on_errors: bool,
}

impl CommonArgs {
    fn sweep_config(&self) -> Result<SweepConfig> {
        let kinds = match &self.kinds {
            Some(list) => parse_kinds(list)?,
            None => ResourceKind::defaults(),
        };
        let config = SweepConfig {
            eligibility: EligibilityConfig {
                owner_key: self.owner_key.clone(),
                owner_prefix: self.owner_prefix.clone(),
                age_key: self.age_key.clone(),
                min_age: min_age_from_hours(self.min_age_hours)?,
            },
            kinds,
            queue_capacity: self.queue_capacity,
            ..SweepConfig::default()
        }
        .with_name_filters(self.name_filters.iter().cloned());

        Ok(if self.include_iam {
            config.include_iam()
        } else {
            config
        })
    }

    async fn aws(&self) -> Arc<AwsCloud> {
        let ctx = match &self.profile {
            Some(profile) => {
                info!(profile = %profile, "Using AWS profile");
                AwsContext::with_profile(&self.region, profile).await
            }
            None => AwsContext::new(&self.region).await,
        };
        Arc::new(AwsCloud::from_context(&ctx))
    }
}

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(&e);
            std::process::exit(1);
        }
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = io::stderr();
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");
    for cause in e.chain().skip(1) {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(
            "info,aws_config=warn,aws_smithy_runtime=warn,aws_sdk_ec2=warn,aws_sdk_ecs=warn,aws_sdk_iam=warn,aws_sdk_cloudwatchlogs=warn",
        )
    });
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Cancel the token on Ctrl-C; in-flight calls still finish
fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing in-flight calls, starting nothing new");
            child.cancel();
        }
    });
    token
}

async fn run() -> Result<i32> {
    let args = Args::parse();
    init_tracing(args.log_format);

    match args.command {
        Command::Scan(common) => handle_scan(common).await,
        Command::Plan(common) => handle_plan(common).await,
        Command::Sweep(sweep) => handle_sweep(sweep).await,
    }
}

async fn handle_scan(args: CommonArgs) -> Result<i32> {
    let config = args.sweep_config()?;
    info!(region = %args.region, kinds = ?config.kinds, "Scanning for stale resources");

    let sweeper = Sweeper::new(args.aws().await, config).with_cancellation(cancel_on_ctrl_c());
    let discovered = sweeper.scan(Utc::now()).await;
    report_discovery_errors(&discovered);

    match args.output {
        OutputFormat::Json => {
            let items: Vec<_> = discovered.resources.iter().map(resource_json).collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Table => {
            if discovered.resources.is_empty() {
                println!("No stale resources found.");
            } else {
                println!("{}", resource_table(&discovered.resources));
                println!("\nTotal: {} resources", discovered.resources.len());
            }
        }
    }
    Ok(0)
}

async fn handle_plan(args: CommonArgs) -> Result<i32> {
    let config = args.sweep_config()?;
    let sweeper = Sweeper::new(args.aws().await, config).with_cancellation(cancel_on_ctrl_c());
    let (discovered, plan) = sweeper.plan(Utc::now()).await?;
    report_discovery_errors(&discovered);

    match args.output {
        OutputFormat::Json => {
            let stages: Vec<_> = (0..plan.stages.len())
                .map(|i| {
                    plan.stage_targets(i)
                        .into_iter()
                        .map(|t| {
                            serde_json::json!({
                                "resource_type": t.kind(),
                                "identifier": t.identifier(),
                            })
                        })
                        .collect::<Vec<_>>()
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&stages)?);
        }
        OutputFormat::Table => {
            if plan.is_empty() {
                println!("Nothing to delete.");
            } else {
                println!("{}", plan_table(&plan));
            }
        }
    }
    Ok(0)
}

async fn handle_sweep(args: SweepArgs) -> Result<i32> {
    let mut config = args.common.sweep_config()?;
    config.concurrency = args.concurrency;
    config.dry_run = !args.execute;

    if config.dry_run {
        info!("Dry run: nothing will be deleted (pass --execute to delete)");
    }

    let sweeper =
        Sweeper::new(args.common.aws().await, config).with_cancellation(cancel_on_ctrl_c());
    let sweep = sweeper
        .run(Utc::now())
        .await
        .context("Refusing to delete anything")?;
    if let Some(error) = &sweep.discovery_error {
        eprintln!("Discovery incomplete:\n{error}");
    }

    if let Some(path) = &args.report {
        let mut sink: Box<dyn ReportSink> = if path == "-" {
            Box::new(JsonLinesSink::new(io::stdout().lock()))
        } else {
            let file = File::create(path).with_context(|| format!("Failed to create {path}"))?;
            Box::new(JsonLinesSink::new(BufWriter::new(file)))
        };
        report::emit(sink.as_mut(), &sweep.outcomes)?;
    }

    let summary = sweep.summary();
    match args.common.output {
        OutputFormat::Json => {
            let records: Vec<_> = sweep
                .outcomes
                .iter()
                .map(report::ReportRecord::from)
                .collect();
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        OutputFormat::Table => {
            if !sweep.outcomes.is_empty() {
                println!("{}", outcome_table(&sweep.outcomes));
            }
            println!("{}", summary_table(&summary));
        }
    }

    if args.fail_on_errors && summary.needs_attention() {
        return Ok(EXIT_TARGETS_FAILED);
    }
    Ok(0)
}

fn report_discovery_errors(discovered: &Discovered) {
    if let Some(error) = &discovered.error {
        eprintln!("Discovery incomplete:\n{error}");
    }
    if !discovered.skipped.is_empty() {
        eprintln!("Cancelled before listing: {:?}", discovered.skipped);
    }
}

fn resource_json(resource: &Resource) -> serde_json::Value {
    let tags: serde_json::Map<String, serde_json::Value> = resource
        .tags()
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::from(v)))
        .collect();
    serde_json::json!({
        "kind": resource.kind().as_str(),
        "id": resource.id(),
        "description": resource.describe(),
        "targets": resource.targets().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "tags": tags,
    })
}

fn resource_table(resources: &[Resource]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Kind"),
            Cell::new("ID"),
            Cell::new("Name"),
            Cell::new("Details"),
        ]);
    for resource in resources {
        table.add_row(vec![
            Cell::new(resource.kind().as_str()),
            Cell::new(resource.id()),
            Cell::new(resource.tags().name().unwrap_or("")),
            Cell::new(resource.describe()),
        ]);
    }
    table
}

fn plan_table(plan: &Plan) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new("Stage"), Cell::new("Type"), Cell::new("ID")]);
    for i in 0..plan.stages.len() {
        for target in plan.stage_targets(i) {
            table.add_row(vec![
                Cell::new(i + 1),
                Cell::new(target.kind()),
                Cell::new(target.identifier()),
            ]);
        }
    }
    table
}
