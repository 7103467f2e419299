use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::cli::{connect, utils, OutputFormat};
use crate::config;
use crate::services::ScheduleService;
use crate::sync::{RunStatus, RunSummary, SyncOrchestrator, Trigger};

#[derive(Subcommand)]
pub enum SyncCommands {
    #[command(about = "Run one sync in the foreground and print its summary")]
    Run {
        #[arg(long, help = "Limit the run to this node's subtree")]
        node: Option<Uuid>,
    },

    #[command(about = "List configured sync schedules")]
    Schedules,
}

pub async fn handle(cmd: SyncCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SyncCommands::Run { node } => run(node, output_format).await,
        SyncCommands::Schedules => schedules(output_format).await,
    }
}

async fn run(node: Option<Uuid>, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect().await?;
    let orchestrator = SyncOrchestrator::new(pool, config::config().sync.clone());
    let summary = orchestrator.run(Trigger::Cli, node).await?;

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        OutputFormat::Text => print_summary(&summary),
    }

    if summary.status == RunStatus::Failed {
        anyhow::bail!("sync run {} failed", summary.run_id);
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "Run {} {}: {} school(s), {} record(s) upserted, {} error(s)",
        summary.run_id, summary.status, summary.schools, summary.upserted, summary.errors
    );
    if let Some(error) = &summary.error {
        println!("  {}", error);
    }
    for track in &summary.tracks {
        for school in &track.schools {
            println!("  [{}] {}", track.source, school.node_name);
            if let Some(error) = &school.error {
                println!("    error: {}", error);
            }
            for endpoint in &school.endpoints {
                match &endpoint.aborted {
                    Some(reason) => println!("    {:<18} aborted: {}", endpoint.endpoint, reason),
                    None => println!(
                        "    {:<18} fetched {:>6}  upserted {:>6}  failures {}",
                        endpoint.endpoint,
                        endpoint.fetched,
                        endpoint.upserted,
                        endpoint.failures.len()
                    ),
                }
            }
        }
    }
}

async fn schedules(output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = connect().await?;
    let schedules = ScheduleService::new(pool).select_all().await?;

    if schedules.is_empty() {
        return utils::output_empty_collection(&output_format, "schedules", "No sync schedules configured");
    }

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "schedules": schedules }))?),
        OutputFormat::Text => {
            let rows: Vec<Vec<String>> = schedules
                .iter()
                .map(|s| {
                    vec![
                        s.id.to_string(),
                        s.cron_expression.clone(),
                        if s.enabled { "yes".into() } else { "no".into() },
                        s.node_id.map(|id| id.to_string()).unwrap_or_else(|| "all".into()),
                        s.description.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            println!("{}", utils::render_table(&["id", "cron", "enabled", "node", "description"], &rows));
        }
    }
    Ok(())
}
