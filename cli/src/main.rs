//! taskgraph - drive and inspect task-group DAG invocations from the
//! command line.

mod output;
mod spec;
mod work;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use futures::StreamExt;
use serde::Serialize;
use tabled::Tabled;
use taskgraph_core::dag::{DriverEvent, Entry, InvocationDriver, TaskGroup, TerminationStrategy};
use taskgraph_core::telemetry::{self, TelemetryConfig};

use output::OutputFormat;
use work::EchoItem;

/// taskgraph - task-group DAG scheduler CLI
#[derive(Parser)]
#[command(
    name = "taskgraph",
    author = "Aezi <aezi.zhu@icloud.com>",
    version = "0.1.0",
    about = "Drive and inspect task-group DAG invocations",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the built-in sample shape (a leaf, three mid-tier entries, a hub,
    /// and a root) and print the order entries completed in.
    Demo {
        /// Max number of entries dispatched concurrently.
        #[arg(long, default_value_t = 4)]
        max_concurrent_dispatch: usize,
    },
    /// Load a graph from a JSON/YAML/TOML spec file and invoke it.
    Run {
        /// Path to the graph spec file.
        spec: PathBuf,

        /// Max number of entries dispatched concurrently.
        #[arg(long, default_value_t = 4)]
        max_concurrent_dispatch: usize,
    },
}

#[derive(Tabled, Serialize)]
struct EntryRow {
    #[tabled(rename = "order")]
    order: usize,
    #[tabled(rename = "key")]
    key: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_telemetry(&TelemetryConfig::default())?;

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }
    let format = cli.output;

    let task_group = match cli.command {
        Commands::Demo { max_concurrent_dispatch } => {
            invoke_and_report(demo_task_group(), max_concurrent_dispatch, format).await?
        }
        Commands::Run { spec, max_concurrent_dispatch } => {
            let graph_spec = spec::GraphSpec::load(&spec)?;
            invoke_and_report(graph_spec.into_task_group()?, max_concurrent_dispatch, format).await?
        }
    };

    let stats = task_group.stats();
    output::print_header("Stats");
    output::print_detail("total", &stats.total.to_string());
    output::print_detail("succeeded", &stats.succeeded.to_string());
    output::print_detail("faulted", &stats.faulted.to_string());
    output::print_detail("cancelled", &stats.cancelled.to_string());

    Ok(())
}

/// The six-node sample shape used throughout the scheduler's own tests: a
/// leaf with no dependencies, three entries depending only on the leaf, a
/// hub depending on two of those three, and a root depending on the
/// remaining entry plus the hub.
fn demo_task_group() -> TaskGroup<String> {
    let group = TaskGroup::new(
        "F",
        Arc::new(EchoItem::new("F")),
        TerminationStrategy::TerminateOnInProgressCompletion,
    );
    for key in ["A", "B", "C", "D", "E"] {
        group
            .add_entry(Entry::new(key, Arc::new(EchoItem::new(key))))
            .expect("demo shape entries are unique");
    }
    group.add_edge("A", "B").unwrap();
    group.add_edge("A", "C").unwrap();
    group.add_edge("A", "D").unwrap();
    group.add_edge("C", "E").unwrap();
    group.add_edge("D", "E").unwrap();
    group.add_edge("B", "F").unwrap();
    group.add_edge("E", "F").unwrap();
    group
}

async fn invoke_and_report(
    task_group: TaskGroup<String>,
    max_concurrent_dispatch: usize,
    format: OutputFormat,
) -> Result<TaskGroup<String>> {
    task_group.prepare_for_enumeration();

    let mut events = task_group.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                DriverEvent::EntryReady { key } => output::print_info(&format!("ready: {key}")),
                DriverEvent::EntryCompleted { key } => {
                    output::print_success(&format!("completed: {key}"))
                }
                DriverEvent::EntryFailed { key, cancelled } => output::print_error(&format!(
                    "failed: {key} ({} cancelled)",
                    cancelled.len()
                )),
                DriverEvent::InvocationFinished { success } => {
                    output::print_info(&format!("invocation finished, success={success}"))
                }
            }
        }
    });

    let driver = InvocationDriver::new(
        task_group.clone(),
        max_concurrent_dispatch,
        Duration::from_millis(25),
    );
    let context = task_group.new_invocation_context();
    let mut results = driver.invoke_async(context);

    let mut rows = Vec::new();
    let mut index = 0usize;
    while let Some(result) = results.next().await {
        match result {
            Ok(value) => rows.push(EntryRow { order: index, key: value }),
            Err(err) => output::print_error(&err.to_string()),
        }
        index += 1;
    }

    output::print_list(&rows, format);
    Ok(task_group)
}
