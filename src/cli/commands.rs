//! Command execution

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::time::Instant;

use loadpace_core::{
    parse_override, CoordinatorBuilder, Db, Measurement, MeteredDb, OperationMeter, OutputFormat,
    RunConfig, RunSummary,
};

use super::{Commands, RunArgs};

/// Dispatch a parsed command
pub async fn execute(command: Commands) -> Result<()> {
    let load_start = Instant::now();

    match command {
        Commands::Load(args) => {
            let config = load_config(&args, Some(false))?;
            let store = create_store(&args)?;
            run_phase(config, &args, store, load_start).await?;
        }
        Commands::Run { args, load_first } => {
            let config = load_config(&args, Some(true))?;
            let store = create_store(&args)?;
            if load_first {
                let load = load_config(&args, Some(false))?;
                tracing::info!(records = load.total_operation_count(), "Loading before run");
                run_phase(load, &args, Arc::clone(&store), load_start).await?;
            }
            run_phase(config, &args, store, Instant::now()).await?;
        }
        Commands::Validate(args) => {
            let config = load_config(&args, None)?;
            print_plan(&config);
        }
    }

    Ok(())
}

/// Read the config file and `-p` overrides, then validate
fn load_config(args: &RunArgs, do_transactions: Option<bool>) -> Result<RunConfig> {
    let overrides = args
        .properties
        .iter()
        .map(|raw| parse_override(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let mut config = RunConfig::load(args.config.as_deref(), &overrides)
        .context("Failed to load configuration")?;
    if let Some(do_transactions) = do_transactions {
        config.do_transactions = do_transactions;
    }
    config.validate().context("Invalid configuration")?;

    Ok(config)
}

fn create_store(args: &RunArgs) -> Result<Arc<dyn Db>> {
    match loadpace_stores::create(&args.db) {
        Some(store) => Ok(store),
        None => bail!("unknown db {:?}", args.db),
    }
}

async fn run_phase(
    config: RunConfig,
    args: &RunArgs,
    store: Arc<dyn Db>,
    load_start: Instant,
) -> Result<RunSummary> {
    let format = if args.json {
        OutputFormat::Json
    } else {
        OutputFormat::Log
    };
    let meter = Arc::new(OperationMeter::new(!config.warm_up().is_zero(), format));
    let db: Arc<dyn Db> = Arc::new(MeteredDb::new(store, Arc::clone(&meter)));
    let workload = loadpace_workloads::create(&args.workload, &config)?;

    let coordinator = CoordinatorBuilder::new()
        .config(config)
        .workload(workload)
        .db(db)
        .measurement(meter.clone())
        .build()?;

    let summary = coordinator.run_until_done(load_start).await?;
    meter.output();
    print_summary(&summary, args.json)?;

    Ok(summary)
}

fn print_summary(summary: &RunSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(summary)?);
        return Ok(());
    }

    println!("Workers:      {}", summary.workers);
    println!("Operations:   {}", summary.operations);
    println!("Measured:     {}", summary.measured);
    println!(
        "Errors:       {} ({:.2}%)",
        summary.errors,
        summary.error_rate() * 100.0
    );
    println!("Elapsed:      {:.2}s", summary.elapsed.as_secs_f64());
    println!("Throughput:   {:.1} ops/sec", summary.ops_per_sec);
    if summary.cancelled > 0 {
        println!("Cancelled:    {} workers", summary.cancelled);
    }
    if summary.pacing_failed > 0 {
        println!("Pacing failed: {} workers", summary.pacing_failed);
    }
    Ok(())
}

fn print_plan(config: &RunConfig) {
    let phase = if config.do_transactions { "run" } else { "load" };
    println!("Phase:          {phase}");
    println!("Threads:        {}", config.thread_count);
    println!(
        "Operations:     {} ({} per worker)",
        config.total_operation_count(),
        config.per_worker_operation_count()
    );
    match config.per_worker_tick() {
        Some(tick) => println!("Worker tick:    {tick:?}"),
        None => println!("Worker tick:    unthrottled"),
    }
    println!("Warm-up:        {:?}", config.warm_up());
    if config.normaldatain_time {
        println!("Pacing:         {}", config.time_distribution);
    } else {
        println!("Pacing:         disabled");
    }
}
