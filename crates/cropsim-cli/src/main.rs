//! Cropsim - experiment driver for an external crop-simulation program
//!
//! ## Commands
//!
//! - `list`: Show discovered cases and the active list
//! - `create`: Create a case directory with its parameter file and descriptor
//! - `register`: Append a case to the active list
//! - `unregister`: Remove a case from the active list
//! - `run`: Run cases one at a time and report every outcome
//! - `parse`: Ingest a case's result and print its seasonal summary
//! - `export`: Write a case's result as CSV and/or JSON
//! - `sweep`: Vary one soil or crop parameter across a list of values

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cropsim_core::domain::SeasonalSummary;
use cropsim_core::export::{write_daily_csv, write_json, write_seasonal_csv};
use cropsim_core::{ingest, summarize};
use cropsim_runner::{
    run_batch, run_sweep, Case, CaseRegistry, DriverConfig, InvocationMode, Orchestrator,
};
use std::path::{Path, PathBuf};
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "cropsim")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Drive crop-simulation cases, sweeps and result exports", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Project root; uses the conventional layout beneath it instead of CROPSIM_* paths
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Directory holding case-* directories
    #[arg(long, global = true)]
    cases_dir: Option<PathBuf>,

    /// Active list file read by the simulation program
    #[arg(long, global = true)]
    active_list: Option<PathBuf>,

    /// Simulation executable (auto-detected under the root if omitted)
    #[arg(long, global = true)]
    executable: Option<PathBuf>,

    /// Working directory for the simulation program (default: each case's directory)
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,

    /// Kill a run after this many seconds (0 = never)
    #[arg(long, global = true)]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List discovered cases and the current active list
    List,

    /// Create a new case
    Create {
        /// Case name, must start with "case-"
        #[arg(short, long)]
        name: String,

        #[arg(long, default_value = "Maize")]
        crop: String,

        /// Planting date (YYYY-MM-DD)
        #[arg(long, default_value = "2024-05-01")]
        planting: String,

        /// Harvest date (YYYY-MM-DD)
        #[arg(long, default_value = "2024-10-15")]
        harvest: String,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Simulation years in the project descriptor
        #[arg(long, default_value = "1")]
        years: u32,

        #[arg(long, default_value = "2024")]
        start_year: i32,
    },

    /// Append a case to the active list
    Register {
        #[arg(short, long)]
        case: String,
    },

    /// Remove a case from the active list
    Unregister {
        #[arg(short, long)]
        case: String,
    },

    /// Run cases sequentially (all discovered cases when none are named)
    Run {
        #[arg(short, long)]
        case: Vec<String>,

        /// Write a placeholder result covering this many days instead of running
        #[arg(long)]
        simulate: Option<u32>,

        /// Pass the case's parameter file as the only argument
        #[arg(long)]
        param_file: bool,

        /// Write the batch report as JSON to this path
        #[arg(long)]
        summary_out: Option<PathBuf>,
    },

    /// Parse a case's result and print its seasonal summary
    Parse {
        #[arg(short, long)]
        case: String,
    },

    /// Export a case's result
    Export {
        #[arg(short, long)]
        case: String,

        /// Daily records as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Seasonal summary and daily records as JSON
        #[arg(long)]
        json_out: Option<PathBuf>,

        /// Seasonal summary as parameter,value,unit CSV
        #[arg(long)]
        seasonal_csv: Option<PathBuf>,
    },

    /// Run a case once per value of one parameter
    Sweep {
        #[arg(short, long)]
        case: String,

        /// Soil or crop parameter name, e.g. field_capacity
        #[arg(short, long)]
        param: String,

        /// Comma-separated values, run in the order given
        #[arg(long, value_delimiter = ',', required = true)]
        values: Vec<f64>,

        /// Write <prefix>_<index>.csv and .json for every point
        #[arg(long)]
        export_prefix: Option<PathBuf>,

        /// Write placeholder results covering this many days instead of running
        #[arg(long)]
        simulate: Option<u32>,

        /// Pass the case's parameter file as the only argument
        #[arg(long)]
        param_file: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    cropsim_core::init_tracing(cli.json, level);

    let config = driver_config(&cli);
    let registry = CaseRegistry::from_config(&config);

    // Dropping the command future on Ctrl-C kills the child and runs the
    // active-list and parameter guards.
    tokio::select! {
        result = dispatch(cli.command, &config, &registry) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; active list and swept parameter restored");
            anyhow::bail!("Interrupted")
        }
    }
}

fn invocation_mode(simulate: Option<u32>, param_file: bool) -> InvocationMode {
    match (simulate, param_file) {
        (Some(days), _) => InvocationMode::Simulated { days },
        (None, true) => InvocationMode::ParameterFile,
        (None, false) => InvocationMode::ActiveList,
    }
}

async fn dispatch(
    command: Commands,
    config: &DriverConfig,
    registry: &CaseRegistry,
) -> Result<()> {
    match command {
        Commands::List => cmd_list(registry),
        Commands::Create {
            name,
            crop,
            planting,
            harvest,
            description,
            years,
            start_year,
        } => cmd_create(
            registry,
            &name,
            &[
                ("crop_type", crop.as_str()),
                ("planting_date", planting.as_str()),
                ("harvest_date", harvest.as_str()),
                ("description", description.as_str()),
            ],
            years,
            start_year,
        ),
        Commands::Register { case } => cmd_register(registry, &case),
        Commands::Unregister { case } => cmd_unregister(registry, &case),
        Commands::Run {
            case,
            simulate,
            param_file,
            summary_out,
        } => {
            let mode = invocation_mode(simulate, param_file);
            cmd_run(config, registry, &case, mode, summary_out.as_deref()).await
        }
        Commands::Parse { case } => cmd_parse(registry, &case),
        Commands::Export {
            case,
            csv,
            json_out,
            seasonal_csv,
        } => cmd_export(
            registry,
            &case,
            csv.as_deref(),
            json_out.as_deref(),
            seasonal_csv.as_deref(),
        ),
        Commands::Sweep {
            case,
            param,
            values,
            export_prefix,
            simulate,
            param_file,
        } => {
            let mode = invocation_mode(simulate, param_file);
            cmd_sweep(
                config,
                registry,
                &case,
                &param,
                &values,
                export_prefix.as_deref(),
                mode,
            )
            .await
        }
    }
}

fn driver_config(cli: &Cli) -> DriverConfig {
    let mut config = match &cli.root {
        Some(root) => DriverConfig::new(root),
        None => DriverConfig::from_env(),
    };
    if let Some(dir) = &cli.cases_dir {
        config = config.with_cases_dir(dir);
    }
    if let Some(list) = &cli.active_list {
        config = config.with_active_list(list);
    }
    if let Some(exe) = &cli.executable {
        config = config.with_executable(exe);
    }
    if let Some(dir) = &cli.workdir {
        config = config.with_working_dir(dir);
    }
    if let Some(secs) = cli.timeout {
        config = config.with_timeout_secs(secs);
    }
    config
}

fn orchestrator(config: &DriverConfig, mode: InvocationMode) -> Result<Orchestrator> {
    let run_config = config
        .run_config(mode)
        .context("Cannot locate the simulation executable")?;
    Ok(Orchestrator::new(
        CaseRegistry::from_config(config).active_list().clone(),
        run_config,
    ))
}

fn print_summary(summary: &SeasonalSummary) {
    for (key, value, unit) in summary.unit_rows() {
        if unit.is_empty() {
            println!("  {:<32} {:.4}", key, value);
        } else {
            println!("  {:<32} {:.4} {}", key, value, unit);
        }
    }
}

/// List discovered cases and the active list.
fn cmd_list(registry: &CaseRegistry) -> Result<()> {
    let cases = registry.discover()?;
    println!("Cases in {}:", registry.cases_dir().display());
    if cases.is_empty() {
        println!("  (none)");
    }
    for case in &cases {
        let descriptor = if case.descriptor().is_file() {
            "descriptor"
        } else {
            "no descriptor"
        };
        println!(
            "  {} ({} parameters, {})",
            case.name,
            case.parameters.len(),
            descriptor
        );
    }

    let entries = registry.active_list().entries()?;
    println!();
    println!("Active list {}:", registry.active_list().path().display());
    if entries.is_empty() {
        println!("  (empty)");
    }
    for entry in entries {
        println!("  {}", entry);
    }
    Ok(())
}

fn cmd_create(
    registry: &CaseRegistry,
    name: &str,
    attributes: &[(&str, &str)],
    years: u32,
    start_year: i32,
) -> Result<()> {
    let case = registry
        .create_case(name, attributes)
        .with_context(|| format!("Failed to create case {}", name))?;
    let descriptor = registry.write_project_descriptor(&case, years, start_year)?;
    println!("✓ Created case {}", case.name);
    println!("  Directory:  {}", case.root.display());
    println!("  Parameters: {}", case.param_file().display());
    println!("  Descriptor: {}", descriptor.display());
    Ok(())
}

fn cmd_register(registry: &CaseRegistry, name: &str) -> Result<()> {
    let case = registry.open(name)?;
    registry
        .register(&case)
        .with_context(|| format!("Failed to register {}", name))?;
    println!(
        "✓ Registered {} in {}",
        case.list_entry(),
        registry.active_list().path().display()
    );
    Ok(())
}

fn cmd_unregister(registry: &CaseRegistry, name: &str) -> Result<()> {
    let case = registry.open(name)?;
    if registry.unregister(&case)? {
        println!("✓ Removed {} from the active list", case.list_entry());
    } else {
        println!("{} was not in the active list", case.list_entry());
    }
    Ok(())
}

async fn cmd_run(
    config: &DriverConfig,
    registry: &CaseRegistry,
    names: &[String],
    mode: InvocationMode,
    summary_out: Option<&Path>,
) -> Result<()> {
    let cases: Vec<Case> = if names.is_empty() {
        registry.discover()?
    } else {
        names
            .iter()
            .map(|name| registry.open(name))
            .collect::<cropsim_runner::Result<_>>()?
    };
    if cases.is_empty() {
        anyhow::bail!("No cases found in {}", registry.cases_dir().display());
    }

    let orchestrator = orchestrator(config, mode)?;
    info!(cases = cases.len(), "starting batch");
    let report = run_batch(&orchestrator, &cases).await;

    print!("{}", report.render());
    if let Some(path) = summary_out {
        report.write_json(path)?;
        println!("Report written to {}", path.display());
    }

    if report.all_succeeded() {
        Ok(())
    } else {
        anyhow::bail!("{} of {} case(s) failed", report.failed(), report.total())
    }
}

fn load_records(
    registry: &CaseRegistry,
    name: &str,
) -> Result<(Case, Vec<cropsim_core::CanonicalDailyRecord>)> {
    let case = registry.open(name)?;
    let records = ingest(&case.result_path())
        .with_context(|| format!("Failed to read results for {}", name))?;
    Ok((case, records))
}

fn cmd_parse(registry: &CaseRegistry, name: &str) -> Result<()> {
    let (case, records) = load_records(registry, name)?;
    let summary = summarize(&records);
    println!("Seasonal summary for {} ({} days):", case.name, records.len());
    print_summary(&summary);
    Ok(())
}

fn cmd_export(
    registry: &CaseRegistry,
    name: &str,
    csv: Option<&Path>,
    json: Option<&Path>,
    seasonal_csv: Option<&Path>,
) -> Result<()> {
    if csv.is_none() && json.is_none() && seasonal_csv.is_none() {
        anyhow::bail!("Nothing to export: pass --csv, --json-out or --seasonal-csv");
    }
    let (case, records) = load_records(registry, name)?;
    let summary = summarize(&records);

    if let Some(path) = csv {
        write_daily_csv(path, &records)?;
        println!("✓ Daily CSV: {}", path.display());
    }
    if let Some(path) = json {
        write_json(path, Some(&case.name), &summary, &records)?;
        println!("✓ JSON: {}", path.display());
    }
    if let Some(path) = seasonal_csv {
        write_seasonal_csv(path, &summary)?;
        println!("✓ Seasonal CSV: {}", path.display());
    }
    Ok(())
}

async fn cmd_sweep(
    config: &DriverConfig,
    registry: &CaseRegistry,
    name: &str,
    param: &str,
    values: &[f64],
    export_prefix: Option<&Path>,
    mode: InvocationMode,
) -> Result<()> {
    let mut case = registry.open(name)?;
    let orchestrator = orchestrator(config, mode)?;

    println!("Sweeping {} over {:?} for {}", param, values, case.name);
    let outcome = run_sweep(&orchestrator, &mut case, param, values, export_prefix).await;
    let (points, error) = match outcome {
        Ok(points) => (points, None),
        Err(e) => {
            let message = e.to_string();
            (e.completed, Some(message))
        }
    };

    for point in &points {
        let status = if point.run.success { "✓" } else { "✗" };
        println!(
            "  {} [{}] {} = {}: {:?}, max biomass {:.2}, final yield {:.2}",
            status,
            point.index,
            param,
            point.value,
            point.status,
            point.summary.max_biomass,
            point.summary.final_yield
        );
        for path in &point.exports {
            println!("      → {}", path.display());
        }
    }

    match error {
        Some(message) => anyhow::bail!(message),
        None => Ok(()),
    }
}
