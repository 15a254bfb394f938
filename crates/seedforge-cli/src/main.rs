mod logging;
mod run;
mod settings;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use seedforge_core::{Error as CoreError, Project, load_project, project_fingerprint};
use seedforge_generate::{
    BenchmarkReport, CancellationToken, CsvSink, GenerationEngine, GenerationError,
    GeneratorRegistry, PartitionPlanner, PartitionRuntime, PartitionStatus, PreparedRun,
    ProgressEvent, run_benchmark,
};
use seedforge_plan::{
    ExecutionMode, JsonFileLedger, LedgerHeader, PartitionPlan, PlanError, PlanOptions,
    WorkloadReport, apply_row_overrides, estimate_workload,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use run::{RunManifest, RunPaths, read_manifest, write_json_atomic, write_run_artifacts};
use settings::{LogFormat, Settings, SettingsError, load_settings};

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Generate(#[from] GenerationError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("Project '{project}': {count} problem(s) found. Fix: resolve the issues listed above.")]
    Invalid { project: String, count: usize },
    #[error("Output '{}': {source}. Fix: check that the directory is writable.", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Resume: {0}. Fix: rerun without --resume or with the original settings.")]
    Resume(String),
    #[error("Logging: {0}. Fix: set a valid log level or log file.")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "seedforge", version, about = "Schema-driven synthetic data generator")]
struct Cli {
    /// Settings file; defaults to ./seedforge.toml when present.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, value_name = "FILTER")]
    log_level: Option<String>,
    /// Emit console logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a project and load its CSV samples without generating rows.
    Validate(ValidateArgs),
    /// Print the partition plan for a project.
    Plan(PlanArgs),
    /// Generate CSV files for a project.
    Generate(GenerateArgs),
    /// Print a JSON Schema for one of the documents seedforge reads or writes.
    Schema(SchemaArgs),
}

#[derive(Args, Debug)]
struct ProjectArgs {
    /// Project JSON document.
    #[arg(value_name = "PROJECT")]
    project: PathBuf,
    /// Only these tables (comma separated); FK parents are added.
    #[arg(long, value_delimiter = ',')]
    tables: Vec<String>,
    /// Override the project seed.
    #[arg(long)]
    seed: Option<u64>,
    /// Base directory for relative sample_csv paths; defaults to the project's directory.
    #[arg(long, value_name = "DIR")]
    asset_root: Option<PathBuf>,
    /// Row count overrides as TABLE=ROWS (comma separated).
    #[arg(long = "rows", value_name = "TABLE=ROWS", value_delimiter = ',', value_parser = parse_row_override)]
    row_overrides: Vec<(String, u64)>,
}

fn parse_row_override(raw: &str) -> Result<(String, u64), String> {
    let (table, rows) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected TABLE=ROWS, got '{raw}'"))?;
    let rows = rows
        .trim()
        .parse::<u64>()
        .map_err(|err| format!("row count for '{table}': {err}"))?;
    Ok((table.trim().to_string(), rows))
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    project: ProjectArgs,
}

#[derive(Args, Debug)]
struct PlanArgs {
    #[command(flatten)]
    project: ProjectArgs,
    #[arg(long)]
    chunk_size: Option<u64>,
    /// Write the plan here instead of stdout.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Also generate every partition in memory and report throughput.
    #[arg(long, default_value_t = false)]
    benchmark: bool,
    /// Workers used by --benchmark.
    #[arg(long)]
    workers: Option<usize>,
}

/// What `plan` prints when no output file is given.
#[derive(Serialize)]
struct PlanDocument<'a> {
    plan: &'a PartitionPlan,
    workload: &'a WorkloadReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    benchmark: Option<&'a BenchmarkReport>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Output directory for CSV files, the report and the run ledger.
    #[arg(long, default_value = "out")]
    out: PathBuf,
    #[arg(long)]
    chunk_size: Option<u64>,
    #[arg(long)]
    workers: Option<usize>,
    #[arg(long)]
    retry_limit: Option<u32>,
    #[arg(long)]
    pk_offset: Option<u64>,
    /// Continue an interrupted run in the same output directory.
    #[arg(long, default_value_t = false)]
    resume: bool,
}

#[derive(Args, Debug)]
struct SchemaArgs {
    #[arg(value_enum)]
    document: SchemaDocument,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SchemaDocument {
    Project,
    Plan,
    Ledger,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let mut settings = load_settings(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        settings.logging.level = level;
    }
    if cli.log_json {
        settings.logging.format = LogFormat::Json;
    }
    logging::init_logging(&settings.logging).map_err(CliError::Logging)?;

    match cli.command {
        Command::Validate(args) => run_validate(settings, args),
        Command::Plan(args) => run_plan(settings, args),
        Command::Generate(args) => run_generate(settings, args),
        Command::Schema(args) => run_schema(args),
    }
}

/// Load the project and fold the shared flags into `settings`.
fn load(settings: &mut Settings, args: &ProjectArgs) -> Result<Project, CliError> {
    let mut project = load_project(&args.project)?;
    if let Some(seed) = args.seed {
        project.seed = seed;
    }
    if !args.tables.is_empty() {
        settings.plan.tables = args.tables.clone();
    }
    settings
        .plan
        .row_overrides
        .extend(args.row_overrides.iter().cloned());
    if !settings.plan.row_overrides.is_empty() {
        project = apply_row_overrides(&project, &settings.plan.row_overrides)?;
    }
    if let Some(root) = &args.asset_root {
        settings.generate.asset_root = Some(root.clone());
    } else if settings.generate.asset_root.is_none() {
        settings.generate.asset_root = args
            .project
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf);
    }
    info!(project = %project.name, seed = project.seed, tables = project.tables.len(), "project loaded");
    Ok(project)
}

fn io_error(path: PathBuf) -> impl FnOnce(std::io::Error) -> CliError {
    move |source| CliError::Io { path, source }
}

fn run_validate(mut settings: Settings, args: ValidateArgs) -> Result<(), CliError> {
    let project = load(&mut settings, &args.project)?;
    let registry = GeneratorRegistry::with_builtins();
    let diagnostics = seedforge_generate::validate(&project, &registry);
    if !diagnostics.is_empty() {
        for diagnostic in &diagnostics {
            println!("{diagnostic}");
        }
        return Err(CliError::Invalid {
            project: project.name.clone(),
            count: diagnostics.len(),
        });
    }

    let engine = GenerationEngine::new(&registry, settings.generate.clone());
    let prepared = engine.prepare(&project, &settings.plan.tables)?;
    let rows: u64 = prepared
        .tables()
        .iter()
        .filter_map(|table| prepared.layout(table))
        .map(|layout| layout.rows())
        .sum();
    println!(
        "Project '{}' is valid: {} table(s), {} row(s) planned.",
        project.name,
        prepared.tables().len(),
        rows
    );
    Ok(())
}

fn build_plan(
    prepared: &PreparedRun<'_>,
    settings: &Settings,
    chunk_size: Option<u64>,
) -> Result<PartitionPlan, CliError> {
    let options = PlanOptions {
        chunk_size_rows: chunk_size.unwrap_or(settings.plan.chunk_size_rows),
        selected_tables: settings.plan.tables.clone(),
        row_overrides: settings.plan.row_overrides.clone(),
    };
    Ok(PartitionPlanner::build_plan(prepared, &options)?)
}

fn run_plan(mut settings: Settings, args: PlanArgs) -> Result<(), CliError> {
    let project = load(&mut settings, &args.project)?;
    if let Some(workers) = args.workers {
        settings.runtime.worker_count = workers;
    }
    let registry = GeneratorRegistry::with_builtins();
    let engine = GenerationEngine::new(&registry, settings.generate.clone());
    let prepared = engine.prepare(&project, &settings.plan.tables)?;
    let plan = build_plan(&prepared, &settings, args.chunk_size)?;

    let benchmark = if args.benchmark {
        let listener = |event: &ProgressEvent| {
            if event.status == PartitionStatus::Completed {
                debug!(partition_id = %event.partition_id, rows_done = event.rows_done, "partition measured");
            }
        };
        Some(run_benchmark(
            &prepared,
            &plan,
            settings.runtime.clone(),
            &listener,
            &CancellationToken::new(),
        )?)
    } else {
        None
    };
    let workload = match &benchmark {
        Some(report) => report.workload.clone(),
        None => estimate_workload(prepared.project(), &prepared, &plan),
    };

    match args.out {
        Some(path) => {
            write_json_atomic(&path, &plan).map_err(io_error(path.clone()))?;
            println!(
                "Wrote {} partition(s) in {} stage(s) to {}.",
                plan.partitions.len(),
                plan.stage_count(),
                path.display()
            );
            print_workload(&workload, benchmark.as_ref());
        }
        None => {
            let document = PlanDocument {
                plan: &plan,
                workload: &workload,
                benchmark: benchmark.as_ref(),
            };
            let encoded = serde_json::to_string_pretty(&document).map_err(GenerationError::from)?;
            println!("{encoded}");
        }
    }
    Ok(())
}

fn print_workload(workload: &WorkloadReport, benchmark: Option<&BenchmarkReport>) {
    for estimate in &workload.estimates {
        println!(
            "{}: {} row(s), ~{} MB in memory, ~{} MB written, ~{}s, {:?} risk: {}.",
            estimate.table,
            estimate.rows,
            estimate.memory_mb,
            estimate.write_mb,
            estimate.seconds,
            estimate.risk,
            estimate.recommendation
        );
    }
    let summary = &workload.summary;
    println!(
        "Total: {} row(s) in {} table(s), ~{}s estimated, highest risk {:?}.",
        summary.rows, summary.tables, summary.seconds, summary.highest_risk
    );
    if let Some(report) = benchmark {
        println!(
            "Benchmark: {} row(s) in {} ms ({} rows/s, {} MB rendered).",
            report.rows_generated, report.duration_ms, report.rows_per_second, report.rendered_mb
        );
    }
}

fn run_generate(mut settings: Settings, args: GenerateArgs) -> Result<(), CliError> {
    let started_at = Utc::now();
    let project = load(&mut settings, &args.project)?;
    if let Some(workers) = args.workers {
        settings.runtime.worker_count = workers;
    }
    if let Some(retry_limit) = args.retry_limit {
        settings.runtime.retry_limit = retry_limit;
    }
    if let Some(pk_offset) = args.pk_offset {
        settings.generate.pk_offset = pk_offset;
    }

    let paths = RunPaths::new(args.out.clone());
    std::fs::create_dir_all(&paths.out_dir).map_err(io_error(paths.out_dir.clone()))?;

    let registry = GeneratorRegistry::with_builtins();
    let engine = GenerationEngine::new(&registry, settings.generate.clone());
    let prepared = engine.prepare(&project, &settings.plan.tables)?;
    let plan = build_plan(&prepared, &settings, args.chunk_size)?;
    let fingerprint = project_fingerprint(&project)?;

    let ledger_path = paths.ledger_path();
    if args.resume {
        check_resumable(&paths, &plan, &fingerprint)?;
    } else if ledger_path.exists() {
        std::fs::remove_file(&ledger_path).map_err(io_error(ledger_path.clone()))?;
    }
    let workers = settings.runtime.worker_count.max(1);
    let header = LedgerHeader {
        project_name: project.name.clone(),
        project_seed: project.seed,
        project_fingerprint: fingerprint.clone(),
        mode: if workers > 1 {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        },
        worker_count: u32::try_from(workers).unwrap_or(u32::MAX),
        selected_tables: plan.selected_tables.clone(),
    };
    let mut ledger = JsonFileLedger::open_or_create(&ledger_path, header)?;
    let mut sink = if args.resume {
        CsvSink::resume(&paths.out_dir)?
    } else {
        CsvSink::create(&paths.out_dir)?
    };

    let listener = |event: &ProgressEvent| match event.status {
        PartitionStatus::Completed => info!(
            table = %event.table,
            partition_id = %event.partition_id,
            rows_done = event.rows_done,
            "partition written"
        ),
        PartitionStatus::Skipped => debug!(partition_id = %event.partition_id, "partition already complete"),
        PartitionStatus::Retrying | PartitionStatus::Failed => warn!(
            partition_id = %event.partition_id,
            status = ?event.status,
            "partition did not complete"
        ),
    };
    let runtime = PartitionRuntime::new(settings.runtime.clone());
    let outcome = runtime.run(
        &prepared,
        &plan,
        &mut sink,
        &mut ledger,
        &listener,
        &CancellationToken::new(),
    )?;
    let bytes = sink.finish()?;

    let cancelled = outcome.is_cancelled();
    let report = outcome.into_report();
    let manifest = RunManifest {
        run_id: report.run_id.clone(),
        started_at,
        finished_at: Utc::now(),
        project: project.name.clone(),
        project_path: args.project.project.clone(),
        project_fingerprint: fingerprint,
        seed: project.seed,
        chunk_size_rows: plan.chunk_size_rows,
        tables: plan.selected_tables.clone(),
        resumed: args.resume,
        status: report.status,
        generate: settings.generate.clone(),
        runtime: settings.runtime.clone(),
    };
    write_run_artifacts(&paths, &manifest, &report).map_err(io_error(paths.out_dir.clone()))?;

    println!(
        "{} {} row(s) across {} table(s) into {} ({} bytes, run {}).",
        if cancelled { "Cancelled after" } else { "Generated" },
        report.rows_generated(),
        report.tables.len(),
        paths.out_dir.display(),
        bytes,
        report.run_id
    );
    for warning in &report.warnings {
        println!("warning [{}]: {}", warning.code, warning.message);
    }
    Ok(())
}

/// A resumed run must reuse the partition layout of the run it continues.
fn check_resumable(paths: &RunPaths, plan: &PartitionPlan, fingerprint: &str) -> Result<(), CliError> {
    let manifest_path = paths.manifest_path();
    let manifest = read_manifest(&manifest_path).map_err(io_error(manifest_path.clone()))?;
    let Some(manifest) = manifest else {
        if paths.ledger_path().exists() {
            return Ok(());
        }
        return Err(CliError::Resume(format!(
            "no previous run found in '{}'",
            paths.out_dir.display()
        )));
    };
    if manifest.chunk_size_rows != plan.chunk_size_rows {
        return Err(CliError::Resume(format!(
            "chunk size {} differs from the previous run's {}",
            plan.chunk_size_rows, manifest.chunk_size_rows
        )));
    }
    if manifest.project_fingerprint != fingerprint {
        return Err(CliError::Resume(
            "the project changed since the previous run".to_string(),
        ));
    }
    Ok(())
}

fn run_schema(args: SchemaArgs) -> Result<(), CliError> {
    let schema = match args.document {
        SchemaDocument::Project => serde_json::to_string_pretty(&seedforge_core::project_json_schema()),
        SchemaDocument::Plan => serde_json::to_string_pretty(&seedforge_plan::plan_json_schema()),
        SchemaDocument::Ledger => serde_json::to_string_pretty(&seedforge_plan::ledger_json_schema()),
    }
    .map_err(GenerationError::from)?;
    println!("{schema}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn generate_flags_parse() {
        let cli = Cli::try_parse_from([
            "seedforge",
            "generate",
            "shop.json",
            "--out",
            "data",
            "--workers",
            "4",
            "--tables",
            "orders,customers",
            "--resume",
        ])
        .expect("parse");
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.out, PathBuf::from("data"));
        assert_eq!(args.workers, Some(4));
        assert_eq!(args.project.tables, vec!["orders", "customers"]);
        assert!(args.resume);
    }

    #[test]
    fn row_overrides_parse_as_pairs() {
        let cli = Cli::try_parse_from([
            "seedforge",
            "plan",
            "shop.json",
            "--rows",
            "orders=500, customers=20",
            "--benchmark",
        ])
        .expect("parse");
        let Command::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert!(args.benchmark);
        assert_eq!(
            args.project.row_overrides,
            vec![("orders".to_string(), 500), ("customers".to_string(), 20)]
        );

        let err = Cli::try_parse_from(["seedforge", "plan", "shop.json", "--rows", "orders"])
            .expect_err("missing count");
        assert!(err.to_string().contains("TABLE=ROWS"));
    }
}
