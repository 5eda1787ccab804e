use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{ensure, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

use frameweave_core::batch::run_batch;
use frameweave_core::config::{config_path, data_dir, initialize_data_dir, AppConfig};
use frameweave_core::dedupe::{
    self, AutofillOptions, BlockDiffDetector, TuneRange, MAX_BLOCK_SAD,
};
use frameweave_core::deep::{DeepInterpolator, DeepRequest, Stitch};
use frameweave_core::files::{self, FrameNaming};
use frameweave_core::logging::{self, FileSinkPlan, LoggingInitOptions, DEFAULT_LOG_FILTER};
use frameweave_core::oracle::backend::InferenceBackend;
use frameweave_core::oracle::{FrameOracle, ModelName, RifeOracle};
use frameweave_core::progress::{format_duration, ProgressStack};
use frameweave_core::resample::{plan_resample, Resampler};
use frameweave_core::restore::{FrameRestorer, RestoreRequest};
use frameweave_core::search::{SearchRequest, TargetSearch};
use frameweave_core::series::{SeriesInterpolator, SeriesRequest};
use frameweave_core::warnings::Warnings;

#[derive(Parser, Debug)]
#[command(
    name = "frameweave",
    about = "Frame interpolation, duplicate repair and frame-rate conversion for image sequences"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        global = true,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        global = true,
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long, global = true, help = "Data directory holding config.toml and logs")]
    data_dir: Option<PathBuf>,

    #[command(flatten)]
    oracle: OracleArgs,

    #[arg(long, global = true, help = "Frame file extension (overrides [output] extension)")]
    extension: Option<String>,

    #[arg(long, global = true, help = "Keep every transient search frame")]
    keep_samples: bool,

    #[arg(long, global = true, help = "Disable progress bars")]
    no_progress: bool,
}

#[derive(Args, Debug, Default)]
struct OracleArgs {
    #[arg(long, global = true, help = "Interpolation model: ours | ours_small")]
    model: Option<ModelName>,

    #[arg(
        long = "gpu_ids",
        global = true,
        allow_hyphen_values = true,
        help = "GPU ids, e.g. 0 or 0,1; -1 for CPU"
    )]
    gpu_ids: Option<String>,

    #[arg(long = "time_step", global = true, help = "Let the model place frames at arbitrary times")]
    time_step: bool,

    #[arg(long, global = true, help = "Execution provider: cuda | tensorrt")]
    backend: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bisect between two frames to a fixed depth
    Interpolate(PairArgs),
    /// Search for a single frame at a target time between two frames
    Search(SearchArgs),
    /// Restore evenly spaced frames between two frames
    Restore(RestoreArgs),
    /// Slow-motion inflation of a whole series
    Inflate(SeriesArgs),
    /// Replace original frames with ones synthesized from wider pairs
    Resynthesize(ResynthesizeArgs),
    /// Convert a series to a new frame rate
    Resample(ResampleArgs),
    /// Print the duplicate groups of a series
    Report(ReportArgs),
    /// Copy a series without its duplicates
    Delete(DeleteArgs),
    /// Replace duplicates with interpolated frames
    Autofill(AutofillArgs),
    /// Sweep the duplicate threshold over a range
    Tune(TuneArgs),
}

#[derive(Args, Debug)]
struct PairArgs {
    #[arg(long)]
    before: PathBuf,
    #[arg(long)]
    after: PathBuf,
    #[arg(long = "output_path")]
    output_path: PathBuf,
    #[arg(long, default_value_t = 1)]
    depth: u32,
}

#[derive(Args, Debug)]
struct SearchArgs {
    #[arg(long)]
    before: PathBuf,
    #[arg(long)]
    after: PathBuf,
    #[arg(long = "output_path")]
    output_path: PathBuf,
    #[arg(long = "min-target")]
    min_target: f64,
    #[arg(long = "max-target")]
    max_target: f64,
    #[arg(long, help = "Search depth (defaults to [search] precision)")]
    depth: Option<u32>,
}

#[derive(Args, Debug)]
struct RestoreArgs {
    #[arg(long)]
    before: PathBuf,
    #[arg(long)]
    after: PathBuf,
    #[arg(long = "output_path")]
    output_path: PathBuf,
    #[arg(long)]
    count: usize,
    #[arg(long, help = "Search depth (defaults to [search] precision)")]
    depth: Option<u32>,
}

#[derive(Args, Debug)]
struct SeriesArgs {
    #[arg(long = "input_path")]
    input_path: PathBuf,
    #[arg(long = "output_path")]
    output_path: Option<PathBuf>,
    #[arg(long, default_value_t = 1)]
    depth: u32,
    #[arg(long, help = "Process every sub-directory of input_path separately")]
    batch: bool,
}

#[derive(Args, Debug)]
struct ResynthesizeArgs {
    #[command(flatten)]
    series: SeriesArgs,
    #[arg(long, default_value_t = 2)]
    offset: usize,
}

#[derive(Args, Debug)]
struct ResampleArgs {
    #[arg(long = "input_path")]
    input_path: PathBuf,
    #[arg(long = "output_path")]
    output_path: Option<PathBuf>,
    #[arg(long = "source-fps")]
    source_fps: u64,
    #[arg(long = "target-fps")]
    target_fps: u64,
    #[arg(long, help = "Search depth (defaults to [search] precision)")]
    depth: Option<u32>,
    #[arg(long)]
    batch: bool,
}

#[derive(Args, Debug)]
struct DedupeArgs {
    #[arg(long = "input_path")]
    input_path: PathBuf,
    #[arg(long, help = "Largest 8x8 block luma SAD counted as duplicate")]
    threshold: Option<u32>,
    #[arg(long = "max_dupes", help = "Largest group size, keep frame included (0 = unlimited)")]
    max_dupes: Option<usize>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    #[command(flatten)]
    dedupe: DedupeArgs,
    #[arg(long = "report-file")]
    report_file: Option<PathBuf>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Args, Debug)]
struct DeleteArgs {
    #[command(flatten)]
    dedupe: DedupeArgs,
    #[arg(long = "output_path")]
    output_path: Option<PathBuf>,
    #[arg(long = "max_size_for_delete", default_value_t = 0)]
    max_size_for_delete: usize,
}

#[derive(Args, Debug)]
struct AutofillArgs {
    #[command(flatten)]
    dedupe: DedupeArgs,
    #[arg(long = "output_path")]
    output_path: Option<PathBuf>,
    #[arg(long, help = "Search depth (defaults to [search] precision)")]
    depth: Option<u32>,
}

#[derive(Args, Debug)]
struct TuneArgs {
    #[arg(long = "input_path")]
    input_path: PathBuf,
    #[arg(long = "tune_min")]
    tune_min: Option<u32>,
    #[arg(long = "tune_max")]
    tune_max: Option<u32>,
    #[arg(long = "tune_step")]
    tune_step: Option<u32>,
    #[arg(long = "max_dupes")]
    max_dupes: Option<usize>,
    #[arg(long, help = "Also write the table as CSV")]
    csv: Option<PathBuf>,
}

/// Config values with this run's CLI overrides applied.
#[derive(Debug, Clone)]
struct RunSettings {
    config: AppConfig,
    data_dir: PathBuf,
    extension: String,
    keep_samples: bool,
    progress: bool,
}

impl RunSettings {
    fn resolve(cli: &Cli, mut config: AppConfig, data_dir: PathBuf) -> Result<Self> {
        if let Some(model) = cli.oracle.model {
            config.oracle.model_name = model;
        }
        if let Some(gpu_ids) = &cli.oracle.gpu_ids {
            config.oracle.gpu_ids = gpu_ids.clone();
        }
        if cli.oracle.time_step {
            config.oracle.use_time_step = true;
        }
        if let Some(backend) = &cli.oracle.backend {
            config.oracle.backend = InferenceBackend::from_str_lossy(backend);
        }

        let extension = cli
            .extension
            .clone()
            .unwrap_or_else(|| config.output.extension.clone())
            .trim_start_matches('.')
            .to_string();
        ensure!(!extension.is_empty(), "frame extension must not be empty");

        Ok(Self {
            keep_samples: cli.keep_samples || config.search.keep_samples,
            progress: config.progress.enabled && !cli.no_progress,
            config,
            data_dir,
            extension,
        })
    }

    fn progress(&self) -> ProgressStack {
        ProgressStack::new(self.progress)
    }

    fn base_name(&self) -> &str {
        &self.config.output.base_filename
    }

    fn precision(&self, depth: Option<u32>) -> u32 {
        depth.unwrap_or(self.config.search.precision)
    }

    fn threshold(&self, args: &DedupeArgs) -> Result<u32> {
        let threshold = args.threshold.unwrap_or(self.config.dedupe.threshold);
        ensure!(
            threshold <= MAX_BLOCK_SAD,
            "threshold {threshold} exceeds the maximum block difference {MAX_BLOCK_SAD}"
        );
        Ok(threshold)
    }

    fn max_dupes(&self, max_dupes: Option<usize>) -> usize {
        max_dupes.unwrap_or(self.config.dedupe.max_dupes)
    }

    fn load_oracle(&self) -> Result<RifeOracle> {
        RifeOracle::load(&self.config.oracle.to_options(&self.data_dir))
            .context("failed to initialise the frame oracle")
    }

    fn frames(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        files::list_frames(dir, Some(&self.extension))
    }
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );
    log_startup_metadata(&resolved_data_dir);

    if let Err(e) = initialize_data_dir(&resolved_data_dir) {
        warn!(error = %e, "Failed to initialize data directory");
    }
    let cfg_path = config_path(&resolved_data_dir);
    let config = match AppConfig::load_from_path(&cfg_path) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "Failed to load config file, using defaults");
            AppConfig::default()
        }
    };

    let settings = RunSettings::resolve(&cli, config, resolved_data_dir)?;
    let started = Instant::now();
    run_command(&cli.command, &settings)?;
    info!(
        elapsed = %format_duration(started.elapsed().as_secs_f64()),
        "Done"
    );
    Ok(())
}

#[cfg(test)]
fn select_log_filter(
    noise_base: &str,
    rust_log_env: Option<&str>,
    verbose: u8,
    cli_log_filter: Option<&str>,
) -> String {
    let options = LoggingInitOptions {
        data_dir: None,
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: rust_log_env.map(ToString::to_string),
        default_log_filter: DEFAULT_LOG_FILTER.to_string(),
        noise_filter: noise_base.to_string(),
        include_noise_filter_when_implicit: true,
        retention_files: logging::DEFAULT_LOG_RETENTION_FILES,
    };

    logging::compose_logging_filters(&options).console_filter
}

fn init_logging(data_dir: Option<&Path>, verbose: u8, cli_log_filter: Option<&str>) {
    let init_options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let init_plan = logging::compose_logging_init_plan(&init_options);
    let console_filter = init_plan.filters.console_filter;
    let file_filter = init_plan.filters.file_filter;

    match init_plan.file_sink {
        FileSinkPlan::Ready(ready) => {
            let console_env_filter = parse_env_filter_with_fallback(&console_filter, "console");
            let file_env_filter = parse_env_filter_with_fallback(&file_filter, "file");

            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(console_env_filter),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(ready.appender)
                        .with_filter(file_env_filter),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            let attempted_log_dir = fallback
                .attempted_log_dir
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<none>".to_string());
            let reason = fallback.reason;

            let console_env_filter = parse_env_filter_with_fallback(&console_filter, "console");
            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(console_env_filter),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
                return;
            }

            eprintln!(
                "Warning: persistent file logging unavailable (path: {attempted_log_dir}; reason: {reason}). Continuing with console-only logging."
            );
            warn!(
                attempted_log_dir = %attempted_log_dir,
                reason = %reason,
                "Persistent file logging unavailable; continuing with console-only logging"
            );
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink_name: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Invalid {sink_name} log filter '{filter}': {error}. Falling back to '{DEFAULT_LOG_FILTER}'."
        );
        tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER)
    })
}

fn log_startup_metadata(data_dir: &Path) {
    info!(
        pid = std::process::id(),
        data_dir = %data_dir.display(),
        config_path = %config_path(data_dir).display(),
        "Runtime startup metadata"
    );
}

/// `<parent>/<input name>-<suffix>` next to the input directory.
fn default_output(input: &Path, suffix: &str) -> PathBuf {
    let name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frames".to_string());
    input.with_file_name(format!("{name}-{suffix}"))
}

fn report_warnings(warnings: &Warnings) {
    if !warnings.is_empty() {
        info!(count = warnings.len(), "Finished with warnings");
    }
}

/// Run `job` on `input`, or on each of its sub-directories when `batch` is set.
fn for_each_input<F>(input: &Path, output: &Path, batch: bool, mut job: F) -> Result<()>
where
    F: FnMut(&Path, &Path) -> Result<()>,
{
    if batch {
        run_batch(input, output, job)?.into_result()
    } else {
        job(input, output)
    }
}

fn run_command(command: &Commands, settings: &RunSettings) -> Result<()> {
    match command {
        Commands::Interpolate(args) => {
            let mut oracle = settings.load_oracle()?;
            run_interpolate(&mut oracle, settings, args)
        }
        Commands::Search(args) => {
            let mut oracle = settings.load_oracle()?;
            run_search(&mut oracle, settings, args)
        }
        Commands::Restore(args) => {
            let mut oracle = settings.load_oracle()?;
            run_restore(&mut oracle, settings, args)
        }
        Commands::Inflate(args) => {
            let mut oracle = settings.load_oracle()?;
            run_series(&mut oracle, settings, args, 1)
        }
        Commands::Resynthesize(args) => {
            ensure!(args.offset >= 2, "resynthesis needs an offset of at least 2");
            let mut oracle = settings.load_oracle()?;
            run_series(&mut oracle, settings, &args.series, args.offset)
        }
        Commands::Resample(args) => {
            let mut oracle = settings.load_oracle()?;
            run_resample(&mut oracle, settings, args)
        }
        Commands::Report(args) => run_report(settings, args),
        Commands::Delete(args) => run_delete(settings, args),
        Commands::Autofill(args) => {
            let mut oracle = settings.load_oracle()?;
            run_autofill(&mut oracle, settings, args)
        }
        Commands::Tune(args) => run_tune(settings, args),
    }
}

fn run_interpolate(
    oracle: &mut dyn FrameOracle,
    settings: &RunSettings,
    args: &PairArgs,
) -> Result<()> {
    let mut progress = settings.progress();
    let outcome = DeepInterpolator::new(oracle, &mut progress).run(&DeepRequest {
        before: &args.before,
        after: &args.after,
        depth: args.depth,
        naming: FrameNaming::new(&args.output_path, settings.base_name(), &settings.extension),
        stitch: Stitch::Normal,
    })?;
    info!(
        outputs = outcome.outputs.len(),
        synthesized = outcome.synthesized,
        output = %args.output_path.display(),
        "Interpolation finished"
    );
    Ok(())
}

fn run_search(oracle: &mut dyn FrameOracle, settings: &RunSettings, args: &SearchArgs) -> Result<()> {
    let mut progress = settings.progress();
    let outcome = TargetSearch::new(oracle, &mut progress)
        .keep_samples(settings.keep_samples)
        .run(&SearchRequest {
            before: &args.before,
            after: &args.after,
            min_target: args.min_target,
            max_target: args.max_target,
            depth: settings.precision(args.depth),
            naming: FrameNaming::new(&args.output_path, settings.base_name(), &settings.extension),
        })?;
    info!(
        fraction = outcome.fraction,
        hit = outcome.hit,
        midpoints = outcome.midpoints,
        path = %outcome.path.display(),
        "Search finished"
    );
    report_warnings(&outcome.warnings);
    Ok(())
}

fn run_restore(
    oracle: &mut dyn FrameOracle,
    settings: &RunSettings,
    args: &RestoreArgs,
) -> Result<()> {
    let mut progress = settings.progress();
    let outcome = FrameRestorer::new(oracle, &mut progress)
        .keep_samples(settings.keep_samples)
        .run(&RestoreRequest {
            before: &args.before,
            after: &args.after,
            count: args.count,
            precision: settings.precision(args.depth),
            naming: FrameNaming::new(&args.output_path, settings.base_name(), &settings.extension),
        })?;
    info!(
        frames = outcome.frames.len(),
        fractions = ?outcome.fractions,
        output = %args.output_path.display(),
        "Restore finished"
    );
    report_warnings(&outcome.warnings);
    Ok(())
}

fn run_series(
    oracle: &mut dyn FrameOracle,
    settings: &RunSettings,
    args: &SeriesArgs,
    offset: usize,
) -> Result<()> {
    let suffix = if offset == 1 { "inflated" } else { "resynthesized" };
    let output = args
        .output_path
        .clone()
        .unwrap_or_else(|| default_output(&args.input_path, suffix));
    let mut progress = settings.progress();

    for_each_input(&args.input_path, &output, args.batch, |input, output| {
        let frames = settings.frames(input)?;
        let outcome = SeriesInterpolator::new(&mut *oracle, &mut progress).run(&SeriesRequest {
            frames: &frames,
            output_dir: output,
            base_name: settings.base_name(),
            extension: &settings.extension,
            depth: args.depth,
            offset,
        })?;
        info!(
            segments = outcome.segments,
            outputs = outcome.outputs.len(),
            output = %output.display(),
            "Series finished"
        );
        report_warnings(&outcome.warnings);
        Ok(())
    })
}

fn run_resample(
    oracle: &mut dyn FrameOracle,
    settings: &RunSettings,
    args: &ResampleArgs,
) -> Result<()> {
    let output = args.output_path.clone().unwrap_or_else(|| {
        default_output(&args.input_path, &format!("{}fps", args.target_fps))
    });
    let mut progress = settings.progress();
    let time_step = oracle.supports_time_step();

    for_each_input(&args.input_path, &output, args.batch, |input, output| {
        let frames = settings.frames(input)?;
        let plan = plan_resample(
            &frames,
            args.source_fps,
            args.target_fps,
            settings.precision(args.depth),
            time_step,
        )?;
        let outcome = Resampler::new(&mut *oracle, &mut progress)
            .keep_samples(settings.keep_samples)
            .run(&plan, output, settings.base_name(), &settings.extension)?;
        info!(
            outputs = outcome.outputs.len(),
            copied = outcome.copied,
            synthesized = outcome.synthesized,
            output = %output.display(),
            "Resample finished"
        );
        let mut warnings = plan.warnings.clone();
        warnings.absorb(outcome.warnings);
        report_warnings(&warnings);
        Ok(())
    })
}

fn run_report(settings: &RunSettings, args: &ReportArgs) -> Result<()> {
    let frames = settings.frames(&args.dedupe.input_path)?;
    let report = dedupe::analyze(
        &mut BlockDiffDetector::new(),
        &frames,
        settings.threshold(&args.dedupe)?,
        settings.max_dupes(args.dedupe.max_dupes),
    )?;

    let text = if args.json {
        serde_json::to_string_pretty(&report).context("failed to serialize report")?
    } else {
        dedupe::render_report(&report)
    };
    println!("{text}");
    if let Some(path) = &args.report_file {
        fs::write(path, &text)
            .with_context(|| format!("failed to write report: {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }
    Ok(())
}

fn run_delete(settings: &RunSettings, args: &DeleteArgs) -> Result<()> {
    let frames = settings.frames(&args.dedupe.input_path)?;
    let report = dedupe::analyze(
        &mut BlockDiffDetector::new(),
        &frames,
        settings.threshold(&args.dedupe)?,
        settings.max_dupes(args.dedupe.max_dupes),
    )?;
    let output = args
        .output_path
        .clone()
        .unwrap_or_else(|| default_output(&args.dedupe.input_path, "deduped"));
    dedupe::delete_duplicates(&frames, &report, &output, args.max_size_for_delete)?;
    Ok(())
}

fn run_autofill(
    oracle: &mut dyn FrameOracle,
    settings: &RunSettings,
    args: &AutofillArgs,
) -> Result<()> {
    let frames = settings.frames(&args.dedupe.input_path)?;
    let ignore_over_size = settings.max_dupes(args.dedupe.max_dupes);
    // Autofill reuses max_dupes as a size limit, so the scan itself is uncapped.
    let report = dedupe::analyze(
        &mut BlockDiffDetector::new(),
        &frames,
        settings.threshold(&args.dedupe)?,
        0,
    )?;
    let output = args
        .output_path
        .clone()
        .unwrap_or_else(|| default_output(&args.dedupe.input_path, "autofilled"));

    let mut progress = settings.progress();
    let outcome = dedupe::autofill(
        oracle,
        &mut progress,
        &frames,
        &report,
        &output,
        &AutofillOptions {
            ignore_over_size,
            precision: settings.precision(args.depth),
            keep_samples: settings.keep_samples,
        },
    )?;
    report_warnings(&outcome.warnings);
    Ok(())
}

fn run_tune(settings: &RunSettings, args: &TuneArgs) -> Result<()> {
    let frames = settings.frames(&args.input_path)?;
    let range = TuneRange {
        min: args.tune_min.unwrap_or(settings.config.dedupe.tune_min),
        max: args.tune_max.unwrap_or(settings.config.dedupe.tune_max),
        step: args.tune_step.unwrap_or(settings.config.dedupe.tune_step),
    };
    let mut progress = settings.progress();
    let table = dedupe::tune(
        &mut BlockDiffDetector::new(),
        &mut progress,
        &frames,
        range,
        settings.max_dupes(args.max_dupes),
    )?;

    println!("{}", table.render());
    if let Some(path) = &args.csv {
        table.write_csv(path)?;
        info!(path = %path.display(), rows = table.rows.len(), "Tuning CSV written");
    }
    report_warnings(&table.warnings);
    Ok(())
}
