//! gpx-run-metrics CLI
//!
//! Usage:
//!   gpx-run-metrics distance <file.gpx> [--smoothing kalman|butterworth|none] [--export out.gpx]
//!   gpx-run-metrics manifest <folder> [--output GPSdata.csv]
//!   gpx-run-metrics analyze <GPSdata.csv> [--output run_results.csv]

use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};
use gpx_run_metrics::session::{
    analyze_sessions, build_manifest, read_manifest, successful, write_manifest,
    write_session_results,
};
use gpx_run_metrics::trends::{
    summarize_trends, GroupSummary, LinearFit, MannWhitney, HEAT_THRESHOLD_C, SIGNIFICANCE_LEVEL,
};
use gpx_run_metrics::{write_track, ParseMode, PipelineConfig, SmoothingMode, TrackPipeline};

#[derive(Parser)]
#[command(name = "gpx-run-metrics")]
#[command(about = "Smoothed running distance and trends from GPX recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Distance and duration of a single recording
    Distance {
        file: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Also write the smoothed path to this GPX file
        #[arg(long)]
        export: Option<PathBuf>,
    },

    /// List the GPX files in a folder as a session manifest CSV
    Manifest {
        folder: PathBuf,

        #[arg(short, long, default_value = "GPSdata.csv")]
        output: PathBuf,
    },

    /// Compute metrics for every session in a manifest and report trends
    Analyze {
        manifest: PathBuf,

        #[command(flatten)]
        pipeline: PipelineArgs,

        #[arg(short, long, default_value = "run_results.csv")]
        output: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SmoothingArg {
    Kalman,
    Butterworth,
    None,
}

impl From<SmoothingArg> for SmoothingMode {
    fn from(arg: SmoothingArg) -> Self {
        match arg {
            SmoothingArg::Kalman => SmoothingMode::Kalman,
            SmoothingArg::Butterworth => SmoothingMode::Butterworth,
            SmoothingArg::None => SmoothingMode::None,
        }
    }
}

#[derive(Args)]
struct PipelineArgs {
    #[arg(long, value_enum, default_value = "kalman")]
    smoothing: SmoothingArg,

    /// Butterworth cutoff as a fraction of Nyquist
    #[arg(long, default_value_t = 0.3)]
    cutoff: f64,

    /// Segments longer than this many seconds count as pauses when slow
    #[arg(long, default_value_t = 8.0)]
    gap_threshold: f64,

    /// Slowest pace still counted as running, in s/m
    #[arg(long, default_value_t = 0.67)]
    slow_pace: f64,

    /// Retry broken XML after minimal repairs
    #[arg(long)]
    tolerant: bool,
}

impl PipelineArgs {
    fn to_config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::default()
            .with_smoothing(self.smoothing.into())
            .with_parse_mode(if self.tolerant {
                ParseMode::Tolerant
            } else {
                ParseMode::Strict
            });
        config.butterworth_cutoff = self.cutoff;
        config.gap_threshold_sec = self.gap_threshold;
        config.slow_pace_threshold = self.slow_pace;
        config
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| writeln!(buf, "[{:5}] {}", record.level(), record.args()))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Distance {
            file,
            pipeline,
            export,
        } => run_distance(&file, &pipeline, export.as_deref()),
        Commands::Manifest { folder, output } => run_manifest(&folder, &output),
        Commands::Analyze {
            manifest,
            pipeline,
            output,
        } => run_analyze(&manifest, &pipeline, &output),
    }
}

fn run_distance(
    file: &Path,
    args: &PipelineArgs,
    export: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pipeline = TrackPipeline::new(args.to_config())?;
    let (track, smoothed) = pipeline.smooth_track(file)?;
    let metrics = pipeline.metrics_for(&track, &smoothed)?;

    println!("\n🏃 {}", file.display());
    println!("   Smoothing:  {}", pipeline.smoother_name());
    println!("   Fixes:      {}", track.len());
    println!("   Distance:   {:.1} m", metrics.total_distance_m);
    println!("   Duration:   {:.2} min", metrics.duration_min);
    if let Some(speed) = metrics.avg_speed_mps() {
        println!("   Avg speed:  {:.2} m/s", speed);
    }

    if let Some(out) = export {
        write_track(&smoothed, out)?;
        println!("📁 Smoothed track saved to: {}", out.display());
    }
    Ok(())
}

fn run_manifest(folder: &Path, output: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = build_manifest(folder)?;
    write_manifest(&sessions, output)?;

    let undated = sessions.iter().filter(|s| s.datetime.is_none()).count();
    println!("\n✅ Listed {} GPX files", sessions.len());
    if undated > 0 {
        println!("⚠️  {} files have no start time in their name", undated);
    }
    println!("📁 Manifest saved to: {}", output.display());
    Ok(())
}

fn run_analyze(
    manifest: &Path,
    args: &PipelineArgs,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let sessions = read_manifest(manifest)?;
    let base_dir = manifest.parent().unwrap_or_else(|| Path::new("."));
    let pipeline = TrackPipeline::new(args.to_config())?;

    let outcomes = analyze_sessions(&pipeline, &sessions, base_dir);
    let total = outcomes.len();
    let results = successful(outcomes);

    println!("\n✅ Processed {} out of {} sessions", results.len(), total);
    if results.is_empty() {
        println!("⚠️  No valid results to save");
        return Ok(());
    }

    write_session_results(&results, output)?;
    println!("📁 Results saved to: {}", output.display());

    let summary = summarize_trends(&results);
    println!("\n📈 TRENDS OVER TIME");
    println!("==================");
    print_fit("Distance", "m", summary.distance.as_ref());
    print_fit("Duration", "min", summary.duration.as_ref());
    print_fit("Avg speed", "m/s", summary.speed.as_ref());

    println!("\n🌡️  HOT (≥ {:.0}°C) VS COOL DAYS", HEAT_THRESHOLD_C);
    println!("===========================");
    print_group("Hot", summary.hot.as_ref());
    print_group("Cool", summary.cool.as_ref());
    print_speed_test(summary.hot_vs_cool_speed.as_ref());

    Ok(())
}

fn print_fit(label: &str, unit: &str, fit: Option<&LinearFit>) {
    let Some(fit) = fit else {
        println!("  {:<10} not enough dated sessions", label);
        return;
    };

    let p_value = fit
        .p_value
        .map(|p| format!("p = {:.3}", p))
        .unwrap_or_else(|| "p = n/a".to_string());
    println!(
        "  {:<10} {:+.3} {}/day (r² = {:.3}, {}, n = {})",
        label,
        fit.slope_per_day(),
        unit,
        fit.r_squared,
        p_value,
        fit.samples
    );
    if fit.is_significant() {
        println!(
            "  {:<10} ✅ changed over time at the {:.0}% significance level",
            "",
            SIGNIFICANCE_LEVEL * 100.0
        );
    }
}

fn print_group(label: &str, group: Option<&GroupSummary>) {
    match group {
        Some(g) => println!(
            "  {:<5} {} runs, {:.0} m, {:.1} min, {}",
            label,
            g.count,
            g.mean_distance_m,
            g.mean_duration_min,
            g.mean_speed_mps
                .map(|s| format!("{:.2} m/s", s))
                .unwrap_or_else(|| "n/a".to_string())
        ),
        None => println!("  {:<5} no runs with a recorded temperature", label),
    }
}

fn print_speed_test(test: Option<&MannWhitney>) {
    match test {
        Some(t) => {
            println!("  Mann-Whitney U on avg speed: U = {:.1}, p = {:.3}", t.u, t.p_value);
            if t.is_significant() {
                println!(
                    "  ✅ Hot and cool day speeds differ at the {:.0}% significance level",
                    SIGNIFICANCE_LEVEL * 100.0
                );
            } else {
                println!("  ➖ No significant speed difference between hot and cool days");
            }
        }
        None => println!("  Mann-Whitney U needs runs on both hot and cool days"),
    }
}
