use anyhow::{Context, Result};
use assetlens::{
    AnalysisConfig, AnalysisReport, CatalogScanner, GrepSearcher, ImageAsset, PerceptualExtractor,
    ProgressCallback, RegexSearcher, SearchBackend, SimilarityEngine, SimilarityGroup, TextSearcher,
    UsageAnalyzer, UsageStatus, Verbosity,
};
use clap::{Args, Parser, Subcommand};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::filter::LevelFilter;

const PROGRESS_STEPS: u64 = 1000;

#[derive(Parser, Debug)]
#[command(
    name = "assetlens",
    version,
    about = "Find similar and unused images in asset catalogs"
)]
struct Cli {
    /// Diagnostic output level
    #[arg(long, value_enum, global = true)]
    verbosity: Option<Verbosity>,

    /// JSON config file (default: `<config dir>/assetlens/config.json`)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find groups of visually similar image sets
    Similar {
        #[command(flatten)]
        scan: ScanArgs,

        /// Maximum feature distance for two images to count as similar
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Project sources to check usage against before computing savings
        #[arg(long, value_name = "DIR")]
        project: Option<PathBuf>,
    },

    /// List image sets that are not referenced from project sources
    Unused {
        #[command(flatten)]
        scan: ScanArgs,

        /// Project source root
        #[arg(long, value_name = "DIR")]
        project: PathBuf,
    },
}

#[derive(Args, Debug)]
struct ScanArgs {
    /// Directory containing the asset catalogs
    #[arg(short, long, value_name = "DIR")]
    path: PathBuf,

    /// Skip image files smaller than this many kilobytes
    #[arg(long, value_name = "KB")]
    min_size: Option<u64>,

    /// Text search implementation used for usage detection
    #[arg(long, value_enum)]
    search_backend: Option<SearchBackend>,

    /// Print a JSON report instead of text
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        AnalysisConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(verbosity) = cli.verbosity {
        config.verbosity = verbosity;
    }
    init_logging(config.verbosity);

    match cli.command {
        Commands::Similar {
            scan,
            threshold,
            project,
        } => {
            apply_scan_args(&mut config, &scan);
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            config.validate()?;
            run_similar(&scan, project.as_deref(), &config)
        }
        Commands::Unused { scan, project } => {
            apply_scan_args(&mut config, &scan);
            config.validate()?;
            run_unused(&scan, &project, &config)
        }
    }
}

fn init_logging(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_max_level(tracing_level(verbosity))
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
    log::set_max_level(verbosity.level_filter());
}

/// The `tracing` counterpart of [`Verbosity::level_filter`].
fn tracing_level(verbosity: Verbosity) -> LevelFilter {
    verbosity
        .level_filter()
        .to_string()
        .parse()
        .unwrap_or(LevelFilter::WARN)
}

fn apply_scan_args(config: &mut AnalysisConfig, scan: &ScanArgs) {
    if let Some(min_size) = scan.min_size {
        config.min_size_kb = min_size;
    }
    if let Some(backend) = scan.search_backend {
        config.search_backend = backend;
    }
}

fn run_similar(scan: &ScanArgs, project: Option<&Path>, config: &AnalysisConfig) -> Result<()> {
    if !scan.json {
        println!("▶ Scanning for similar images in: {}", scan.path.display());
    }
    let mut assets = scan_catalog(&scan.path, config.min_size_kb, scan.json)?;

    if let Some(project) = project {
        analyze_usage(&mut assets, project, config, scan.json)?;
    }

    let engine = SimilarityEngine::new(
        config.threshold,
        Arc::new(PerceptualExtractor::new(config.hash_size)),
    );

    let bar = ProgressBar::new(PROGRESS_STEPS);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {percent:>3}% {msg}",
    )?);
    bar.set_message("Comparing images…");
    let progress = bar.clone();
    let callback: ProgressCallback = Box::new(move |fraction| {
        progress.set_position((fraction * PROGRESS_STEPS as f64).round() as u64);
    });

    let groups = benchmark("similarity analysis", || {
        engine.find_similar_groups(&assets, Some(&callback))
    })?;
    bar.finish_and_clear();

    if scan.json {
        let report = AnalysisReport::new(&scan.path, project, &groups, &assets);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_groups(&groups);
    Ok(())
}

fn run_unused(scan: &ScanArgs, project: &Path, config: &AnalysisConfig) -> Result<()> {
    if !scan.json {
        println!("▶ Checking asset usage in: {}", project.display());
    }
    let mut assets = scan_catalog(&scan.path, config.min_size_kb, scan.json)?;
    analyze_usage(&mut assets, project, config, scan.json)?;

    if scan.json {
        let report = AnalysisReport::new(&scan.path, Some(project), &[], &assets);
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let unused: Vec<&ImageAsset> = assets
        .iter()
        .filter(|a| a.usage_status == UsageStatus::Unused)
        .collect();

    if unused.is_empty() {
        println!("No unused assets found.");
        return Ok(());
    }

    println!("Found {} unused asset(s):", unused.len());
    for asset in &unused {
        println!(
            "   ▶ {} ({})",
            asset.relative_path(),
            HumanBytes(asset.image_set_byte_size)
        );
    }
    let total: u64 = unused.iter().map(|a| a.image_set_byte_size).sum();
    println!("\n💾 Removing them would free {}", HumanBytes(total));
    Ok(())
}

fn print_groups(groups: &[SimilarityGroup]) {
    if groups.is_empty() {
        println!("No similar images found.");
        return;
    }

    println!("Found {} similar group(s):", groups.len());
    for (i, group) in groups.iter().enumerate() {
        println!(
            "\n✨ Group {} ({}, saves {}):",
            i + 1,
            HumanBytes(group.total_size()),
            HumanBytes(group.potential_savings())
        );
        println!(
            "   🏆 {}{}",
            group.primary().relative_path(),
            usage_label(group.primary())
        );
        for member in group.members() {
            println!(
                "   ▶ {} (distance {:.3}){}",
                member.asset.relative_path(),
                member.distance,
                usage_label(&member.asset)
            );
        }
    }

    let savings: u64 = groups.iter().map(SimilarityGroup::potential_savings).sum();
    println!("\n💾 Potential savings: {}", HumanBytes(savings));
}

fn usage_label(asset: &ImageAsset) -> &'static str {
    match asset.usage_status {
        UsageStatus::Unknown => "",
        UsageStatus::Used => " [used]",
        UsageStatus::Unused => " [unused]",
    }
}

/// Walk `dir` behind a spinner, returning one asset per image set.
fn scan_catalog(dir: &Path, min_size_kb: u64, quiet: bool) -> Result<Vec<ImageAsset>> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message("Scanning for image sets…");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let scanner = CatalogScanner::new();
    let result = benchmark("catalog scan", || scanner.scan_directory(dir, min_size_kb));
    spinner.finish_and_clear();

    let assets = result.with_context(|| format!("Failed to scan {}", dir.display()))?;
    if !quiet {
        println!("▶ Found {} image set(s)", assets.len());
    }
    Ok(assets)
}

fn analyze_usage(
    assets: &mut [ImageAsset],
    project: &Path,
    config: &AnalysisConfig,
    quiet: bool,
) -> Result<()> {
    let searcher: Arc<dyn TextSearcher> = match config.search_backend {
        SearchBackend::Grep => Arc::new(GrepSearcher::new()),
        SearchBackend::Builtin => Arc::new(RegexSearcher::new()),
    };
    let analyzer = UsageAnalyzer::new(searcher)
        .with_source_globs(config.source_globs.clone())
        .with_excluded_dirs(config.excluded_dirs.clone());

    let summary = benchmark("usage analysis", || analyzer.analyze(assets, project))?;
    if !quiet {
        println!(
            "▶ {} asset(s) used, {} unused",
            summary.used, summary.unused
        );
    }
    Ok(())
}

/// Run `f()`, log how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
