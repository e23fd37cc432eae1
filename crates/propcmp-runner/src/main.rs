//! # propcmp
//!
//! CLI for comparing propagation model exports.
//!
//! Runs the batch analysis over simulator CSV exports and exposes the
//! analytical link tools (free-space path loss, link budget, coverage) for
//! quick checks from the shell.

use clap::{Parser, Subcommand, ValueEnum};
use propcmp_link::{
    coverage_table, fspl_constant_db, fspl_db, fspl_wavelength_db, theoretical_rx_power_dbm, LinkBudgetConfig,
};
use propcmp_model::{validate_link_budget, AnalysisConfig, AnalysisSettings, BuildingsFilter, ALL_COLUMNS};
use propcmp_runner::export::{print_summary_table, print_warnings_table, write_outputs, write_report_json};
use propcmp_runner::{run_analysis, RunnerError};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Command Line
// ============================================================================

/// Output format for command results on stdout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable tables.
    Text,
    /// JSON for programmatic consumption.
    Json,
}

/// propcmp - propagation model comparison
#[derive(Parser, Debug)]
#[command(name = "propcmp")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Log progress at info level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compare propagation models across one or more CSV exports
    Analyze(AnalyzeConfig),
    /// Free-space path loss at a distance and frequency
    Fspl(FsplConfig),
    /// Noise floor, SINR and throughput bound for a received power
    LinkBudget(LinkBudgetCommandConfig),
    /// Coverage percentage of received power values per threshold
    Coverage(CoverageConfig),
    /// List recognized input columns with units and aliases
    Columns,
}

// ============================================================================
// Analyze Configuration (supports YAML files + CLI overrides)
// ============================================================================

/// Configuration for an analysis run.
///
/// Configuration is loaded from zero or more YAML files (merged in order,
/// later files override earlier) with CLI arguments as final overrides.
///
/// ## Usage Examples
///
/// ```bash
/// # Every CSV in a directory, defaults for everything
/// propcmp analyze results/
///
/// # Config file with a CLI override for the reference model
/// propcmp analyze --config lte.yaml results/ --reference LogDistance
///
/// # Write the CSV and JSON exports, per-sample link budget included
/// propcmp analyze results/ --out-dir out/ --link-budget
/// ```
#[derive(Parser, Debug)]
pub struct AnalyzeConfig {
    /// Input CSV files or directories (directories contribute their *.csv files)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// YAML config file(s) to load (can be specified multiple times, merged in order)
    #[arg(short, long = "config", value_name = "FILE")]
    pub configs: Vec<PathBuf>,

    /// Reference model the others are scored against [default: FreeSpace]
    #[arg(long, value_name = "MODEL")]
    pub reference: Option<String>,

    /// Coverage thresholds in dBm, comma separated [default: -95,-100,-110]
    #[arg(long = "threshold", value_name = "DBM", value_delimiter = ',', allow_negative_numbers = true)]
    pub thresholds: Vec<f64>,

    /// Distance bin width in meters [default: 20]
    #[arg(long, value_name = "M")]
    pub bin_width: Option<f64>,

    /// Groups with fewer samples are left out of the summary [default: 10]
    #[arg(long)]
    pub min_samples: Option<usize>,

    /// LOS boundary distance in meters when no LOS flag is exported [default: 100]
    #[arg(long, value_name = "M")]
    pub los_boundary: Option<f64>,

    /// Split groups by frequency (rounded to whole MHz)
    #[arg(long)]
    pub split_by_frequency: bool,

    /// Channel bandwidth in Hz for SINR and throughput [default: 20e6]
    #[arg(long, value_name = "HZ")]
    pub bandwidth: Option<f64>,

    /// Receiver noise figure in dB [default: 5]
    #[arg(long, value_name = "DB", allow_negative_numbers = true)]
    pub noise_figure: Option<f64>,

    /// Spectral efficiency ceiling in bits/s/Hz [default: 7.6]
    #[arg(long, value_name = "BITS")]
    pub max_spectral_efficiency: Option<f64>,

    /// Frequency applied to files without a frequency column, in MHz [default: 2100]
    #[arg(long, value_name = "MHZ")]
    pub default_frequency: Option<f64>,

    /// Transmit power applied to files without tx power or path loss columns, in dBm [default: 30]
    #[arg(long, value_name = "DBM", allow_negative_numbers = true)]
    pub default_tx_power: Option<f64>,

    /// Require frequency and tx power in every file (disables both defaults)
    #[arg(long, conflicts_with_all = ["default_frequency", "default_tx_power"])]
    pub strict: bool,

    /// Keep only rows of this technology (e.g. LTE, 5G)
    #[arg(long)]
    pub technology: Option<String>,

    /// Keep only rows at this frequency in MHz (within 0.5 MHz)
    #[arg(long, value_name = "MHZ")]
    pub frequency: Option<f64>,

    /// Keep only rows with buildings on, off, or both
    #[arg(long, value_name = "STATE")]
    pub buildings: Option<BuildingsFilter>,

    /// Directory for summary.csv, distance_bins.csv, buildings_delta.csv and report.json
    #[arg(short, long, value_name = "DIR")]
    pub out_dir: Option<PathBuf>,

    /// Also write link_budget.csv with per-sample SINR and capacity-bounded throughput
    /// (an upper bound, not an achievable rate). Requires --out-dir
    #[arg(long, requires = "out_dir")]
    pub link_budget: bool,

    /// Output format on stdout
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Load files in parallel on this many threads (0 = one per core)
    #[arg(short, long)]
    pub jobs: Option<usize>,
}

impl AnalyzeConfig {
    /// Resolve the final configuration: defaults, then YAML files, then CLI flags.
    pub fn resolve(&self) -> Result<AnalysisConfig, RunnerError> {
        let paths: Vec<&Path> = self.configs.iter().map(|p| p.as_path()).collect();
        let mut config = AnalysisConfig::load(&paths)?;

        let analysis: &mut AnalysisSettings = &mut config.analysis;
        if let Some(ref reference) = self.reference {
            analysis.reference_model = reference.clone();
        }
        if !self.thresholds.is_empty() {
            analysis.coverage_thresholds_dbm = self.thresholds.clone();
        }
        if let Some(v) = self.bin_width {
            analysis.distance_bin_m = v;
        }
        if let Some(v) = self.min_samples {
            analysis.min_samples = v;
        }
        if let Some(v) = self.los_boundary {
            analysis.los_boundary_m = v;
        }
        if self.split_by_frequency {
            analysis.split_by_frequency = true;
        }

        if let Some(v) = self.bandwidth {
            config.link_budget.bandwidth_hz = v;
        }
        if let Some(v) = self.noise_figure {
            config.link_budget.noise_figure_db = v;
        }
        if let Some(v) = self.max_spectral_efficiency {
            config.link_budget.max_spectral_efficiency = v;
        }

        if self.strict {
            config.normalize.default_frequency_mhz = None;
            config.normalize.default_tx_power_dbm = None;
        }
        if let Some(v) = self.default_frequency {
            config.normalize.default_frequency_mhz = Some(v);
        }
        if let Some(v) = self.default_tx_power {
            config.normalize.default_tx_power_dbm = Some(v);
        }

        if let Some(ref tech) = self.technology {
            config.filter.technology = Some(tech.clone());
        }
        if let Some(v) = self.frequency {
            config.filter.frequency_mhz = Some(v);
        }
        if let Some(v) = self.buildings {
            config.filter.buildings = v;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Configuration for the free-space path loss calculator
#[derive(Parser, Debug)]
pub struct FsplConfig {
    /// Transmitter to receiver distance in meters
    #[arg(long, value_name = "M")]
    pub distance: f64,

    /// Frequency in MHz
    #[arg(long, value_name = "MHZ")]
    pub frequency: f64,

    /// Transmit power in dBm
    #[arg(long, value_name = "DBM", default_value = "30", allow_negative_numbers = true)]
    pub tx_power: f64,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Configuration for the link budget calculator
#[derive(Parser, Debug)]
pub struct LinkBudgetCommandConfig {
    /// Received signal power in dBm
    #[arg(long, value_name = "DBM", allow_negative_numbers = true)]
    pub rx_power: f64,

    /// Interference power in dBm
    #[arg(long, value_name = "DBM", allow_negative_numbers = true)]
    pub interference: Option<f64>,

    /// Channel bandwidth in Hz
    #[arg(long, value_name = "HZ", default_value_t = LinkBudgetConfig::DEFAULT_BANDWIDTH_HZ)]
    pub bandwidth: f64,

    /// Receiver noise figure in dB
    #[arg(long, value_name = "DB", default_value_t = LinkBudgetConfig::DEFAULT_NOISE_FIGURE_DB, allow_negative_numbers = true)]
    pub noise_figure: f64,

    /// Spectral efficiency ceiling in bits/s/Hz
    #[arg(long, value_name = "BITS", default_value_t = LinkBudgetConfig::DEFAULT_MAX_SPECTRAL_EFFICIENCY)]
    pub max_spectral_efficiency: f64,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Configuration for the coverage calculator
#[derive(Parser, Debug)]
pub struct CoverageConfig {
    /// Received power values in dBm (space or comma separated)
    #[arg(required = true, num_args = 1.., value_delimiter = ',', allow_negative_numbers = true)]
    pub values: Vec<f64>,

    /// Sensitivity thresholds in dBm [default: -95,-100,-110]
    #[arg(long = "threshold", value_name = "DBM", value_delimiter = ',', allow_negative_numbers = true)]
    pub thresholds: Vec<f64>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

// ============================================================================
// Main
// ============================================================================

fn main() -> Result<(), RunnerError> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise warn, or info with --verbose
    let default_level = if cli.verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let result = match cli.command {
        Commands::Analyze(config) => analyze_command(config),
        Commands::Fspl(config) => fspl_command(config),
        Commands::LinkBudget(config) => link_budget_command(config),
        Commands::Coverage(config) => coverage_command(config),
        Commands::Columns => {
            print_columns_info();
            Ok(())
        }
    };

    if let Err(ref e) = result {
        error!("{}", e);
    }
    result
}

// ============================================================================
// Commands
// ============================================================================

fn analyze_command(args: AnalyzeConfig) -> Result<(), RunnerError> {
    let config = args.resolve()?;
    info!(
        "Reference model '{}', {} coverage thresholds, bins of {} m",
        config.analysis.reference_model,
        config.analysis.coverage_thresholds_dbm.len(),
        config.analysis.distance_bin_m
    );

    let report = match args.jobs {
        Some(jobs) => {
            let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
            pool.install(|| run_analysis(&args.paths, &config, true))?
        }
        None => run_analysis(&args.paths, &config, false)?,
    };

    if let Some(ref out_dir) = args.out_dir {
        let written = write_outputs(&report, out_dir, args.link_budget)?;
        eprintln!("Wrote {} files to {}", written.len(), out_dir.display());
    }

    match args.format {
        OutputFormat::Json => {
            let stdout = std::io::stdout();
            write_report_json(&report, stdout.lock())?;
            println!();
        }
        OutputFormat::Text => {
            print_summary_table(&report);
        }
    }
    print_warnings_table(&report.warnings, &report.failures);

    Ok(())
}

fn fspl_command(args: FsplConfig) -> Result<(), RunnerError> {
    let constant_form = fspl_db(args.distance, args.frequency);
    let wavelength_form = fspl_wavelength_db(args.distance, args.frequency);
    let rx_power = theoretical_rx_power_dbm(args.tx_power, constant_form);

    match args.format {
        OutputFormat::Json => {
            let output = json!({
                "distance_m": args.distance,
                "frequency_mhz": args.frequency,
                "tx_power_dbm": args.tx_power,
                "fspl_db": constant_form,
                "fspl_wavelength_db": wavelength_form,
                "rx_power_dbm": rx_power,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Free-Space Path Loss");
            println!("====================");
            println!();
            println!("  Distance:            {:.3} m", args.distance);
            println!("  Frequency:           {:.3} MHz", args.frequency);
            println!("  Tx power:            {:.2} dBm", args.tx_power);
            println!();
            println!("  FSPL (constant):     {:.3} dB  (20log10(d_km) + 20log10(f_MHz) + {:.2})", constant_form, fspl_constant_db());
            println!("  FSPL (wavelength):   {:.3} dB  (20log10(4πd/λ))", wavelength_form);
            println!("  Rx power:            {:.2} dBm", rx_power);
        }
    }
    Ok(())
}

fn link_budget_command(args: LinkBudgetCommandConfig) -> Result<(), RunnerError> {
    let link = LinkBudgetConfig {
        bandwidth_hz: args.bandwidth,
        noise_figure_db: args.noise_figure,
        max_spectral_efficiency: args.max_spectral_efficiency,
    };
    validate_link_budget(&link)?;
    let budget = link.evaluate(args.rx_power, args.interference);

    match args.format {
        OutputFormat::Json => {
            let output = json!({
                "rx_power_dbm": args.rx_power,
                "interference_dbm": args.interference,
                "config": link,
                "result": budget,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Link Budget");
            println!("===========");
            println!();
            println!("  Rx power:              {:.2} dBm", args.rx_power);
            match args.interference {
                Some(i) => println!("  Interference:          {:.2} dBm", i),
                None => println!("  Interference:          none"),
            }
            println!("  Bandwidth:             {:.3} MHz", link.bandwidth_hz / 1e6);
            println!("  Noise figure:          {:.1} dB", link.noise_figure_db);
            println!();
            println!("  Noise floor:           {:.2} dBm", budget.noise_dbm);
            println!("  SINR:                  {:.2} dB", budget.sinr_db);
            println!(
                "  Spectral efficiency:   {:.3} bits/s/Hz (cap {:.1})",
                budget.spectral_efficiency, link.max_spectral_efficiency
            );
            println!("  Throughput bound:      {:.2} Mbit/s", budget.throughput_bound_mbps);
            println!();
            println!("  The throughput is a capacity upper bound, not an achievable rate.");
        }
    }
    Ok(())
}

fn coverage_command(args: CoverageConfig) -> Result<(), RunnerError> {
    let thresholds = if args.thresholds.is_empty() {
        AnalysisSettings::DEFAULT_COVERAGE_THRESHOLDS_DBM.to_vec()
    } else {
        args.thresholds.clone()
    };
    let table = coverage_table(&args.values, &thresholds);

    match args.format {
        OutputFormat::Json => {
            let output = json!({
                "samples": args.values.len(),
                "coverage": table,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Text => {
            println!("Coverage over {} samples", args.values.len());
            println!();
            for c in &table {
                println!("  >= {:>8.2} dBm: {:>6.2}%", c.threshold_dbm, c.percent);
            }
        }
    }
    Ok(())
}

/// Print the column registry
fn print_columns_info() {
    println!("propcmp Recognized Columns");
    println!("==========================\n");

    println!("Headers are matched case-insensitively after trimming whitespace.");
    println!("The canonical name is tried first, then the aliases in the order shown.\n");

    println!("## Mandatory Fields\n");
    println!("  distance_m (or all six tx/rx coordinates), rx_power_dbm");
    println!("  propagation_model, frequency and tx power fall back to defaults when absent.\n");

    println!("## Columns\n");
    for column in ALL_COLUMNS {
        println!("  {}", column.name);
        println!("    {}", column.description);
        if let Some(unit) = column.unit {
            println!("    Unit: {}", unit);
        }
        if !column.aliases.is_empty() {
            println!("    Aliases: {}", column.aliases.join(", "));
        }
        if let Some(fallback) = column.fallback {
            println!("    When absent: {}", fallback);
        }
        println!();
    }
}
