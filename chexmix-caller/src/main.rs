use clap::{Args, Parser, Subcommand};
use log::{error, info};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chexmix_rs::binding::BindingModel;
use chexmix_rs::composite::CompositeTagDistribution;
use chexmix_rs::config::ModelConfig;
use chexmix_rs::density::TagProbabilityDensity;
use chexmix_rs::error::ChexmixError;
use chexmix_rs::events::{events_to_dataframe, PointsToEvents};
use chexmix_rs::experiment::{Condition, ExperimentDesign, ReadStore, Replicate};
use chexmix_rs::model::ProteinDnaInteractionModel;
use chexmix_rs::simulate::ReadSimulator;
use chexmix_rs::types::{Point, Strand};

#[derive(thiserror::Error, Debug)]
pub enum CallerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error(transparent)]
    Model(#[from] ChexmixError),

    #[error("Invalid point '{0}', expected chrom:position[:strand]")]
    InvalidPoint(String),

    #[error("Invalid site '{0}', expected 'position strength'")]
    InvalidSite(String),

    #[error("{0} controls given for {1} signal tables; give one per replicate or a single shared control")]
    ControlCount(usize, usize),
}

#[derive(Parser, Debug)]
#[command(
    name = "chexmix-caller",
    about = "Places protein-DNA binding events in ChIP-exo read pileups",
    long_about = "Scans windows around candidate points with a binding model to find the most likely \
                  event position, assigns nearby reads to the event, and fits initial \
                  protein-DNA interaction models over composite read profiles.",
    version,
    after_help = "Example usage:\n    \
                  chexmix-caller call --points peaks.txt --binding-model bm.txt --signal rep1.tsv --control ctrl.tsv events.csv\n    \
                  chexmix-caller fit --points peaks.txt --binding-model bm.txt --signal rep1.tsv model.txt\n    \
                  chexmix-caller show model.txt",
    color = clap::ColorChoice::Always
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert candidate points into binding events
    Call(CallArgs),
    /// Build a composite profile and write an initial interaction model
    Fit(FitArgs),
    /// Print a saved interaction model
    Show {
        #[arg(value_name = "MODEL_FILE")]
        model: PathBuf,
    },
    /// Simulate reads from binding events
    Simulate(SimulateArgs),
}

#[derive(Args, Debug)]
struct InputArgs {
    /// Candidate points, one chrom:position[:strand] per line
    #[arg(long, value_name = "POINTS_FILE")]
    points: PathBuf,

    /// Empirical binding model, one 'distance weight' pair per line
    #[arg(long, value_name = "BINDING_MODEL")]
    binding_model: PathBuf,

    /// Signal read table (chrom, position, strand, count), one per replicate
    #[arg(long, required = true)]
    signal: Vec<PathBuf>,

    /// Control read table, one per replicate or a single one shared by all replicates
    #[arg(long)]
    control: Vec<PathBuf>,

    /// Condition name used in output column headers
    #[arg(long, default_value = "condition")]
    condition: String,

    /// TOML file with model parameters
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CallArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Width of the window scanned around each point
    #[arg(long)]
    window: Option<usize>,

    /// Output CSV of events
    #[arg(value_name = "OUTPUT_FILE")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct FitArgs {
    #[command(flatten)]
    input: InputArgs,

    /// Initial background mixing proportion
    #[arg(long)]
    noise_pi: Option<f64>,

    /// Spacing between cross-link components
    #[arg(long)]
    xl_spacing: Option<usize>,

    /// Output model file
    #[arg(value_name = "OUTPUT_FILE")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct SimulateArgs {
    /// Empirical binding model, one 'distance weight' pair per line
    #[arg(long, value_name = "BINDING_MODEL")]
    binding_model: PathBuf,

    /// Binding sites, one 'position strength' pair per line
    #[arg(long)]
    sites: PathBuf,

    #[arg(long, default_value = "chr1")]
    chrom: String,

    #[arg(long, default_value = "10000")]
    chrom_len: i64,

    #[arg(long, default_value = "1000")]
    num_reads: usize,

    /// Probability that a read is background noise
    #[arg(long, default_value = "0.5")]
    noise: f64,

    #[arg(long, default_value = "1")]
    seed: u64,

    /// Output read table (TSV)
    #[arg(value_name = "OUTPUT_FILE")]
    output: PathBuf,
}

fn parse_point(line: &str) -> Result<(Point, Strand), CallerError> {
    let invalid = || CallerError::InvalidPoint(line.to_string());
    let mut parts = line.split(':');
    let chrom = parts.next().filter(|c| !c.is_empty()).ok_or_else(invalid)?;
    let location: i64 = parts
        .next()
        .and_then(|p| p.trim().parse().ok())
        .ok_or_else(invalid)?;
    let strand = match parts.next() {
        Some(s) => Strand::try_from(s.trim().chars().next().unwrap_or(' ')).map_err(|_| invalid())?,
        None => Strand::Forward,
    };
    Ok((Point::new(chrom, location), strand))
}

fn read_points(path: &Path) -> Result<Vec<(Point, Strand)>, CallerError> {
    fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(parse_point)
        .collect()
}

fn load_config(input: &InputArgs) -> Result<ModelConfig, CallerError> {
    Ok(match &input.config {
        Some(path) => ModelConfig::from_toml_file(path)?,
        None => ModelConfig::default(),
    })
}

/// One condition with one replicate per signal table. Tables given more than once share a
/// sample index.
fn load_experiment(input: &InputArgs) -> Result<(ExperimentDesign, ReadStore), CallerError> {
    let n_sig = input.signal.len();
    let n_ctrl = input.control.len();
    if n_ctrl > 1 && n_ctrl != n_sig {
        return Err(CallerError::ControlCount(n_ctrl, n_sig));
    }

    let binding_model = Arc::new(BindingModel::from_file(&input.binding_model)?);
    let mut store = ReadStore::new();
    let mut sample_of: HashMap<PathBuf, usize> = HashMap::new();
    let mut sample_index = |path: &PathBuf, store: &mut ReadStore| -> Result<usize, CallerError> {
        if let Some(idx) = sample_of.get(path) {
            return Ok(*idx);
        }
        let idx = sample_of.len();
        store.load_tsv(idx, path)?;
        info!("sample {}: {} ({} reads)", idx, path.display(), store.total(idx));
        sample_of.insert(path.clone(), idx);
        Ok(idx)
    };

    let mut replicates = Vec::with_capacity(n_sig);
    for (r, signal) in input.signal.iter().enumerate() {
        let signal = sample_index(signal, &mut store)?;
        let control = match input.control.get(r).or(input.control.first()) {
            Some(path) => Some(sample_index(path, &mut store)?),
            None => None,
        };
        replicates.push(Replicate::new(
            format!("{}:rep{}", input.condition, r + 1),
            signal,
            control,
            Arc::clone(&binding_model),
        ));
    }
    let design = ExperimentDesign::new(vec![Condition::new(input.condition.clone(), replicates)])?;
    Ok((design, store))
}

fn call(args: CallArgs) -> Result<(), CallerError> {
    let config = load_config(&args.input)?;
    let window = args.window.unwrap_or(config.event_window);
    let points: Vec<Point> = read_points(&args.input.points)?
        .into_iter()
        .map(|(p, _)| p)
        .collect();
    info!("{} points to convert", points.len());

    let (design, store) = load_experiment(&args.input)?;
    let events = PointsToEvents::new(&design, &store, window).execute(&points);

    let mut df = events_to_dataframe(&events, &design)?;
    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(&args.output)?;
    CsvWriter::new(&mut file).include_header(true).finish(&mut df)?;
    info!("wrote {} events to {}", df.height(), args.output.display());
    Ok(())
}

fn fit(args: FitArgs) -> Result<(), CallerError> {
    let mut config = load_config(&args.input)?;
    if let Some(noise_pi) = args.noise_pi {
        config.noise_pi = noise_pi;
    }
    if let Some(spacing) = args.xl_spacing {
        config.xl_component_spacing = spacing;
    }
    config.validate()?;

    let points = read_points(&args.input.points)?;
    let (design, store) = load_experiment(&args.input)?;
    let composite =
        CompositeTagDistribution::build(&points, &design, &store, config.composite_window)?;

    let half = (config.composite_window / 2) as i32;
    let binding_model = BindingModel::from_file(&args.input.binding_model)?;
    let cs_seed = TagProbabilityDensity::from_binding_model(&binding_model);
    let xl_seed = TagProbabilityDensity::gaussian(-half, half, 0.0, config.xl_seed_sd)?;
    let background_seed = TagProbabilityDensity::uniform(-half, half)?;

    let model = ProteinDnaInteractionModel::new(
        &config,
        &composite,
        &xl_seed,
        cs_seed,
        background_seed,
        config.noise_pi,
    )?;
    if let Some(parent) = args.output.parent() {
        fs::create_dir_all(parent)?;
    }
    model.save_to_file(&args.output)?;
    print!("{}", model);
    info!("wrote model to {}", args.output.display());
    Ok(())
}

fn show(path: &Path) -> Result<(), CallerError> {
    let model = ProteinDnaInteractionModel::load_from_file(path)?;
    println!(
        "width {}, center {}, {} conditions, {} components ({} active)",
        model.width(),
        model.center_offset(),
        model.num_conditions(),
        model.num_components(),
        model.non_zero_components().len()
    );
    print!("{}", model);
    Ok(())
}

fn simulate(args: SimulateArgs) -> Result<(), CallerError> {
    let binding_model = BindingModel::from_file(&args.binding_model)?;
    let sites = fs::read_to_string(&args.sites)?
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| {
            let mut words = l.split_whitespace();
            let pos = words.next().and_then(|w| w.parse::<i64>().ok());
            let strength = words.next().map_or(Some(100.0), |w| w.parse::<f64>().ok());
            pos.zip(strength)
                .ok_or_else(|| CallerError::InvalidSite(l.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut sim = ReadSimulator::new(&binding_model, args.chrom, args.chrom_len, sites, args.seed)?;
    sim.set_noise_prob(args.noise)?;
    let mut store = ReadStore::new();
    sim.simulate_into(&mut store, 0, args.num_reads);

    let mut df = store.to_dataframe(0)?;
    let mut file = File::create(&args.output)?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b'\t')
        .finish(&mut df)?;
    Ok(())
}

fn run(cli: Cli) -> Result<(), CallerError> {
    match cli.command {
        Command::Call(args) => call(args),
        Command::Fit(args) => fit(args),
        Command::Show { model } => show(&model),
        Command::Simulate(args) => simulate(args),
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let start_time = std::time::Instant::now();

    if let Err(e) = run(Cli::parse()) {
        error!("{}", e);
        std::process::exit(1);
    }

    info!(
        "Total execution time: {:.4} minutes",
        start_time.elapsed().as_secs_f64() / 60.0
    );
}
