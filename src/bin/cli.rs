use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};

use apneascope_lib::config::AppConfig;
use apneascope_lib::detect::ModelBundle;
use apneascope_lib::diagnosis::{apnea_diagnose, Diagnosis};
use apneascope_lib::pipeline::{Evaluation, EvaluationOutcome, Evaluator, TraceWriter};
use apneascope_lib::report;
use apneascope_lib::samples::SampleStore;

#[derive(Parser, Debug)]
#[command(name = "apneascope-cli")]
#[command(about = "Minute-wise sleep apnea screening from heartbeat timing")]
struct Cli {
    /// Path to the model bundle (overrides config)
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Path to an apneascope.toml config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Write a JSONL trace of the evaluation stages
    #[arg(long, global = true)]
    trace: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate a file of heartbeat timestamps (minutes, one per line)
    Evaluate { file: PathBuf },

    /// Evaluate a built-in sample recording, e.g. "Sample 1"
    Sample { name: String },

    /// Score an existing file of 0/1 per-minute predictions
    Score { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => AppConfig::from_default_location().context("failed to load config")?,
    };
    config.apply_env_overrides();
    if let Some(model) = &cli.model {
        config.model.path = model.clone();
    }

    match &cli.command {
        Command::Score { file } => run_score(file, cli.json),
        Command::Evaluate { file } => {
            let evaluator = build_evaluator(&config)?;
            let data = std::fs::read(file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let trace = cli.trace.clone().map(TraceWriter::new);

            let outcome = evaluator
                .evaluate_upload(&data, trace.as_ref())
                .with_context(|| format!("failed to evaluate {}", file.display()))?;
            print_outcome(&outcome, cli.json)
        }
        Command::Sample { name } => {
            let evaluator = build_evaluator(&config)?;
            let store = SampleStore::new(config.samples.dir.clone());
            let sample = store
                .load(name)
                .with_context(|| format!("failed to load sample {:?}", name))?;
            let trace = cli.trace.clone().map(TraceWriter::new);

            let evaluation = evaluator.evaluate_sample(&sample, trace.as_ref())?;
            print_evaluation(&evaluation, cli.json)
        }
    }
}

fn build_evaluator(config: &AppConfig) -> anyhow::Result<Evaluator> {
    let bundle = ModelBundle::load(&config.model.path)
        .with_context(|| format!("failed to load model {}", config.model.path.display()))?;
    log::info!("Using model {}", bundle.version);

    Ok(Evaluator::new(
        Arc::new(bundle),
        config.duration,
        config.features.clone(),
    ))
}

fn run_score(file: &Path, json: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;

    let predictions = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.trim()
                .parse::<u8>()
                .with_context(|| format!("line {}: expected 0 or 1, got {:?}", i + 1, line.trim()))
        })
        .collect::<anyhow::Result<Vec<u8>>>()?;

    let diagnosis = apnea_diagnose(&predictions)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&diagnosis)?);
    } else {
        print_diagnosis(&diagnosis, &predictions);
    }
    Ok(())
}

fn print_outcome(outcome: &EvaluationOutcome, json: bool) -> anyhow::Result<()> {
    match outcome {
        EvaluationOutcome::Completed(evaluation) => print_evaluation(evaluation, json),
        EvaluationOutcome::Rejected {
            warning,
            duration_hours,
        } => {
            if json {
                println!("{}", serde_json::to_string_pretty(outcome)?);
            } else {
                eprintln!("{}", warning);
                eprintln!("(recording spans {:.2} hours)", duration_hours);
            }
            Ok(())
        }
    }
}

fn print_evaluation(evaluation: &Evaluation, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(evaluation)?);
    } else {
        println!("Model: {}", evaluation.model_version);
        print_diagnosis(&evaluation.diagnosis, &evaluation.predictions);
    }
    Ok(())
}

fn print_diagnosis(diagnosis: &Diagnosis, predictions: &[u8]) {
    println!("Minutes analysed:   {}", diagnosis.minute_count);
    println!("Apnea minutes:      {}", diagnosis.apnea_total);
    if diagnosis.is_rated() {
        println!("Max apnea index:    {:.1} /h", diagnosis.ai_max);
    } else {
        println!("Max apnea index:    n/a (recording shorter than one hour)");
    }

    let chart = report::diagnosis_chart(diagnosis, predictions);
    for bar in &chart.hours {
        let marker = if bar.extrapolated { " (extrapolated)" } else { "" };
        println!("  {:<14} {:>5.1}{}", bar.label, bar.ai, marker);
    }
}
