use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use candle_core::Device;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use trajcur_common::{CurriculumError, RunConfig, TrajectoryStore};
use trajcur_core::Student;
use trajcur_train::{CurriculumController, Trainer};

#[derive(Parser, Debug)]
#[command(name = "trajcur", about = "Curriculum training on trajectory data")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a student under the configured curriculum.
    Train(TrainArgs),
    /// Score a saved checkpoint on the validation split.
    Evaluate(EvaluateArgs),
    /// Write the default configuration.
    InitConfig(InitConfigArgs),
}

// ── Args ────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct TrainArgs {
    #[arg(long, default_value = "run.json")]
    config: PathBuf,
    /// Trajectory file; overrides `data.path`.
    #[arg(long)]
    data: Option<PathBuf>,
    /// Dot-path override, e.g. `--set general.epochs=200`. Repeatable.
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
    /// Overwrite existing run data without asking.
    #[arg(long, short = 'y')]
    yes: bool,
}

#[derive(Parser, Debug)]
struct EvaluateArgs {
    #[arg(long, default_value = "run.json")]
    config: PathBuf,
    #[arg(long)]
    checkpoint: PathBuf,
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long = "set", value_name = "KEY=VALUE")]
    overrides: Vec<String>,
}

#[derive(Parser, Debug)]
struct InitConfigArgs {
    #[arg(long, default_value = "run.json")]
    output: PathBuf,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => cmd_train(args),
        Command::Evaluate(args) => cmd_evaluate(args),
        Command::InitConfig(args) => cmd_init_config(args),
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

fn cmd_train(args: TrainArgs) -> Result<()> {
    if !args.config.exists() {
        RunConfig::default().save(&args.config)?;
        eprintln!("Created default config at {}", args.config.display());
    }
    let config = load_config(&args.config, &args.overrides, args.data)?;
    let mut trainer = build_trainer(config)?;

    let yes = args.yes;
    trainer.prepare_output(|run_dir| yes || confirm_overwrite(run_dir))?;

    let pb = ProgressBar::new(trainer.config().general.epochs as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} epochs {msg}")?
            .progress_chars("=>-"),
    );
    let summary = trainer.train(&pb)?;

    eprintln!(
        "Training done: {} epochs, final train loss {:.4e}",
        summary.epochs_run, summary.final_train_loss
    );
    if let Some(mean) = summary.last_validation_mean {
        eprintln!("  last validation loss {mean:.4e}");
    }
    if let Some(last) = summary.checkpoints.last() {
        eprintln!("  {} checkpoints, latest {}", summary.checkpoints.len(), last.display());
    }
    eprintln!("  history in {}", trainer.paths().history_dir().display());
    Ok(())
}

fn cmd_evaluate(args: EvaluateArgs) -> Result<()> {
    let config = load_config(&args.config, &args.overrides, args.data)?;
    let mut trainer = build_trainer(config)?;
    trainer.student_mut().load_checkpoint(&args.checkpoint)?;
    tracing::info!(
        checkpoint = %args.checkpoint.display(),
        training = trainer.student().is_training(),
        "Checkpoint loaded"
    );

    let dist = trainer.validate()?;
    let report = serde_json::json!({
        "checkpoint": args.checkpoint,
        "loss_val_distr": dist.per_difficulty,
        "loss_val_transformed": trainer.curriculum().transform_validation_loss(&dist.per_difficulty),
        "counts": dist.counts,
        "loss_val_avg": dist.mean,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_init_config(args: InitConfigArgs) -> Result<()> {
    RunConfig::default().save(&args.output)?;
    eprintln!("Wrote default config to {}", args.output.display());
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────────

/// Load and validate; a missing file is a configuration error.
fn load_config(path: &Path, overrides: &[String], data: Option<PathBuf>) -> Result<RunConfig> {
    if !path.exists() {
        return Err(
            CurriculumError::config(format!("config file {} not found", path.display())).into(),
        );
    }
    let mut config = RunConfig::load_with_overrides(path, overrides)?;
    if let Some(data) = data {
        config.data.path = data;
    }
    config.validate()?;
    Ok(config)
}

fn build_trainer(config: RunConfig) -> Result<Trainer> {
    let data = &config.data;
    let train = TrajectoryStore::load_safetensors(&data.path, &data.train_key)?;
    let val = TrajectoryStore::load_safetensors(&data.path, &data.val_key)?;
    let device = Device::cuda_if_available(0)?;
    Trainer::new(config, train, val, device)
}

/// Interactive Y/N; anything but an explicit yes declines.
fn confirm_overwrite(run_dir: &Path) -> bool {
    eprint!(
        "Run data already exists in {}. Overwrite? [y/N] ",
        run_dir.display()
    );
    let _ = std::io::stderr().flush();
    let mut answer = String::new();
    if std::io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_is_not_created_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let err = load_config(&path, &[], None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CurriculumError>(),
            Some(CurriculumError::Config(_))
        ));
        assert!(!path.exists());
    }

    #[test]
    fn load_applies_overrides_and_data_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        RunConfig::default().save(&path).unwrap();
        let config = load_config(
            &path,
            &["general.epochs=7".to_string()],
            Some(PathBuf::from("other.safetensors")),
        )
        .unwrap();
        assert_eq!(config.general.epochs, 7);
        assert_eq!(config.data.path, PathBuf::from("other.safetensors"));
    }
}
