//! GenreForge command line
//!
//! Usage:
//!   genreforge train      - Load, scale, split, train, evaluate and save
//!   genreforge predict    - Label an unlabelled feature table
//!   genreforge schema     - Print the default feature schema as JSON

mod config;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gf_features::{paths, prepare_training_data, DatasetSplits, FeatureSchema, FeatureTable, LabelTable};
use gf_model::{default_device, GenreClassifier, ModelMetadata, Trainer, DEFAULT_MODEL_DIR};

use crate::config::RunConfig;

#[derive(Parser)]
#[command(name = "genreforge", about = "Music genre classification from audio feature statistics")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train, evaluate and save a model
    Train {
        /// Directory with X_train.csv and y_train.csv
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Where to save the model
        #[arg(long)]
        model_dir: Option<PathBuf>,

        /// Run configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the number of epochs
        #[arg(long)]
        epochs: Option<usize>,

        /// Override the split and shuffle seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Predict genres for a feature table
    Predict {
        /// Saved model directory
        #[arg(long, default_value = DEFAULT_MODEL_DIR)]
        model_dir: PathBuf,

        /// Feature table to label
        #[arg(short, long, default_value = paths::X_TEST)]
        input: PathBuf,

        /// Output CSV (track_id,genre,confidence)
        #[arg(short, long, default_value = "predictions.csv")]
        output: PathBuf,
    },
    /// Print the default feature schema
    Schema,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train {
            data_dir,
            model_dir,
            config,
            epochs,
            seed,
        } => {
            let run = match config {
                Some(path) => RunConfig::from_json_file(&path)?,
                None => RunConfig::default(),
            };
            train(run.with_overrides(data_dir, model_dir, epochs, seed))
        }
        Commands::Predict {
            model_dir,
            input,
            output,
        } => predict(&model_dir, &input, &output),
        Commands::Schema => print_schema(),
    }
}

fn train(run: RunConfig) -> Result<()> {
    let schema = run.load_schema()?;
    let features_path = run.features_path();
    let labels_path = run.labels_path();

    let features = FeatureTable::from_csv_path(&features_path)
        .with_context(|| format!("Failed to load features from {}", features_path.display()))?;
    let labels = LabelTable::from_csv_path(&labels_path)
        .with_context(|| format!("Failed to load labels from {}", labels_path.display()))?;

    let prepared = prepare_training_data(&schema, &features, &labels).context("Failed to prepare training data")?;
    let splits = DatasetSplits::stratified(&prepared.dataset, &run.split).context("Failed to split dataset")?;

    for (class, count) in prepared
        .encoder
        .classes()
        .iter()
        .zip(prepared.encoder.class_counts(&splits.train.labels))
    {
        log::debug!("  {:<24} {} training tracks", class, count);
    }

    let device = default_device();
    log::info!("Using device {:?}", device);

    let metadata = ModelMetadata::new(run.model.clone(), schema, prepared.encoder, prepared.scaler);
    let classifier = GenreClassifier::new(metadata, device.clone()).context("Failed to build network")?;
    println!("{}", classifier.network().summary());

    let trainer = Trainer::new(run.training.clone(), device.clone())?;
    let history = trainer.fit(
        classifier.network(),
        classifier.varmap(),
        &splits.train,
        Some(&splits.validation),
    )?;
    if let Some(best) = history.best_validation() {
        log::info!(
            "Best validation accuracy {:.4} at epoch {}",
            best.val_accuracy.unwrap_or_default(),
            best.epoch
        );
    }

    let test = classifier.evaluate(&splits.test)?;
    println!("Test loss: {:.4}", test.loss);
    println!("Test accuracy: {:.4}", test.accuracy);

    classifier
        .save(&run.model_dir)
        .with_context(|| format!("Failed to save model to {}", run.model_dir.display()))?;

    let reloaded = GenreClassifier::load(&run.model_dir, device)
        .with_context(|| format!("Failed to reload model from {}", run.model_dir.display()))?;
    let check = reloaded.evaluate(&splits.test)?;
    println!("Reloaded model test accuracy: {:.4}", check.accuracy);

    Ok(())
}

fn predict(model_dir: &Path, input: &Path, output: &Path) -> Result<()> {
    let classifier = GenreClassifier::load(model_dir, default_device())
        .with_context(|| format!("Failed to load model from {}", model_dir.display()))?;
    let table = FeatureTable::from_csv_path(input)
        .with_context(|| format!("Failed to load features from {}", input.display()))?;

    let predictions = classifier.predict_table(&table).context("Prediction failed")?;

    let mut writer =
        csv::Writer::from_path(output).with_context(|| format!("Failed to create {}", output.display()))?;
    writer.write_record(["track_id", "genre", "confidence"])?;
    for (track_id, prediction) in &predictions {
        let confidence = format!("{:.6}", prediction.confidence);
        writer.write_record([track_id.as_str(), prediction.genre.as_str(), confidence.as_str()])?;
    }
    writer.flush()?;

    log::info!("Wrote {} predictions to {}", predictions.len(), output.display());
    Ok(())
}

fn print_schema() -> Result<()> {
    let json = serde_json::to_string_pretty(&FeatureSchema::fma())?;
    println!("{}", json);
    Ok(())
}
