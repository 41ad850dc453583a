//! Agri Advisor CLI
//!
//! Entry point wiring configuration, labels and the model cache into the
//! disease pipeline, the yield estimator and the treatment knowledge base.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use agri_advisor::backend::backend_name;
use agri_advisor::inference::cache::{GatekeeperState, ModelState};
use agri_advisor::utils::logging::{init_logging, LogConfig};
use agri_advisor::{
    AdvisorConfig, ArtifactLoader, CropAliases, DiseasePipeline, KnowledgeBase, LabelRegistry,
    ModelCache, PredictionResult, Recommendation, RiskLevel, YieldEstimator, YieldInput,
};

/// Agri Advisor
///
/// Crop disease classification, yield risk banding and treatment lookup.
#[derive(Parser, Debug)]
#[command(name = "agri-advisor")]
#[command(version)]
#[command(about = "Crop disease classification, yield risk and treatment advice", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// JSON configuration file (environment variables override it)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Print machine-readable JSON instead of formatted text
    #[arg(long, global = true, default_value = "false")]
    json: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a leaf photo
    Classify {
        /// Path to a JPEG, PNG or WebP image
        image: PathBuf,

        /// Restrict predictions to one crop (e.g. "tomato", "maize")
        #[arg(long)]
        crop: Option<String>,

        /// Load both models before classifying
        #[arg(long, default_value = "false")]
        warm: bool,
    },

    /// Estimate yield and risk for a field
    Yield {
        #[arg(long)]
        district: String,

        #[arg(long)]
        soil: String,

        #[arg(long)]
        crop: String,

        /// Monthly rainfall in mm
        #[arg(long)]
        rainfall: f64,

        /// Average temperature in degrees Celsius
        #[arg(long)]
        temperature: f64,
    },

    /// Show treatments for a disease
    Recommend {
        /// Disease name, e.g. "Tomato Late Blight"
        disease: String,
    },

    /// List diseases with known treatments
    Diseases,

    /// List the classifier's class labels
    Labels,

    /// Report model cache health
    Status {
        /// Load both models before reporting
        #[arg(long, default_value = "false")]
        warm: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.json {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    let _ = init_logging(&log_config);

    if !cli.json {
        print_banner();
    }

    let config = AdvisorConfig::resolve(cli.config.as_deref()).context("Failed to load configuration")?;
    let out = Output { json: cli.json };

    match cli.command {
        Commands::Classify { image, crop, warm } => cmd_classify(&config, &out, &image, crop.as_deref(), warm),
        Commands::Yield {
            district,
            soil,
            crop,
            rainfall,
            temperature,
        } => cmd_yield(
            &config,
            &out,
            YieldInput {
                district,
                soil_type: soil,
                crop,
                rainfall,
                temperature,
            },
        ),
        Commands::Recommend { disease } => cmd_recommend(&out, &disease),
        Commands::Diseases => cmd_diseases(&out),
        Commands::Labels => cmd_labels(&config, &out),
        Commands::Status { warm } => cmd_status(&config, &out, warm),
    }
}

struct Output {
    json: bool,
}

impl Output {
    fn print<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔══════════════════════════════════════════════════════════════════╗
 ║   🌾 Agri Advisor                                                ║
 ║   Crop disease detection, yield risk and treatment advice        ║
 ╚══════════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn build_pipeline(config: &AdvisorConfig) -> Result<DiseasePipeline> {
    let labels = Arc::new(LabelRegistry::load(config.disease.labels_path.as_deref()));
    let aliases = CropAliases::load_or_default(config.disease.crop_aliases_path.as_deref())?;
    let cache = Arc::new(ModelCache::new(config, labels, Arc::new(ArtifactLoader)));
    Ok(DiseasePipeline::new(cache, aliases, config))
}

#[derive(Serialize)]
struct ClassifyReport<'a> {
    #[serde(flatten)]
    prediction: &'a PredictionResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    recommendation: Option<&'a Recommendation>,
}

fn cmd_classify(
    config: &AdvisorConfig,
    out: &Output,
    image: &Path,
    crop: Option<&str>,
    warm: bool,
) -> Result<()> {
    info!("Classifying {}", image.display());

    let pipeline = build_pipeline(config)?;
    if warm {
        pipeline.cache().warm_up();
    }

    let bytes = std::fs::read(image).with_context(|| format!("Failed to read {}", image.display()))?;
    let prediction = pipeline.classify_upload(&bytes, crop)?;

    let recommendation = if prediction.success && !prediction.is_healthy {
        KnowledgeBase::builtin()?.lookup(&prediction.disease_name)
    } else {
        None
    };

    if out.json {
        return out.print(&ClassifyReport {
            prediction: &prediction,
            recommendation,
        });
    }

    println!("{}", "Classification:".cyan().bold());
    println!("  📷 Image:   {}", image.display());
    if let Some(crop) = crop {
        println!("  🌱 Crop:    {}", crop);
    }
    println!("  🖥️  Backend: {}", backend_name());
    if pipeline.cache().is_degraded() {
        println!("  {} Disease model unavailable, serving mock predictions", "Warning:".yellow());
    }
    println!();

    if prediction.success {
        let verdict = if prediction.is_healthy {
            "healthy".green()
        } else {
            "diseased".red()
        };
        println!(
            "  {} {} ({:.2}%, {})",
            "Result:".green().bold(),
            prediction.disease_name,
            prediction.confidence,
            verdict
        );
    } else {
        println!(
            "  {} {}",
            "Rejected:".red().bold(),
            prediction.error.as_deref().unwrap_or(&prediction.disease_name)
        );
    }
    if let Some(notice) = &prediction.notice {
        println!("  {} {}", "Note:".yellow(), notice);
    }

    if let Some(recommendation) = recommendation {
        println!();
        print_recommendation(recommendation);
    }
    Ok(())
}

fn cmd_yield(config: &AdvisorConfig, out: &Output, input: YieldInput) -> Result<()> {
    let estimator = YieldEstimator::new(config.yield_model.clone());
    let result = estimator.predict(&input)?;

    if out.json {
        return out.print(&result);
    }

    let risk = match result.risk_level {
        RiskLevel::Low => result.risk_level.to_string().green(),
        RiskLevel::Medium => result.risk_level.to_string().yellow(),
        RiskLevel::High => result.risk_level.to_string().red(),
    };

    println!("{}", "Yield Estimate:".cyan().bold());
    println!("  📍 District:    {}", input.district);
    println!("  🪨 Soil:        {}", input.soil_type);
    println!("  🌾 Crop:        {}", input.crop);
    println!("  🌧️  Rainfall:    {} mm", input.rainfall);
    println!("  🌡️  Temperature: {} °C", input.temperature);
    println!();
    println!("  {} {} {}", "Predicted:".green().bold(), result.predicted_yield, result.unit);
    println!("  {} {}", "Risk:".green().bold(), risk);
    if estimator.is_rule_based() {
        println!("  {} Rule-based estimate (no regressor loaded)", "Note:".yellow());
    }
    Ok(())
}

fn cmd_recommend(out: &Output, disease: &str) -> Result<()> {
    let knowledge_base = KnowledgeBase::builtin()?;
    let recommendation = knowledge_base.lookup(disease);

    if out.json {
        return out.print(&recommendation);
    }

    match recommendation {
        Some(recommendation) => print_recommendation(recommendation),
        None => {
            println!("{} No recommendations found for '{}'", "Error:".red(), disease);
            println!("  Run `agri-advisor diseases` to see known diseases.");
        }
    }
    Ok(())
}

fn print_recommendation(recommendation: &Recommendation) {
    println!("{} {}", "Treatment for".cyan().bold(), recommendation.disease.bold());
    let sections = [
        ("Fertilizers", &recommendation.fertilizers),
        ("Pesticides", &recommendation.pesticides),
        ("Organic treatments", &recommendation.organic_treatments),
        ("Preventive measures", &recommendation.preventive_measures),
    ];
    for (title, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("  {}", title.yellow());
        for item in items {
            println!("    • {}", item);
        }
    }
}

fn cmd_diseases(out: &Output) -> Result<()> {
    let diseases = KnowledgeBase::builtin()?.available_diseases();

    if out.json {
        return out.print(&diseases);
    }

    println!("{} ({})", "Known Diseases:".cyan().bold(), diseases.len());
    for disease in diseases {
        println!("  {}", disease);
    }
    Ok(())
}

fn cmd_labels(config: &AdvisorConfig, out: &Output) -> Result<()> {
    let labels = LabelRegistry::load(config.disease.labels_path.as_deref());

    if out.json {
        return out.print(&labels.as_slice());
    }

    println!(
        "{} {} from {}",
        "Class Labels:".cyan().bold(),
        labels.len(),
        labels.source()
    );
    for (i, label) in labels.iter().enumerate() {
        println!("  {:>3}  {}", i, label);
    }
    Ok(())
}

fn cmd_status(config: &AdvisorConfig, out: &Output, warm: bool) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    if warm {
        pipeline.cache().warm_up();
    }
    let status = pipeline.cache().status();

    if out.json {
        return out.print(&status);
    }

    let primary = match &status.primary {
        ModelState::NotLoaded => "not loaded".dimmed().to_string(),
        ModelState::Ready { backend } => format!("{} ({})", "ready".green(), backend),
        ModelState::Mock { reason } => format!("{} ({})", "mock".yellow(), reason),
    };
    let gatekeeper = match &status.gatekeeper {
        GatekeeperState::NotLoaded => "not loaded".dimmed().to_string(),
        GatekeeperState::Ready => "ready".green().to_string(),
        GatekeeperState::Disabled => "disabled".dimmed().to_string(),
        GatekeeperState::Unavailable { reason } => format!("{} ({})", "unavailable".red(), reason),
    };

    println!("{}", "Model Cache:".cyan().bold());
    println!("  🧠 Disease model: {}", primary);
    println!("  🚪 Gatekeeper:    {}", gatekeeper);
    println!("  🏷️  Labels:        {} from {}", status.label_count, status.label_source);
    if let Some(mismatch) = status.label_mismatch {
        println!(
            "  {} model emits {} classes but {} labels are loaded",
            "Warning:".yellow(),
            mismatch.model_classes,
            mismatch.labels
        );
    }
    if status.degraded {
        println!("  {} Serving mock predictions", "Degraded:".red().bold());
    }
    Ok(())
}
