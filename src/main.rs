//! open_set_da CLI
//!
//! Entry point for universal domain adaptation experiments and the long-tail
//! list resampler.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use open_set_da::backend::{backend_name, default_device, TrainingBackend};
use open_set_da::dataset::longtail::sample_to_longtail;
use open_set_da::model::BackboneArch;
use open_set_da::training::{run_experiment, ExperimentConfig};
use open_set_da::utils::logging::{init_logging, LogConfig, LogLevel};

/// Universal domain adaptation with ensemble-calibrated sample weighting
#[derive(Parser, Debug)]
#[command(name = "open_set_da")]
#[command(version)]
#[command(about = "Universal domain adaptation with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, global = true, default_value = "false")]
    quiet: bool,

    /// Log level (trace, debug, info, warn, error); overrides -v / -q
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Adapt from a source list to a target list and report open-set metrics
    Train(TrainArgs),

    /// Write long-tailed copies of every list file in a directory to `<dir>-lt`
    Longtail {
        /// Directory of list files
        #[arg(long)]
        dir: PathBuf,

        /// Images kept for the rarest class
        #[arg(long)]
        min_img_num: usize,

        /// Random seed for the per-class shuffles
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

/// Flags of `train`; unset flags keep the value from `--config` (or the default)
#[derive(Args, Debug)]
struct TrainArgs {
    /// Dataset root; list-file paths are relative to it
    root: PathBuf,

    /// JSON experiment configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Source domain list file
    #[arg(short, long)]
    source: Option<PathBuf>,

    /// Target domain list file
    #[arg(short, long)]
    target: Option<PathBuf>,

    /// Separate test list (defaults to the validation split)
    #[arg(long)]
    test: Option<PathBuf>,

    /// Backbone architecture (cnn, cnn-lite)
    #[arg(short, long)]
    arch: Option<BackboneArch>,

    /// Burn record with pretrained backbone weights
    #[arg(long)]
    backbone_weights: Option<PathBuf>,

    #[arg(short, long)]
    batch_size: Option<usize>,

    #[arg(long)]
    epochs: Option<usize>,

    /// Source-only warm-up epochs
    #[arg(long)]
    pretrain_epochs: Option<usize>,

    #[arg(short, long)]
    iters_per_epoch: Option<usize>,

    #[arg(long)]
    lr: Option<f64>,

    #[arg(long)]
    momentum: Option<f64>,

    #[arg(long)]
    weight_decay: Option<f64>,

    /// Weight of the domain-adversarial loss
    #[arg(long)]
    trade_off: Option<f64>,

    /// Number of classes shared by both domains
    #[arg(long)]
    n_share: Option<usize>,

    /// Number of classes only the source has
    #[arg(long)]
    n_source_private: Option<usize>,

    /// Total number of classes
    #[arg(long)]
    n_total: Option<usize>,

    /// Open-set score threshold for known vs unknown
    #[arg(long)]
    threshold: Option<f64>,

    /// Score threshold for samples used in class re-weighting
    #[arg(long)]
    source_threshold: Option<f64>,

    #[arg(long)]
    seed: Option<u64>,

    #[arg(short, long)]
    print_freq: Option<usize>,

    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Decode all images before training
    #[arg(long, default_value = "false")]
    cache_images: bool,

    /// Write ROC / PR curves and the F1 table after testing
    #[arg(long, default_value = "false")]
    diagnostics: bool,
}

impl TrainArgs {
    /// Layer the flags over the config file (or the defaults)
    fn into_config(self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load(path)
                .with_context(|| format!("loading config {}", path.display()))?,
            None => ExperimentConfig::default(),
        };

        config.root = self.root;
        macro_rules! set {
            ($($field:ident),*) => {
                $(if let Some(value) = self.$field {
                    config.$field = value;
                })*
            };
        }
        set!(
            source, target, arch, batch_size, epochs, pretrain_epochs, iters_per_epoch, lr,
            momentum, weight_decay, trade_off, threshold, source_threshold, print_freq, output_dir
        );

        if self.test.is_some() {
            config.test = self.test;
        }
        if self.backbone_weights.is_some() {
            config.backbone_weights = self.backbone_weights;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(n) = self.n_share {
            config.partition.n_share = n;
        }
        if let Some(n) = self.n_source_private {
            config.partition.n_source_private = n;
        }
        if let Some(n) = self.n_total {
            config.partition.n_total = n;
        }
        config.cache_images |= self.cache_images;
        config.diagnostics |= self.diagnostics;

        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.verbose {
        LogConfig::verbose()
    } else if cli.quiet {
        LogConfig::quiet()
    } else {
        LogConfig::default()
    };
    if let Some(level) = &cli.log_level {
        log_config.level = LogLevel::parse(level);
    }
    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Train(args) => cmd_train(args)?,
        Commands::Longtail {
            dir,
            min_img_num,
            seed,
        } => cmd_longtail(&dir, min_img_num, seed)?,
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ╔════════════════════════════════════════════════════════════╗
 ║   open_set_da                                              ║
 ║   Universal Domain Adaptation with Burn + Rust             ║
 ╚════════════════════════════════════════════════════════════╝
  "#
        .green()
    );
}

fn cmd_train(args: TrainArgs) -> Result<()> {
    let config = args.into_config()?;

    println!("{}", "Training Configuration:".cyan().bold());
    println!("  Backend:          {}", backend_name());
    println!(
        "  Source → Target:  {} → {}",
        config.source.display(),
        config.target.display()
    );
    println!(
        "  Classes:          {} shared, {} source-private, {} total",
        config.partition.n_share, config.partition.n_source_private, config.partition.n_total
    );
    println!("  Backbone:         {}", config.arch);
    println!(
        "  Epochs:           {} x {} iterations",
        config.epochs, config.iters_per_epoch
    );
    println!("  Batch size:       {}", config.batch_size);
    println!("  Learning rate:    {}", config.lr);
    println!("  Output:           {}", config.output_dir.display());
    println!();

    info!("Configuration: {:?}", config);
    let report = run_experiment::<TrainingBackend>(config, default_device())?;

    println!();
    println!("{}", "Training Complete!".green().bold());
    if let Some(epoch) = report.best_epoch {
        println!(
            "  Best epoch {} with mean accuracy {:.2}%",
            epoch,
            report.best_mean_accuracy * 100.0
        );
    }
    println!("  Test mean accuracy: {:.2}%", report.test.mean_accuracy * 100.0);
    println!("  Test H-score:       {:.2}%", report.test.h_score * 100.0);
    if let Some(diagnostics) = &report.diagnostics {
        println!(
            "  AUC conf / margin / entropy: {:.3} / {:.3} / {:.3}",
            diagnostics.auc_confidence, diagnostics.auc_margin, diagnostics.auc_entropy
        );
    }
    Ok(())
}

fn cmd_longtail(dir: &std::path::Path, min_img_num: usize, seed: u64) -> Result<()> {
    println!("{}", "Resampling list files to a long tail...".cyan().bold());
    let written = sample_to_longtail(dir, min_img_num, seed)
        .with_context(|| format!("resampling {}", dir.display()))?;
    for path in &written {
        println!("  {} {}", "wrote".green(), path.display());
    }
    Ok(())
}
