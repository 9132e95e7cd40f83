// ============================================================
// Layer 1: CLI / Presentation Layer
// ============================================================
// Entry point for all user interaction. Parses arguments with
// `clap` and delegates every piece of work to Layer 2.
//
// Commands:
//   train     fit a model on a ProteinNet-style dataset
//   evaluate  score the best checkpoint on one split
//   predict   write a PDB file for a single sequence
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvaluateArgs, PredictArgs, TrainArgs};

use crate::domain::geometry::NUM_ANGLES;

#[derive(Parser, Debug)]
#[command(
    name = "protein-transformer",
    version = "0.1.0",
    about = "Train a transformer that predicts protein torsion angles, then fold sequences into 3D."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Route the subcommand to its use case. Only printing happens here.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::Evaluate(args) => run_evaluate(args),
            Commands::Predict(args)  => run_predict(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting training on dataset: {}", args.data);
    let checkpoint_dir = args.checkpoint_dir.clone();

    let test = TrainUseCase::new(args.into()).execute()?;

    println!("Training complete. Checkpoints in '{}'.", checkpoint_dir);
    if let Some(report) = test {
        println!(
            "Test set: {} proteins, {} = {:.4}{}",
            report.proteins,
            report.loss_kind,
            report.loss,
            report.mean_rmsd.map(|r| format!(", mean RMSD = {r:.3} Å")).unwrap_or_default(),
        );
    }
    Ok(())
}

fn run_evaluate(args: EvaluateArgs) -> Result<()> {
    use crate::application::evaluate_use_case::EvaluateUseCase;

    let split = args.split.clone();
    let report = EvaluateUseCase::new(args.into()).execute()?;

    println!("\nSplit '{}': {} proteins", split, report.proteins);
    println!("  {:<10} {:.4}", report.loss_kind.to_string(), report.loss);
    let b = &report.breakdown;
    for (name, value) in [("drmsd", b.drmsd), ("ln-drmsd", b.ln_drmsd), ("bb-drmsd", b.bb_drmsd)] {
        if let Some(v) = value {
            println!("  {:<10} {:.4}", name, v);
        }
    }
    println!("  {:<10} {:.4}", "mse", b.mse);
    println!("  {:<10} {:.4}", "bb-mse", b.bb_mse);
    println!("  {:<10} {:.4}", "sc-mse", b.sc_mse);
    if let Some(rmsd) = report.mean_rmsd {
        println!("  {:<10} {:.3} Å", "rmsd", rmsd);
    }
    Ok(())
}

const ANGLE_HEADERS: [&str; NUM_ANGLES] = [
    "phi", "psi", "omega", "n-ca-c", "ca-c-n", "c-n-ca", "chi1", "chi2", "chi3", "chi4", "chi5",
];

fn run_predict(args: PredictArgs) -> Result<()> {
    use crate::application::predict_use_case::PredictUseCase;

    let output = args.output.clone();
    let prediction = PredictUseCase::new(args.into()).execute()?;

    println!("\nWrote {} residues to '{}'\n", prediction.sequence.len(), output.display());
    print!("{:>5} {:>4}", "#", "res");
    for h in ANGLE_HEADERS {
        print!(" {:>7}", h);
    }
    println!();
    for (i, (aa, row)) in prediction.sequence.iter().zip(&prediction.angles).enumerate() {
        print!("{:>5} {:>4}", i + 1, aa.three_letter());
        for a in row {
            print!(" {:>7.1}", a.to_degrees());
        }
        println!();
    }
    Ok(())
}
