//! SPM - Statistical Parametric Mapping CLI
//!
//! Command-line interface for mass-univariate group analyses.

use clap::{Parser, Subcommand};
use composable_spm::analysis::{run_analysis, AnalysisConfig, Caffeinator};
use composable_spm::data::{Coding, DesignMatrix, Formula, Metadata};
use composable_spm::error::Result;
use composable_spm::test::ClusterPermutationTest;
use std::path::{Path, PathBuf};

/// Composable Statistical Parametric Mapping
#[derive(Parser)]
#[command(name = "spm")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a group analysis from a YAML configuration file
    Run {
        /// Path to analysis configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Output path for the JSON report (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Evaluate permutations on a single thread
        #[arg(long)]
        sequential: bool,
    },

    /// Show the model columns of each term
    Terms {
        /// Model formula (e.g., "A*B*Y")
        #[arg(short, long)]
        formula: String,

        /// Path to a case table TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Coding of categorical variables: effect or dummy
        #[arg(long, default_value = "effect")]
        coding: Coding,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            config,
            output,
            sequential,
        } => cmd_run(&config, output.as_deref(), sequential),
        Commands::Terms {
            formula,
            metadata,
            coding,
        } => cmd_terms(&formula, &metadata, coding),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn cmd_run(config_path: &Path, output_path: Option<&Path>, sequential: bool) -> Result<()> {
    eprintln!("Loading analysis configuration from {:?}...", config_path);
    let config = AnalysisConfig::from_file(config_path)?;

    let test = if sequential {
        ClusterPermutationTest::sequential()
    } else {
        ClusterPermutationTest::default()
    };

    eprintln!(
        "Running '{}' ({} subjects, model {})...",
        config.name,
        config.subjects.len(),
        config.formula
    );
    let caffeinator = Caffeinator::new();
    let report = {
        let _guard = caffeinator.acquire();
        run_analysis(&config, &test)?
    };

    match output_path {
        Some(path) => {
            eprintln!("Writing report to {:?}...", path);
            report.write_json(path)?;
        }
        None => println!("{}", report.to_json()?),
    }

    eprintln!("Done! {} terms tested", report.terms.len());
    for term in &report.terms {
        let n_sig = term
            .clusters
            .iter()
            .filter(|c| c.p.map(|p| p < 0.05).unwrap_or(false))
            .count();
        eprintln!(
            "  {:<16} {} clusters, {} at p < 0.05 (max |t| = {:.2})",
            term.term,
            term.clusters.len(),
            n_sig,
            term.max_abs_t
        );
    }
    Ok(())
}

fn cmd_terms(formula: &str, metadata_path: &Path, coding: Coding) -> Result<()> {
    let metadata = Metadata::from_tsv(metadata_path)?;
    let formula = Formula::parse(formula)?;
    let design = DesignMatrix::from_formula(&metadata, &formula, coding)?;

    println!("{} cases, {} columns", design.n_cases(), design.n_columns());
    for span in design.terms().iter() {
        let columns: Vec<&str> = span
            .columns
            .iter()
            .map(|&c| design.column_names()[c].as_str())
            .collect();
        println!("  {:<16} {}", span.name(), columns.join(", "));
    }
    Ok(())
}
