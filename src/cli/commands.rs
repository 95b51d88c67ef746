//! CLI command definitions using clap.
//!
//! - run: start (or continue) a search from a resume and preferences
//! - resume / status / rescore / export: act on a checkpointed run

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// jobscout - resume in, ranked job listings out
#[derive(Parser, Debug)]
#[command(name = "jobscout")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a new run, or continue the run with the given id
    Run {
        /// Resume file (PDF or plain text)
        #[arg(short, long)]
        resume: PathBuf,

        /// Preferences YAML file
        #[arg(short, long)]
        prefs: PathBuf,

        /// Run id; reusing an existing id continues that run
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Continue a checkpointed run
    Resume {
        run_id: String,
    },

    /// Show a run's progress
    Status {
        run_id: String,
    },

    /// Retry scoring for listings that failed to score
    Rescore {
        run_id: String,
    },

    /// Write a run's ranked results as JSON
    Export {
        run_id: String,

        /// Output file
        #[arg(short, long)]
        out: PathBuf,
    },
}
