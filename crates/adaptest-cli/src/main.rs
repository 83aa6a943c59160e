//! adaptest CLI — simulate, inspect and validate adaptive tests.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "adaptest",
    version,
    about = "Computerized adaptive testing: ability estimation and question selection"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run simulated test-takers through an activity
    Simulate {
        /// Path to the activity .toml file
        #[arg(long)]
        activity: PathBuf,

        /// Path to the question pool .toml file (default: `pool` from config)
        #[arg(long)]
        pool: Option<PathBuf>,

        /// True ability of the simulated learner, on the activity's level scale
        #[arg(long)]
        ability: f64,

        /// Seed for question picking and simulated answers
        #[arg(long)]
        seed: Option<u64>,

        /// Number of simulated attempts
        #[arg(long)]
        runs: Option<u32>,

        /// Directory to write one JSON report per attempt
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write reports to `output_dir` from config
        #[arg(long, conflicts_with = "output")]
        save: bool,

        /// Output format: text, json
        #[arg(long, default_value = "text")]
        format: String,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate activity TOML files
    Validate {
        /// Path to an activity file or directory (default: `activities_dir` from config)
        #[arg(long)]
        activity: Option<PathBuf>,
    },

    /// Compute the level of the next question
    Step {
        /// Level of the question just answered
        #[arg(long, allow_hyphen_values = true)]
        level: i64,

        /// Questions attempted, including this one
        #[arg(long)]
        attempted: u32,

        /// The answer was correct
        #[arg(long, conflicts_with = "incorrect", required_unless_present = "incorrect")]
        correct: bool,

        /// The answer was incorrect
        #[arg(long)]
        incorrect: bool,

        /// Lowest level of the scale
        #[arg(long, allow_hyphen_values = true)]
        low: i64,

        /// Highest level of the scale
        #[arg(long, allow_hyphen_values = true)]
        high: i64,
    },

    /// Estimate ability from attempt totals
    Estimate {
        /// Sum of the answered questions' difficulties in logits
        #[arg(long, allow_hyphen_values = true)]
        difficulty_sum: f64,

        /// Questions attempted
        #[arg(long)]
        attempted: u32,

        /// Correct answers
        #[arg(long)]
        right: u32,

        /// Incorrect answers
        #[arg(long)]
        wrong: u32,

        /// Lowest level, to show ability on the level scale
        #[arg(long, requires = "high", allow_hyphen_values = true)]
        low: Option<i64>,

        /// Highest level, to show ability on the level scale
        #[arg(long, requires = "low", allow_hyphen_values = true)]
        high: Option<i64>,
    },

    /// Create starter config, sample activity and question pool
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("adaptest=info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Simulate {
            activity,
            pool,
            ability,
            seed,
            runs,
            output,
            save,
            format,
            config,
        } => {
            commands::simulate::execute(commands::simulate::SimulateArgs {
                activity,
                pool,
                ability,
                seed,
                runs,
                output,
                save,
                format,
                config,
            })
            .await
        }
        Commands::Validate { activity } => commands::validate::execute(activity),
        Commands::Step {
            level,
            attempted,
            correct,
            incorrect: _,
            low,
            high,
        } => commands::step::execute(level, attempted, correct, low, high),
        Commands::Estimate {
            difficulty_sum,
            attempted,
            right,
            wrong,
            low,
            high,
        } => commands::estimate::execute(difficulty_sum, attempted, right, wrong, low.zip(high)),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
