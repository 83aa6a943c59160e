//! The `adaptest simulate` command.
//!
//! Runs simulated learners through the full attempt engine. Each learner
//! answers following the Rasch model: the chance of a right answer is the
//! logistic of ability minus question difficulty, both in logits.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use adaptest_core::engine::{
    AnsweredQuestion, AttemptEngine, AttemptEngineConfig, AttemptProgress,
};
use adaptest_core::model::ActivityConfig;
use adaptest_core::parser;
use adaptest_core::report::AttemptReport;
use adaptest_core::scale::{linear_to_logit, sigmoid};
use adaptest_core::traits::SessionCache;
use adaptest_store::{load_config_from, load_pool, InMemoryAttemptStore, InMemorySessionCache};

pub struct SimulateArgs {
    pub activity: PathBuf,
    pub pool: Option<PathBuf>,
    pub ability: f64,
    pub seed: Option<u64>,
    pub runs: Option<u32>,
    pub output: Option<PathBuf>,
    pub save: bool,
    pub format: String,
    pub config: Option<PathBuf>,
}

/// A test-taker with a fixed true ability.
struct SimulatedLearner {
    ability_logits: f64,
    low: f64,
    high: f64,
    rng: ChaCha8Rng,
}

impl SimulatedLearner {
    fn new(ability: f64, low: i64, high: i64, seed: Option<u64>) -> Self {
        let (low, high) = (low as f64, high as f64);
        let mut rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        // Separate stream from the engine's question picks on the same seed.
        rng.set_stream(1);
        Self {
            ability_logits: linear_to_logit(ability, low, high),
            low,
            high,
            rng,
        }
    }

    fn answer(&mut self, level: i64) -> bool {
        let difficulty = linear_to_logit(level as f64, self.low, self.high);
        let p_correct = sigmoid(self.ability_logits - difficulty);
        self.rng.gen_bool(p_correct)
    }
}

#[derive(Debug, Serialize)]
struct RunSummary {
    attempt_id: u64,
    questions: u32,
    right: u32,
    wrong: u32,
    ability: Option<f64>,
    error_percent: Option<f64>,
    stop_reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct SimulationSummary {
    activity_id: u64,
    activity_name: String,
    true_ability: f64,
    seed: Option<u64>,
    mean_questions: f64,
    mean_ability: Option<f64>,
    /// Root mean squared error of the estimated ability.
    rmse: Option<f64>,
    stop_reasons: BTreeMap<String, u32>,
    runs: Vec<RunSummary>,
}

impl SimulationSummary {
    fn from_reports(
        activity: &ActivityConfig,
        true_ability: f64,
        seed: Option<u64>,
        reports: &[AttemptReport],
    ) -> Self {
        let runs: Vec<RunSummary> = reports
            .iter()
            .map(|r| RunSummary {
                attempt_id: r.attempt_id,
                questions: r.questions_attempted,
                right: r.sum_correct,
                wrong: r.sum_incorrect,
                ability: r.score.as_ref().and_then(|s| s.ability),
                error_percent: r.score.as_ref().and_then(|s| s.error_percent),
                stop_reason: r.stop_reason.map(|reason| reason.code().to_string()),
            })
            .collect();

        let mut stop_reasons = BTreeMap::new();
        for run in &runs {
            let code = run.stop_reason.clone().unwrap_or_else(|| "in_progress".into());
            *stop_reasons.entry(code).or_insert(0) += 1;
        }

        let abilities: Vec<f64> = runs.iter().filter_map(|r| r.ability).collect();
        let squared_errors: Vec<f64> = abilities
            .iter()
            .map(|a| (a - true_ability).powi(2))
            .collect();
        let questions: Vec<f64> = runs.iter().map(|r| f64::from(r.questions)).collect();

        Self {
            activity_id: activity.instance_id,
            activity_name: activity.name.clone(),
            true_ability,
            seed,
            mean_questions: mean(&questions).unwrap_or(0.0),
            mean_ability: mean(&abilities),
            rmse: mean(&squared_errors).map(f64::sqrt),
            stop_reasons,
            runs,
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

pub async fn execute(args: SimulateArgs) -> Result<()> {
    anyhow::ensure!(
        matches!(args.format.as_str(), "text" | "json"),
        "unknown format '{}', expected text or json",
        args.format
    );

    let config = load_config_from(args.config.as_deref())?;

    let activity = parser::parse_activity(&args.activity)?;
    for w in parser::validate_activity(&activity) {
        eprintln!("Warning: {}", w.message);
    }

    let (low, high) = activity.bounds();
    anyhow::ensure!(
        args.ability > low as f64 && args.ability < high as f64,
        "--ability must lie strictly between {low} and {high}"
    );

    let pool_path = args
        .pool
        .or(config.pool)
        .context("no question pool given; pass --pool or set `pool` in adaptest.toml")?;
    let pool = Arc::new(load_pool(&pool_path)?);

    let runs = args.runs.unwrap_or(config.runs);
    anyhow::ensure!(runs >= 1, "runs must be at least 1");
    let seed = args.seed.or(config.seed);

    let store = Arc::new(InMemoryAttemptStore::with_activities([activity.clone()]));
    let engine = AttemptEngine::new(store, pool, AttemptEngineConfig { seed });
    let mut learner = SimulatedLearner::new(args.ability, low, high, seed);

    let mut reports = Vec::with_capacity(runs as usize);
    for run in 1..=runs {
        // One session per learner, so availability is tracked per attempt.
        let session = InMemorySessionCache::new();
        let user_id = format!("simulated-{run}");
        let attempt_id =
            run_attempt(&engine, &session, activity.instance_id, &user_id, &mut learner).await?;
        let report = engine.attempt_report(attempt_id).await?;
        tracing::debug!(
            run,
            attempt_id,
            questions = report.questions_attempted,
            "simulated attempt finished"
        );
        reports.push(report);
    }

    let summary = SimulationSummary::from_reports(&activity, args.ability, seed, &reports);
    match args.format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_summary(&summary),
    }

    let output_dir = args.output.or(args.save.then_some(config.output_dir));
    if let Some(dir) = &output_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create output directory: {}", dir.display()))?;
        for report in &reports {
            report.save_json(&dir.join(format!("attempt-{}.json", report.attempt_id)))?;
        }
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
        let summary_path = dir.join(format!("simulation-{timestamp}.json"));
        std::fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
            .with_context(|| format!("failed to write {}", summary_path.display()))?;
        eprintln!("Reports saved to: {}", dir.display());
    }

    Ok(())
}

/// Drive one attempt to completion and return its id.
async fn run_attempt(
    engine: &AttemptEngine,
    session: &dyn SessionCache,
    activity_id: u64,
    user_id: &str,
    learner: &mut SimulatedLearner,
) -> Result<u64> {
    let mut progress = engine.start_attempt(session, activity_id, user_id).await?;
    loop {
        match progress {
            AttemptProgress::Question {
                attempt, question, ..
            } => {
                let answer = AnsweredQuestion {
                    correct: Some(learner.answer(question.level)),
                    level: question.level,
                    question_id: question.question_id,
                };
                progress = engine.submit_answer(session, attempt.id, &answer).await?;
            }
            AttemptProgress::Completed { attempt } => return Ok(attempt.id),
            AttemptProgress::Ungraded { attempt } => {
                anyhow::bail!("attempt {} stopped on an ungraded answer", attempt.id)
            }
        }
    }
}

fn print_summary(summary: &SimulationSummary) {
    use comfy_table::{Cell, Table};

    let fmt_opt = |value: Option<f64>, suffix: &str| {
        value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}{suffix}"))
    };

    let mut table = Table::new();
    table.set_header(vec![
        "Attempt",
        "Questions",
        "Right",
        "Wrong",
        "Ability",
        "Error",
        "Stop reason",
    ]);

    for run in &summary.runs {
        table.add_row(vec![
            Cell::new(run.attempt_id),
            Cell::new(run.questions),
            Cell::new(run.right),
            Cell::new(run.wrong),
            Cell::new(fmt_opt(run.ability, "")),
            Cell::new(fmt_opt(run.error_percent, "%")),
            Cell::new(run.stop_reason.as_deref().unwrap_or("-")),
        ]);
    }

    println!(
        "{} (activity {}), true ability {:.1}",
        summary.activity_name, summary.activity_id, summary.true_ability
    );
    println!("{table}");
    println!("Simulated attempts: {}", summary.runs.len());
    println!("Mean questions:     {:.1}", summary.mean_questions);
    println!("Mean ability:       {}", fmt_opt(summary.mean_ability, ""));
    println!("Ability RMSE:       {}", fmt_opt(summary.rmse, ""));
    for (code, count) in &summary.stop_reasons {
        println!("  {code}: {count}");
    }
}
