//! The `adaptest estimate` command.

use anyhow::Result;

use adaptest_core::estimator::{estimate, AttemptTotals};
use adaptest_core::scale::{logit_to_linear, round_to};

pub fn execute(
    difficulty_sum: f64,
    attempted: u32,
    right: u32,
    wrong: u32,
    bounds: Option<(i64, i64)>,
) -> Result<()> {
    let totals = AttemptTotals {
        questions_attempted: attempted,
        difficulty_sum_logits: difficulty_sum,
        sum_correct: right,
        sum_incorrect: wrong,
    };
    if !totals.is_consistent() {
        eprintln!(
            "Warning: right + wrong ({}) does not equal attempted ({attempted})",
            u64::from(right) + u64::from(wrong)
        );
    }

    let estimate = match estimate(&totals) {
        Ok(estimate) => estimate,
        Err(reason) => {
            println!("No estimate: {reason}");
            return Ok(());
        }
    };

    let error_percent = estimate.display_error_percent()?;
    println!("Measure:        {} logits", estimate.measure_logits);
    println!(
        "Standard error: {} logits ({:.1}%)",
        estimate.standard_error_logits, error_percent
    );

    if let Some((low, high)) = bounds {
        anyhow::ensure!(low < high, "--low must be below --high");
        let (low_f, high_f) = (low as f64, high as f64);
        let measure = estimate.measure_logits;
        let se = estimate.standard_error_logits;
        println!(
            "Ability:        {:.1} on [{low}, {high}] (range {:.1} to {:.1})",
            round_to(estimate.display_ability(low, high), 1),
            round_to(logit_to_linear(measure - se, low_f, high_f), 1),
            round_to(logit_to_linear(measure + se, low_f, high_f), 1),
        );
    }

    Ok(())
}
