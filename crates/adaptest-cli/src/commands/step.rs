//! The `adaptest step` command.

use anyhow::Result;

use adaptest_core::stepper::compute_next_difficulty;

pub fn execute(level: i64, attempted: u32, correct: bool, low: i64, high: i64) -> Result<()> {
    anyhow::ensure!(low < high, "--low must be below --high");

    let next = compute_next_difficulty(level, attempted, correct, low, high)?;
    let answer = if correct { "correct" } else { "incorrect" };
    println!("Answered level {level} {answer} (question {attempted})");
    println!("Next level: {next}");
    Ok(())
}
