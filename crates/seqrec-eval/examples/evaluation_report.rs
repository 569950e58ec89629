//! Trains windows `1..=K` on interaction records and prints, per window,
//! the trained and random-baseline scores as JSON lines.
//!
//! Run with: cargo run -p seqrec-eval --example evaluation_report -- [K] [SEED] < records.jsonl

use seqrec_core::{parse_records, HistoryInitializer};
use seqrec_eval::{compare_baselines, MetricParams};
use seqrec_solver::SolverConfig;
use std::error::Error;
use std::io::{self, Read};

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let max_window: usize = match args.next() {
        Some(k) => k.parse()?,
        None => 3,
    };
    let seed: u64 = match args.next() {
        Some(s) => s.parse()?,
        None => 0,
    };

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let base = HistoryInitializer::from_records(
        parse_records(&input)?,
        1,
        HistoryInitializer::DEFAULT_ALPHA,
    )?;

    let save_dir = std::env::temp_dir().join(format!("seqrec_report_{}", std::process::id()));
    let config = SolverConfig {
        verbose: false,
        save_dir: save_dir.clone(),
        ..SolverConfig::default()
    };
    let comparisons = compare_baselines(max_window, &config, MetricParams::default(), seed, |k| {
        base.with_window(k)
    });
    let _ = std::fs::remove_dir_all(&save_dir);

    for c in comparisons? {
        eprintln!(
            "k={}: decay {:.2} vs {:.2}, hit-rate {:.2} vs {:.2}",
            c.window,
            c.trained.decay.value,
            c.random.decay.value,
            c.trained.hit_rate.value,
            c.random.hit_rate.value
        );
        println!("{}", serde_json::to_string(&c)?);
    }
    Ok(())
}
