use seqrec_core::{parse_records, HistoryInitializer, ItemId};
use seqrec_solver::{RecommendationEngine, SolverConfig};
use serde::Serialize;
use std::error::Error;
use std::io::{self, Read};

#[derive(Serialize)]
struct UserRecommendation<'a> {
    user: &'a str,
    item: ItemId,
    title: Option<String>,
    top: Vec<ItemId>,
}

/// Trains a policy on interaction records read from stdin and prints the
/// recommendation for every user as JSON lines.
///
/// Usage: recommend [WINDOW] < records.jsonl
fn main() -> Result<(), Box<dyn Error>> {
    let window = match std::env::args().nth(1) {
        Some(w) => w.parse()?,
        None => HistoryInitializer::DEFAULT_WINDOW,
    };

    let mut input = String::new();
    io::stdin().read_to_string(&mut input)?;
    let init = HistoryInitializer::from_records(
        parse_records(&input)?,
        window,
        HistoryInitializer::DEFAULT_ALPHA,
    )?;

    let config = SolverConfig {
        verbose: false,
        ..SolverConfig::default()
    };
    let max_iteration = config.max_iteration;
    let mut engine = RecommendationEngine::from_initializer(&init, config)?;
    let outcome = engine
        .solver_mut()
        .policy_iteration(max_iteration, false, false)?;
    eprintln!(
        "trained in {} iterations (converged: {})",
        outcome.iterations, outcome.converged
    );

    let catalog = engine.catalog().clone();
    for user in catalog.users() {
        let rec = engine.recommend(user)?;
        let top = engine.rank(user)?.iter().take(3).map(|r| r.item).collect();
        let line = UserRecommendation {
            user,
            item: rec.item,
            title: rec.title,
            top,
        };
        println!("{}", serde_json::to_string(&line)?);
    }

    Ok(())
}
