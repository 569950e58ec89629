use seqrec_core::{parse_records, HistoryInitializer, MdpDefinition, ModelInitializer};
use std::error::Error;
use std::io::{self, Read};

/// Reads interaction records (one JSON object per line) from a file or
/// stdin and prints the size of the resulting model.
///
/// Usage: build_model [PATH|-] [WINDOW]
fn main() -> Result<(), Box<dyn Error>> {
    let mut args = std::env::args().skip(1);
    let path = args.next().filter(|p| p != "-");
    let window = match args.next() {
        Some(w) => w.parse()?,
        None => HistoryInitializer::DEFAULT_WINDOW,
    };

    let input = match path {
        Some(p) => std::fs::read_to_string(p)?,
        None => {
            let mut buf = String::new();
            io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let records = parse_records(&input)?;
    let init =
        HistoryInitializer::from_records(records, window, HistoryInitializer::DEFAULT_ALPHA)?;
    let (mdp, _) = MdpDefinition::from_initializer(&init, false)?;

    println!("window\t{}", mdp.window());
    println!("users\t{}", init.user_histories().len());
    println!("actions\t{}", mdp.actions().len());
    println!("states\t{}", mdp.states().len());
    for (user, history) in init.user_histories() {
        let titles: Vec<&str> = history
            .iter()
            .map(|item| init.catalog_ref().title(*item).unwrap_or("<untitled>"))
            .collect();
        println!("{user}\t{}", titles.join(" > "));
    }

    Ok(())
}
