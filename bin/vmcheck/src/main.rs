use automata_core::{prelude::*, vending::*};
use automata_learning::{
    active::{Campaign, SessionReport},
    diff::{Contract, DiffConfig, Differencer, ReportSink, TracingSink, Verdict},
    LearningConfig, OracleStrategy,
};
use owo_colors::OwoColorize;
use tracing::{debug, error, info, trace};
use tracing_subscriber::{filter, prelude::*};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

type Device = Box<dyn Sul<Symbol = VendingSymbol, Output = VendingOutput> + Send>;

const DEVICES: [&str; 5] = ["correct", "off-by-one", "forgetful", "leaky", "jammed"];

fn cli() -> clap::Command {
    Command::new("vmcheck")
        .about("Learns models of vending machines and compares them")
        .subcommand_required(true)
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(["info", "debug", "trace"])
                .default_missing_value("info")
                .global(true),
        )
        .arg(
            Arg::new("devices")
                .long("devices")
                .num_args(1..)
                .value_delimiter(',')
                .value_parser(DEVICES)
                .default_values(DEVICES)
                .global(true),
        )
        .arg(
            Arg::new("price")
                .long("price")
                .help("price of every item in cents")
                .value_parser(value_parser!(u32))
                .default_value("200")
                .global(true),
        )
        .arg(
            Arg::new("oracle")
                .long("oracle")
                .value_parser(["random-walk", "random-words"])
                .default_value("random-walk")
                .global(true),
        )
        .arg(
            Arg::new("budget")
                .long("budget")
                .help("steps of a random walk or number of random words")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .arg(
            Arg::new("max-iterations")
                .long("max-iterations")
                .value_parser(value_parser!(usize))
                .global(true),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64))
                .default_value("0")
                .global(true),
        )
        .arg(
            Arg::new("sequential")
                .long("sequential")
                .help("learn one device after the other")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .subcommand(Command::new("learn").about("learns every device and prints the models"))
        .subcommand(
            Command::new("compare")
                .about("learns every device and ranks the models that converged")
                .arg(
                    Arg::new("max-len")
                        .long("max-len")
                        .value_parser(value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    Arg::new("max-sequences")
                        .long("max-sequences")
                        .value_parser(value_parser!(usize))
                        .default_value("50000"),
                )
                .arg(
                    Arg::new("minimal")
                        .long("minimal")
                        .help("only report divergences that end in the first mismatch")
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("no-contract")
                        .long("no-contract")
                        .help("do not check the models against the reference rules")
                        .action(ArgAction::SetTrue),
                ),
        )
}

fn setup_logging(matches: &ArgMatches) {
    let level = match matches
        .try_get_one::<String>("verbosity")
        .ok()
        .flatten()
        .map(|m| m.as_str())
    {
        Some("trace") => filter::LevelFilter::TRACE,
        Some("debug") => filter::LevelFilter::DEBUG,
        Some("info") => filter::LevelFilter::INFO,
        _ => filter::LevelFilter::WARN,
    };

    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

fn learning_config(matches: &ArgMatches) -> LearningConfig {
    let budget = matches.get_one::<usize>("budget").copied();
    let oracle = match matches.get_one::<String>("oracle").map(|s| s.as_str()) {
        Some("random-words") => {
            let words = budget.unwrap_or(100);
            OracleStrategy::random_words(words, 2, 5)
        }
        _ => OracleStrategy::random_walk(budget.unwrap_or(1000)),
    };
    let mut config = LearningConfig::from_env()
        .with_oracle(oracle)
        .with_seed(matches.get_one::<u64>("seed").copied().unwrap_or_default());
    if let Some(max) = matches.get_one::<usize>("max-iterations") {
        config = config.with_max_iterations(*max);
    }
    config
}

fn device(name: &str, price: u32) -> Device {
    match name {
        "off-by-one" => Box::new(VendingMachine::with_threshold(price, price / 2)),
        "forgetful" => Box::new(ForgetfulVendingMachine),
        "leaky" => Box::new(LeakyVendingMachine::new(price)),
        "jammed" => Box::new(FlakyVendingMachine::new(price, 50)),
        _ => Box::new(VendingMachine::new(price)),
    }
}

fn learn(matches: &ArgMatches) -> Option<Vec<SessionReport<VendingSymbol, VendingOutput>>> {
    let config = learning_config(matches);
    if let Err(e) = config.validate() {
        error!("invalid configuration: {e}");
        return None;
    }
    let price = matches.get_one::<u32>("price").copied().unwrap_or(REFERENCE_PRICE);
    let devices: Vec<(String, Device)> = matches
        .get_many::<String>("devices")
        .into_iter()
        .flatten()
        .map(|name| (name.clone(), device(name, price)))
        .collect();
    debug!("learning {} devices with {:?}", devices.len(), config);

    let campaign = Campaign::new(reference_alphabet(), config);
    Some(if matches.get_flag("sequential") {
        campaign.learn_sequential(devices)
    } else {
        campaign.learn(devices)
    })
}

fn print_sessions(sessions: &[SessionReport<VendingSymbol, VendingOutput>]) {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record(["device", "result", "states", "queries", "counterexamples"]);
    for session in sessions {
        match &session.result {
            Ok(outcome) => builder.push_record([
                session.id.clone(),
                "converged".green().to_string(),
                outcome.hypothesis.size().to_string(),
                outcome.stats.membership_queries.to_string(),
                outcome.stats.counterexamples.to_string(),
            ]),
            Err(e) => builder.push_record([
                session.id.clone(),
                e.kind().red().to_string(),
                "-".to_string(),
                "-".to_string(),
                "-".to_string(),
            ]),
        }
    }
    println!("{}", builder.build());
}

pub fn main() {
    let matches = cli().get_matches();

    setup_logging(&matches);

    let Some(sessions) = learn(&matches) else {
        std::process::exit(2);
    };
    print_sessions(&sessions);

    let mut sink = TracingSink;
    match matches.subcommand() {
        Some(("learn", _)) => {
            for session in &sessions {
                if let Some(model) = session.hypothesis() {
                    sink.hypothesis(&session.id, model);
                    println!("{}\n{:?}", session.id.bold(), model);
                }
            }
        }
        Some(("compare", sub_matches)) => {
            let alphabet = reference_alphabet();
            let price = matches.get_one::<u32>("price").copied().unwrap_or(REFERENCE_PRICE);
            let contract = (!sub_matches.get_flag("no-contract"))
                .then(|| Contract::vending(&alphabet, price));
            let config = DiffConfig::default()
                .with_max_len(sub_matches.get_one::<usize>("max-len").copied().unwrap_or(3))
                .with_max_sequences(
                    sub_matches
                        .get_one::<usize>("max-sequences")
                        .copied()
                        .unwrap_or(50000),
                )
                .minimal_only(sub_matches.get_flag("minimal"))
                .with_seed(matches.get_one::<u64>("seed").copied().unwrap_or_default());

            let start = std::time::Instant::now();
            let report =
                Differencer::new(alphabet, config).compare_sessions(&sessions, contract.as_ref());
            info!(
                "comparison took {}",
                automata_core::show_duration(start.elapsed())
            );
            sink.report(&report);

            println!("{}", report.pairs_table());
            println!("{}", report.ranking_table());
            if report.is_partial() {
                println!(
                    "{}",
                    format!(
                        "based on {} of {} requested models",
                        report.compared.len(),
                        report.requested
                    )
                    .yellow()
                );
            }
            match &report.verdict {
                Verdict::MostLikelyCorrect(_) => println!("{}", report.verdict.green()),
                _ => println!("{}", report.verdict.yellow()),
            }
        }
        _ => unreachable!(),
    }
}
