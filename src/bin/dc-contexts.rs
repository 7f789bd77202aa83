//! Dependency contexts, in two passes over an annotated corpus store
//!
//! First count the words and keep a vocabulary of those seen often enough:
//!
//! ```text
//! dc-contexts ptwiki/ vocab --min-count 100
//! ```
//!
//! Then extract `word context` pairs for the words in that vocabulary, keeping the list of
//! contexts seen often enough:
//!
//! ```text
//! dc-contexts ptwiki/ extract --min-count 100
//! ```
//!
//! Both passes read and write the same output directory (`-o`, `./data/contexts/` by
//! default). Set `RUST_LOG=info` to follow along.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate depctx;

use std::process;
use clap::{AppSettings, Arg, ArgMatches, SubCommand};

use depctx::errors::*;
use depctx::pipeline::{self, Config, Rotation, RunModeConfig};
use depctx::store::FileCorpus;

pub fn main() {
    // Main can't return a Result, and the ? operator needs the enclosing function to return Result
    if let Err(err) = inner_main() {
        error!("{}", err);
        eprintln!("Could not recover. Exiting. {}", err);
        process::exit(1);
    }
}

fn min_count(args: &ArgMatches) -> u64 {
    value_t!(args, "min-count", u64).unwrap_or_else(|e| e.exit())
}

pub fn inner_main() -> Result<()> {
    env_logger::init();
    let args = app_from_crate!()
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg_from_usage("<store> 'corpus store directory, as made by dc-import'")
        .arg(Arg::from_usage("-b, --batchsize=[N] 'sentences handed to a worker at a time'")
            .default_value("50"))
        .arg_from_usage("-j, --threads=[N] 'how many workers to run (default: one per CPU)'")
        .arg(Arg::from_usage("-o, --output=[DIR] 'directory for the vocabularies and contexts'")
            .default_value("./data/contexts/"))
        .arg(Arg::from_usage("--report=[BATCHES] 'log progress every this many batches'")
            .default_value("10"))
        .arg_from_usage("--max-file-size=[BYTES] 'split the pairs over files of about this size'")
        .arg_from_usage("--compress 'gzip the split files'")
        .subcommand(SubCommand::with_name("vocab")
            .about("Count words and keep the frequent ones as the vocabulary")
            .arg_from_usage("-m, --min-count=<N> 'ignore words seen fewer times than this'"))
        .subcommand(SubCommand::with_name("extract")
            .about("Write the contexts of vocabulary words and count them")
            .arg_from_usage("-m, --min-count=<N> 'ignore contexts seen fewer times than this'")
            .arg_from_usage("--vocab=[FILE] 'a word count listing to filter with instead of the vocabulary snapshot'"))
        .get_matches();

    let mode = match args.subcommand() {
        ("vocab", Some(sub)) => RunModeConfig::BuildVocabulary { min_count: min_count(sub) },
        ("extract", Some(sub)) => RunModeConfig::ExtractContexts {
            min_count: min_count(sub),
            vocabulary: sub.value_of("vocab").map(Into::into),
        },
        _ => unreachable!("clap requires a subcommand"),
    };

    let mut config = Config::new(args.value_of("output").unwrap(), mode);
    config.batch_size = value_t!(args, "batchsize", usize).unwrap_or_else(|e| e.exit());
    config.report_period = value_t!(args, "report", usize).unwrap_or_else(|e| e.exit());
    if args.is_present("threads") {
        config.workers = Some(value_t!(args, "threads", usize).unwrap_or_else(|e| e.exit()));
    }
    if args.is_present("max-file-size") {
        config.rotation = Some(Rotation {
            max_file_size: value_t!(args, "max-file-size", u64).unwrap_or_else(|e| e.exit()),
            compress: args.is_present("compress"),
        });
    }
    info!("Batch size: {}, output in {}", config.batch_size, config.output_dir.display());

    let corpus = FileCorpus::open(args.value_of("store").unwrap())?;
    let summary = pipeline::run(&config, &corpus)?;
    println!("{} entries kept ({} below the minimum count), {} pairs from {} sentences",
        summary.table.len(), summary.removed, summary.pairs, summary.sentences);
    Ok(())
}
