//! Run the dependency parser over every sentence in a store that doesn't have an annotation
//!
//! Sentences go to the parser in batches (`-b`), one parser process per batch, with as many
//! batches in flight as there are workers. A batch whose output doesn't split into one block
//! per sentence is skipped and can be retried by running this again.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate depctx;

use std::process;
use clap::Arg;

use depctx::annotate::{AnnotateJob, CommandAnnotator};
use depctx::dispatch::Dispatcher;
use depctx::errors::*;
use depctx::store::FileCorpus;

pub fn main() {
    if let Err(err) = inner_main() {
        error!("{}", err);
        eprintln!("Could not recover. Exiting. {}", err);
        process::exit(1);
    }
}

pub fn inner_main() -> Result<()> {
    env_logger::init();
    let args = app_from_crate!()
        .arg_from_usage("<store> 'corpus store directory, as made by dc-import'")
        .arg(Arg::from_usage("-p, --parser=[COMMAND] 'parser command line, reading stdin'")
            .default_value("/opt/palavras/por.pl"))
        .arg_from_usage("--banner=[TEXT] 'what the parser normally prints on stderr'")
        .arg_from_usage("--strict 'fail when the parser prints anything else on stderr'")
        .arg(Arg::from_usage("-b, --batchsize=[N] 'sentences per parser run'")
            .default_value("10"))
        .arg_from_usage("-j, --threads=[N] 'how many parsers to run at once (default: one per CPU)'")
        .get_matches();

    let mut parser = CommandAnnotator::from_command_line(args.value_of("parser").unwrap())?
        .strict(args.is_present("strict"));
    if let Some(banner) = args.value_of("banner") {
        parser = parser.banner(banner);
    }
    let mut dispatcher = Dispatcher::new(value_t!(args, "batchsize", usize).unwrap_or_else(|e| e.exit()));
    if args.is_present("threads") {
        dispatcher = dispatcher.workers(value_t!(args, "threads", usize).unwrap_or_else(|e| e.exit()));
    }

    let corpus = FileCorpus::open(args.value_of("store").unwrap())?;
    let mut annotated = 0;
    let stats = dispatcher.run(&corpus, &AnnotateJob::new(&parser), |_, n| { annotated += n; Ok(()) })?;
    println!("Annotated {} sentences; {} of {} batches dropped", annotated, stats.dropped, stats.batches);
    Ok(())
}
