//! Create a corpus store from a text file with one sentence per line
//!
//! Row ids follow the line numbers, starting from 1.

// argument parsing
#[macro_use] extern crate clap;
// logging
#[macro_use] extern crate log;
extern crate env_logger;
// lastly, this library
extern crate depctx;

use std::process;
use depctx::errors::*;
use depctx::store::{self, CorpusStore, Eligibility, StoreConnector};

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
        .arg_from_usage("<sentences> 'text file, one cleaned sentence per line'")
        .arg_from_usage("<store> 'directory to create the store in'")
        .get_matches();

    let corpus = store::import_text(args.value_of("sentences").unwrap(), args.value_of("store").unwrap())?;
    let rows = corpus.connect()?.count(Eligibility::Present)?;
    println!("{} sentences in {}", rows, corpus.dir().display());
    Ok(())
}
