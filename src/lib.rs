//! Dependency contexts for word embeddings
//!
//! Turns a corpus of dependency-parsed sentences into `word context` pairs and the word and
//! context vocabularies needed to train embeddings on them. The binaries are thin wrappers
//! around `pipeline` and `annotate`; the pieces are here in case you need them elsewhere.


#[macro_use] extern crate log;
extern crate regex;
extern crate farmhash;
extern crate hash_hasher;
pub mod errors;
pub mod farm;
pub mod sentence;
pub mod context;
pub mod counts;
pub mod snapshot;
pub mod store;
pub mod dispatch;
pub mod aggregate;
pub mod annotate;
pub mod output;
pub mod pipeline;
