//! Dependency contexts
//!
//! A word's context is its relation to its head joined with the head's form, so `ele` in
//! "ele correu" gets the context `subj>_correu`.
use std::fmt;

use crate::sentence::{Sentence, SentenceParser, TokenRecord};

/// Between the relation and the head's form
pub const SEPARATOR: char = '_';

/// One (word, context) observation
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextPair {
    pub word: String,
    pub context: String,
}

impl ContextPair {
    pub fn new(word: &str, label: &str, head_form: &str) -> ContextPair {
        let mut context = String::with_capacity(label.len() + head_form.len() + 1);
        context.push_str(label);
        context.push(SEPARATOR);
        context.push_str(head_form);
        ContextPair { word: word.to_owned(), context }
    }
}

/// The output line format, `word context`
impl fmt::Display for ContextPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.word, self.context)
    }
}

/// Every pair a sentence yields, lazily.
///
/// Each token with a head in the same sentence contributes its forms × its labels × the head's
/// forms. Tokens are visited in map order, so only the multiset of pairs is stable.
pub fn context_pairs<'s>(sentence: &'s Sentence) -> impl Iterator<Item=ContextPair> + 's {
    sentence.tokens()
        .filter_map(move |token| sentence.head_of(token).map(|head| (token, head)))
        .flat_map(|(token, head)| token_pairs(token, head))
}

fn token_pairs<'s>(token: &'s TokenRecord, head: &'s TokenRecord)
    -> impl Iterator<Item=ContextPair> + 's {
    token.surface_forms.iter().flat_map(move |word| {
        token.context_labels.iter().flat_map(move |label| {
            head.surface_forms.iter()
                .map(move |head_form| ContextPair::new(word, label, head_form))
        })
    })
}

/// Parse a block of annotated text and collect the pairs of the sentence it ends with
pub fn extract(parser: &SentenceParser, annotated: &str) -> Vec<ContextPair> {
    match parser.parse(annotated) {
        Some(sentence) => context_pairs(&sentence).collect(),
        None => vec![],
    }
}
