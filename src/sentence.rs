//! Dependency record parser
//!
//! The parser's output is one token per line, for example:
//!
//! ```text
//! <ß>
//! Ele [ele] PERS M 3S NOM @SUBJ> #1->2
//! correu [correr] V PS 3S IND VFIN @FS-STA #2->0
//! $.
//! </ß>
//! ```
//!
//! Only the first field (the word), the `@` relations and the `#id->head` pointer matter
//! here. Sentences are never delimited explicitly at this layer: a token whose id drops below
//! the last one seen starts a new sentence.
use regex::Regex;

use crate::errors::*;
use crate::farm::{new_plain, PlainMap};

/// Joins the parts of a compound lemma, as in `guarda=chuva`
pub const COMPOUND_MARKER: char = '=';
/// Prefix of every dependency relation
pub const RELATION_MARKER: char = '@';

/// One analysed token within a sentence
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenRecord {
    pub local_id: u32,
    /// The compound parts (if any) followed by the whole word
    pub surface_forms: Vec<String>,
    /// Relations with the marker removed
    pub context_labels: Vec<String>,
    /// None when the pointer isn't a plain number
    pub head_ref: Option<u32>,
}

impl TokenRecord {
    /// Build a record from the four fields of a rewritten token line
    pub fn from_fields(local_id: u32, word: &str, contexts: &str, head: &str) -> TokenRecord {
        let mut surface_forms: Vec<String> = word.split(COMPOUND_MARKER)
            .map(String::from)
            .collect();
        if surface_forms.len() > 1 {
            surface_forms.push(word.to_owned());
        }
        let context_labels = contexts.replace(RELATION_MARKER, "")
            .split(' ')
            .map(String::from)
            .collect();
        TokenRecord {
            local_id,
            surface_forms,
            context_labels,
            head_ref: head.parse().ok(),
        }
    }
}

/// All the tokens of one sentence, by id
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sentence {
    tokens: PlainMap<u32, TokenRecord>,
}

impl Sentence {
    pub fn get(&self, local_id: u32) -> Option<&TokenRecord> {
        self.tokens.get(&local_id)
    }

    /// The token this one depends on, if it is in the same sentence
    pub fn head_of(&self, token: &TokenRecord) -> Option<&TokenRecord> {
        token.head_ref.and_then(|head| self.tokens.get(&head))
    }

    /// Tokens in no particular order
    pub fn tokens(&self) -> impl Iterator<Item=&TokenRecord> {
        self.tokens.values()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Collects the tokens of a sentence as they are read.
///
/// When a token's id is lower than the last id seen, the tokens so far are thrown out and the
/// last id is forgotten. Only the scope left open at the end of a block counts as a sentence. The token that caused the reset does not become the
/// new last id; the one after it does. Equal ids never split a sentence, the later token
/// replaces the earlier one.
#[derive(Debug, Default)]
pub struct SentenceScope {
    current: PlainMap<u32, TokenRecord>,
    last_seen: Option<u32>,
}

impl SentenceScope {
    pub fn new() -> SentenceScope {
        SentenceScope { current: new_plain(), last_seen: None }
    }

    /// Add a token. If it started a new scope, the tokens of the old one are handed back so
    /// the caller can see what was discarded.
    pub fn push(&mut self, token: TokenRecord) -> Option<Sentence> {
        let finished = match self.last_seen {
            Some(last) if token.local_id < last => {
                self.last_seen = None;
                Some(self.take())
            },
            _ => {
                self.last_seen = Some(token.local_id);
                None
            }
        };
        self.current.insert(token.local_id, token);
        finished
    }

    /// Close off whatever is left
    pub fn finish(mut self) -> Option<Sentence> {
        if self.current.is_empty() { None }
        else { Some(self.take()) }
    }

    fn take(&mut self) -> Sentence {
        Sentence { tokens: ::std::mem::replace(&mut self.current, new_plain()) }
    }
}

/// Compiled patterns for reading annotated text. Build one per worker and reuse it.
pub struct SentenceParser {
    doc_tags: Regex,
    special_lines: Regex,
    token_line: Regex,
}

impl SentenceParser {
    pub fn new() -> Result<SentenceParser> {
        Ok(SentenceParser {
            doc_tags: Regex::new(r"</?ß>\s+")?,
            special_lines: Regex::new(r"(?m)^\$.*\s")?,
            token_line: Regex::new(r"(?m)^(.*?) +.*?(@.*?)\s+#(\d+)->(\d+)")?,
        })
    }

    /// Lowercase, strip markup, and rewrite token lines as `id|word|relations|head`.
    ///
    /// Whatever follows the head pointer on a line is left in place.
    pub fn normalize(&self, text: &str) -> String {
        let text = text.to_lowercase();
        let text = self.doc_tags.replace_all(&text, "");
        let text = self.special_lines.replace_all(&text, "");
        self.token_line.replace_all(&text, "${3}|${1}|${2}|${4}").into_owned()
    }

    /// The sentence a block of annotated text ends with.
    ///
    /// Tokens before the last reset are dropped, and lines that aren't tokens are skipped
    /// without complaint. None if the block has no tokens.
    pub fn parse(&self, text: &str) -> Option<Sentence> {
        let mut scope = SentenceScope::new();
        for line in self.normalize(text).split('\n') {
            if let Some(token) = parse_token_line(line) {
                scope.push(token);
            }
        }
        scope.finish()
    }
}

/// Read one rewritten line. It needs exactly four fields and a numeric id.
pub fn parse_token_line(line: &str) -> Option<TokenRecord> {
    let fields: Vec<&str> = line.split('|').collect();
    if fields.len() != 4 {
        return None;
    }
    let local_id = fields[0].parse().ok()?;
    Some(TokenRecord::from_fields(local_id, fields[1], fields[2], fields[3]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(id: u32, head: u32) -> TokenRecord {
        TokenRecord::from_fields(id, &format!("w{}", id), "@x", &head.to_string())
    }

    fn ids(sentence: &Sentence) -> Vec<u32> {
        let mut ids: Vec<u32> = sentence.tokens().map(|t| t.local_id).collect();
        ids.sort();
        ids
    }

    #[test]
    fn compound_words_keep_the_joined_form() {
        let t = TokenRecord::from_fields(1, "guarda=chuva", "@subj>", "2");
        assert_eq!(t.surface_forms, vec!["guarda", "chuva", "guarda=chuva"]);
        let t = TokenRecord::from_fields(1, "casa", "@subj>", "2");
        assert_eq!(t.surface_forms, vec!["casa"]);
    }

    #[test]
    fn relations_lose_their_marker() {
        let t = TokenRecord::from_fields(3, "de", "@n< @<advl", "2");
        assert_eq!(t.context_labels, vec!["n<", "<advl"]);
        assert_eq!(t.head_ref, Some(2));
    }

    #[test]
    fn trailing_text_loses_the_head() {
        let t = TokenRecord::from_fields(3, "de", "@n<", "2 extra");
        assert_eq!(t.head_ref, None);
    }

    #[test]
    fn lower_id_starts_a_new_sentence() {
        let mut scope = SentenceScope::new();
        let mut dropped = vec![];
        for &id in &[1, 2, 3, 1, 2] {
            dropped.extend(scope.push(token(id, 1)));
        }
        assert_eq!(dropped.len(), 1);
        assert_eq!(ids(&dropped[0]), vec![1, 2, 3]);
        let last = scope.finish().unwrap();
        assert_eq!(ids(&last), vec![1, 2]);
        assert_eq!(last.get(2).unwrap().surface_forms, vec!["w2"]);
    }

    #[test]
    fn equal_ids_replace_instead_of_splitting() {
        let mut scope = SentenceScope::new();
        assert!(scope.push(token(1, 0)).is_none());
        assert!(scope.push(TokenRecord::from_fields(1, "outro", "@x", "0")).is_none());
        let only = scope.finish().unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only.get(1).unwrap().surface_forms, vec!["outro"]);
    }

    #[test]
    fn reset_token_does_not_become_last_seen() {
        // After the reset at id 2, an id of 1 is not lower than "unset", so no second split.
        let mut scope = SentenceScope::new();
        let mut dropped = vec![];
        for &id in &[4, 5, 2, 1] {
            dropped.extend(scope.push(token(id, 1)));
        }
        assert_eq!(dropped.len(), 1);
        assert_eq!(ids(&dropped[0]), vec![4, 5]);
        assert_eq!(ids(&scope.finish().unwrap()), vec![1, 2]);
    }

    #[test]
    fn token_lines_are_rewritten() {
        let parser = SentenceParser::new().unwrap();
        let text = "<ß>\nEle [ele] PERS M 3S NOM @SUBJ> #1->2\n$.\n</ß>\n";
        let normalized = parser.normalize(text);
        assert_eq!(normalized.trim(), "1|ele|@subj>|2");
    }

    #[test]
    fn markup_and_noise_are_skipped() {
        let parser = SentenceParser::new().unwrap();
        let text = "<ß>\n\
                    Ele [ele] PERS M 3S NOM @SUBJ> #1->2\n\
                    correu [correr] V PS 3S IND VFIN @FS-STA #2->0\n\
                    $. #3->0\n\
                    isto não é um token\n\
                    </ß>\n";
        let s = &parser.parse(text).unwrap();
        assert_eq!(ids(s), vec![1, 2]);
        let ele = s.get(1).unwrap();
        assert_eq!(ele.context_labels, vec!["subj>"]);
        assert_eq!(s.head_of(ele).unwrap().surface_forms, vec!["correu"]);
        assert!(s.head_of(s.get(2).unwrap()).is_none());
    }

    #[test]
    fn only_the_last_sentence_of_a_block_is_kept() {
        let parser = SentenceParser::new().unwrap();
        let text = "a [a] X @A #1->2\nb [b] X @B #2->0\nc [c] X @C #3->2\n\
                    d [d] X @D #1->3\ne [e] X @E #2->1\n";
        let last = parser.parse(text).unwrap();
        assert_eq!(ids(&last), vec![1, 2]);
        assert_eq!(last.get(1).unwrap().surface_forms, vec!["d"]);
        // d points at 3, which only existed in the dropped tokens
        assert!(last.head_of(last.get(1).unwrap()).is_none());
        assert_eq!(last.head_of(last.get(2).unwrap()).unwrap().surface_forms, vec!["d"]);
    }

    #[test]
    fn empty_text_has_no_sentences() {
        let parser = SentenceParser::new().unwrap();
        assert!(parser.parse("").is_none());
        assert!(parser.parse("<ß>\n</ß>\n").is_none());
    }
}
