//! Frequency tables for words and contexts
use std::io::{BufRead, Write};
use std::iter::FromIterator;

use crate::errors::*;
use crate::farm::{new_farm, FarmMap};

/// Counts over string keys.
///
/// Merging adds counts pointwise, so partial tables can be combined in any order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FrequencyTable {
    counts: FarmMap<String, u64>,
}

impl FrequencyTable {
    pub fn new() -> FrequencyTable {
        FrequencyTable { counts: new_farm() }
    }

    /// Count one occurrence
    #[inline]
    pub fn add(&mut self, key: &str) {
        self.add_count(key, 1);
    }

    pub fn add_count(&mut self, key: &str, count: u64) {
        // Look before allocating, most keys are already there
        if let Some(existing) = self.counts.get_mut(key) {
            *existing += count;
            return;
        }
        self.counts.insert(key.to_owned(), count);
    }

    /// Zero for missing keys
    pub fn get(&self, key: &str) -> u64 {
        self.counts.get(key).cloned().unwrap_or(0)
    }

    /// Membership as a vocabulary: present with a positive count
    pub fn contains(&self, key: &str) -> bool {
        self.get(key) > 0
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item=(&str, u64)> {
        self.counts.iter().map(|(k, &c)| (k.as_str(), c))
    }

    /// Add another table into this one
    pub fn merge(&mut self, other: FrequencyTable) {
        if self.counts.is_empty() {
            self.counts = other.counts;
            return;
        }
        for (key, count) in other.counts {
            *self.counts.entry(key).or_insert(0) += count;
        }
    }

    /// Entries by descending count. Equal counts are ordered by key so the listing is stable.
    pub fn most_common(&self) -> Vec<(&str, u64)> {
        let mut entries: Vec<(&str, u64)> = self.iter().collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }

    /// Walk down the most common entries and drop everything from the first one below
    /// `min_count` onwards. Returns how many were dropped.
    pub fn apply_cutoff(&mut self, min_count: u64) -> usize {
        let doomed: Vec<String> = self.most_common()
            .into_iter()
            .skip_while(|&(_, count)| count >= min_count)
            .map(|(key, _)| key.to_owned())
            .collect();
        for key in doomed.iter() {
            self.counts.remove(key);
        }
        doomed.len()
    }

    /// Write `key count` lines, most common first
    pub fn write_listing<W: Write>(&self, out: &mut W) -> Result<()> {
        for (key, count) in self.most_common() {
            writeln!(out, "{} {}", key, count)?;
        }
        Ok(())
    }

    /// Read back a `key count` listing.
    ///
    /// The count is the last space separated field, so keys may contain spaces. Blank lines
    /// are ignored.
    pub fn read_listing<R: BufRead>(input: R) -> Result<FrequencyTable> {
        let mut table = FrequencyTable::new();
        for (line_i, line) in input.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match line.rfind(' ') {
                Some(split) => {
                    let count = line[split+1..].trim().parse()?;
                    table.add_count(&line[..split], count);
                },
                None => return Err(Error::Other(format!(
                    "Line {} of the listing should look like `key count` but is: {}",
                    line_i + 1, line))),
            }
        }
        Ok(table)
    }
}

impl<S: AsRef<str>> FromIterator<(S, u64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item=(S, u64)>>(iter: I) -> Self {
        let mut table = FrequencyTable::new();
        for (key, count) in iter {
            table.add_count(key.as_ref(), count);
        }
        table
    }
}

impl<'a> Extend<&'a str> for FrequencyTable {
    fn extend<I: IntoIterator<Item=&'a str>>(&mut self, iter: I) {
        for key in iter {
            self.add(key);
        }
    }
}
