use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_EDIT_DISTANCE: usize = 2;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpellingDictionary {
    words: BTreeMap<String, u32>,
}

impl SpellingDictionary {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self) -> usize { self.words.len() }

    pub fn is_empty(&self) -> bool { self.words.is_empty() }

    pub fn add(&mut self, word: &str, count: u32) {
        if count == 0 { return; }
        *self.words.entry(word.to_string()).or_insert(0) += count;
    }

    /// Decrement a word, dropping it once its frequency reaches zero.
    pub fn remove(&mut self, word: &str, count: u32) {
        if let Some(freq) = self.words.get_mut(word) {
            *freq = freq.saturating_sub(count);
            if *freq == 0 {
                self.words.remove(word);
            }
        }
    }

    pub fn frequency(&self, word: &str) -> u32 {
        self.words.get(word).copied().unwrap_or(0)
    }

    pub fn contains(&self, word: &str) -> bool { self.words.contains_key(word) }

    /// Closest known word for an out-of-vocabulary `word`. Known words and
    /// words with nothing within `MAX_EDIT_DISTANCE` yield `None`.
    pub fn suggest(&self, word: &str) -> Option<&str> {
        if word.is_empty() || self.contains(word) {
            return None;
        }
        let word_len = word.chars().count();
        let mut best: Option<(usize, u32, &str)> = None;
        for (candidate, &freq) in &self.words {
            if candidate.chars().count().abs_diff(word_len) > MAX_EDIT_DISTANCE {
                continue;
            }
            let Some(distance) = levenshtein_distance_limited(word, candidate, MAX_EDIT_DISTANCE) else {
                continue;
            };
            let better = match best {
                None => true,
                // BTreeMap iteration is lexical, so equal entries keep the earlier word.
                Some((d, f, _)) => distance < d || (distance == d && freq > f),
            };
            if better {
                best = Some((distance, freq, candidate.as_str()));
            }
        }
        best.map(|(_, _, w)| w)
    }
}

/// Edit distance between two strings, or `None` once it exceeds `max_distance`.
pub fn levenshtein_distance_limited(s1: &str, s2: &str, max_distance: usize) -> Option<usize> {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1.abs_diff(len2) > max_distance {
        return None;
    }
    if len1 == 0 { return Some(len2); }
    if len2 == 0 { return Some(len1); }

    let mut prev: Vec<usize> = (0..=len2).collect();
    let mut curr = vec![0usize; len2 + 1];

    for i in 1..=len1 {
        curr[0] = i;
        let mut min_in_row = curr[0];
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            min_in_row = min_in_row.min(curr[j]);
        }
        if min_in_row > max_distance {
            return None;
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    if prev[len2] <= max_distance { Some(prev[len2]) } else { None }
}
