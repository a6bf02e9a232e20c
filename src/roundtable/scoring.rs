//! Heuristic scoring used to rank agents and to judge how well an output answers
//! its input.
//!
//! Nothing here calls a model; every score is computed from the text alone and is
//! clamped to `[0.1, 1.0]` by [`normalize_score`].
//!
//! - [`score_agent`] = 0.4 · domain weight + 0.3 · experience + 0.3 · expertise
//! - [`relevance`] = 0.5 · cosine similarity + 0.2 · length score + 0.3 · structure score
//!
//! ```
//! use roundtable::scoring::{domain_weight, relevance};
//!
//! assert_eq!(domain_weight("system_architecture"), 0.95);
//! assert_eq!(domain_weight("astrology"), 0.5);
//!
//! let text = "Shard the accounts table by region.\n\nKeep billing records in one primary database.";
//! assert!(relevance(text, text) > 0.9);
//! ```

use crate::client_wrapper::{Message, Role};
use crate::roundtable::agent::Agent;
use std::collections::HashMap;

/// Weight of each known domain tag. Unknown tags weigh [`DEFAULT_DOMAIN_WEIGHT`].
pub const DOMAIN_WEIGHTS: &[(&str, f64)] = &[
    ("product_management", 0.9),
    ("ui_ux_design", 0.85),
    ("ai_development", 0.95),
    ("data_science", 0.9),
    ("operation_management", 0.8),
    ("business_analysis", 0.85),
    ("system_architecture", 0.95),
    ("security", 0.9),
    ("testing", 0.8),
];

pub const DEFAULT_DOMAIN_WEIGHT: f64 = 0.5;

/// Score used when there is nothing to measure (no history, no description).
pub const NEUTRAL_SCORE: f64 = 0.5;

pub const MIN_SCORE: f64 = 0.1;
pub const MAX_SCORE: f64 = 1.0;

const MIN_WORD_LENGTH: usize = 3;
const MAX_WORD_LENGTH: usize = 20;
const MIN_TERM_FREQ: f64 = 0.001;
const MAX_TERM_FREQ: f64 = 0.8;

const TECHNICAL_PREFIXES: &[&str] = &["micro", "multi", "inter", "cyber", "tech", "auto", "meta"];

pub fn domain_weight(tag: &str) -> f64 {
    DOMAIN_WEIGHTS
        .iter()
        .find(|(name, _)| *name == tag)
        .map(|(_, weight)| *weight)
        .unwrap_or(DEFAULT_DOMAIN_WEIGHT)
}

/// Mean domain weight of `capabilities`; [`DEFAULT_DOMAIN_WEIGHT`] when there are none.
pub fn base_domain_weight(capabilities: &[String]) -> f64 {
    if capabilities.is_empty() {
        return DEFAULT_DOMAIN_WEIGHT;
    }
    let total: f64 = capabilities.iter().map(|c| domain_weight(c)).sum();
    total / capabilities.len() as f64
}

/// Share of the history made of quality assistant answers.
pub fn experience_score(history: &[Message]) -> f64 {
    if history.is_empty() {
        return NEUTRAL_SCORE;
    }
    let successful = history
        .iter()
        .filter(|m| m.role == Role::Assistant && is_quality_response(&m.content))
        .count();
    successful as f64 / history.len() as f64
}

/// Density of professional terms in an agent description.
pub fn expertise_score(description: Option<&str>) -> f64 {
    let Some(description) = description else {
        return NEUTRAL_SCORE;
    };
    let words = description.split_whitespace().count();
    if words == 0 {
        return NEUTRAL_SCORE;
    }
    extract_professional_terms(description).len() as f64 / words as f64
}

/// Capability score of an agent, in `[0.1, 1.0]`.
pub fn score_agent(agent: &dyn Agent) -> f64 {
    let base = base_domain_weight(&agent.capabilities());
    let experience = experience_score(&agent.history());
    let expertise = expertise_score(agent.description());
    normalize_score(base * 0.4 + experience * 0.3 + expertise * 0.3)
}

/// How well `output` answers `input`, in `[0.1, 1.0]`.
pub fn relevance(input: &str, output: &str) -> f64 {
    let input_vector = weighted_terms(&term_counts(input));
    let output_vector = weighted_terms(&term_counts(output));

    let similarity = cosine_similarity(&input_vector, &output_vector);
    let length = length_score(input, output);
    let structure = structure_score(input, output);

    normalize_score(similarity * 0.5 + length * 0.2 + structure * 0.3)
}

/// At least 20 words, 3 professional terms and 2 paragraphs.
pub fn is_quality_response(content: &str) -> bool {
    if content.split_whitespace().count() < 20 {
        return false;
    }
    if extract_professional_terms(content).len() < 3 {
        return false;
    }
    content.split("\n\n").count() >= 2
}

/// Cleaned words longer than 8 characters or starting with a technical prefix.
pub fn extract_professional_terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .map(clean_word)
        .filter(|word| word.chars().count() > 8 || has_technical_prefix(word))
        .collect()
}

pub fn normalize_score(score: f64) -> f64 {
    if score.is_nan() {
        return MIN_SCORE;
    }
    score.clamp(MIN_SCORE, MAX_SCORE)
}

fn has_technical_prefix(word: &str) -> bool {
    TECHNICAL_PREFIXES.iter().any(|prefix| word.starts_with(prefix))
}

fn clean_word(word: &str) -> String {
    word.chars().filter(|c| c.is_alphanumeric()).collect()
}

fn is_valid_term(term: &str) -> bool {
    (MIN_WORD_LENGTH..=MAX_WORD_LENGTH).contains(&term.chars().count())
}

fn term_counts(text: &str) -> HashMap<String, usize> {
    let mut terms = HashMap::new();
    for word in text.to_lowercase().split_whitespace() {
        let word = clean_word(word);
        if is_valid_term(&word) {
            *terms.entry(word).or_insert(0) += 1;
        }
    }
    terms
}

/// tf · ln(1 + 1/tf) for every term whose frequency lies in the accepted band.
fn weighted_terms(counts: &HashMap<String, usize>) -> HashMap<String, f64> {
    let total: usize = counts.values().sum();
    if total == 0 {
        return HashMap::new();
    }
    counts
        .iter()
        .filter_map(|(term, count)| {
            let tf = *count as f64 / total as f64;
            (MIN_TERM_FREQ..=MAX_TERM_FREQ)
                .contains(&tf)
                .then(|| (term.clone(), tf * (1.0 + 1.0 / tf).ln()))
        })
        .collect()
}

fn cosine_similarity(a: &HashMap<String, f64>, b: &HashMap<String, f64>) -> f64 {
    let dot: f64 = a
        .iter()
        .filter_map(|(term, x)| b.get(term).map(|y| x * y))
        .sum();
    let norm_a: f64 = a.values().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b: f64 = b.values().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// 1.0 when the output is one to three times as long as the input (in words).
fn length_score(input: &str, output: &str) -> f64 {
    let input_len = input.split_whitespace().count();
    if input_len == 0 {
        return 0.0;
    }
    let ratio = output.split_whitespace().count() as f64 / input_len as f64;
    if ratio < 1.0 {
        ratio
    } else if ratio > 3.0 {
        3.0 / ratio
    } else {
        1.0
    }
}

fn structure_score(input: &str, output: &str) -> f64 {
    let paragraphs = closeness(input.split("\n\n").count(), output.split("\n\n").count());
    let punctuation = closeness(count_punctuation(input), count_punctuation(output));
    (paragraphs + punctuation) / 2.0
}

/// 1 − |actual − expected| / expected. Goes negative once `actual` drifts more
/// than `expected` away; only the final relevance is clamped.
fn closeness(expected: usize, actual: usize) -> f64 {
    if expected == 0 {
        return 0.0;
    }
    let diff = (actual as f64 - expected as f64).abs();
    1.0 - diff / expected as f64
}

fn count_punctuation(text: &str) -> usize {
    text.chars().filter(|c| is_punctuation(*c)).count()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '\u{00A1}' | '\u{00A7}' | '\u{00AB}' | '\u{00B6}' | '\u{00B7}' | '\u{00BB}' | '\u{00BF}'
            | '\u{2010}'..='\u{2027}'
            | '\u{2030}'..='\u{205E}'
            | '\u{3001}'..='\u{3003}'
            | '\u{3008}'..='\u{3011}'
            | '\u{3014}'..='\u{301F}'
            | '\u{FF01}'..='\u{FF0F}'
            | '\u{FF1A}'..='\u{FF20}'
            | '\u{FF3B}'..='\u{FF3D}'
            | '\u{FF5B}'..='\u{FF65}')
}
