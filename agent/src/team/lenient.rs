use crate::analyzer::gateway::truncate;
use crate::team::analyst::{validate, ToolArgs};
use crate::types::{Confidence, Sentiment, StructuredAnalysis, StructuredOutcome};
use regex::Regex;
use std::sync::LazyLock;
use tracing::debug;

static BULLISH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bullish|upside|likely to rise|optimistic)\b").expect("valid regex")
});

static BEARISH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearish|downside|likely to fall|pessimistic)\b").expect("valid regex")
});

const EXTRACTED_REASONING: &str = "Extracted from an unstructured model response.";

/// Pull the first balanced JSON object out of free text, or a fenced json block
pub fn extract_json(text: &str) -> Option<&str> {
    if let Some(start) = text.find('{') {
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        for (i, ch) in text[start..].char_indices() {
            if in_string {
                match ch {
                    _ if escaped => escaped = false,
                    '\\' => escaped = true,
                    '"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match ch {
                '"' => in_string = true,
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&text[start..=start + i]);
                    }
                }
                _ => {}
            }
        }
    }
    if let Some(s) = text.find("```json") {
        let body = &text[s + 7..];
        if let Some(e) = body.find("```") {
            return Some(body[..e].trim());
        }
    }
    None
}

/// Recover a judgment from a reply that skipped the tool call.
///
/// Tries embedded JSON in the tool's shape first, then per-label percentage
/// patterns. Either way the result is marked low confidence.
pub fn parse_free_text(text: &str, labels: &[String], model: &str) -> Option<StructuredAnalysis> {
    if labels.is_empty() || text.trim().is_empty() {
        return None;
    }

    if let Some(raw) = extract_json(text) {
        match serde_json::from_str::<ToolArgs>(raw) {
            Ok(args) => {
                if let Ok(mut analysis) = validate(args, labels, model) {
                    analysis.confidence = Confidence::Low;
                    return Some(analysis);
                }
            }
            Err(e) => debug!("{model}: embedded JSON unusable: {e}"),
        }
    }

    parse_percentages(text, labels)
}

fn label_pattern(label: &str) -> Option<Regex> {
    let escaped = regex::escape(label.trim());
    if escaped.is_empty() {
        return None;
    }
    let starts_word = label.trim().chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = label.trim().chars().last().is_some_and(|c| c.is_alphanumeric());
    let pattern = format!(
        r"(?i){}{}{}\D{{0,60}}?(\d{{1,3}}(?:\.\d+)?)\s*%",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" },
    );
    Regex::new(&pattern).ok()
}

fn find_percentage(text: &str, label: &str) -> Option<f64> {
    let re = label_pattern(label)?;
    let found = re
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse::<f64>().ok())
        .find(|p| (0.0..=100.0).contains(p));
    found
}

fn parse_percentages(text: &str, labels: &[String]) -> Option<StructuredAnalysis> {
    let found: Vec<Option<f64>> = labels.iter().map(|l| find_percentage(text, l)).collect();

    // Unmatched labels share whatever mass the matched ones leave
    let matched_sum: f64 = found.iter().flatten().sum();
    let unmatched = found.iter().filter(|p| p.is_none()).count();
    let share = if unmatched == 0 {
        0.0
    } else if unmatched == labels.len() {
        100.0 / labels.len() as f64
    } else {
        (100.0 - matched_sum).max(0.0) / unmatched as f64
    };

    let outcomes: Vec<StructuredOutcome> = labels
        .iter()
        .zip(&found)
        .map(|(label, p)| StructuredOutcome {
            label: label.clone(),
            probability: p.unwrap_or(share),
            reasoning: EXTRACTED_REASONING.to_string(),
            data_points: Vec::new(),
        })
        .collect();

    let top_pick = outcomes
        .iter()
        .fold(None::<&StructuredOutcome>, |best, o| match best {
            Some(b) if b.probability >= o.probability => Some(b),
            _ => Some(o),
        })?
        .label
        .clone();

    let sentiment = match (BULLISH.is_match(text), BEARISH.is_match(text)) {
        (true, false) => Sentiment::Bullish,
        (false, true) => Sentiment::Bearish,
        _ => Sentiment::Neutral,
    };

    Some(StructuredAnalysis {
        summary: truncate(text.trim(), 600).to_string(),
        outcomes,
        top_pick,
        sentiment,
        confidence: Confidence::Low,
        assumptions: Vec::new(),
        key_risks: Vec::new(),
    })
}
