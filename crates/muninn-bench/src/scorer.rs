//! Scoring rules for each `AnswerType`.

use std::collections::HashSet;

use regex::Regex;

use crate::task::AnswerType;

/// The outcome of scoring one answer: `score` is always in `[0, 1]`;
/// `correct` applies the answer-type's own correctness threshold (which is
/// not always `score == 1.0` — `numeric` grants partial credit but is only
/// "correct" within its tolerance band).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreResult {
    pub score: f64,
    pub correct: bool,
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn extract_first_number(s: &str) -> Option<f64> {
    let cleaned: String = s.chars().filter(|c| *c != ',' && *c != '$' && *c != '%').collect();
    let number_re = Regex::new(r"-?\d+(?:\.\d+)?").expect("valid regex");
    number_re.find(&cleaned).and_then(|m| m.as_str().parse::<f64>().ok())
}

fn tokenize_set(s: &str) -> HashSet<String> {
    let split_re = Regex::new(r"[,;\n ]+").expect("valid regex");
    split_re
        .split(s.trim())
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty() && t != "and" && t != "or")
        .collect()
}

/// Scores `actual` against `expected` according to `answer_type`.
pub fn score(answer_type: AnswerType, actual: &str, expected: &str) -> ScoreResult {
    match answer_type {
        AnswerType::Exact => {
            let correct = normalize(actual) == normalize(expected);
            ScoreResult {
                score: if correct { 1.0 } else { 0.0 },
                correct,
            }
        }
        AnswerType::Contains => {
            let correct = normalize(actual).contains(&normalize(expected));
            ScoreResult {
                score: if correct { 1.0 } else { 0.0 },
                correct,
            }
        }
        AnswerType::Numeric => score_numeric(actual, expected),
        AnswerType::F1 => score_f1(actual, expected),
        // No builtin generator emits `Custom`; callers that do should score
        // those tasks themselves via `CustomScorer` rather than this
        // function. Falling back to exact match keeps `score()` total.
        AnswerType::Custom => score(AnswerType::Exact, actual, expected),
    }
}

/// A caller-supplied scorer for tasks whose `answer_type` is `Custom`.
/// `runner::Runner` looks one up by task ID before falling back to `score()`.
pub type CustomScorer = dyn Fn(&str, &str) -> ScoreResult + Send + Sync;

fn score_numeric(actual: &str, expected: &str) -> ScoreResult {
    let (Some(a), Some(e)) = (extract_first_number(actual), extract_first_number(expected)) else {
        return ScoreResult { score: 0.0, correct: false };
    };
    if e == 0.0 {
        let correct = a == 0.0;
        return ScoreResult { score: if correct { 1.0 } else { 0.0 }, correct };
    }

    let d = ((a - e) / e).abs();
    let correct = d <= 0.01;
    let score = if d < 0.10 {
        1.0 - d
    } else if d < 0.50 {
        0.5 - d
    } else {
        0.0
    };
    ScoreResult { score: score.max(0.0), correct }
}

fn score_f1(actual: &str, expected: &str) -> ScoreResult {
    let a = tokenize_set(actual);
    let e = tokenize_set(expected);
    if a.is_empty() && e.is_empty() {
        return ScoreResult { score: 1.0, correct: true };
    }
    if a.is_empty() || e.is_empty() {
        return ScoreResult { score: 0.0, correct: false };
    }

    let tp = a.intersection(&e).count() as f64;
    let precision = tp / a.len() as f64;
    let recall = tp / e.len() as f64;
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };
    ScoreResult { score: f1, correct: f1 >= 0.99 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_is_case_and_whitespace_insensitive() {
        let r = score(AnswerType::Exact, "  Yes ", "yes");
        assert!(r.correct);
        assert_eq!(r.score, 1.0);
    }

    #[test]
    fn contains_finds_substring_case_insensitively() {
        let r = score(AnswerType::Contains, "the value is ABC123 here", "abc123");
        assert!(r.correct);
    }

    #[test]
    fn numeric_strips_currency_and_separators() {
        let r = score(AnswerType::Numeric, "$1,234.50", "1234.5");
        assert!(r.correct);
        assert_eq!(r.score, 1.0);
    }

    #[test]
    fn numeric_grants_partial_credit_within_ten_percent() {
        let r = score(AnswerType::Numeric, "109", "100");
        assert!(!r.correct); // 9% off, outside the 1% tolerance
        assert!(r.score > 0.85 && r.score < 0.95);
    }

    #[test]
    fn numeric_zero_score_past_fifty_percent() {
        let r = score(AnswerType::Numeric, "1000", "100");
        assert_eq!(r.score, 0.0);
        assert!(!r.correct);
    }

    #[test]
    fn f1_ignores_and_or_connectives_and_order() {
        let r = score(AnswerType::F1, "apples and oranges", "oranges, apples");
        assert!(r.correct);
        assert_eq!(r.score, 1.0);
    }

    #[test]
    fn f1_partial_overlap_scores_below_threshold() {
        let r = score(AnswerType::F1, "apples, pears", "apples, oranges");
        assert!(!r.correct);
        assert!(r.score > 0.0 && r.score < 0.99);
    }

    #[test]
    fn custom_without_a_registered_scorer_falls_back_to_exact_match() {
        let r = score(AnswerType::Custom, "42", "42");
        assert!(r.correct);
        assert_eq!(r.score, 1.0);
        let r = score(AnswerType::Custom, "42", "43");
        assert!(!r.correct);
    }
}
