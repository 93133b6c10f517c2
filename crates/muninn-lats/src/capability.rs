//! Tool capability profiles and natural-language requirement matching.

use std::collections::HashMap;

use regex::Regex;

pub type Capability = String;

/// What a tool claims to be good at, and at what cost.
#[derive(Debug, Clone)]
pub struct ToolProfile {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub cost: f64,
    pub latency_ms: f64,
}

impl ToolProfile {
    pub fn new(name: impl Into<String>, capabilities: Vec<Capability>, cost: f64, latency_ms: f64) -> Self {
        Self {
            name: name.into(),
            capabilities,
            cost,
            latency_ms,
        }
    }

    fn cost_efficiency(&self) -> f64 {
        1.0 / (1.0 + self.cost / 100.0)
    }

    fn latency_efficiency(&self) -> f64 {
        1.0 / (1.0 + self.latency_ms / 500.0)
    }
}

/// A query's inferred capability needs.
#[derive(Debug, Clone, Default)]
pub struct Requirements {
    pub required: Vec<Capability>,
    pub preferred: Vec<Capability>,
    /// 1 (trivial) to 10 (very complex).
    pub estimated_complexity: u8,
    pub suggested_tool_sequence: Vec<String>,
}

/// Name→`ToolProfile` map answering capability lookups.
#[derive(Default)]
pub struct CapabilityMatcher {
    profiles: HashMap<String, ToolProfile>,
}

impl CapabilityMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, profile: ToolProfile) {
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn find_by_capability(&self, capability: &str) -> Vec<&ToolProfile> {
        self.profiles
            .values()
            .filter(|p| p.capabilities.iter().any(|c| c == capability))
            .collect()
    }

    /// Conjunctive: a tool must claim every capability in `capabilities`.
    pub fn find_by_capabilities(&self, capabilities: &[Capability]) -> Vec<&ToolProfile> {
        self.profiles
            .values()
            .filter(|p| capabilities.iter().all(|c| p.capabilities.contains(c)))
            .collect()
    }

    /// The lowest-cost tool claiming `capability`, if any.
    pub fn best_tool_for(&self, capability: &str) -> Option<&ToolProfile> {
        self.find_by_capability(capability)
            .into_iter()
            .min_by(|a, b| a.cost.partial_cmp(&b.cost).unwrap_or(std::cmp::Ordering::Equal))
    }

    /// Score in [0, 1]: a 90% penalty applies when any required capability
    /// is absent; each preferred capability met adds a 0.5 bonus, normalized
    /// to the maximum possible score.
    pub fn capability_score(&self, profile: &ToolProfile, req: &Requirements) -> f64 {
        let has_all_required = req.required.iter().all(|c| profile.capabilities.contains(c));
        let base = if has_all_required { 1.0 } else { 0.1 };

        let preferred_met = req
            .preferred
            .iter()
            .filter(|c| profile.capabilities.contains(c))
            .count() as f64;
        let max_possible = 1.0 + 0.5 * req.preferred.len() as f64;

        ((base + 0.5 * preferred_met) / max_possible).clamp(0.0, 1.0)
    }

    /// Rank every registered tool by `0.6·capability + 0.2·cost_efficiency +
    /// 0.2·latency_efficiency`, descending.
    pub fn recommend_tools(&self, req: &Requirements) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .profiles
            .values()
            .map(|profile| {
                let score = 0.6 * self.capability_score(profile, req)
                    + 0.2 * profile.cost_efficiency()
                    + 0.2 * profile.latency_efficiency();
                (profile.name.clone(), score)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }
}

/// Converts a natural-language query into a `Requirements` record via a
/// fixed regex table.
pub struct QueryAnalyzer {
    rules: Vec<(Regex, Capability, bool)>,
}

impl Default for QueryAnalyzer {
    fn default() -> Self {
        let table: &[(&str, &str, bool)] = &[
            (r"(?i)\b(search|find|look\s*up|google)\b", "search", true),
            (r"(?i)\b(calculate|compute|sum|total|average)\b", "math", true),
            (r"(?i)\b(read|open|file|directory|folder)\b", "file_io", true),
            (r"(?i)\b(remember|recall|memory|previously)\b", "memory", true),
            (r"(?i)\b(code|function|class|bug|refactor)\b", "code", true),
            (r"(?i)\b(summarize|summary|tl;?dr)\b", "summarize", false),
            (r"(?i)\b(compare|versus|vs\.?)\b", "compare", false),
        ];
        Self {
            rules: table
                .iter()
                .map(|(pattern, capability, required)| {
                    (Regex::new(pattern).expect("valid regex"), capability.to_string(), *required)
                })
                .collect(),
        }
    }
}

impl QueryAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn analyze(&self, query: &str) -> Requirements {
        let mut required = Vec::new();
        let mut preferred = Vec::new();

        for (pattern, capability, is_required) in &self.rules {
            if pattern.is_match(query) {
                if *is_required {
                    required.push(capability.clone());
                } else {
                    preferred.push(capability.clone());
                }
            }
        }

        let matched = required.len() + preferred.len();
        let word_count = query.split_whitespace().count();
        let estimated_complexity = (1 + matched * 2 + word_count / 10).min(10) as u8;

        Requirements {
            suggested_tool_sequence: required.clone(),
            required,
            preferred,
            estimated_complexity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyzer_matches_search_and_math() {
        let analyzer = QueryAnalyzer::new();
        let req = analyzer.analyze("search for the total cost of these items");
        assert!(req.required.contains(&"search".to_string()));
        assert!(req.required.contains(&"math".to_string()));
    }

    #[test]
    fn analyzer_complexity_clamped_to_ten() {
        let analyzer = QueryAnalyzer::new();
        let long_query = "search calculate read remember code summarize compare ".repeat(5);
        let req = analyzer.analyze(&long_query);
        assert_eq!(req.estimated_complexity, 10);
    }

    #[test]
    fn capability_score_penalizes_missing_required() {
        let matcher = CapabilityMatcher::new();
        let profile = ToolProfile::new("web_search", vec!["search".to_string()], 10.0, 100.0);
        let req = Requirements {
            required: vec!["math".to_string()],
            preferred: vec![],
            estimated_complexity: 1,
            suggested_tool_sequence: vec![],
        };
        let score = matcher.capability_score(&profile, &req);
        assert!((score - 0.1).abs() < 1e-9);
    }

    #[test]
    fn capability_score_full_match_is_one() {
        let matcher = CapabilityMatcher::new();
        let profile = ToolProfile::new(
            "swiss_army",
            vec!["search".to_string(), "summarize".to_string()],
            10.0,
            100.0,
        );
        let req = Requirements {
            required: vec!["search".to_string()],
            preferred: vec!["summarize".to_string()],
            estimated_complexity: 1,
            suggested_tool_sequence: vec![],
        };
        let score = matcher.capability_score(&profile, &req);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn best_tool_for_picks_lowest_cost() {
        let mut matcher = CapabilityMatcher::new();
        matcher.register(ToolProfile::new("expensive", vec!["search".to_string()], 50.0, 100.0));
        matcher.register(ToolProfile::new("cheap", vec!["search".to_string()], 5.0, 100.0));
        let best = matcher.best_tool_for("search").unwrap();
        assert_eq!(best.name, "cheap");
    }

    #[test]
    fn find_by_capabilities_is_conjunctive() {
        let mut matcher = CapabilityMatcher::new();
        matcher.register(ToolProfile::new(
            "full",
            vec!["search".to_string(), "math".to_string()],
            1.0,
            1.0,
        ));
        matcher.register(ToolProfile::new("partial", vec!["search".to_string()], 1.0, 1.0));
        let results = matcher.find_by_capabilities(&["search".to_string(), "math".to_string()]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "full");
    }

    #[test]
    fn recommend_tools_ranks_descending() {
        let mut matcher = CapabilityMatcher::new();
        matcher.register(ToolProfile::new("fast_cheap", vec!["search".to_string()], 1.0, 1.0));
        matcher.register(ToolProfile::new("slow_costly", vec!["search".to_string()], 500.0, 2000.0));
        let req = Requirements {
            required: vec!["search".to_string()],
            preferred: vec![],
            estimated_complexity: 1,
            suggested_tool_sequence: vec![],
        };
        let ranked = matcher.recommend_tools(&req);
        assert_eq!(ranked[0].0, "fast_cheap");
    }
}
