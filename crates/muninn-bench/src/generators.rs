//! Deterministic synthetic task generators.
//!
//! Every generator takes a `u64` seed and a target context size (in
//! approximate whitespace tokens); the same (seed, target_tokens) pair always
//! produces byte-identical output.

use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rand::{Rng, SeedableRng};

use crate::task::{AnswerType, ContextBucket, GeneratorKind, Task};

const FILLER_VOCAB: &[&str] = &[
    "lattice", "harbor", "cobalt", "quiet", "margin", "orbit", "cedar", "velvet", "drift",
    "anchor", "parchment", "signal", "hollow", "copper", "valley", "ember", "chisel", "tundra",
    "paper", "granite",
];

fn filler_words(rng: &mut StdRng, approx_tokens: usize) -> Vec<String> {
    (0..approx_tokens)
        .map(|_| FILLER_VOCAB.choose(rng).expect("non-empty vocab").to_string())
        .collect()
}

/// Produces one task per call. Every implementation must be deterministic in
/// `seed` and `target_tokens`.
pub trait TaskGenerator {
    fn kind(&self) -> GeneratorKind;
    fn generate(&self, seed: u64, target_tokens: usize) -> Task;
}

/// Embeds a known count of a marker token in filler; asks how many times it
/// appears. Cost of verification is linear in context length.
pub struct CountingGenerator;

impl TaskGenerator for CountingGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Counting
    }

    fn generate(&self, seed: u64, target_tokens: usize) -> Task {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut words = filler_words(&mut rng, target_tokens.max(20));
        let marker_count = rng.random_range(3..=20);
        let mut positions: Vec<usize> = (0..words.len()).collect();
        positions.shuffle(&mut rng);
        for &idx in positions.iter().take(marker_count) {
            words[idx] = "MARKER".to_string();
        }
        let body = words.join(" ");
        let prompt = format!(
            "{body}\n\nHow many times does the exact word MARKER appear in the text above? Answer with a number."
        );

        Task {
            id: format!("counting-{seed}-{target_tokens}"),
            generator: GeneratorKind::Counting,
            context_tokens: prompt.split_whitespace().count(),
            prompt,
            expected_answer: marker_count.to_string(),
            answer_type: AnswerType::Numeric,
            complexity: 3,
            metadata: serde_json::json!({ "marker_count": marker_count }),
        }
    }
}

/// Places a single rare key-value pair at a parameterised position in filler
/// and asks for the value. Verification cost is constant regardless of
/// context length.
pub struct NeedleGenerator;

impl TaskGenerator for NeedleGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Needle
    }

    fn generate(&self, seed: u64, target_tokens: usize) -> Task {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut words = filler_words(&mut rng, target_tokens.max(20));

        let code = format!("CODE-{:04}", rng.random_range(0..10_000));
        let secret = format!("{:08x}", rng.random::<u32>());
        let needle = format!("{code}: {secret}");

        // Place somewhere past the first quarter of the filler so recall
        // can't rely on proximity to the prompt's start.
        let min_pos = words.len() / 4;
        let pos = if words.len() > min_pos {
            rng.random_range(min_pos..words.len())
        } else {
            0
        };
        words.insert(pos, needle);

        let body = words.join(" ");
        let prompt = format!("{body}\n\nWhat is the value associated with {code}?");

        Task {
            id: format!("needle-{seed}-{target_tokens}"),
            generator: GeneratorKind::Needle,
            context_tokens: prompt.split_whitespace().count(),
            prompt,
            expected_answer: secret.clone(),
            answer_type: AnswerType::Contains,
            complexity: 5,
            metadata: serde_json::json!({ "code": code, "position": pos }),
        }
    }
}

/// Generates `n` items and a set of existing pairs among them, then asks a
/// yes/no question about whether a particular pair exists. Construction is
/// quadratic in the number of items considered.
pub struct PairingGenerator;

impl TaskGenerator for PairingGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Pairing
    }

    fn generate(&self, seed: u64, target_tokens: usize) -> Task {
        let mut rng = StdRng::seed_from_u64(seed);
        let n = (target_tokens / 30).clamp(6, 200);
        let items: Vec<String> = (0..n).map(|i| format!("item-{i}")).collect();

        let mut pairs = Vec::new();
        for a in 0..n {
            for b in (a + 1)..n {
                if rng.random_range(0..100) < 4 {
                    pairs.push((items[a].clone(), items[b].clone()));
                }
            }
        }
        if pairs.is_empty() && n >= 2 {
            pairs.push((items[0].clone(), items[1].clone()));
        }

        let mut lines: Vec<String> =
            pairs.iter().map(|(a, b)| format!("{a} is paired with {b}.")).collect();
        let mut rest: Vec<String> = items.clone();
        rest.retain(|i| !pairs.iter().any(|(a, b)| a == i || b == i));
        for w in &rest {
            lines.push(format!("{w} stands alone."));
        }

        let ask_existing = rng.random_bool(0.5);
        let (asked_a, asked_b, expected) = if ask_existing && !pairs.is_empty() {
            let (a, b) = pairs.choose(&mut rng).expect("non-empty").clone();
            (a, b, "yes")
        } else {
            let a = items.choose(&mut rng).expect("non-empty").clone();
            let b = items
                .iter()
                .find(|candidate| {
                    **candidate != a && !pairs.iter().any(|(x, y)| (x == &a && y == *candidate) || (y == &a && x == *candidate))
                })
                .cloned()
                .unwrap_or_else(|| items.last().expect("non-empty").clone());
            (a, b, "no")
        };

        let body = lines.join(" ");
        let prompt = format!(
            "{body}\n\nDoes {asked_a} pair with {asked_b}? Answer yes or no."
        );

        Task {
            id: format!("pairing-{seed}-{target_tokens}"),
            generator: GeneratorKind::Pairing,
            context_tokens: prompt.split_whitespace().count(),
            prompt,
            expected_answer: expected.to_string(),
            answer_type: AnswerType::Exact,
            complexity: 7,
            metadata: serde_json::json!({ "item_count": n, "pair_count": pairs.len() }),
        }
    }
}

/// Embeds regional figures and asks for their sum. Linear in context length,
/// but requires combining many scattered facts rather than recalling one.
pub struct AggregationGenerator;

impl TaskGenerator for AggregationGenerator {
    fn kind(&self) -> GeneratorKind {
        GeneratorKind::Aggregation
    }

    fn generate(&self, seed: u64, target_tokens: usize) -> Task {
        let mut rng = StdRng::seed_from_u64(seed);
        let region_count = (target_tokens / 200).clamp(3, 40);

        let mut words = filler_words(&mut rng, target_tokens.max(40));
        let mut values = Vec::with_capacity(region_count);
        for i in 0..region_count {
            let value = rng.random_range(1..1000);
            values.push(value);
            let stmt = format!("Region R{i} reported a figure of {value}.");
            let pos = (i + 1) * words.len() / (region_count + 1);
            words.insert(pos.min(words.len()), stmt);
        }

        let body = words.join(" ");
        let total: i64 = values.iter().sum();
        let prompt = format!(
            "{body}\n\nWhat is the sum of all the regional figures reported above?"
        );

        Task {
            id: format!("aggregation-{seed}-{target_tokens}"),
            generator: GeneratorKind::Aggregation,
            context_tokens: prompt.split_whitespace().count(),
            prompt,
            expected_answer: total.to_string(),
            answer_type: AnswerType::Numeric,
            complexity: 6,
            metadata: serde_json::json!({ "values": values, "region_count": region_count }),
        }
    }
}

/// Round-robins over the other four generators. Pairing and aggregation are
/// only selected once the target context is at least 8000 tokens; below that
/// threshold the round-robin falls back to counting/needle.
pub struct MultiGenerator {
    counting: CountingGenerator,
    needle: NeedleGenerator,
    pairing: PairingGenerator,
    aggregation: AggregationGenerator,
}

impl Default for MultiGenerator {
    fn default() -> Self {
        Self {
            counting: CountingGenerator,
            needle: NeedleGenerator,
            pairing: PairingGenerator,
            aggregation: AggregationGenerator,
        }
    }
}

impl MultiGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `index` selects the round-robin slot; `seed` and `target_tokens`
    /// parameterise the chosen generator as usual.
    pub fn generate_at(&self, index: usize, seed: u64, target_tokens: usize) -> Task {
        const LARGE_CONTEXT_FLOOR: usize = 8_000;
        match index % 4 {
            0 => self.counting.generate(seed, target_tokens),
            1 => self.needle.generate(seed, target_tokens),
            2 if target_tokens >= LARGE_CONTEXT_FLOOR => self.pairing.generate(seed, target_tokens),
            2 => self.counting.generate(seed, target_tokens),
            _ if target_tokens >= LARGE_CONTEXT_FLOOR => self.aggregation.generate(seed, target_tokens),
            _ => self.needle.generate(seed, target_tokens),
        }
    }
}

/// Generates a full suite of `count` tasks at `target_tokens`, seeded from
/// `base_seed + index` so every task in a suite is distinct yet reproducible.
pub fn generate_suite(
    generator: &dyn TaskGenerator,
    base_seed: u64,
    target_tokens: usize,
    count: usize,
) -> Vec<Task> {
    (0..count).map(|i| generator.generate(base_seed.wrapping_add(i as u64), target_tokens)).collect()
}

pub fn task_bucket(task: &Task) -> ContextBucket {
    task.token_bucket()
}
