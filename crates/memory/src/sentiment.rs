//! Heuristic valence and intensity inference for conversational text.
//!
//! Rough signals only: they seed `emotional_valence` on freshly extracted
//! memories and give demo pipelines an emotional-complexity estimate when no
//! upstream emotion stage is wired in.

const WARM_WORDS: &[&str] = &[
    "love", "loved", "happy", "glad", "excited", "thrilled", "grateful", "thanks",
    "thank", "proud", "amazing", "wonderful", "great", "fun", "beautiful", "relieved",
    "hope", "hopeful", "miss", "adore", "enjoy", "enjoyed", "laugh", "laughed", "yay",
];

const HEAVY_WORDS: &[&str] = &[
    "sad", "lonely", "alone", "angry", "upset", "hurt", "scared", "afraid", "anxious",
    "worried", "stressed", "tired", "exhausted", "cry", "crying", "cried", "hate",
    "awful", "terrible", "sorry", "lost", "died", "funeral", "breakup", "fight", "fired",
];

const NEGATORS: &[&str] = &["not", "no", "never", "without", "hardly"];

fn words(content: &str) -> Vec<String> {
    content
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

/// Infer a valence score in `[-1.0, 1.0]`.
///
/// Warm words push up, heavy words push down, and a negator in the two-word
/// lookback window flips and dampens the contribution ("not happy" reads as
/// mildly negative, "not worried" as mildly positive).
pub fn infer_valence(content: &str) -> f64 {
    let words = words(content);
    let mut score: f64 = 0.0;
    for (i, word) in words.iter().enumerate() {
        let negated = (i > 0 && NEGATORS.contains(&words[i - 1].as_str()))
            || (i > 1 && NEGATORS.contains(&words[i - 2].as_str()));

        if WARM_WORDS.contains(&word.as_str()) {
            score += if negated { -0.10 } else { 0.18 };
        } else if HEAVY_WORDS.contains(&word.as_str()) {
            score += if negated { 0.10 } else { -0.18 };
        }
    }

    // Exclamation marks amplify whichever direction the text already leans.
    let exclamations = content.chars().filter(|&c| c == '!').count() as f64;
    let amplifier = 1.0 + (exclamations * 0.1).min(0.3);

    (score * amplifier).clamp(-1.0, 1.0)
}

/// Emotional intensity in `[0.0, 1.0]`, regardless of direction.
///
/// Density of emotional vocabulary, plus bumps for emphasis (exclamations,
/// shouted words) and for hedging questions, which tend to need a more careful
/// reply.
pub fn emotional_intensity(content: &str) -> f64 {
    let words = words(content);
    if words.is_empty() {
        return 0.0;
    }
    let charged = words
        .iter()
        .filter(|w| WARM_WORDS.contains(&w.as_str()) || HEAVY_WORDS.contains(&w.as_str()))
        .count() as f64;
    let density = (charged / words.len() as f64 * 4.0).min(0.7);

    let exclamations = content.chars().filter(|&c| c == '!').count() as f64;
    let emphasis = (exclamations * 0.05).min(0.15);

    let shouted = content
        .split_whitespace()
        .filter(|w| {
            let alpha: String = w.chars().filter(|c| c.is_alphabetic()).collect();
            alpha.chars().count() >= 4 && alpha == alpha.to_uppercase()
        })
        .count() as f64;
    let caps = (shouted * 0.05).min(0.1);

    let questions = if content.contains('?') { 0.05 } else { 0.0 };

    (density + emphasis + caps + questions).clamp(0.0, 1.0)
}
