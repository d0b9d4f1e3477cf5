use crate::types::normalize_text;
use serde::{Deserialize, Serialize};

/// What a request is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Look something up in meeting notes or history
    Retrieval,
    /// Generate new ideas or proposals
    Ideation,
    /// Compare, evaluate, explain
    Analysis,
    /// Answered by the orchestrator itself
    Direct,
}

impl IntentCategory {
    /// All categories, in tie-break order
    pub const ALL: [IntentCategory; 4] = [
        IntentCategory::Retrieval,
        IntentCategory::Ideation,
        IntentCategory::Analysis,
        IntentCategory::Direct,
    ];

    pub fn heading(self) -> &'static str {
        match self {
            IntentCategory::Retrieval => "Retrieval",
            IntentCategory::Ideation => "Ideation",
            IntentCategory::Analysis => "Analysis",
            IntentCategory::Direct => "Direct",
        }
    }

    pub fn is_delegated(self) -> bool {
        self != IntentCategory::Direct
    }
}

impl std::fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentCategory::Retrieval => write!(f, "retrieval"),
            IntentCategory::Ideation => write!(f, "ideation"),
            IntentCategory::Analysis => write!(f, "analysis"),
            IntentCategory::Direct => write!(f, "direct"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: IntentCategory,
    /// Share of the total score held by the winner, 0 when nothing matched
    pub confidence: f64,
    /// Raw score per category, in tie-break order
    pub scores: Vec<(IntentCategory, f64)>,
}

impl Classification {
    pub fn score(&self, category: IntentCategory) -> f64 {
        self.scores
            .iter()
            .find(|(c, _)| *c == category)
            .map(|(_, score)| *score)
            .unwrap_or(0.0)
    }

    /// Delegated categories scoring at least `threshold`, in tie-break order
    pub fn strong_delegated(&self, threshold: f64) -> Vec<IntentCategory> {
        self.scores
            .iter()
            .filter(|(category, score)| category.is_delegated() && *score >= threshold)
            .map(|(category, _)| *category)
            .collect()
    }
}

/// Maps request text to an intent. Implementations must be pure: the same
/// text always yields the same classification.
pub trait IntentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Classification;
}

const RETRIEVAL_KEYWORDS: &[(&str, f64)] = &[
    ("what did", 2.0),
    ("who said", 2.0),
    ("when did", 2.0),
    ("last meeting", 2.0),
    ("retrieve", 2.0),
    ("remind me", 1.5),
    ("look up", 1.5),
    ("find", 1.5),
    ("search", 1.5),
    ("recap", 1.5),
    ("mentioned", 1.5),
    ("decided", 1.5),
    ("transcript", 1.5),
    ("notes", 1.0),
    ("minutes", 1.0),
    ("action items", 1.0),
];

const IDEATION_KEYWORDS: &[(&str, f64)] = &[
    ("brainstorm", 2.0),
    ("ideas", 2.0),
    ("come up with", 2.0),
    ("how might we", 2.0),
    ("idea", 1.5),
    ("suggest", 1.5),
    ("propose", 1.5),
    ("what if", 1.5),
    ("alternatives", 1.5),
    ("creative", 1.5),
    ("agenda", 1.0),
    ("improve", 1.0),
];

const ANALYSIS_KEYWORDS: &[(&str, f64)] = &[
    ("analyze", 2.0),
    ("analyse", 2.0),
    ("compare", 2.0),
    ("pros and cons", 2.0),
    ("evaluate", 1.5),
    ("assess", 1.5),
    ("impact", 1.5),
    ("trend", 1.5),
    ("trends", 1.5),
    ("breakdown", 1.5),
    ("metrics", 1.5),
    ("summarize", 1.0),
    ("risk", 1.0),
    ("why", 1.0),
];

const DIRECT_KEYWORDS: &[(&str, f64)] = &[
    ("translate", 1.5),
    ("rephrase", 1.5),
    ("rewrite", 1.5),
    ("define", 1.0),
    ("hello", 1.0),
    ("thanks", 1.0),
    ("thank you", 1.0),
];

/// Weighted keyword table per category.
///
/// A keyword counts once if it appears as a whole word (or phrase) in the
/// normalized text.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    table: Vec<(IntentCategory, Vec<(String, f64)>)>,
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        let owned = |keywords: &[(&str, f64)]| {
            keywords
                .iter()
                .map(|(keyword, weight)| (keyword.to_string(), *weight))
                .collect::<Vec<_>>()
        };
        Self {
            table: vec![
                (IntentCategory::Retrieval, owned(RETRIEVAL_KEYWORDS)),
                (IntentCategory::Ideation, owned(IDEATION_KEYWORDS)),
                (IntentCategory::Analysis, owned(ANALYSIS_KEYWORDS)),
                (IntentCategory::Direct, owned(DIRECT_KEYWORDS)),
            ],
        }
    }
}

impl KeywordClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or reweight a keyword for `category`
    pub fn with_keyword(mut self, category: IntentCategory, keyword: &str, weight: f64) -> Self {
        let keyword = normalize_text(keyword);
        if let Some((_, keywords)) = self.table.iter_mut().find(|(c, _)| *c == category) {
            match keywords.iter_mut().find(|(k, _)| *k == keyword) {
                Some(existing) => existing.1 = weight,
                None => keywords.push((keyword, weight)),
            }
        }
        self
    }

    fn score(&self, padded: &str, category: IntentCategory) -> f64 {
        self.table
            .iter()
            .filter(|(c, _)| *c == category)
            .flat_map(|(_, keywords)| keywords.iter())
            .filter(|(keyword, _)| padded.contains(&format!(" {} ", keyword)))
            .map(|(_, weight)| *weight)
            .sum()
    }
}

impl IntentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> Classification {
        let padded = format!(" {} ", normalize_text(text));
        let scores: Vec<(IntentCategory, f64)> = IntentCategory::ALL
            .iter()
            .map(|category| (*category, self.score(&padded, *category)))
            .collect();

        // Strictly greater keeps the earlier category on ties
        let mut best = (IntentCategory::Direct, 0.0);
        for (category, score) in &scores {
            if *score > best.1 {
                best = (*category, *score);
            }
        }

        let total: f64 = scores.iter().map(|(_, score)| score).sum();
        let confidence = if total > 0.0 { best.1 / total } else { 0.0 };

        Classification {
            category: best.0,
            confidence,
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_match_whole_words_only() {
        let classifier = KeywordClassifier::new();
        // "findings" must not count as "find"
        let result = classifier.classify("share your findings");
        assert_eq!(result.score(IntentCategory::Retrieval), 0.0);
        assert_eq!(result.category, IntentCategory::Direct);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn ties_prefer_retrieval_then_ideation() {
        let classifier = KeywordClassifier::new();
        // search (1.5) vs suggest (1.5)
        let result = classifier.classify("search and suggest");
        assert_eq!(result.category, IntentCategory::Retrieval);
        assert_eq!(result.confidence, 0.5);

        // idea (1.5) vs evaluate (1.5)
        let result = classifier.classify("evaluate this idea");
        assert_eq!(result.category, IntentCategory::Ideation);
    }

    #[test]
    fn custom_keywords_extend_the_table() {
        let classifier =
            KeywordClassifier::new().with_keyword(IntentCategory::Analysis, "Forecast", 3.0);
        let result = classifier.classify("forecast next quarter");
        assert_eq!(result.category, IntentCategory::Analysis);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn strong_delegated_excludes_direct() {
        let classifier = KeywordClassifier::new();
        let result = classifier.classify("what did we decide last meeting? also brainstorm ideas");
        let strong = result.strong_delegated(2.0);
        assert_eq!(strong, vec![IntentCategory::Retrieval, IntentCategory::Ideation]);
    }
}
