//! Conversation history compression
//!
//! Fits a history into a token budget by keeping the turns that matter:
//! those mentioning salient markers (decisions, owners, deadlines...) and
//! the most recent ones. Nothing is summarized; turns are kept or dropped
//! whole and the survivors stay in chronological order.

use crate::config::CompressionConfig;
use crate::types::ConversationTurn;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Result of compressing a history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressedContext {
    /// Kept turns, oldest first
    pub turns: Vec<ConversationTurn>,
    pub original_tokens: usize,
    pub compressed_tokens: usize,
    /// Number of turns left out
    pub dropped: usize,
}

impl CompressedContext {
    pub fn compression_ratio(&self) -> f64 {
        if self.original_tokens == 0 {
            1.0
        } else {
            self.compressed_tokens as f64 / self.original_tokens as f64
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextCompressor {
    keywords: Vec<String>,
    keyword_weight: f64,
    recency_weight: f64,
    chars_per_token: usize,
}

impl Default for ContextCompressor {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

impl ContextCompressor {
    pub fn new(config: CompressionConfig) -> Self {
        Self {
            keywords: config
                .salient_keywords
                .iter()
                .map(|keyword| keyword.to_lowercase())
                .filter(|keyword| !keyword.trim().is_empty())
                .collect(),
            keyword_weight: config.keyword_weight,
            recency_weight: config.recency_weight,
            chars_per_token: config.chars_per_token.max(1),
        }
    }

    /// `ceil(chars / chars_per_token)`
    pub fn estimate_tokens(&self, text: &str) -> usize {
        text.chars().count().div_ceil(self.chars_per_token)
    }

    fn salient_hits(&self, text: &str) -> usize {
        let lowered = text.to_lowercase();
        self.keywords
            .iter()
            .filter(|keyword| lowered.contains(keyword.as_str()))
            .count()
    }

    /// Score of the turn at `position` out of `total`; later turns score
    /// higher on recency.
    pub fn score(&self, turn: &ConversationTurn, position: usize, total: usize) -> f64 {
        let recency = if total == 0 {
            0.0
        } else {
            (position + 1) as f64 / total as f64
        };
        self.salient_hits(&turn.content) as f64 * self.keyword_weight
            + self.recency_weight * recency
    }

    pub fn compress(&self, history: &[ConversationTurn], budget_tokens: i64) -> CompressedContext {
        let costs: Vec<usize> = history
            .iter()
            .map(|turn| self.estimate_tokens(&turn.content))
            .collect();
        let original_tokens: usize = costs.iter().sum();

        if budget_tokens <= 0 || history.is_empty() {
            return CompressedContext {
                turns: Vec::new(),
                original_tokens,
                compressed_tokens: 0,
                dropped: history.len(),
            };
        }

        let budget = budget_tokens as usize;
        if original_tokens <= budget {
            return CompressedContext {
                turns: history.to_vec(),
                original_tokens,
                compressed_tokens: original_tokens,
                dropped: 0,
            };
        }

        let total = history.len();
        let mut keep = vec![false; total];
        let mut used = 0usize;

        let last = total - 1;
        if costs[last] <= budget {
            keep[last] = true;
            used += costs[last];
        }

        let mut ranked: Vec<(usize, f64)> = history
            .iter()
            .enumerate()
            .filter(|(index, _)| !keep[*index])
            .map(|(index, turn)| (index, self.score(turn, index, total)))
            .collect();
        // Stable sort keeps older turns first among equal scores
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        for (index, _) in ranked {
            if used + costs[index] <= budget {
                keep[index] = true;
                used += costs[index];
            }
        }

        let turns: Vec<ConversationTurn> = history
            .iter()
            .zip(&keep)
            .filter(|(_, kept)| **kept)
            .map(|(turn, _)| turn.clone())
            .collect();
        let dropped = total - turns.len();

        debug!(
            original_tokens,
            compressed_tokens = used,
            budget,
            dropped,
            "compressed conversation history"
        );

        CompressedContext {
            turns,
            original_tokens,
            compressed_tokens: used,
            dropped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compressor() -> ContextCompressor {
        ContextCompressor::new(CompressionConfig {
            chars_per_token: 1,
            ..Default::default()
        })
    }

    #[test]
    fn non_positive_budget_is_empty() {
        let history = vec![ConversationTurn::user("hello")];
        let result = compressor().compress(&history, 0);
        assert!(result.turns.is_empty());
        assert_eq!(result.dropped, 1);
        assert!(compressor().compress(&history, -5).turns.is_empty());
    }

    #[test]
    fn everything_fits_unchanged() {
        let history = vec![ConversationTurn::user("abc"), ConversationTurn::assistant("def")];
        let result = compressor().compress(&history, 100);
        assert_eq!(result.turns, history);
        assert_eq!(result.original_tokens, 6);
        assert_eq!(result.compressed_tokens, 6);
    }

    #[test]
    fn salient_turns_beat_older_filler() {
        let history = vec![
            ConversationTurn::user("we agreed the deadline is friday"),
            ConversationTurn::assistant("some small talk about weather"),
            ConversationTurn::user("more chatter about lunch plans"),
            ConversationTurn::user("latest"),
        ];
        // room for the latest turn and one more
        let result = compressor().compress(&history, 40);
        let contents: Vec<_> = result.turns.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["we agreed the deadline is friday", "latest"]);
        assert_eq!(result.dropped, 2);
        assert!(result.compressed_tokens <= 40);
    }

    #[test]
    fn oversized_latest_turn_is_skipped() {
        let history = vec![
            ConversationTurn::user("short"),
            ConversationTurn::user("this final turn is far too long for the budget"),
        ];
        let result = compressor().compress(&history, 10);
        assert_eq!(result.turns, vec![ConversationTurn::user("short")]);
    }

    #[test]
    fn token_estimate_rounds_up() {
        let compressor = ContextCompressor::default();
        assert_eq!(compressor.estimate_tokens(""), 0);
        assert_eq!(compressor.estimate_tokens("abcde"), 2);
    }
}
