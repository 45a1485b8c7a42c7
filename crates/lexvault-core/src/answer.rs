//! Answer synthesis: the model trait, prompt templates, and context
//! assembly.
//!
//! The query pipeline retrieves [`ChunkHit`]s, packs as many of them as
//! fit a byte budget into a [`ContextWindow`] (least relevant dropped
//! first), and hands context and question to an [`AnswerModel`].

use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;

use crate::index::ChunkHit;

/// Returned when retrieval finds nothing the requester may see.
pub const NO_CONTEXT_ANSWER: &str =
    "I could not find relevant information in your documents to answer this question.";

const QA_TEMPLATE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.\n\n\
{context}\n\nQuestion: {question}\nHelpful Answer:";

const RISK_TEMPLATE: &str =
    "Analyze the following contract clause and identify potential risks:\n\n{text}";

const SEPARATOR: &str = "\n\n---\n\n";

/// Fill the question-answering template.
pub fn build_qa_prompt(context: &str, question: &str) -> String {
    QA_TEMPLATE
        .replace("{context}", context)
        .replace("{question}", question.trim())
}

/// Fill the contract risk-analysis template.
pub fn build_risk_prompt(text: &str) -> String {
    RISK_TEMPLATE.replace("{text}", text)
}

/// An external answer-synthesis service (LLM or offline stand-in).
#[async_trait]
pub trait AnswerModel: Send + Sync {
    fn model_name(&self) -> &str;

    /// Complete a fully rendered prompt.
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// Answer `question` from `context` using the fixed QA template.
    async fn answer(&self, context: &str, question: &str) -> Result<String> {
        self.complete(&build_qa_prompt(context, question)).await
    }

    /// Identify potential risks in a contract text.
    async fn analyze(&self, text: &str) -> Result<String> {
        self.complete(&build_risk_prompt(text)).await
    }
}

/// The bounded context handed to the answer model.
#[derive(Debug, Clone, Default)]
pub struct ContextWindow {
    pub text: String,
    /// Hits that made it into `text`, best first.
    pub used: Vec<ChunkHit>,
    /// Number of hits dropped to respect the budget.
    pub dropped: usize,
}

impl ContextWindow {
    pub fn is_empty(&self) -> bool {
        self.used.is_empty()
    }

    /// Distinct filenames of the chunks in this window.
    pub fn sources(&self) -> BTreeSet<String> {
        self.used.iter().map(|h| h.filename.clone()).collect()
    }
}

/// Pack best-first `hits` into at most `budget_bytes` of context.
///
/// Hits are taken in order until the next one would overflow the budget;
/// it and every lower-ranked hit are dropped. If even the best hit is too
/// large it is truncated (at a char boundary) rather than dropped.
pub fn assemble_context(hits: &[ChunkHit], budget_bytes: usize) -> ContextWindow {
    let mut window = ContextWindow::default();
    if budget_bytes == 0 {
        window.dropped = hits.len();
        return window;
    }

    for (i, hit) in hits.iter().enumerate() {
        let block = format_block(hit);
        let extra = if window.text.is_empty() {
            block.len()
        } else {
            SEPARATOR.len() + block.len()
        };

        if window.text.len() + extra > budget_bytes {
            if window.text.is_empty() {
                let cut = floor_char_boundary(&block, budget_bytes);
                window.text.push_str(&block[..cut]);
                window.used.push(hit.clone());
                window.dropped = hits.len() - i - 1;
            } else {
                window.dropped = hits.len() - i;
            }
            break;
        }

        if !window.text.is_empty() {
            window.text.push_str(SEPARATOR);
        }
        window.text.push_str(&block);
        window.used.push(hit.clone());
    }

    window
}

fn format_block(hit: &ChunkHit) -> String {
    format!("[source: {}]\n{}", hit.filename, hit.text)
}

/// Truncate `s` to at most `max` bytes without splitting a character.
pub fn truncate_to_budget(s: &str, max: usize) -> &str {
    &s[..floor_char_boundary(s, max)]
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(filename: &str, text: &str, score: f32) -> ChunkHit {
        ChunkHit {
            document_id: filename.to_string(),
            sequence_index: 0,
            filename: filename.to_string(),
            owner_id: "u".to_string(),
            text: text.to_string(),
            score,
        }
    }

    #[test]
    fn test_everything_fits() {
        let hits = vec![hit("a.pdf", "alpha", 0.9), hit("b.pdf", "beta", 0.5)];
        let window = assemble_context(&hits, 10_000);
        assert_eq!(window.used.len(), 2);
        assert_eq!(window.dropped, 0);
        assert!(window.text.contains("alpha"));
        assert!(window.text.contains("beta"));
        let sources: Vec<_> = window.sources().into_iter().collect();
        assert_eq!(sources, vec!["a.pdf", "b.pdf"]);
    }

    #[test]
    fn test_least_relevant_dropped_first() {
        let hits = vec![
            hit("a.pdf", &"a".repeat(40), 0.9),
            hit("b.pdf", &"b".repeat(40), 0.8),
            hit("c.pdf", "c", 0.1),
        ];
        let budget = format_block(&hits[0]).len() + SEPARATOR.len() + format_block(&hits[1]).len();
        let window = assemble_context(&hits, budget);
        assert_eq!(window.used.len(), 2);
        assert_eq!(window.dropped, 1);
        assert!(!window.sources().contains("c.pdf"));
        assert!(window.text.len() <= budget);
    }

    #[test]
    fn test_oversized_best_hit_is_truncated() {
        let hits = vec![hit("big.pdf", &"é".repeat(500), 0.9), hit("b.pdf", "b", 0.1)];
        let window = assemble_context(&hits, 101);
        assert_eq!(window.used.len(), 1);
        assert_eq!(window.dropped, 1);
        assert!(window.text.len() <= 101);
    }

    #[test]
    fn test_empty_hits() {
        let window = assemble_context(&[], 100);
        assert!(window.is_empty());
        assert!(window.sources().is_empty());
    }

    #[test]
    fn test_qa_prompt_contains_context_and_question() {
        let prompt = build_qa_prompt("CONTEXT", "  What?  ");
        assert!(prompt.contains("CONTEXT"));
        assert!(prompt.contains("Question: What?\n"));
    }

    #[test]
    fn test_truncate_to_budget_respects_char_boundaries() {
        assert_eq!(truncate_to_budget("héllo", 2), "h");
        assert_eq!(truncate_to_budget("hello", 10), "hello");
    }
}
