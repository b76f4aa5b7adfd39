//! LLM-backed filtering of catalog candidates.
//!
//! Catalog searches return loosely matching listings, including summaries and
//! study guides. A [`RelevanceJudge`] decides per candidate whether it is the
//! requested book; [`select_candidate`] picks the first accepted one.

mod error;
mod openai;

pub use error::RelevanceError;
pub use openai::{
    DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL, OpenAiJudge, is_affirmative, user_prompt,
};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::catalog::CatalogCandidate;

/// Decides whether a listing is the book the reader asked for.
#[async_trait]
pub trait RelevanceJudge: Send + Sync {
    /// Returns `true` when `candidate_title` is the (full, English) book `requested`.
    async fn is_desired_book(
        &self,
        requested: &str,
        candidate_title: &str,
    ) -> Result<bool, RelevanceError>;
}

/// Returns the first candidate, in catalog order, that the judge accepts.
///
/// Scanning stops at the first acceptance. A judge error rejects that
/// candidate only.
pub async fn select_candidate(
    judge: &dyn RelevanceJudge,
    requested: &str,
    candidates: Vec<CatalogCandidate>,
) -> Option<CatalogCandidate> {
    for candidate in candidates {
        match judge.is_desired_book(requested, &candidate.title).await {
            Ok(true) => {
                info!(requested, candidate = %candidate.title, "Candidate accepted");
                return Some(candidate);
            }
            Ok(false) => debug!(requested, candidate = %candidate.title, "Candidate rejected"),
            Err(error) => warn!(
                requested,
                candidate = %candidate.title,
                error = %error,
                "Relevance check failed; treating as rejected"
            ),
        }
    }
    None
}
