pub mod browser;
pub mod extract;
pub mod retry;
pub mod scrape;
pub mod search;

/// Upper bound on in-flight items when processing a batch. Items are
/// independent, but we avoid hammering target sites or the search engine.
pub(crate) const BATCH_CONCURRENCY: usize = 4;
