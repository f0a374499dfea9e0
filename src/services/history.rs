use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use tokio::time::{sleep, Duration};

use crate::services::retry::{with_backoff, RetryPolicy};
use crate::types::error::SourceError;
use crate::types::records::RawActivityRecord;

/// One page of history as returned by a source.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<RawActivityRecord>,
    /// How many entries the source listed for this page. Can exceed
    /// `records.len()` when a source fails to hydrate some of them.
    pub listed: usize,
    /// `before` cursor for the next request.
    pub cursor: Option<String>,
}

impl Page {
    pub fn from_records(records: Vec<RawActivityRecord>) -> Self {
        let cursor = records
            .last()
            .and_then(|record| record.pagination_key())
            .map(str::to_string);
        Self { listed: records.len(), records, cursor }
    }
}

/// A paginated, newest-first history of an address.
#[async_trait]
pub trait HistorySource: Send + Sync {
    fn name(&self) -> &'static str;

    /// Entries requested per page. A shorter page means there is nothing older.
    fn page_size(&self) -> usize;

    async fn fetch_page(&self, address: &str, before: Option<&str>) -> Result<Page, SourceError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FetchPolicy {
    pub page_delay: Duration,
    pub retry: RetryPolicy,
    /// Stop pulling pages once this many records are collected.
    pub max_records: Option<usize>,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            page_delay: Duration::from_millis(200),
            retry: RetryPolicy::new(3, Duration::from_secs(1)),
            max_records: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<RawActivityRecord>,
    pub pages: usize,
    /// False when pagination stopped on an error and `records` is a prefix of the history.
    pub complete: bool,
    /// True when `max_records` cut the walk short.
    pub truncated: bool,
}

struct PageState {
    cursor: Option<String>,
    page: usize,
    done: bool,
}

pub struct HistoryFetcher {
    source: Arc<dyn HistorySource>,
    policy: FetchPolicy,
}

impl HistoryFetcher {
    pub fn new(source: Arc<dyn HistorySource>, policy: FetchPolicy) -> Self {
        Self { source, policy }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Lazily walks the history backwards, one item per page. A failed page
    /// (after retries) is yielded as the final item.
    pub fn pages<'a>(
        &'a self,
        address: &'a str,
    ) -> impl Stream<Item = Result<Vec<RawActivityRecord>, SourceError>> + 'a {
        let initial = PageState { cursor: None, page: 0, done: false };

        stream::unfold(initial, move |state| async move {
            if state.done {
                return None;
            }
            if state.page > 0 {
                sleep(self.policy.page_delay).await;
            }

            let page_number = state.page + 1;
            let label = format!("{} page {} for {}", self.source.name(), page_number, address);
            let cursor = state.cursor;
            let result = with_backoff(&self.policy.retry, &label, SourceError::is_retryable, || {
                self.source.fetch_page(address, cursor.as_deref())
            })
            .await;

            match result {
                Ok(page) => {
                    if page.listed == 0 {
                        tracing::debug!("{} exhausted after {} pages", self.source.name(), state.page);
                        return None;
                    }
                    let last_page = page.listed < self.source.page_size() || page.cursor.is_none();
                    tracing::info!(
                        "Page {}: fetched {} records from {} ({} listed)",
                        page_number,
                        page.records.len(),
                        self.source.name(),
                        page.listed
                    );
                    let next = PageState {
                        cursor: page.cursor,
                        page: page_number,
                        done: last_page,
                    };
                    Some((Ok(page.records), next))
                }
                Err(e) => {
                    tracing::warn!("{} stopped at page {}: {}", self.source.name(), page_number, e);
                    let next = PageState { cursor: None, page: page_number, done: true };
                    Some((Err(e), next))
                }
            }
        })
    }

    /// Collects every page. Errors never discard what was already fetched.
    pub async fn fetch(&self, address: &str) -> FetchOutcome {
        let mut outcome = FetchOutcome { complete: true, ..Default::default() };
        let pages = self.pages(address);
        futures::pin_mut!(pages);

        while let Some(page) = pages.next().await {
            match page {
                Ok(records) => {
                    outcome.pages += 1;
                    outcome.records.extend(records);
                    if let Some(cap) = self.policy.max_records {
                        if outcome.records.len() >= cap {
                            outcome.records.truncate(cap);
                            outcome.truncated = true;
                            break;
                        }
                    }
                }
                Err(_) => outcome.complete = false,
            }
        }

        tracing::info!(
            "Fetched {} records for {} in {} pages (complete: {}, truncated: {})",
            outcome.records.len(),
            address,
            outcome.pages,
            outcome.complete,
            outcome.truncated
        );
        outcome
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    pub(crate) fn enriched_page(start: usize, len: usize) -> Page {
        let records = (start..start + len)
            .map(|i| RawActivityRecord::Enriched(json!({ "signature": format!("sig{}", i) })))
            .collect();
        Page::from_records(records)
    }

    pub(crate) struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Page, SourceError>>>,
        pub(crate) cursors: Mutex<Vec<Option<String>>>,
    }

    impl ScriptedSource {
        pub(crate) fn new(responses: Vec<Result<Page, SourceError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                cursors: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.cursors.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl HistorySource for ScriptedSource {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn page_size(&self) -> usize {
            100
        }

        async fn fetch_page(&self, _address: &str, before: Option<&str>) -> Result<Page, SourceError> {
            self.cursors.lock().unwrap().push(before.map(str::to_string));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Page::default()))
        }
    }

    fn fast_policy() -> FetchPolicy {
        FetchPolicy {
            page_delay: Duration::from_millis(1),
            retry: RetryPolicy::new(3, Duration::from_millis(1)),
            max_records: None,
        }
    }

    async fn run(source: &Arc<ScriptedSource>) -> FetchOutcome {
        let fetcher = HistoryFetcher::new(source.clone(), fast_policy());
        fetcher.fetch("wallet").await
    }

    #[tokio::test]
    async fn test_short_page_ends_pagination() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(enriched_page(0, 100)),
            Ok(enriched_page(100, 100)),
            Ok(enriched_page(200, 37)),
        ]));
        let outcome = run(&source).await;

        assert_eq!(outcome.records.len(), 237);
        assert_eq!(outcome.pages, 3);
        assert!(outcome.complete);
        assert_eq!(source.calls(), 3, "no request after the short page");
    }

    #[tokio::test]
    async fn test_cursor_is_last_signature_of_previous_page() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(enriched_page(0, 100)),
            Ok(enriched_page(100, 5)),
        ]));
        run(&source).await;

        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors, vec![None, Some("sig99".to_string())]);
    }

    #[tokio::test]
    async fn test_no_activity_is_empty_and_complete() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(Page::default())]));
        let outcome = run(&source).await;

        assert!(outcome.records.is_empty());
        assert_eq!(outcome.pages, 0);
        assert!(outcome.complete);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_full_final_page_needs_one_empty_request() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(enriched_page(0, 100)), Ok(Page::default())]));
        let outcome = run(&source).await;

        assert_eq!(outcome.records.len(), 100);
        assert_eq!(source.calls(), 2);
        assert!(outcome.complete);
    }

    #[tokio::test]
    async fn test_missing_cursor_stops() {
        let mut page = enriched_page(0, 100);
        page.cursor = None;
        let source = Arc::new(ScriptedSource::new(vec![Ok(page), Ok(enriched_page(100, 100))]));
        let outcome = run(&source).await;

        assert_eq!(outcome.records.len(), 100);
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_status_error_keeps_partial_results() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(enriched_page(0, 100)),
            Err(SourceError::Status(401)),
            Ok(enriched_page(100, 100)),
        ]));
        let outcome = run(&source).await;

        assert_eq!(outcome.records.len(), 100);
        assert!(!outcome.complete);
        assert_eq!(source.calls(), 2, "non-retryable status is not retried");
    }

    #[tokio::test]
    async fn test_transient_error_is_retried_on_same_cursor() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(enriched_page(0, 100)),
            Err(SourceError::Status(503)),
            Err(SourceError::Transport("reset".into())),
            Ok(enriched_page(100, 10)),
        ]));
        let outcome = run(&source).await;

        assert_eq!(outcome.records.len(), 110);
        assert!(outcome.complete);
        let cursors = source.cursors.lock().unwrap().clone();
        assert_eq!(cursors[1..], [Some("sig99".to_string()), Some("sig99".to_string()), Some("sig99".to_string())]);
    }

    #[tokio::test]
    async fn test_retries_exhausted_returns_what_was_collected() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(enriched_page(0, 100)),
            Err(SourceError::Status(429)),
            Err(SourceError::Status(429)),
            Err(SourceError::Status(429)),
            Ok(enriched_page(100, 100)),
        ]));
        let outcome = run(&source).await;

        assert_eq!(outcome.records.len(), 100);
        assert!(!outcome.complete);
        assert_eq!(source.calls(), 4);
    }

    #[tokio::test]
    async fn test_record_cap_stops_requesting_pages() {
        let source = Arc::new(ScriptedSource::new(vec![
            Ok(enriched_page(0, 100)),
            Ok(enriched_page(100, 100)),
            Ok(enriched_page(200, 100)),
        ]));
        let policy = FetchPolicy { max_records: Some(150), ..fast_policy() };
        let outcome = HistoryFetcher::new(source.clone(), policy).fetch("wallet").await;

        assert_eq!(outcome.records.len(), 150);
        assert!(outcome.truncated);
        assert!(outcome.complete);
        assert_eq!(source.calls(), 2);
    }

    #[tokio::test]
    async fn test_pages_stream_is_lazy() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(enriched_page(0, 100)), Ok(enriched_page(100, 100))]));
        let fetcher = HistoryFetcher::new(source.clone(), fast_policy());
        let pages = fetcher.pages("wallet");
        futures::pin_mut!(pages);

        assert_eq!(source.calls(), 0);
        let first = pages.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 100);
        assert_eq!(source.calls(), 1);
    }
}
