use crate::normalize::clean;
use crate::outcome::{ExtractionOutcome, ExtractionRequest, FetchFailure};
use crate::Extractor;
use clipper_common::ArticleRecord;
use clipper_http::same_url;

impl Extractor {
    /// Last resort after a failed pass: one more full pass against the
    /// failure's alternate URL, then a stub record.
    pub(crate) async fn recover(&self, request: &ExtractionRequest, failure: FetchFailure) -> ArticleRecord {
        let alternate = failure
            .alternate_url
            .as_deref()
            .map(clean)
            .filter(|alt| !same_url(alt, &request.url));

        let Some(alternate) = alternate else {
            tracing::warn!(url=%request.url, error=%failure, "extract.recovery.stub");
            return ArticleRecord::stub(&request.url);
        };

        tracing::info!(url=%request.url, alternate=%alternate, "extract.recovery.retry");
        let (retry, outcome) = self.pass(&alternate, self.policy.recovery_max_retries).await;
        match outcome {
            ExtractionOutcome::Success(record) => record,
            ExtractionOutcome::Failure(f) => {
                tracing::warn!(
                    url=%request.url,
                    alternate=%retry.url,
                    attempted=?retry.attempted,
                    error=%f,
                    "extract.recovery.stub"
                );
                ArticleRecord::stub(alternate)
            }
        }
    }
}
