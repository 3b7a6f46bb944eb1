//! Inbound scrape trigger
//!
//! `start_scraper` is the direct call; `handle_trigger_body` accepts the same
//! request as a JSON body and answers with a status code and JSON body, for
//! whatever transport sits in front of it.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, warn};

use crate::crawling::CrawlingError;
use crate::crawling::coordinator::{ScrapeCoordinator, ScrapeRun};
use crate::crawling::progress::ScrapeSummary;
use crate::domain::value_objects::StudbookId;
use crate::infrastructure::config::defaults;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    #[serde(default)]
    pub start_id: Option<StudbookId>,
    #[serde(default)]
    pub end_id: Option<StudbookId>,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_num_browsers")]
    pub num_browsers: usize,
}

const fn default_delay_ms() -> u64 {
    defaults::DELAY_MS
}

const fn default_num_browsers() -> usize {
    defaults::NUM_BROWSERS
}

impl ScrapeRequest {
    #[must_use]
    pub const fn new(start_id: StudbookId, end_id: StudbookId) -> Self {
        Self {
            start_id: Some(start_id),
            end_id: Some(end_id),
            delay_ms: defaults::DELAY_MS,
            num_browsers: defaults::NUM_BROWSERS,
        }
    }

    pub fn to_run(&self) -> Result<ScrapeRun, CrawlingError> {
        let (Some(start_id), Some(end_id)) = (self.start_id, self.end_id) else {
            return Err(CrawlingError::Configuration("startId and endId are required".into()));
        };
        let run = ScrapeRun {
            start_id,
            end_id,
            delay: Duration::from_millis(self.delay_ms),
            workers: self.num_browsers,
        };
        run.validate()?;
        Ok(run)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub status_code: u16,
    pub body: Value,
}

impl TriggerResponse {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status_code: 400,
            body: json!({ "message": message.into() }),
        }
    }
}

pub async fn start_scraper(
    coordinator: &ScrapeCoordinator,
    request: &ScrapeRequest,
) -> Result<ScrapeSummary, CrawlingError> {
    let run = request.to_run()?;
    coordinator.run(run).await
}

/// 400 for malformed or incomplete requests, 200 once the run finished, 500 otherwise
pub async fn handle_trigger_body(coordinator: &ScrapeCoordinator, body: &str) -> TriggerResponse {
    let request: ScrapeRequest = match serde_json::from_str(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Rejected scrape trigger body");
            return TriggerResponse::bad_request(format!("Invalid request body: {e}"));
        }
    };

    if request.start_id.is_none() || request.end_id.is_none() {
        return TriggerResponse::bad_request("startId and endId are required");
    }

    match start_scraper(coordinator, &request).await {
        Ok(summary) => TriggerResponse {
            status_code: 200,
            body: json!({
                "message": "Scraping completed successfully",
                "summary": summary,
            }),
        },
        Err(CrawlingError::Configuration(reason)) => TriggerResponse::bad_request(reason),
        Err(e) => {
            error!(error = %e, "Scrape run failed");
            TriggerResponse {
                status_code: 500,
                body: json!({ "message": "Scraping failed", "error": e.to_string() }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawling::navigation::NavigationPolicy;
    use crate::crawling::worker::ScrapeContext;
    use crate::domain::services::{BrowserError, BrowserLauncher, BrowserSession};
    use crate::infrastructure::config::SiteConfig;
    use crate::infrastructure::in_memory_repository::{InMemoryHorseRepository, InMemoryReportRepository};
    use crate::infrastructure::parsing::HorseDetailParser;
    use async_trait::async_trait;
    use rstest::rstest;
    use std::sync::Arc;

    struct BrokenLauncher;

    #[async_trait]
    impl BrowserLauncher for BrokenLauncher {
        async fn launch(&self, _worker_index: usize) -> Result<Box<dyn BrowserSession>, BrowserError> {
            Err(BrowserError::Launch("chromium missing".into()))
        }
    }

    fn coordinator() -> ScrapeCoordinator {
        let context = ScrapeContext {
            site: SiteConfig::default(),
            navigation: NavigationPolicy {
                attempts: 1,
                backoff: Duration::ZERO,
                timeout: Duration::from_secs(1),
            },
            horses: Arc::new(InMemoryHorseRepository::new()),
            reports: Arc::new(InMemoryReportRepository::new()),
            extractor: Arc::new(HorseDetailParser::new().unwrap()),
            sessions: None,
            archiver: None,
        };
        ScrapeCoordinator::new(context, Arc::new(BrokenLauncher))
    }

    #[test]
    fn request_defaults_delay_and_browsers() {
        let request: ScrapeRequest = serde_json::from_str(r#"{"startId": 1, "endId": 5}"#).unwrap();
        assert_eq!(request, ScrapeRequest::new(1, 5));
        assert_eq!(request.delay_ms, 2000);
        assert_eq!(request.num_browsers, 1);
    }

    #[test]
    fn request_without_end_id_is_a_configuration_error() {
        let request: ScrapeRequest = serde_json::from_str(r#"{"startId": 1}"#).unwrap();
        assert!(matches!(request.to_run(), Err(CrawlingError::Configuration(_))));
    }

    #[rstest]
    #[case::not_json("start=1&end=2")]
    #[case::missing_start(r#"{"endId": 2}"#)]
    #[case::negative_id(r#"{"startId": -1, "endId": 2}"#)]
    #[case::inverted_range(r#"{"startId": 9, "endId": 2}"#)]
    #[tokio::test]
    async fn bad_bodies_are_rejected_with_400(#[case] body: &str) {
        let response = handle_trigger_body(&coordinator(), body).await;
        assert_eq!(response.status_code, 400);
    }

    #[tokio::test]
    async fn launch_failure_maps_to_500() {
        let response = handle_trigger_body(&coordinator(), r#"{"startId": 1, "endId": 2}"#).await;

        assert_eq!(response.status_code, 500);
        assert!(response.body["error"].as_str().unwrap().contains("chromium missing"));
    }
}
