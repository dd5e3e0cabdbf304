use async_trait::async_trait;
use tokio::time::{Duration, sleep};

use super::replicate::{PredictionJob, PredictionStatus};
use crate::{
    config::PollingConfig,
    error::{GenerateError, Result},
};

/// Anything that can report the current state of a prediction
#[async_trait]
pub trait PredictionSource: Send + Sync {
    async fn fetch_prediction(&self, url: &str) -> Result<PredictionJob>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrediction {
    pub output_url: String,
    /// Status queries issued; zero when the job was already finished
    pub attempts: u32,
}

/// Drives a prediction to a terminal state with fixed-interval queries
pub struct PredictionPoller<'a, S: ?Sized> {
    source: &'a S,
    interval: Duration,
    max_attempts: u32,
}

impl<'a, S: PredictionSource + ?Sized> PredictionPoller<'a, S> {
    pub fn new(source: &'a S, config: PollingConfig) -> Self {
        Self {
            source,
            interval: config.interval,
            max_attempts: config.max_attempts,
        }
    }

    /// Resolve `job` to its output URL.
    ///
    /// A job that is already terminal is settled without any query. Otherwise
    /// each attempt waits one interval and then reads `status_url`. A failed
    /// read is logged and still spends the attempt.
    pub async fn resolve(&self, job: &PredictionJob, status_url: &str) -> Result<ResolvedPrediction> {
        if let Some(outcome) = settle(job) {
            return outcome.map(|output_url| ResolvedPrediction {
                output_url,
                attempts: 0,
            });
        }

        let mut last_status = job.status;
        for attempt in 1..=self.max_attempts {
            sleep(self.interval).await;

            let polled = match self.source.fetch_prediction(status_url).await {
                Ok(polled) => polled,
                Err(err) => {
                    tracing::warn!(
                        prediction_id = %job.id,
                        attempt,
                        error = %err,
                        "prediction status query failed"
                    );
                    continue;
                }
            };
            if polled.id != job.id {
                tracing::warn!(
                    prediction_id = %job.id,
                    reported_id = %polled.id,
                    attempt,
                    "status endpoint answered for a different prediction"
                );
                continue;
            }

            if polled.status != last_status {
                tracing::info!(
                    prediction_id = %job.id,
                    attempt,
                    status = ?polled.status,
                    "prediction status changed"
                );
                last_status = polled.status;
            } else {
                tracing::debug!(prediction_id = %job.id, attempt, status = ?polled.status, "prediction pending");
            }

            if let Some(outcome) = settle(&polled) {
                return outcome.map(|output_url| ResolvedPrediction {
                    output_url,
                    attempts: attempt,
                });
            }
        }

        tracing::error!(
            prediction_id = %job.id,
            attempts = self.max_attempts,
            "prediction did not finish in time"
        );
        Err(GenerateError::PollingTimeout {
            attempts: self.max_attempts,
        })
    }
}

/// Terminal outcome of `job`, or `None` while it is still running
fn settle(job: &PredictionJob) -> Option<Result<String>> {
    if !job.status.is_terminal() {
        return None;
    }
    match job.status {
        PredictionStatus::Succeeded => Some(job.output_url().map(str::to_string).ok_or_else(|| {
            GenerateError::MalformedResponse {
                snippet: format!("prediction {} succeeded without an output URL", job.id),
            }
        })),
        _ => Some(Err(GenerateError::ProviderJobFailed(job.error_detail()))),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use super::*;
    use crate::providers::PredictionOutput;

    const STATUS_URL: &str = "https://api.replicate.test/v1/predictions/job-1";

    fn job(status: PredictionStatus) -> PredictionJob {
        PredictionJob {
            id: "job-1".to_string(),
            status,
            output: None,
            error: None,
            urls: None,
        }
    }

    fn succeeded(url: &str) -> PredictionJob {
        PredictionJob {
            output: Some(PredictionOutput::Single(url.to_string())),
            ..job(PredictionStatus::Succeeded)
        }
    }

    /// Replays a fixed script of poll answers, then reports `processing`
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<PredictionJob>>>,
        queries: AtomicU32,
    }

    impl ScriptedSource {
        fn new(script: Vec<Result<PredictionJob>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                queries: AtomicU32::new(0),
            }
        }

        fn queries(&self) -> u32 {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PredictionSource for ScriptedSource {
        async fn fetch_prediction(&self, url: &str) -> Result<PredictionJob> {
            assert_eq!(url, STATUS_URL);
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(job(PredictionStatus::Processing)))
        }
    }

    fn policy() -> PollingConfig {
        PollingConfig {
            interval: Duration::from_secs(2),
            max_attempts: 30,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn resolves_after_exactly_three_queries() {
        let source = ScriptedSource::new(vec![
            Ok(job(PredictionStatus::Processing)),
            Ok(job(PredictionStatus::Processing)),
            Ok(succeeded("https://replicate.delivery/out.png")),
        ]);
        let poller = PredictionPoller::new(&source, policy());

        let started = tokio::time::Instant::now();
        let resolved = poller
            .resolve(&job(PredictionStatus::Starting), STATUS_URL)
            .await
            .expect("prediction resolves");

        assert_eq!(resolved.output_url, "https://replicate.delivery/out.png");
        assert_eq!(resolved.attempts, 3);
        assert_eq!(source.queries(), 3);
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_exactly_thirty_queries() {
        let source = ScriptedSource::new(Vec::new());
        let poller = PredictionPoller::new(&source, policy());

        let err = poller
            .resolve(&job(PredictionStatus::Starting), STATUS_URL)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerateError::PollingTimeout { attempts: 30 }));
        assert_eq!(source.queries(), 30);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_stops_on_first_observation() {
        let failed = PredictionJob {
            error: Some(serde_json::Value::String("model crashed".to_string())),
            ..job(PredictionStatus::Failed)
        };
        let source = ScriptedSource::new(vec![Ok(failed)]);
        let poller = PredictionPoller::new(&source, policy());

        let err = poller
            .resolve(&job(PredictionStatus::Processing), STATUS_URL)
            .await
            .unwrap_err();

        assert!(matches!(err, GenerateError::ProviderJobFailed(ref detail) if detail == "model crashed"));
        assert_eq!(source.queries(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_spend_attempts_without_aborting() {
        let source = ScriptedSource::new(vec![
            Err(GenerateError::transport(502, "bad gateway")),
            Err(GenerateError::malformed("<html>")),
            Ok(succeeded("https://replicate.delivery/late.png")),
        ]);
        let poller = PredictionPoller::new(&source, policy());

        let resolved = poller
            .resolve(&job(PredictionStatus::Starting), STATUS_URL)
            .await
            .expect("prediction resolves");

        assert_eq!(resolved.output_url, "https://replicate.delivery/late.png");
        assert_eq!(resolved.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_errors_count_toward_the_budget() {
        let source = ScriptedSource::new(
            (0..5)
                .map(|_| Err(GenerateError::transport(503, "unavailable")))
                .collect(),
        );
        let poller = PredictionPoller::new(
            &source,
            PollingConfig {
                interval: Duration::from_secs(2),
                max_attempts: 5,
            },
        );

        let err = poller
            .resolve(&job(PredictionStatus::Starting), STATUS_URL)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::PollingTimeout { attempts: 5 }));
        assert_eq!(source.queries(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn answers_for_other_predictions_are_ignored() {
        let foreign = PredictionJob {
            id: "someone-else".to_string(),
            ..succeeded("https://replicate.delivery/wrong.png")
        };
        let source = ScriptedSource::new(vec![
            Ok(foreign),
            Ok(succeeded("https://replicate.delivery/right.png")),
        ]);
        let poller = PredictionPoller::new(&source, policy());

        let resolved = poller
            .resolve(&job(PredictionStatus::Starting), STATUS_URL)
            .await
            .unwrap();
        assert_eq!(resolved.output_url, "https://replicate.delivery/right.png");
        assert_eq!(resolved.attempts, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn finished_jobs_need_no_queries() {
        let source = ScriptedSource::new(Vec::new());
        let poller = PredictionPoller::new(&source, policy());

        let resolved = poller
            .resolve(&succeeded("https://replicate.delivery/now.png"), STATUS_URL)
            .await
            .unwrap();
        assert_eq!(resolved.attempts, 0);
        assert_eq!(source.queries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_without_output_is_malformed() {
        let source = ScriptedSource::new(vec![Ok(job(PredictionStatus::Succeeded))]);
        let poller = PredictionPoller::new(&source, policy());

        let err = poller
            .resolve(&job(PredictionStatus::Starting), STATUS_URL)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::MalformedResponse { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn canceled_is_terminal() {
        let source = ScriptedSource::new(vec![Ok(job(PredictionStatus::Canceled))]);
        let poller = PredictionPoller::new(&source, policy());

        let err = poller
            .resolve(&job(PredictionStatus::Processing), STATUS_URL)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::ProviderJobFailed(ref detail) if detail.contains("canceled")));
        assert_eq!(source.queries(), 1);
    }
}
