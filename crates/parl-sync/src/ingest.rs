use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parl_adapters::{BillsAdapter, MpsAdapter, SourceAdapter};
use parl_storage::{HttpClientConfig, HttpFetcher, RecordStore, Resource};
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::upsert::{upsert_batch, UpsertTally, Upsertable};

/// Terminal state of one stream within a cycle. Only ever logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Upserted(UpsertTally),
    Empty,
    FetchFailed,
    DecodeFailed,
    TimedOut,
    Aborted,
}

/// Completion signal for one cycle. A cycle always completes; per-stream
/// diagnostics go to the log.
#[derive(Debug, Clone)]
pub struct CycleSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Runs ingestion cycles against a borrowed store handle. Cheap to clone.
#[derive(Clone)]
pub struct Ingestor {
    http: HttpFetcher,
    store: Arc<dyn RecordStore>,
    bills: BillsAdapter,
    mps: MpsAdapter,
    stream_timeout: Option<Duration>,
}

impl Ingestor {
    pub fn new(
        http: HttpFetcher,
        store: Arc<dyn RecordStore>,
        bills: BillsAdapter,
        mps: MpsAdapter,
    ) -> Self {
        Self {
            http,
            store,
            bills,
            mps,
            stream_timeout: None,
        }
    }

    pub fn from_config(config: &SyncConfig, store: Arc<dyn RecordStore>) -> anyhow::Result<Self> {
        let http = HttpFetcher::new(HttpClientConfig {
            timeout: config.http_timeout,
            user_agent: Some(config.user_agent.clone()),
        })?;
        Ok(Self::new(
            http,
            store,
            BillsAdapter::new(config.bills_url.clone()),
            MpsAdapter::new(config.mps_url.clone()),
        )
        .with_stream_timeout(config.stream_timeout))
    }

    pub fn with_stream_timeout(mut self, stream_timeout: Option<Duration>) -> Self {
        self.stream_timeout = stream_timeout;
        self
    }

    /// One full cycle: both streams run as separate tasks and are joined.
    pub async fn run_cycle(&self) -> CycleSummary {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();

        async move {
            info!("ingestion cycle started");

            let mut bills = {
                let this = self.clone();
                StreamTask(tokio::spawn(
                    async move { this.run_stream(&this.bills).await }.in_current_span(),
                ))
            };
            let mut mps = {
                let this = self.clone();
                StreamTask(tokio::spawn(
                    async move { this.run_stream(&this.mps).await }.in_current_span(),
                ))
            };

            let (bills, mps) = tokio::join!(&mut bills.0, &mut mps.0);
            let bills = settle(Resource::Bills, bills);
            let mps = settle(Resource::Mps, mps);

            let finished_at = Utc::now();
            info!(
                bills = ?bills,
                mps = ?mps,
                elapsed_ms = (finished_at - started_at).num_milliseconds(),
                "ingestion cycle completed"
            );
            CycleSummary {
                run_id,
                started_at,
                finished_at,
            }
        }
        .instrument(info_span!("ingest_cycle", %run_id))
        .await
    }

    /// Fetch then upsert one resource. Fetch strictly precedes every upsert;
    /// a failed fetch upserts nothing.
    pub async fn run_stream<A>(&self, adapter: &A) -> StreamOutcome
    where
        A: SourceAdapter,
        A::Record: Upsertable,
    {
        let resource = adapter.resource();
        let work = async {
            let records = match adapter.fetch(&self.http).await {
                Ok(records) => records,
                Err(err) => {
                    error!(
                        resource = resource.as_str(),
                        url = adapter.url(),
                        error = %err,
                        "fetch failed; stream upserts nothing this cycle"
                    );
                    return if err.is_decode() {
                        StreamOutcome::DecodeFailed
                    } else {
                        StreamOutcome::FetchFailed
                    };
                }
            };

            if records.is_empty() {
                info!(resource = resource.as_str(), "upstream returned no records");
                return StreamOutcome::Empty;
            }

            info!(resource = resource.as_str(), records = records.len(), "fetched; upserting");
            let tally = upsert_batch(self.store.as_ref(), &records).await;
            info!(
                resource = resource.as_str(),
                upserted = tally.upserted,
                failed = tally.failed,
                "stream finished"
            );
            StreamOutcome::Upserted(tally)
        };

        match self.stream_timeout {
            Some(limit) => match tokio::time::timeout(limit, work).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    error!(
                        resource = resource.as_str(),
                        timeout_secs = limit.as_secs_f64(),
                        "stream exceeded its deadline"
                    );
                    StreamOutcome::TimedOut
                }
            },
            None => work.await,
        }
    }
}

/// Aborts the stream task when dropped, so a cancelled cycle takes both of
/// its streams with it.
struct StreamTask(JoinHandle<StreamOutcome>);

impl Drop for StreamTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn settle(resource: Resource, joined: Result<StreamOutcome, JoinError>) -> StreamOutcome {
    joined.unwrap_or_else(|err| {
        error!(resource = resource.as_str(), error = %err, "stream task aborted");
        StreamOutcome::Aborted
    })
}
