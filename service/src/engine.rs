use crate::query::BENCHMARK_TABLE;
use polars::prelude::*;
use polars::sql::SQLContext;
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OnceCell;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to build the query engine HTTP client")]
    Init(#[source] reqwest::Error),
    #[error("failed to fetch partition {url}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("no partitions to scan")]
    NoPartitions,
    #[error("query failed")]
    Query(#[from] PolarsError),
    #[error("query execution task failed")]
    Join(#[from] tokio::task::JoinError),
}

/// Embedded analytical engine over remote parquet partitions.
///
/// Partition bytes are fetched over HTTP and scanned in memory, with no
/// local copy step. SQL text runs through a [SQLContext] in which the
/// concatenated partitions are registered as the `benchmark_runs` table.
/// The shared HTTP client is created once on first use; after that,
/// concurrent `execute` calls need no coordination because every call
/// builds its own context.
pub struct QueryEngine {
    client: OnceCell<reqwest::Client>,
    fetch_timeout: Duration,
}

impl QueryEngine {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self {
            client: OnceCell::new(),
            fetch_timeout,
        }
    }

    /// Initialise the engine if it has not been initialised yet.
    ///
    /// Safe to call concurrently; only one initialisation runs.
    pub async fn ensure_ready(&self) -> Result<&reqwest::Client, EngineError> {
        self.client
            .get_or_try_init(|| async {
                reqwest::Client::builder()
                    .timeout(self.fetch_timeout)
                    .build()
                    .map_err(EngineError::Init)
            })
            .await
    }

    /// Execute query text against the listed partition URLs.
    pub async fn execute(&self, urls: &[String], sql: &str) -> Result<DataFrame, EngineError> {
        if urls.is_empty() {
            return Err(EngineError::NoPartitions);
        }
        let client = self.ensure_ready().await?.clone();

        log::debug!("Querying {} partitions: {}", urls.len(), sql);

        let parts = futures::future::try_join_all(
            urls.iter().map(|url| fetch_partition(client.clone(), url)),
        )
        .await?;

        let sql = sql.to_string();
        let frame = tokio::task::spawn_blocking(move || {
            let frames = parts
                .into_iter()
                .map(|bytes| {
                    ParquetReader::new(Cursor::new(bytes))
                        .finish()
                        .map(|frame| frame.lazy())
                })
                .collect::<PolarsResult<Vec<_>>>()?;
            execute_sql(frames, &sql)
        })
        .await??;

        log::trace!("Query produced frame: {}", frame);

        Ok(frame)
    }
}

async fn fetch_partition(client: reqwest::Client, url: &str) -> Result<Vec<u8>, EngineError> {
    let fetch_err = |source| EngineError::Fetch {
        url: url.to_string(),
        source,
    };
    let response = client
        .get(url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(fetch_err)?;
    let bytes = response.bytes().await.map_err(fetch_err)?;
    Ok(bytes.to_vec())
}

/// Register the partition frames and run the SQL text over them.
fn execute_sql(frames: Vec<LazyFrame>, sql: &str) -> Result<DataFrame, EngineError> {
    let scan = concat(frames, UnionArgs::default())?;
    let mut ctx = SQLContext::new();
    ctx.register(BENCHMARK_TABLE, scan);
    let frame = ctx.execute(sql)?.collect()?;
    Ok(frame)
}
