use anyhow::Context;
use chrono::DateTime;
use polars::prelude::*;
use terrabench_model::{BenchmarkRunRecord, RunOutcome, ScenarioSummary};

/// Map a summary query result to the response shape.
pub(crate) fn summaries_from_frame(frame: &DataFrame) -> anyhow::Result<Vec<ScenarioSummary>> {
    let ids = frame.column("scenario_id")?.str()?;
    let runs = frame.column("runs")?.i64()?;
    let success = frame.column("success_count")?.i64()?;
    let failed = frame.column("failed_count")?.i64()?;

    let mut summaries = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        summaries.push(ScenarioSummary::new(
            ids.get(idx).context("Null scenario id")?.to_string(),
            runs.get(idx).context("Null runs count")?,
            success.get(idx).context("Null success count")?,
            failed.get(idx).context("Null failed count")?,
        ));
    }
    Ok(summaries)
}

/// Map a detail query result to the response shape.
pub(crate) fn records_from_frame(frame: &DataFrame) -> anyhow::Result<Vec<BenchmarkRunRecord>> {
    let ids = frame.column("scenario_id")?.str()?;
    let cpu = frame.column("cpu_seconds")?.i64()?;
    let memory = frame.column("memory_seconds")?.i64()?;
    let cost = frame.column("cost")?.i64()?;
    let duration = frame.column("duration_seconds")?.f64()?;
    let pixels = frame.column("input_pixels")?.i64()?;
    let executor_memory = frame.column("max_executor_memory")?.i64()?;
    let network = frame.column("network_received_bytes")?.i64()?;
    let started = frame.column("started_at")?.i64()?;
    let outcomes = frame.column("outcome")?.str()?;

    let mut records = Vec::with_capacity(frame.height());
    for idx in 0..frame.height() {
        let started_ms = started.get(idx).context("Null start time")?;
        let outcome: RunOutcome = outcomes
            .get(idx)
            .context("Null outcome")?
            .parse()
            .map_err(anyhow::Error::msg)?;

        records.push(BenchmarkRunRecord {
            scenario_id: ids.get(idx).context("Null scenario id")?.to_string(),
            cpu_seconds: cpu.get(idx).context("Null cpu_seconds")?,
            memory_seconds: memory.get(idx).context("Null memory_seconds")?,
            cost: cost.get(idx).context("Null cost")?,
            duration_seconds: duration.get(idx).context("Null duration_seconds")?,
            input_pixels: pixels.get(idx).context("Null input_pixels")?,
            max_executor_memory: executor_memory.get(idx).context("Null max_executor_memory")?,
            network_received_bytes: network.get(idx).context("Null network_received_bytes")?,
            started_at: DateTime::from_timestamp_millis(started_ms)
                .with_context(|| format!("Start time out of range: {started_ms}"))?,
            outcome,
        });
    }
    Ok(records)
}

/// Extract the single value of a count query.
pub(crate) fn total_count_from_frame(frame: &DataFrame) -> anyhow::Result<i64> {
    frame
        .column("total_count")?
        .i64()?
        .get(0)
        .context("Count query returned no rows")
}
