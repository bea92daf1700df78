//! `analyze`: load reading documents, push them through the batch runner in
//! chunks and report on each batch.

use std::fs;
use std::path::Path;

use extrusion_core::error::AnalyticsError;
use extrusion_core::{AnalyticsRunner, AnnotatedReading, BatchReport};
use extrusion_traits::ReadingStore;
use serde_json::{Value, json};

/// Reading documents loaded from one input file.
#[derive(Debug, Default)]
pub struct Input {
    pub docs: Vec<Value>,
    /// Rows or lines that never became a document.
    pub failed: usize,
}

/// Totals over every batch of a run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunSummary {
    pub batches: usize,
    pub records: usize,
    pub anomalies: usize,
    pub persisted: usize,
    /// Batches whose write-back failed.
    pub unpersisted_batches: usize,
    pub failed: usize,
    quality_sum: f64,
    quality_n: usize,
}

impl RunSummary {
    fn add(&mut self, report: &BatchReport) {
        self.batches += 1;
        self.records += report.records.len();
        self.anomalies += report.anomalies();
        self.persisted += report.persisted;
        if report.persist_error.is_some() {
            self.unpersisted_batches += 1;
        }
        for q in report.records.iter().filter_map(|r| r.quality.as_ref()) {
            self.quality_sum += f64::from(q.score);
            self.quality_n += 1;
        }
    }

    pub fn mean_quality(&self) -> Option<f64> {
        (self.quality_n > 0).then(|| self.quality_sum / self.quality_n as f64)
    }

    pub fn to_json(&self) -> Value {
        json!({
            "summary": {
                "batches": self.batches,
                "records": self.records,
                "anomalies": self.anomalies,
                "persisted": self.persisted,
                "unpersisted_batches": self.unpersisted_batches,
                "failed": self.failed,
                "mean_quality": self.mean_quality(),
            }
        })
    }
}

impl std::fmt::Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "analyzed {} records in {} batches: {} anomalies, mean quality {}",
            self.records,
            self.batches,
            self.anomalies,
            fmt_quality(self.mean_quality())
        )?;
        if self.persisted > 0 {
            write!(f, ", {} persisted", self.persisted)?;
        }
        if self.unpersisted_batches > 0 {
            write!(f, ", {} batches not persisted", self.unpersisted_batches)?;
        }
        if self.failed > 0 {
            write!(f, ", {} input rows skipped", self.failed)?;
        }
        Ok(())
    }
}

fn fmt_quality(q: Option<f64>) -> String {
    q.map_or_else(|| "n/a".to_string(), |q| format!("{q:.1}"))
}

/// `.csv` files go through the line-export importer; anything else is read
/// as a JSON array or as JSON lines.
pub fn load_input(path: &Path) -> eyre::Result<Input> {
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        let report = extrusion_config::import_line_csv(path)?;
        return Ok(Input {
            failed: report.failed,
            docs: report.rows,
        });
    }
    let text = fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read input {}: {}", path.display(), e))?;
    parse_json_input(&text)
}

pub fn parse_json_input(text: &str) -> eyre::Result<Input> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|e| AnalyticsError::InvalidBatch(format!("input is not valid JSON: {e}")))?;
        return match value {
            Value::Array(docs) => Ok(Input { docs, failed: 0 }),
            other => Err(AnalyticsError::InvalidBatch(format!("expected an array, got {other}")).into()),
        };
    }

    let mut input = Input::default();
    for (idx, line) in trimmed.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(doc) => input.docs.push(doc),
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "unreadable input line, skipped");
                input.failed += 1;
            }
        }
    }
    Ok(input)
}

/// Process `input` in chunks of `batch_size`, printing every batch as it
/// completes. In JSON mode each annotated record is one line on stdout.
pub fn run_analyze<S>(
    runner: &AnalyticsRunner<S>,
    input: Input,
    batch_size: usize,
    json: bool,
) -> eyre::Result<RunSummary>
where
    S: ReadingStore<AnnotatedReading>,
{
    if batch_size == 0 {
        return Err(AnalyticsError::Config("batch size must be >= 1".into()).into());
    }
    let mut summary = RunSummary {
        failed: input.failed,
        ..RunSummary::default()
    };
    for chunk in input.docs.chunks(batch_size) {
        let report = runner.process_json(&Value::Array(chunk.to_vec()))?;
        summary.add(&report);
        if json {
            for rec in &report.records {
                println!("{}", serde_json::to_string(rec)?);
            }
        } else {
            print_batch(summary.batches, &report);
        }
    }
    tracing::info!(
        batches = summary.batches,
        records = summary.records,
        anomalies = summary.anomalies,
        "analysis finished"
    );
    Ok(summary)
}

fn print_batch(n: usize, report: &BatchReport) {
    let thresholds = report.thresholds.map_or_else(String::new, |t| {
        format!(" (z {:.2}, mad {:.2})", t.z, t.mad)
    });
    println!(
        "batch {n}: {} records, {} anomalies, mean quality {}, window {}{thresholds}",
        report.records.len(),
        report.anomalies(),
        fmt_quality(report.mean_quality()),
        report.window_len,
    );
}
