//! Parallel multi-file transfer engine.
//!
//! A batch fans out one task per unit. Progress ticks from the transport are
//! forwarded to the shared multi-row display. On a unit failure the batch
//! either aborts with that error or contains it, removes the unit's partial
//! output and keeps going, depending on the requested failure mode.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use thiserror::Error;

use crate::logger::Logger;
use crate::progress::ProgressAggregator;

/// Failure of a single transfer unit.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("object storage: {0}")]
    Storage(#[from] object_store::Error),

    #[error("i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("transfer task aborted unexpectedly")]
    TaskJoin,

    #[error("{0}")]
    Other(String),
}

/// One file's worth of source-to-destination movement within a batch.
#[derive(Debug, Clone)]
pub struct TransferUnit {
    /// Index of the unit within its batch; also the progress row key.
    pub id: usize,
    /// URL or local path, depending on the transport.
    pub source: String,
    /// Local path or remote object key.
    pub destination: PathBuf,
    /// Base name of the source, right-padded to the batch-wide width.
    pub display_name: String,
}

/// What the batch does when one unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The first failing unit ends the batch with its error.
    Abort,
    /// Failures are recorded, partial output is removed, the rest continue.
    ContinueAndCleanup,
}

/// Action taken by the engine for one failed unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    AbortBatch,
    CleanupAndContinue,
}

/// Decide what a unit failure does to the rest of the batch.
pub fn on_unit_failure(mode: FailureMode) -> FailureAction {
    match mode {
        FailureMode::Abort => FailureAction::AbortBatch,
        FailureMode::ContinueAndCleanup => FailureAction::CleanupAndContinue,
    }
}

/// A validated batch of units plus the policy knobs that apply to all of them.
#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub units: Vec<TransferUnit>,
    pub on_failure: FailureMode,
    pub timeout: Option<Duration>,
}

impl BatchRequest {
    /// Build units from `(source, destination)` pairs, padding every display
    /// name to the widest base name in the batch so progress bars align.
    pub fn new(
        pairs: Vec<(String, PathBuf)>,
        on_failure: FailureMode,
        timeout: Option<Duration>,
    ) -> Self {
        let width = pairs
            .iter()
            .map(|(source, _)| source_base_name(source).chars().count())
            .max()
            .unwrap_or(0);

        let units = pairs
            .into_iter()
            .enumerate()
            .map(|(id, (source, destination))| {
                let name = source_base_name(&source).to_string();
                TransferUnit {
                    id,
                    display_name: format!("{name:<width$}"),
                    source,
                    destination,
                }
            })
            .collect();

        Self {
            units,
            on_failure,
            timeout,
        }
    }
}

/// Outcome of a batch that ran to completion.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: Vec<TransferUnit>,
    pub failed: Vec<(TransferUnit, TransferError)>,
}

/// Progress callback: `(bytes_transferred, bytes_total)`. The total may be
/// unknown until the transport has seen the first response.
pub type ProgressFn = dyn Fn(u64, Option<u64>) + Send + Sync;

/// Moves one unit's bytes from source to destination.
///
/// Implementations report ticks at whatever granularity the underlying
/// stream provides; the engine only forwards them.
pub trait Transport: Send + Sync {
    fn transfer<'a>(
        &'a self,
        unit: &'a TransferUnit,
        progress: &'a ProgressFn,
    ) -> BoxFuture<'a, Result<u64, TransferError>>;

    /// Remove the unit's partial output after a failure. The default removes
    /// the destination file; a missing file counts as already clean.
    fn cleanup<'a>(&'a self, unit: &'a TransferUnit) -> BoxFuture<'a, Result<(), TransferError>> {
        Box::pin(async move {
            match tokio::fs::remove_file(&unit.destination).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(TransferError::Io(e)),
            }
        })
    }
}

/// Run every unit of the batch concurrently and settle them all.
///
/// Under `Abort` the first error is returned as soon as it settles; sibling
/// tasks are detached and run to their own completion rather than being
/// cancelled. Under `ContinueAndCleanup` the call always returns `Ok` and
/// failures are collected in the result.
pub async fn run_batch(
    transport: Arc<dyn Transport>,
    request: BatchRequest,
    aggregator: Arc<ProgressAggregator>,
    logger: Arc<dyn Logger>,
) -> Result<BatchResult, TransferError> {
    let mode = request.on_failure;
    let timeout = request.timeout;

    let mut tasks = FuturesUnordered::new();
    for unit in request.units {
        let settled = unit.clone();
        let handle = tokio::spawn(run_unit(
            transport.clone(),
            unit,
            timeout,
            mode,
            aggregator.clone(),
            logger.clone(),
        ));
        tasks.push(async move { (settled, handle.await) });
    }

    let mut result = BatchResult::default();
    while let Some((unit, joined)) = tasks.next().await {
        let settled = match joined {
            Ok(res) => res,
            Err(_) => Err(TransferError::TaskJoin),
        };
        match settled {
            Ok(()) => result.succeeded.push(unit),
            Err(err) => match on_unit_failure(mode) {
                FailureAction::AbortBatch => {
                    aggregator.stop();
                    return Err(err);
                }
                FailureAction::CleanupAndContinue => result.failed.push((unit, err)),
            },
        }
    }
    aggregator.stop();

    result.succeeded.sort_by_key(|u| u.id);
    result.failed.sort_by_key(|(u, _)| u.id);
    Ok(result)
}

/// Drive one unit: transfer with optional deadline, then record or clean up.
async fn run_unit(
    transport: Arc<dyn Transport>,
    unit: TransferUnit,
    timeout: Option<Duration>,
    mode: FailureMode,
    aggregator: Arc<ProgressAggregator>,
    logger: Arc<dyn Logger>,
) -> Result<(), TransferError> {
    logger.start(&unit.source, &unit.destination);

    let progress: Box<ProgressFn> = {
        let aggregator = aggregator.clone();
        let label = unit.display_name.clone();
        let id = unit.id;
        Box::new(move |transferred, total| {
            let percent = match total {
                Some(total) if total > 0 => (transferred as f64 / total as f64) * 100.0,
                _ => 0.0,
            };
            aggregator.report(id, percent, &label);
        })
    };

    let fut = transport.transfer(&unit, &*progress);
    let settled = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(res) => res,
            Err(_) => Err(TransferError::Timeout(limit)),
        },
        None => fut.await,
    };

    match settled {
        Ok(bytes) => {
            aggregator.report(unit.id, 100.0, &unit.display_name);
            logger.done(&unit.source, bytes);
            Ok(())
        }
        Err(err) => {
            logger.error("transfer", &unit.source, &err.to_string());
            if on_unit_failure(mode) == FailureAction::CleanupAndContinue {
                match transport.cleanup(&unit).await {
                    Ok(()) => logger.cleanup(&unit.destination),
                    Err(cleanup_err) => logger.error(
                        "cleanup",
                        &unit.destination.display().to_string(),
                        &cleanup_err.to_string(),
                    ),
                }
            }
            Err(err)
        }
    }
}

/// Last path segment of a source locator, with any URL query or fragment
/// stripped first.
pub fn source_base_name(source: &str) -> &str {
    let path = source
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(source);
    path.trim_end_matches(['/', '\\'])
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_mapping() {
        assert_eq!(
            on_unit_failure(FailureMode::Abort),
            FailureAction::AbortBatch
        );
        assert_eq!(
            on_unit_failure(FailureMode::ContinueAndCleanup),
            FailureAction::CleanupAndContinue
        );
    }

    #[test]
    fn test_base_name_of_url() {
        assert_eq!(
            source_base_name("https://example.com/files/report.pdf"),
            "report.pdf"
        );
        assert_eq!(
            source_base_name("https://example.com/a.txt?token=abc#frag"),
            "a.txt"
        );
    }

    #[test]
    fn test_base_name_of_local_path() {
        assert_eq!(source_base_name("/tmp/data/archive.tar.gz"), "archive.tar.gz");
        assert_eq!(source_base_name("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_base_name_fallback_for_bare_host() {
        assert_eq!(source_base_name("https://example.com/"), "example.com");
    }

    #[test]
    fn test_display_names_padded_to_batch_width() {
        let request = BatchRequest::new(
            vec![
                ("a.txt".to_string(), PathBuf::from("out/a.txt")),
                ("bb.zip".to_string(), PathBuf::from("out/bb.zip")),
            ],
            FailureMode::Abort,
            None,
        );

        // Widest base name is "bb.zip" (6 chars); both labels match it.
        assert_eq!(request.units[0].display_name, "a.txt ");
        assert_eq!(request.units[1].display_name, "bb.zip");
        for unit in &request.units {
            assert_eq!(unit.display_name.chars().count(), 6);
        }
    }

    #[test]
    fn test_unit_ids_follow_batch_order() {
        let request = BatchRequest::new(
            vec![
                ("one".to_string(), PathBuf::from("1")),
                ("two".to_string(), PathBuf::from("2")),
                ("three".to_string(), PathBuf::from("3")),
            ],
            FailureMode::ContinueAndCleanup,
            None,
        );
        let ids: Vec<usize> = request.units.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
