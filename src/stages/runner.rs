use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::CaseError;
use crate::models::{Case, CaseFailure, CaseIndex, Stage, Tagged};

/// Default number of concurrent workers per stage
pub const DEFAULT_WORKERS: usize = 8;

/// Configuration shared by every parallel stage
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Maximum cases processed at once
    pub workers: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Everything a stage produced, once every worker has been joined
#[derive(Debug)]
pub struct StageOutcome<T> {
    /// Successful artifacts, in case index order
    pub succeeded: Vec<Tagged<T>>,
    /// Cases dropped by this stage, in case index order
    pub failures: Vec<CaseFailure>,
}

impl<T> StageOutcome<T> {
    pub fn succeeded_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }
}

/// Run `stage_fn` over every input on a bounded worker pool
///
/// Results are tagged with their case index and collected only after all
/// workers finish, so completion order never affects the output order. A
/// worker that panics is reported as [`CaseError::WorkerCrashed`] for its case.
pub async fn run_stage<I, T, F, Fut>(
    stage: Stage,
    config: &RunnerConfig,
    inputs: Vec<Tagged<I>>,
    stage_fn: F,
) -> StageOutcome<T>
where
    I: Send + 'static,
    T: Send + 'static,
    F: Fn(Case, I) -> Fut,
    Fut: Future<Output = Result<T, CaseError>> + Send + 'static,
{
    let semaphore = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut cases: BTreeMap<CaseIndex, Case> = BTreeMap::new();
    let mut tasks = JoinSet::new();

    info!(
        "Stage {}: dispatching {} cases on {} workers",
        stage,
        inputs.len(),
        config.workers.max(1)
    );

    for Tagged { case, value } in inputs {
        let index = case.index;
        let work = stage_fn(case.clone(), value);
        cases.insert(index, case);

        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            // Inner task isolates panics so the index is never lost
            let result = match tokio::spawn(work).await {
                Ok(result) => result,
                Err(e) => Err(CaseError::WorkerCrashed(e.to_string())),
            };
            (index, result)
        });
    }

    let mut results: BTreeMap<CaseIndex, Result<T, CaseError>> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, result)) => {
                results.insert(index, result);
            }
            Err(e) => warn!("Stage {}: worker join failed: {}", stage, e),
        }
    }

    let mut outcome = StageOutcome {
        succeeded: Vec::with_capacity(results.len()),
        failures: Vec::new(),
    };

    for (index, case) in cases {
        match results.remove(&index) {
            Some(Ok(value)) => outcome.succeeded.push(Tagged::new(case, value)),
            Some(Err(error)) => {
                warn!("Case {} ({:?}) failed at {}: {}", index, case.path, stage, error);
                outcome.failures.push(CaseFailure::new(case, stage, error));
            }
            None => {
                let error = CaseError::WorkerCrashed("result lost".to_string());
                warn!("Case {} ({:?}) failed at {}: {}", index, case.path, stage, error);
                outcome.failures.push(CaseFailure::new(case, stage, error));
            }
        }
    }

    info!(
        "Stage {}: {} succeeded, {} failed",
        stage,
        outcome.succeeded_count(),
        outcome.failed_count()
    );

    outcome
}

/// Tag every case with no payload, as the input of the first stage
pub fn tag_cases(cases: &[Case]) -> Vec<Tagged<()>> {
    cases.iter().cloned().map(|case| Tagged::new(case, ())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn cases(names: &[&str]) -> Vec<Case> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| Case::new(CaseIndex(i), format!("/data/{name}.nii.gz")).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_results_keep_input_order_despite_latency() {
        let cases = cases(&["a", "b", "c"]);
        let inputs: Vec<Tagged<u64>> = cases
            .into_iter()
            .zip([300u64, 150, 10])
            .map(|(case, delay)| Tagged::new(case, delay))
            .collect();

        let finished = Arc::new(std::sync::Mutex::new(Vec::new()));
        let order = Arc::clone(&finished);
        let outcome = run_stage(
            Stage::Normalize,
            &RunnerConfig { workers: 3 },
            inputs,
            move |case, delay| {
                let order = Arc::clone(&order);
                async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    order.lock().unwrap().push(case.names.stem.clone());
                    Ok(format!("{}'", case.names.stem.to_uppercase()))
                }
            },
        )
        .await;

        assert_eq!(*finished.lock().unwrap(), vec!["c", "b", "a"]);
        let values: Vec<&str> = outcome.succeeded.iter().map(|t| t.value.as_str()).collect();
        assert_eq!(values, vec!["A'", "B'", "C'"]);
        assert!(outcome.failures.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let inputs = tag_cases(&cases(&["a", "b", "c", "d", "e", "f"]));
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let (active_ref, peak_ref) = (Arc::clone(&active), Arc::clone(&peak));
        let outcome = run_stage(
            Stage::Extract,
            &RunnerConfig { workers: 2 },
            inputs,
            move |_, ()| {
                let active = Arc::clone(&active_ref);
                let peak = Arc::clone(&peak_ref);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                }
            },
        )
        .await;

        assert_eq!(outcome.succeeded_count(), 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_failures_and_crashes_are_isolated() {
        let inputs = tag_cases(&cases(&["ok", "bad", "crash", "fine"]));

        let outcome = run_stage(
            Stage::Register,
            &RunnerConfig { workers: 4 },
            inputs,
            |case, ()| async move {
                match case.names.stem.as_str() {
                    "bad" => Err(CaseError::WorkerCrashed("tool said no".to_string())),
                    "crash" => panic!("worker blew up"),
                    _ => Ok(case.index.0),
                }
            },
        )
        .await;

        let values: Vec<usize> = outcome.succeeded.iter().map(|t| t.value).collect();
        assert_eq!(values, vec![0, 3]);
        assert_eq!(outcome.failed_count(), 2);
        assert_eq!(outcome.failures[0].case.index, CaseIndex(1));
        assert_eq!(outcome.failures[1].case.index, CaseIndex(2));
        assert!(matches!(
            outcome.failures[1].error,
            CaseError::WorkerCrashed(_)
        ));
        assert!(outcome.failures.iter().all(|f| f.stage == Stage::Register));
    }

    #[tokio::test]
    async fn test_empty_input() {
        let outcome: StageOutcome<()> = run_stage(
            Stage::Extract,
            &RunnerConfig::default(),
            Vec::<Tagged<()>>::new(),
            |_, ()| async { Ok(()) },
        )
        .await;
        assert_eq!(outcome.succeeded_count(), 0);
        assert_eq!(outcome.failed_count(), 0);
    }
}
