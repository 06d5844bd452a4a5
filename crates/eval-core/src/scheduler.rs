//! Scheduler (C6, spec §4.6): bounded worker pool over the cartesian
//! product of prompts × providers × test cases × repeats. Grounded in the
//! teacher's `engine::runner::run_suite`, which drives an `Arc<Semaphore>`
//! + `tokio::task::JoinSet` worker pool over its own suite cartesian
//! product; generalized here to the spec's four-axis product and its
//! `(providerIndex, promptIndex, testIndex, repeatIndex)` result ordering.

use crate::config::EvaluateOptions;
use crate::progress::{ProgressDelta, ProgressMachine};
use crate::runner::{self, RunnerDeps, WorkItem};
use eval_common::{AtomicTestCase, GradingResult, Provider};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// One item's place in the deterministic result ordering (spec §4.6: result
/// order is fixed by indices even though completion order is not).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ResultIndex {
    pub provider_index: usize,
    pub prompt_index: usize,
    pub test_index: usize,
    pub repeat_index: usize,
}

pub struct ScheduledResult {
    pub index: ResultIndex,
    pub provider_id: String,
    pub result: GradingResult,
}

/// Runs every `(prompt, provider, test, repeat)` combination, honoring
/// `EvaluateOptions::effective_concurrency` (spec §4.6 item 2: `delay > 0`
/// collapses the worker pool to a single lane so delays apply in sequence
/// rather than in parallel), and returns results sorted by
/// `(providerIndex, promptIndex, testIndex, repeatIndex)`.
pub async fn run_suite(
    prompts: &[String],
    providers: &[Arc<dyn Provider>],
    tests: &[AtomicTestCase],
    deps: Arc<RunnerDeps>,
    progress: Arc<tokio::sync::Mutex<ProgressMachine>>,
) -> Vec<ScheduledResult> {
    let options = &deps.options;
    let concurrency = options.effective_concurrency();
    let semaphore = Arc::new(Semaphore::new(concurrency));

    let provider_ids: Vec<String> = providers.iter().map(|p| p.id().to_string()).collect();
    let total_tests = prompts.len() * providers.len() * tests.len() * options.repeat.max(1) as usize;
    {
        let mut p = progress.lock().await;
        p.init(&provider_ids, total_tests);
        p.start();
    }

    let mut join_set: JoinSet<(ResultIndex, String, GradingResult)> = JoinSet::new();
    // Whole-run budget (spec §4.5 item 3 / §4.6: expiry stops the Scheduler
    // from dispatching new work and cancels in-flight calls; pending items
    // are reported as errors rather than silently dropped).
    let deadline = deps.options.max_eval_time.map(|budget| Instant::now() + budget);
    let mut undispatched: Vec<ScheduledResult> = Vec::new();

    for (provider_index, provider) in providers.iter().enumerate() {
        for (prompt_index, prompt) in prompts.iter().enumerate() {
            for (test_index, test) in tests.iter().enumerate() {
                for repeat_index in 0..options.repeat.max(1) as usize {
                    if let Some(dl) = deadline {
                        if Instant::now() >= dl {
                            deps.cancelled.store(true, Ordering::Relaxed);
                        }
                    }
                    if deps.cancelled.load(Ordering::Relaxed) {
                        undispatched.push(ScheduledResult {
                            index: ResultIndex { provider_index, prompt_index, test_index, repeat_index },
                            provider_id: provider_ids[provider_index].clone(),
                            result: GradingResult::leaf(false, 0.0, "Cancelled before dispatch: run budget exceeded or cancellation requested"),
                        });
                        continue;
                    }
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                    let item = WorkItem {
                        provider_index,
                        prompt_index,
                        test_index,
                        repeat_index,
                        prompt_template: prompt.clone(),
                        test: test.clone(),
                        provider: provider.clone(),
                        provider_id: provider_ids[provider_index].clone(),
                    };
                    let deps = deps.clone();
                    let delay = options.delay;
                    let provider_id = provider_ids[provider_index].clone();

                    join_set.spawn(async move {
                        let _permit = permit;
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                        let result = runner::run_item(&item, &deps).await;
                        (
                            ResultIndex {
                                provider_index: item.provider_index,
                                prompt_index: item.prompt_index,
                                test_index: item.test_index,
                                repeat_index: item.repeat_index,
                            },
                            provider_id,
                            result,
                        )
                    });
                }
            }
        }
    }

    let mut results = Vec::with_capacity(total_tests);
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, provider_id, result)) => {
                let errored = result.component_results.is_empty() && !result.pass;
                let mut p = progress.lock().await;
                p.progress(ProgressDelta::from_result(&provider_id, &result, errored));
                drop(p);
                results.push(ScheduledResult { index, provider_id, result });
            }
            Err(join_err) => {
                let mut p = progress.lock().await;
                p.add_error(format!("worker task panicked: {join_err}"));
            }
        }
    }

    if !undispatched.is_empty() {
        let mut p = progress.lock().await;
        for pending in &undispatched {
            p.progress(ProgressDelta::from_result(&pending.provider_id, &pending.result, true));
        }
        drop(p);
        results.extend(undispatched);
    }

    {
        let mut p = progress.lock().await;
        if deps.cancelled.load(Ordering::Relaxed) {
            p.mark_cancelled();
        }
        p.complete();
    }

    results.sort_by_key(|r| r.index);
    results
}

pub fn cancel(options: &EvaluateOptions, cancelled: &Arc<std::sync::atomic::AtomicBool>) {
    let _ = options;
    cancelled.store(true, Ordering::Relaxed);
}
