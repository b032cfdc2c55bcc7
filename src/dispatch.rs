use crate::judge::JudgeClient;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Judgment recorded for an item whose judge call failed. It normalizes to
/// `Invalid` like any other unusable answer.
pub const FAILURE_SENTINEL: &str = "";

/// Runs judge requests over a fixed-size pool of worker tasks
pub struct Dispatcher {
    client: Arc<dyn JudgeClient>,
    pool_size: usize,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn JudgeClient>, pool_size: usize) -> Self {
        Self {
            client,
            pool_size: pool_size.max(1),
        }
    }

    /// Judge every prompt and return the raw judgments in input order.
    ///
    /// Items are tagged with their index, pulled from a shared queue by the
    /// workers and put back in place by the collector, so the output lines
    /// up with `prompts` whatever order the calls finish in. A failed or
    /// panicking call yields [`FAILURE_SENTINEL`] for that item only. All
    /// workers are joined before this returns.
    pub async fn run_batch(&self, prompts: &[String]) -> Vec<String> {
        let total = prompts.len();
        if total == 0 {
            return Vec::new();
        }

        let (work_tx, work_rx) = mpsc::unbounded_channel::<(usize, String)>();
        for (index, prompt) in prompts.iter().enumerate() {
            // The receiver is alive until the workers below are spawned
            let _ = work_tx.send((index, prompt.clone()));
        }
        drop(work_tx);

        let work_rx = Arc::new(Mutex::new(work_rx));
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, String)>();
        let mut workers = JoinSet::new();

        for worker_id in 0..self.pool_size.min(total) {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let client = Arc::clone(&self.client);

            workers.spawn(async move {
                loop {
                    let next = work_rx.lock().await.recv().await;
                    let Some((index, prompt)) = next else {
                        break;
                    };
                    let judgment = judge_item(Arc::clone(&client), index, prompt).await;
                    if result_tx.send((index, judgment)).is_err() {
                        break;
                    }
                }
                debug!(worker_id, "worker finished");
            });
        }
        drop(result_tx);

        let mut slots: Vec<Option<String>> = vec![None; total];
        let mut done = 0;
        while let Some((index, judgment)) = result_rx.recv().await {
            slots[index] = Some(judgment);
            done += 1;
            debug!(done, total, "judged item {index}");
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                warn!("judge worker terminated abnormally: {e}");
            }
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| {
                    warn!(index, "no judgment collected, using failure sentinel");
                    FAILURE_SENTINEL.to_string()
                })
            })
            .collect()
    }
}

/// One judge call, isolated in its own task so a panic stays with the item
async fn judge_item(client: Arc<dyn JudgeClient>, index: usize, prompt: String) -> String {
    let call = tokio::spawn(async move { client.request(&prompt).await });

    match call.await {
        Ok(Ok(judgment)) => judgment,
        Ok(Err(e)) => {
            warn!(index, "judge call failed: {e:#}");
            FAILURE_SENTINEL.to_string()
        }
        Err(e) => {
            warn!(index, "judge call aborted: {e}");
            FAILURE_SENTINEL.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge::JudgeSettings;
    use anyhow::{Result, bail};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::time::sleep;

    fn test_settings() -> JudgeSettings {
        JudgeSettings {
            model_name: "mock-judge".to_string(),
            temperature: 0.0,
            max_tokens: 8,
            top_p: 1.0,
        }
    }

    /// Echoes the prompt back, finishing later items first
    struct EchoJudge {
        settings: JudgeSettings,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        calls: AtomicUsize,
    }

    impl EchoJudge {
        fn new() -> Self {
            Self {
                settings: test_settings(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl JudgeClient for EchoJudge {
        fn settings(&self) -> &JudgeSettings {
            &self.settings
        }

        async fn request(&self, prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let index: u64 = prompt.trim_start_matches("prompt-").parse().unwrap_or(0);
            sleep(Duration::from_millis(40u64.saturating_sub(index * 2))).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(format!("judged {prompt}"))
        }
    }

    /// Fails on prompts containing "fail" and panics on prompts containing "panic"
    struct FlakyJudge {
        settings: JudgeSettings,
    }

    #[async_trait]
    impl JudgeClient for FlakyJudge {
        fn settings(&self) -> &JudgeSettings {
            &self.settings
        }

        async fn request(&self, prompt: &str) -> Result<String> {
            if prompt.contains("panic") {
                panic!("judge exploded on {prompt}");
            }
            if prompt.contains("fail") {
                bail!("connection reset");
            }
            Ok("Correct".to_string())
        }
    }

    fn prompts(count: usize) -> Vec<String> {
        (0..count).map(|i| format!("prompt-{i}")).collect()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_batch_preserves_order() {
        let dispatcher = Dispatcher::new(Arc::new(EchoJudge::new()), 4);
        let input = prompts(20);

        let results = dispatcher.run_batch(&input).await;

        assert_eq!(results.len(), input.len());
        for (prompt, result) in input.iter().zip(&results) {
            assert_eq!(result, &format!("judged {prompt}"));
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_batch_respects_pool_size() {
        let judge = Arc::new(EchoJudge::new());
        let dispatcher = Dispatcher::new(judge.clone(), 3);

        dispatcher.run_batch(&prompts(12)).await;

        assert_eq!(judge.calls.load(Ordering::SeqCst), 12);
        assert!(judge.max_in_flight.load(Ordering::SeqCst) <= 3);
        assert_eq!(judge.in_flight.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_run_batch_more_workers_than_items() {
        let judge = Arc::new(EchoJudge::new());
        let dispatcher = Dispatcher::new(judge.clone(), 16);

        let results = dispatcher.run_batch(&prompts(2)).await;

        assert_eq!(results, vec!["judged prompt-0", "judged prompt-1"]);
        assert_eq!(judge.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_run_batch_zero_pool_size_still_runs() {
        let dispatcher = Dispatcher::new(Arc::new(EchoJudge::new()), 0);
        assert_eq!(dispatcher.run_batch(&prompts(3)).await.len(), 3);
    }

    #[tokio::test]
    async fn test_run_batch_empty() {
        let dispatcher = Dispatcher::new(Arc::new(EchoJudge::new()), 5);
        assert!(dispatcher.run_batch(&[]).await.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_run_batch_recovers_failed_items() {
        let dispatcher = Dispatcher::new(
            Arc::new(FlakyJudge {
                settings: test_settings(),
            }),
            2,
        );
        let input = vec![
            "ok".to_string(),
            "fail".to_string(),
            "ok".to_string(),
            "panic".to_string(),
            "ok".to_string(),
        ];

        let results = dispatcher.run_batch(&input).await;

        assert_eq!(
            results,
            vec!["Correct", FAILURE_SENTINEL, "Correct", FAILURE_SENTINEL, "Correct"]
        );
    }
}
