//! The classification worker.
//!
//! A worker is built for exactly one goal: it expands the goal, caches the
//! anchor vectors, signals readiness, then answers page requests one at a
//! time until it is told to stop or its task channel closes.

use std::{any::Any, panic::AssertUnwindSafe, sync::Arc};

use anyhow::Result;
use futures_util::FutureExt;
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::{mpsc, oneshot},
};

use super::{
    classifier::{ClassificationResult, PagePayload, SimilarityClassifier},
    embedding::{encode_anchors, AnchorEmbedding, EmbeddingBackend},
    expander::{GoalExpander, LanguageBackend},
    overrides::{OverrideDecision, OverrideLists},
    protocol::{decode_line, encode_line, WorkerReply, WorkerRequest},
};
use crate::settings::AnchorCounts;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// Model clients a worker talks to.
#[derive(Clone)]
pub struct WorkerComponents {
    pub language: Arc<dyn LanguageBackend>,
    pub embedding: Arc<dyn EmbeddingBackend>,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub lists: OverrideLists,
    pub threshold: f32,
    pub anchors: AnchorCounts,
    pub query_prompt: String,
}

/// Everything needed to bring a worker up, produced inside the worker.
pub struct WorkerBlueprint {
    pub components: WorkerComponents,
    pub config: WorkerConfig,
}

pub struct FocusWorker {
    lists: OverrideLists,
    classifier: SimilarityClassifier,
    cache: AnchorEmbedding,
}

impl FocusWorker {
    /// Expands the goal and precomputes anchor vectors.
    pub async fn prepare(goal: &str, blueprint: WorkerBlueprint) -> Result<Self> {
        let WorkerBlueprint { components, config } = blueprint;

        log_info!("expanding goal '{}'", goal);
        let expander = GoalExpander::new(components.language.clone(), config.anchors);
        let anchors = expander.expand(goal).await;
        log_debug!("anchors: {:?}", anchors.anchors());

        log_info!("pre-encoding {} anchors", anchors.len());
        let cache =
            encode_anchors(components.embedding.as_ref(), anchors, &config.query_prompt).await?;

        Ok(Self {
            lists: config.lists,
            classifier: SimilarityClassifier::new(components.embedding, config.threshold),
            cache,
        })
    }

    pub fn anchor_count(&self) -> usize {
        self.cache.len()
    }

    /// Overrides short-circuit before the page is encoded.
    pub async fn handle(&self, page: &PagePayload) -> Result<ClassificationResult> {
        match self.lists.decide(&page.url) {
            Some(OverrideDecision::Whitelisted) => Ok(ClassificationResult::whitelisted()),
            Some(OverrideDecision::Blacklisted) => Ok(ClassificationResult::blacklisted()),
            None => self.classifier.evaluate(page, &self.cache).await,
        }
    }
}

/// Runs a worker to completion over the given channels.
///
/// `setup` runs inside the worker so model clients are created where they are
/// used. An error before readiness drops `ready`, which the manager observes
/// as the worker exiting.
pub async fn run_worker<F>(
    goal: String,
    setup: F,
    mut tasks: mpsc::UnboundedReceiver<WorkerRequest>,
    replies: mpsc::UnboundedSender<WorkerReply>,
    ready: oneshot::Sender<usize>,
) -> Result<()>
where
    F: FnOnce() -> Result<WorkerBlueprint>,
{
    log_info!("worker starting for goal '{}'", goal);
    let blueprint = setup()?;
    let worker = FocusWorker::prepare(&goal, blueprint).await?;

    if ready.send(worker.anchor_count()).is_err() {
        log_warn!("manager stopped waiting before the worker became ready");
        return Ok(());
    }
    log_info!("worker ready with {} anchors", worker.anchor_count());

    while let Some(request) = tasks.recv().await {
        let (seq, page) = match request {
            WorkerRequest::Stop => {
                log_info!("stop requested, worker exiting");
                break;
            }
            WorkerRequest::Analyze { seq, page } => (seq, page),
        };

        let outcome = AssertUnwindSafe(worker.handle(&page)).catch_unwind().await;
        let reply = match outcome {
            Ok(Ok(result)) => {
                log_debug!(
                    "seq {} {} score={:.4} anchor='{}' in {:?}",
                    seq,
                    page.url,
                    result.score,
                    result.matched_anchor,
                    result.elapsed
                );
                WorkerReply::Classified { seq, result }
            }
            Ok(Err(err)) => {
                log_error!("classification failed for {}: {err:#}", page.url);
                WorkerReply::Failed {
                    seq,
                    message: format!("{err:#}"),
                }
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                log_error!("classification panicked for {}: {}", page.url, message);
                WorkerReply::Failed { seq, message }
            }
        };

        if replies.send(reply).is_err() {
            log_warn!("reply channel closed, worker exiting");
            break;
        }
    }

    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        format!("worker panicked: {text}")
    } else if let Some(text) = payload.downcast_ref::<String>() {
        format!("worker panicked: {text}")
    } else {
        "worker panicked".to_string()
    }
}

/// Hosts a worker over stdin/stdout using line-delimited JSON.
///
/// This is the body of the `worker` subcommand. Logs go to stderr so stdout
/// carries protocol lines only. The stdin read cannot be cancelled, so the
/// caller should exit the process once this returns.
pub async fn serve_stdio<F>(goal: String, setup: F) -> Result<()>
where
    F: FnOnce() -> Result<WorkerBlueprint>,
{
    let (task_tx, task_rx) = mpsc::unbounded_channel::<WorkerRequest>();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<WorkerReply>();
    let (ready_tx, ready_rx) = oneshot::channel::<usize>();

    let reader = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => match decode_line::<WorkerRequest>(&line) {
                    Ok(request) => {
                        if task_tx.send(request).is_err() {
                            break;
                        }
                    }
                    Err(err) => log_warn!("ignoring request: {err:#}"),
                },
                Ok(None) => break,
                Err(err) => {
                    log_error!("failed to read stdin: {err}");
                    break;
                }
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        if let Ok(anchors) = ready_rx.await {
            if write_reply(&mut stdout, &WorkerReply::Ready { anchors })
                .await
                .is_err()
            {
                return;
            }
        }
        while let Some(reply) = reply_rx.recv().await {
            if let Err(err) = write_reply(&mut stdout, &reply).await {
                log_error!("failed to write reply: {err:#}");
                break;
            }
        }
    });

    let outcome = run_worker(goal, setup, task_rx, reply_tx, ready_tx).await;
    if let Err(err) = writer.await {
        log_error!("reply writer failed: {err}");
    }
    reader.abort();
    outcome
}

async fn write_reply(stdout: &mut tokio::io::Stdout, reply: &WorkerReply) -> Result<()> {
    let line = encode_line(reply)?;
    stdout.write_all(line.as_bytes()).await?;
    stdout.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::focus::{
        classifier::{BLACKLIST_LABEL, NO_MATCH_LABEL, WHITELIST_LABEL},
        overrides::ListEntry,
        DEFAULT_THRESHOLD,
    };
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Anchors;

    #[async_trait]
    impl LanguageBackend for Anchors {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(r#"["Python list comprehensions"]"#.into())
        }
    }

    /// Counts encode calls; "boom" in a document fails, "panic" panics.
    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingBackend for Counting {
        async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if inputs.iter().any(|input| input.contains("boom")) {
                bail!("encoder exploded");
            }
            if inputs.iter().any(|input| input.contains("panic")) {
                panic!("encoder panicked");
            }
            Ok(inputs
                .iter()
                .map(|input| {
                    if input.contains("Python") {
                        vec![1.0, 0.0]
                    } else {
                        vec![0.0, 1.0]
                    }
                })
                .collect())
        }
    }

    fn blueprint(embedding: Arc<Counting>) -> WorkerBlueprint {
        WorkerBlueprint {
            components: WorkerComponents {
                language: Arc::new(Anchors),
                embedding,
            },
            config: WorkerConfig {
                lists: OverrideLists::new(
                    vec![ListEntry::new("docs.python.org", true)],
                    vec![ListEntry::new("youtube.com", true)],
                ),
                threshold: DEFAULT_THRESHOLD,
                anchors: AnchorCounts::default(),
                query_prompt: String::new(),
            },
        }
    }

    fn page(url: &str, body: &str) -> PagePayload {
        PagePayload {
            url: url.into(),
            title: String::new(),
            meta: String::new(),
            body: body.into(),
        }
    }

    #[tokio::test]
    async fn overrides_bypass_the_encoder() {
        let embedding = Arc::new(Counting::default());
        let worker = FocusWorker::prepare("Learn Python", blueprint(embedding.clone()))
            .await
            .unwrap();
        let after_prepare = embedding.calls.load(Ordering::SeqCst);
        assert_eq!(after_prepare, 1);

        let white = worker
            .handle(&page("https://docs.python.org/3/", "anything"))
            .await
            .unwrap();
        assert_eq!(white, ClassificationResult::whitelisted());
        assert_eq!(white.matched_anchor, WHITELIST_LABEL);

        let black = worker
            .handle(&page("https://youtube.com/watch?v=1", "Python"))
            .await
            .unwrap();
        assert_eq!(black, ClassificationResult::blacklisted());
        assert_eq!(black.matched_anchor, BLACKLIST_LABEL);

        assert_eq!(embedding.calls.load(Ordering::SeqCst), after_prepare);
    }

    #[tokio::test]
    async fn anchors_are_never_re_encoded() {
        let embedding = Arc::new(Counting::default());
        let worker = FocusWorker::prepare("Learn Python", blueprint(embedding.clone()))
            .await
            .unwrap();
        assert_eq!(worker.anchor_count(), 2);

        for _ in 0..3 {
            worker
                .handle(&page("https://example.com", "Python tips"))
                .await
                .unwrap();
        }
        // one call for the anchors, one per page
        assert_eq!(embedding.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn loop_survives_bad_pages_and_stops_on_request() {
        let embedding = Arc::new(Counting::default());
        let (task_tx, task_rx) = mpsc::unbounded_channel();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let bp = blueprint(embedding);
        let handle = tokio::spawn(run_worker(
            "Learn Python".into(),
            move || Ok(bp),
            task_rx,
            reply_tx,
            ready_tx,
        ));
        assert_eq!(ready_rx.await.unwrap(), 2);

        let requests = [
            page("https://example.com/a", "boom"),
            page("https://example.com/b", "panic"),
            page("https://example.com/c", "Python generators"),
            page("https://example.com/d", "cat videos"),
        ];
        for (seq, page) in requests.into_iter().enumerate() {
            task_tx
                .send(WorkerRequest::Analyze {
                    seq: seq as u64,
                    page,
                })
                .unwrap();
        }

        match reply_rx.recv().await.unwrap() {
            WorkerReply::Failed { seq, message } => {
                assert_eq!(seq, 0);
                assert!(message.contains("encoder exploded"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        match reply_rx.recv().await.unwrap() {
            WorkerReply::Failed { seq, message } => {
                assert_eq!(seq, 1);
                assert!(message.contains("encoder panicked"));
            }
            other => panic!("unexpected reply {other:?}"),
        }
        match reply_rx.recv().await.unwrap() {
            WorkerReply::Classified { seq, result } => {
                assert_eq!(seq, 2);
                assert!(result.is_focused);
            }
            other => panic!("unexpected reply {other:?}"),
        }
        match reply_rx.recv().await.unwrap() {
            WorkerReply::Classified { seq, result } => {
                assert_eq!(seq, 3);
                assert!(!result.is_focused);
                assert_eq!(result.matched_anchor, NO_MATCH_LABEL);
            }
            other => panic!("unexpected reply {other:?}"),
        }

        task_tx.send(WorkerRequest::Stop).unwrap();
        handle.await.unwrap().unwrap();
        assert!(reply_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn setup_failure_drops_readiness() {
        let (_task_tx, task_rx) = mpsc::unbounded_channel();
        let (reply_tx, _reply_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let outcome = run_worker(
            "Learn Python".into(),
            || Err(anyhow::anyhow!("model files missing")),
            task_rx,
            reply_tx,
            ready_tx,
        )
        .await;
        assert!(outcome.is_err());
        assert!(ready_rx.await.is_err());
    }
}
