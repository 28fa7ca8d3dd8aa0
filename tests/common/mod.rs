#![allow(dead_code)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::Result;
use async_trait::async_trait;
use focuslens::{
    focus::{
        EmbeddingBackend, FocusManager, InProcessLauncher, LanguageBackend, ListEntry,
        ManagerTimeouts, OverrideLists, PagePayload, WorkerBlueprint, WorkerComponents,
        WorkerConfig, WorkerHandle, WorkerLauncher, DEFAULT_THRESHOLD,
    },
    settings::AnchorCounts,
};

pub const GOAL: &str = "learn rust ownership";

const VOCABULARY: [&str; 9] = [
    "rust", "ownership", "borrow", "cargo", "python", "cooking", "recipe", "football", "music",
];

/// Returns a canned anchor list, optionally after a delay.
pub struct FixedAnchors {
    payload: String,
    delay: Duration,
    pub finished: AtomicBool,
}

impl FixedAnchors {
    pub fn new() -> Arc<Self> {
        Self::slow(Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            payload: r#"```json
["rust borrow checker", "cargo build tool"]
```"#
                .into(),
            delay,
            finished: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl LanguageBackend for FixedAnchors {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.finished.store(true, Ordering::SeqCst);
        Ok(self.payload.clone())
    }
}

/// Bag-of-words embedder over a tiny vocabulary.
///
/// Page documents (text starting with `title:`) can be slowed down or made
/// to fail without affecting anchor encoding.
pub struct KeywordEmbedder {
    page_delay: Duration,
    fail_anchors: bool,
    pub calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            page_delay: Duration::ZERO,
            fail_anchors: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow_pages(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            page_delay: delay,
            fail_anchors: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn broken() -> Arc<Self> {
        Arc::new(Self {
            page_delay: Duration::ZERO,
            fail_anchors: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub fn bag_of_words(text: &str) -> Vec<f32> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    VOCABULARY
        .iter()
        .map(|term| words.iter().filter(|word| *word == term).count() as f32)
        .collect()
}

#[async_trait]
impl EmbeddingBackend for KeywordEmbedder {
    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let is_page = inputs.iter().any(|text| text.starts_with("title:"));
        if is_page && !self.page_delay.is_zero() {
            tokio::time::sleep(self.page_delay).await;
        }
        if !is_page && self.fail_anchors {
            anyhow::bail!("embedding service unavailable");
        }
        Ok(inputs.iter().map(|text| bag_of_words(text)).collect())
    }
}

pub fn worker_config(lists: OverrideLists) -> WorkerConfig {
    WorkerConfig {
        lists,
        threshold: DEFAULT_THRESHOLD,
        anchors: AnchorCounts::default(),
        query_prompt: "task: search result | query: ".into(),
    }
}

pub fn python_docs_whitelist() -> OverrideLists {
    OverrideLists::new(
        vec![ListEntry::new("docs.python.org", true)],
        vec![ListEntry::new("https://youtube.com/shorts", false)],
    )
}

pub fn blueprint(
    language: Arc<dyn LanguageBackend>,
    embedding: Arc<dyn EmbeddingBackend>,
    lists: OverrideLists,
) -> WorkerBlueprint {
    WorkerBlueprint {
        components: WorkerComponents {
            language,
            embedding,
        },
        config: worker_config(lists),
    }
}

/// Counts launches on top of an in-process launcher.
pub struct CountingLauncher {
    inner: InProcessLauncher,
    pub launches: AtomicUsize,
}

impl CountingLauncher {
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl WorkerLauncher for CountingLauncher {
    fn launch(&self, goal: &str) -> Result<WorkerHandle> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.inner.launch(goal)
    }
}

pub fn counting_launcher(
    language: Arc<FixedAnchors>,
    embedding: Arc<KeywordEmbedder>,
    lists: OverrideLists,
) -> Arc<CountingLauncher> {
    Arc::new(CountingLauncher {
        inner: InProcessLauncher::new(move || {
            Ok(blueprint(language.clone(), embedding.clone(), lists.clone()))
        }),
        launches: AtomicUsize::new(0),
    })
}

pub fn manager(launcher: Arc<CountingLauncher>, timeouts: ManagerTimeouts) -> Arc<FocusManager> {
    Arc::new(FocusManager::new(launcher, timeouts))
}

pub fn quick_timeouts() -> ManagerTimeouts {
    ManagerTimeouts {
        startup: Duration::from_secs(5),
        request: Duration::from_secs(2),
    }
}

pub fn rust_book() -> PagePayload {
    PagePayload {
        url: "https://doc.rust-lang.org/book/ch04-01-what-is-ownership.html".into(),
        title: "The Rust Book".into(),
        meta: "What is ownership?".into(),
        body: "Ownership rules and how borrow checking works".into(),
    }
}

pub fn pasta_recipe() -> PagePayload {
    PagePayload {
        url: "https://example.com/pasta".into(),
        title: "Best pasta recipe".into(),
        meta: String::new(),
        body: "Cooking tips for a weeknight dinner".into(),
    }
}
