//! Concrete model clients for the worker.

pub mod gemini;
pub mod openai;

use std::sync::Arc;

use anyhow::Result;

pub use gemini::GeminiClient;
pub use openai::OpenAiEmbedder;

use crate::{
    focus::{OverrideLists, WorkerBlueprint, WorkerComponents, WorkerConfig},
    settings::UserSettings,
};

/// Builds the worker's clients and policy from a settings snapshot.
pub fn blueprint_from_settings(settings: &UserSettings) -> Result<WorkerBlueprint> {
    let engine = &settings.engine;

    let language = GeminiClient::new(
        settings.language_api_key(),
        engine.language_base_url.clone(),
        engine.language_model.clone(),
        engine.backend_timeout(),
    )?;
    let embedding = OpenAiEmbedder::new(
        settings.embedding_api_key(),
        engine.embedding_base_url.clone(),
        engine.embedding_model.clone(),
        engine.embedding_dimensions,
        engine.backend_timeout(),
        3,
        64,
    )?;

    Ok(WorkerBlueprint {
        components: WorkerComponents {
            language: Arc::new(language),
            embedding: Arc::new(embedding),
        },
        config: WorkerConfig {
            lists: OverrideLists::new(
                settings.client.whitelist.clone(),
                settings.client.blacklist.clone(),
            ),
            threshold: engine.threshold,
            anchors: engine.anchors,
            query_prompt: engine.query_prompt.clone(),
        },
    })
}
