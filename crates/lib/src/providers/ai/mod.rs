pub mod embedding;
pub mod gemini;
pub mod local;

use crate::errors::PromptError;
use async_trait::async_trait;
use dyn_clone::DynClone;
pub use embedding::generate_embedding;
pub use gemini::GeminiProvider;
pub use local::LocalAiProvider;
use std::fmt::Debug;

/// A trait for interacting with an AI provider.
///
/// Both the classifier and the translator talk to the model through this trait,
/// so a test can swap in a scripted provider without touching the network.
#[async_trait]
pub trait AiProvider: Send + Sync + Debug + DynClone {
    /// Generates a response from a given system and user prompt.
    ///
    /// The result should be a string containing the AI's response.
    async fn generate(&self, system_prompt: &str, user_prompt: &str)
        -> Result<String, PromptError>;
}

dyn_clone::clone_trait_object!(AiProvider);
