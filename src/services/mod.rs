pub mod extraction;
pub mod fallback;
pub mod generative;
pub mod google_tasks;
pub mod oauth_provider;
pub mod pdf;

pub use extraction::{ActionItemExtractor, ActionItems, ExtractionSource};
pub use generative::{GeminiClient, RetryPolicy, TextGenerator};
pub use google_tasks::{GoogleTasksClient, TasksApi};
pub use oauth_provider::{GoogleOAuthProvider, OAuthProvider, OAuthProviderConfig};
