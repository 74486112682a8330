pub mod browser;
pub mod document;
pub mod extractor;
pub mod interstitial;
pub mod links;
pub mod orchestrator;
pub mod pagination;
pub mod session;
pub mod traits;
pub mod types;

#[cfg(test)]
mod testing;

pub use browser::ChromeBrowser;
pub use interstitial::{AutoClickResolver, CompositeResolver, ManualPromptResolver};
pub use orchestrator::{Orchestrator, RunOutcome};
pub use session::{CancelToken, PageLoader};
pub use traits::InterstitialResolver;
