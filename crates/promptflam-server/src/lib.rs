//! PromptFlam relay server: same-origin proxy in front of the completions API.

pub mod error;
pub mod routes;
pub mod state;

pub use routes::build_router;
pub use state::AppState;
