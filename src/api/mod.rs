pub mod extract;
pub mod state;

pub use extract::{JsonBody, ValidatedJson};
pub use state::AppState;

pub use crate::routes::create_router;
