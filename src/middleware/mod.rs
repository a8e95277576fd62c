pub mod auth;
pub mod request_id;
pub mod throttle;

pub use auth::{Caller, StaffUser};
pub use request_id::{make_span_with_request_id, request_id_middleware, RequestId};
pub use throttle::LlmUser;
