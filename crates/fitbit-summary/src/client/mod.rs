pub mod api;
pub mod retry;

pub use api::SupabaseClient;
pub use retry::RetryPolicy;
