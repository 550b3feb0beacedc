pub mod auth;
pub mod handlers;
pub mod hooks;
pub mod server;
pub mod state;

pub use server::{router, run};
pub use state::ApiState;
