pub mod analysis;
pub mod auth;
pub mod chat;
pub mod contact;
pub mod debug;
pub mod error;
pub mod keywords;
pub mod middleware;
pub mod pain_points;
pub mod payment;
pub mod quota;
pub mod routes;
pub mod search;
pub mod state;
pub mod user;

pub use routes::build_router;
pub use state::{AppState, AppStateInner};
