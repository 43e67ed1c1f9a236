// Export route modules
pub mod agent;
pub mod health;
pub mod session;

use crate::state::AppState;
use axum::Router;

// Function to configure all routes
pub fn configure(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(agent::routes(state.clone()))
        .merge(session::routes(state))
}
