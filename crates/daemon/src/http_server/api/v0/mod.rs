use axum::routing::post;
use axum::Router;

pub mod insert;

use crate::ServiceState;

pub fn router(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/insert", post(insert::handler))
        .with_state(state)
}
