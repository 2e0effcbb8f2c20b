//! Router Assembly
//!
//! One router serves every process role; only the context differs (local
//! dispatcher in single mode, IPC client in a forked worker).

use axum::routing::get;
use axum::{Extension, Router, middleware};

use super::handlers::{self, AppContext};

pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route(
            "/api/records",
            get(handlers::list_records)
                .post(handlers::create_record)
                .fallback(handlers::method_not_allowed),
        )
        .route(
            "/api/records/:id",
            get(handlers::get_record)
                .put(handlers::update_record)
                .delete(handlers::delete_record)
                .fallback(handlers::method_not_allowed),
        )
        .fallback(handlers::not_found)
        .layer(middleware::from_fn(handlers::log_requests))
        .layer(Extension(ctx))
}
