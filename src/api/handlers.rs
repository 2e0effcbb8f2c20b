//! Route Handlers
//!
//! Each handler shapes its request into one operation and waits for the
//! matching reply; shaping failures answer on the spot. Success and error
//! bodies alike come back as JSON.

use axum::extract::{Path, Request};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};

use super::validate;
use crate::cluster::dispatcher::StoreClient;
use crate::cluster::protocol::{Operation, Reply, ResponseError};

/// Everything a handler needs: the path to the store and, in multi mode,
/// which worker this is (for the request log).
#[derive(Clone)]
pub struct AppContext {
    pub client: StoreClient,
    pub worker: Option<WorkerIdentity>,
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerIdentity {
    pub index: usize,
    pub port: u16,
}

pub async fn log_requests(
    Extension(ctx): Extension<AppContext>,
    req: Request,
    next: Next,
) -> Response {
    match ctx.worker {
        Some(worker) => tracing::info!(
            "Worker {} on port {} (pid {}) handling {} {}",
            worker.index,
            worker.port,
            std::process::id(),
            req.method(),
            req.uri()
        ),
        None => tracing::info!("Handling {} {}", req.method(), req.uri()),
    }
    next.run(req).await
}

pub async fn list_records(Extension(ctx): Extension<AppContext>) -> Response {
    dispatch(&ctx, Operation::all()).await
}

pub async fn get_record(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match validate::parse_record_id(&id) {
        Ok(id) => id,
        Err(err) => return reject(err),
    };
    dispatch(&ctx, Operation::get(id)).await
}

pub async fn create_record(Extension(ctx): Extension<AppContext>, body: String) -> Response {
    let fields = match validate::parse_body(&body) {
        Ok(fields) => fields,
        Err(err) => return reject(err),
    };
    dispatch(&ctx, Operation::create(fields)).await
}

pub async fn update_record(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<String>,
    body: String,
) -> Response {
    let id = match validate::parse_record_id(&id) {
        Ok(id) => id,
        Err(err) => return reject(err),
    };
    let fields = match validate::parse_body(&body) {
        Ok(fields) => fields,
        Err(err) => return reject(err),
    };
    dispatch(&ctx, Operation::update(id, fields)).await
}

pub async fn delete_record(
    Extension(ctx): Extension<AppContext>,
    Path(id): Path<String>,
) -> Response {
    let id = match validate::parse_record_id(&id) {
        Ok(id) => id,
        Err(err) => return reject(err),
    };
    dispatch(&ctx, Operation::delete(id)).await
}

pub async fn not_found() -> Response {
    reject(ResponseError::route_not_found())
}

pub async fn method_not_allowed() -> Response {
    reject(ResponseError::method_not_allowed())
}

async fn dispatch(ctx: &AppContext, op: Operation) -> Response {
    match ctx.client.call(op).await {
        Ok(reply) => render(reply),
        Err(err) => {
            tracing::error!("Store call failed: {err}");
            reject(ResponseError::store_unavailable())
        }
    }
}

fn render(reply: Reply) -> Response {
    let status = StatusCode::from_u16(reply.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if let Some(error) = reply.error {
        return (status, Json(error)).into_response();
    }
    match reply.data {
        Some(data) => (status, Json(data)).into_response(),
        None => status.into_response(),
    }
}

fn reject(error: ResponseError) -> Response {
    let status = StatusCode::from_u16(error.status_code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, Json(error)).into_response()
}
