//! HTTP Surface
//!
//! Routing, request shaping, and validation for the record endpoints. A
//! request either fails shaping here (and is answered immediately, without
//! touching the store) or becomes exactly one operation/reply round trip.
//!
//! ## Endpoints
//! - `GET /api/records` and `POST /api/records`
//! - `GET/PUT/DELETE /api/records/{id}`
//! - unsupported methods under the collection answer 405, everything else 404

pub mod handlers;
pub mod routes;
pub mod validate;

#[cfg(test)]
mod tests;
