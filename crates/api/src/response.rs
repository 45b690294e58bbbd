//! The `{ "data": ... }` response envelope.
//!
//! Every successful JSON response wraps its payload in [`DataResponse`],
//! so clients can tell payloads apart from the `{ "error", "code" }`
//! shape produced by [`crate::error::AppError`] without sniffing fields.

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
