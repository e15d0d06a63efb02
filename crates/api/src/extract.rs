//! Extractors whose rejections map onto the error taxonomy

use axum::extract::FromRequest;

use crate::error::ApiError;

/// JSON body extractor that reports malformed bodies as `validation_error`
/// instead of axum's plain-text rejection.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct Json<T>(pub T);
