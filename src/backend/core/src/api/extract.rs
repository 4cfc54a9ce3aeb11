//! Extractors whose rejections render as the standard error envelope.

use axum::extract::{FromRequest, FromRequestParts};

use crate::error::ScribeError;

/// `Path<T>` with a `validation_error` body on malformed parameters.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ScribeError))]
pub struct ApiPath<T>(pub T);

/// `Json<T>` with a `validation_error` body on malformed input.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ScribeError))]
pub struct ApiJson<T>(pub T);
