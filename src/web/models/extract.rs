//! Request-body extractors whose rejections render as field maps.

use axum::{
    Json,
    body::Bytes,
    extract::{
        FromRequest, Request,
        multipart::{Field, MultipartError, MultipartRejection},
        rejection::JsonRejection,
    },
    http::header,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;

use crate::services::image_service::{ImageError, ImageStore};
use crate::validation::FieldErrors;
use crate::web::error::{AppError, NON_FIELD_ERRORS};

pub const REQUIRED_MESSAGE: &str = "This field is required.";

const DESERIALIZE_PREFIX: &str = "Failed to deserialize the JSON body into the target type: ";

static LOCATION_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+at line \d+ column \d+$").expect("valid location pattern"));
static MISSING_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^missing field `([^`]+)`$").expect("valid missing-field pattern"));
static FIELD_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([A-Za-z_][\w]*)[\w.\[\]]*: (.+)$").expect("valid field-path pattern")
});

/// `axum::Json` with deserialization failures reported per field (400)
/// instead of as a plain-text 422.
#[derive(Debug)]
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(AppError::Validation(json_rejection_errors(&rejection))),
        }
    }
}

/// Maps a JSON rejection onto the top-level field it concerns, falling
/// back to `non_field_errors`.
pub fn json_rejection_errors(rejection: &JsonRejection) -> FieldErrors {
    let text = rejection.body_text();
    if !matches!(rejection, JsonRejection::JsonDataError(_)) {
        return FieldErrors::single(NON_FIELD_ERRORS, text);
    }
    let detail = text.strip_prefix(DESERIALIZE_PREFIX).unwrap_or(&text);
    let detail = LOCATION_SUFFIX.replace(detail, "");
    data_error_fields(&detail)
}

fn data_error_fields(detail: &str) -> FieldErrors {
    if let Some(captures) = MISSING_FIELD.captures(detail) {
        return FieldErrors::single(&captures[1], REQUIRED_MESSAGE);
    }
    // Nested failures are prefixed with their path, e.g. `ingredients[0].amount: ...`.
    if let Some(captures) = FIELD_PATH.captures(detail) {
        return FieldErrors::single(&captures[1], detail);
    }
    FieldErrors::single(NON_FIELD_ERRORS, detail)
}

pub fn is_multipart(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("multipart/form-data"))
}

pub fn multipart_error(err: MultipartError) -> AppError {
    AppError::Validation(FieldErrors::single(NON_FIELD_ERRORS, err.body_text()))
}

pub fn multipart_rejection(rejection: MultipartRejection) -> AppError {
    AppError::Validation(FieldErrors::single(NON_FIELD_ERRORS, rejection.body_text()))
}

/// An image as submitted: a base64 data URI, or a multipart file part.
#[derive(Debug)]
pub enum ImageUpload {
    DataUri(String),
    File {
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

impl ImageUpload {
    /// Reads a multipart part. A part without file name or content type
    /// is taken as a data URI sent as a plain form value.
    pub async fn from_field(field: Field<'_>) -> Result<Self, AppError> {
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        if file_name.is_none() && content_type.is_none() {
            let data_uri = field.text().await.map_err(multipart_error)?;
            return Ok(ImageUpload::DataUri(data_uri));
        }
        let bytes = field.bytes().await.map_err(multipart_error)?;
        Ok(ImageUpload::File {
            file_name,
            content_type,
            bytes,
        })
    }

    /// Writes the image under `folder` and returns its stored path.
    pub async fn store(&self, store: &ImageStore, folder: &str) -> Result<String, ImageError> {
        match self {
            ImageUpload::DataUri(data_uri) => store.save_data_uri(folder, data_uri).await,
            ImageUpload::File {
                file_name,
                content_type,
                bytes,
            } => {
                store
                    .save_bytes(folder, file_name.as_deref(), content_type.as_deref(), bytes)
                    .await
            }
        }
    }
}
