use crate::app::catalog_service::{ImageUpload, ServiceError};
use crate::domain::{parse_product_id, ProductFields};
use crate::storage::StoreError;
use crate::transport::http::types::{error_response, HandlerError};
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::http::StatusCode;
use tracing::{debug, error, warn};

/// Name of the multipart field carrying the picture.
pub const IMAGE_FIELD: &str = "image";

/// Maps service failures to status codes. Messages go to the caller verbatim.
pub fn service_error(err: ServiceError) -> HandlerError {
    let status = match &err {
        ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::Store(StoreError::DuplicateImagePath(_)) => StatusCode::CONFLICT,
        ServiceError::Store(_) | ServiceError::Pipeline(_) | ServiceError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status.is_server_error() {
        error!(error = %err, "request failed");
    } else {
        debug!(error = %err, "request rejected");
    }
    error_response(status, err.to_string())
}

pub fn parse_id_param(raw: &str) -> Result<i64, HandlerError> {
    parse_product_id(raw).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))
}

/// Collects the text fields and the optional image of a product form.
///
/// An `image` part with no bytes (a browser form submitted without a chosen file)
/// counts as no image.
pub async fn read_product_form(
    form: Result<Multipart, MultipartRejection>,
) -> Result<(ProductFields, Option<ImageUpload>), HandlerError> {
    let mut form = form.map_err(|e| {
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Expected a multipart/form-data body: {}", e),
        )
    })?;

    let mut fields = ProductFields::default();
    let mut image = None;
    let multipart_error = |e: axum::extract::multipart::MultipartError| {
        error_response(e.status(), format!("Invalid multipart content: {}", e.body_text()))
    };

    while let Some(field) = form.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        if name == IMAGE_FIELD {
            let file_name = field.file_name().map(str::to_string);
            let data = field.bytes().await.map_err(multipart_error)?;
            if !data.is_empty() {
                image = Some(ImageUpload {
                    file_name,
                    data: data.to_vec(),
                });
            }
            continue;
        }
        let value = field.text().await.map_err(multipart_error)?;
        if !fields.set(&name, value) {
            warn!(field = %name, "ignoring unknown form field");
        }
    }
    Ok((fields, image))
}
