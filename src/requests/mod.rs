//! Thumbnail request builders
//!
//! Builds (but never sends) the HTTP requests for the thumbnail workflow:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | create    | `POST {resource}/pictures` |
//! | activate  | `PATCH {resource}` with `{"active": true}` |
//! | upload    | `PUT {destination}` with `Content-Length`, `Content-Type: image/jpeg`, `Content-Range` |
//!
//! Relative URIs (e.g. `/videos/123`) are resolved against the configured API
//! base URL; absolute URIs (e.g. upload links) are used as-is. Every failure is
//! tagged with the operation it belongs to.

use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, HeaderValue};
use reqwest::{Body, Method, Request};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, FileSizeError, RequestError, Result};


/// MIME type of uploaded thumbnail images
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Message of the [`Error::Upload`] raised for a missing source file
pub const SOURCE_MISSING_MESSAGE: &str = "source file does not exist";

#[derive(Serialize)]
struct ActivateBody {
    active: bool,
}

/// A thumbnail upload request together with the file to stream as its body
#[derive(Debug)]
pub struct ThumbnailUpload {
    /// The `PUT` request; its body is left to the transport
    pub request: Request,
    /// Local image to send
    pub source_path: PathBuf,
    /// Exact size of the image in bytes
    pub size_bytes: u64,
}

/// Builds thumbnail requests against one API endpoint
#[derive(Clone, Debug)]
pub struct ThumbnailRequests {
    base_url: Url,
    accept: Option<HeaderValue>,
}

impl ThumbnailRequests {
    /// Create a builder from API settings
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the base URL or `Accept` value is invalid.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| Error::Config {
            message: format!("invalid base URL {}: {}", config.base_url, e),
            key: Some("api.base_url".to_string()),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Config {
                message: format!("base URL {} cannot be a base", config.base_url),
                key: Some("api.base_url".to_string()),
            });
        }

        let accept = config
            .accept
            .as_deref()
            .map(HeaderValue::from_str)
            .transpose()
            .map_err(|e| Error::Config {
                message: format!("invalid Accept header: {}", e),
                key: Some("api.accept".to_string()),
            })?;

        Ok(Self { base_url, accept })
    }

    /// `POST {resource_uri}/pictures`
    ///
    /// # Errors
    ///
    /// Returns [`Error::CreateThumbnail`] if the URI is empty or malformed.
    pub fn create_thumbnail(&self, resource_uri: &str) -> Result<Request> {
        self.build_create(resource_uri).map_err(Error::CreateThumbnail)
    }

    /// `PATCH {resource_uri}` with body `{"active": true}`
    ///
    /// # Errors
    ///
    /// Returns [`Error::ActivateThumbnail`] if the URI is empty or malformed,
    /// or the body cannot be encoded.
    pub fn activate_thumbnail(&self, resource_uri: &str) -> Result<Request> {
        self.build_activate(resource_uri).map_err(Error::ActivateThumbnail)
    }

    /// `PUT {destination_uri}` announcing the full image
    ///
    /// The source file is checked before anything else is built.
    ///
    /// # Errors
    ///
    /// - [`Error::Upload`] if `source` does not exist
    /// - [`Error::UploadThumbnail`] if its existence or exact size cannot be
    ///   determined, or the request cannot be built
    pub async fn upload_thumbnail(
        &self,
        source: &Path,
        destination_uri: &str,
    ) -> Result<ThumbnailUpload> {
        let exists = tokio::fs::try_exists(source).await.map_err(|e| {
            Error::UploadThumbnail(RequestError::FileSize(FileSizeError::Io(e)))
        })?;
        if !exists {
            return Err(Error::Upload {
                message: SOURCE_MISSING_MESSAGE.to_string(),
                path: source.to_path_buf(),
            });
        }

        let size_bytes = match crate::utils::exact_file_size(source).await {
            Ok(Some(size)) => size,
            Ok(None) => {
                return Err(Error::UploadThumbnail(RequestError::FileSize(
                    FileSizeError::Unavailable {
                        path: source.to_path_buf(),
                    },
                )));
            }
            Err(e) => {
                return Err(Error::UploadThumbnail(RequestError::FileSize(
                    FileSizeError::Io(e),
                )));
            }
        };

        let request = self
            .build_upload(destination_uri, size_bytes)
            .map_err(Error::UploadThumbnail)?;
        debug!(?source, size_bytes, url = %request.url(), "built thumbnail upload request");

        Ok(ThumbnailUpload {
            request,
            source_path: source.to_path_buf(),
            size_bytes,
        })
    }

    fn build_create(&self, resource_uri: &str) -> std::result::Result<Request, RequestError> {
        let mut url = self.resolve(resource_uri)?;
        url.path_segments_mut()
            .map_err(|()| RequestError::CannotBeABase {
                uri: resource_uri.to_string(),
            })?
            .pop_if_empty()
            .push("pictures");
        Ok(self.request(Method::POST, url))
    }

    fn build_activate(&self, resource_uri: &str) -> std::result::Result<Request, RequestError> {
        let url = self.resolve(resource_uri)?;
        let body = serde_json::to_vec(&ActivateBody { active: true })?;

        let mut request = self.request(Method::PATCH, url);
        request
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *request.body_mut() = Some(Body::from(body));
        Ok(request)
    }

    fn build_upload(
        &self,
        destination_uri: &str,
        size_bytes: u64,
    ) -> std::result::Result<Request, RequestError> {
        let url = self.resolve(destination_uri)?;
        // Whole-file range, `bytes 0-S/S`
        let content_range =
            HeaderValue::from_str(&format!("bytes 0-{}/{}", size_bytes, size_bytes))?;

        let mut request = self.request(Method::PUT, url);
        let headers = request.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(size_bytes));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(THUMBNAIL_CONTENT_TYPE));
        headers.insert(CONTENT_RANGE, content_range);
        Ok(request)
    }

    fn request(&self, method: Method, url: Url) -> Request {
        let mut request = Request::new(method, url);
        if let Some(accept) = &self.accept {
            request.headers_mut().insert(ACCEPT, accept.clone());
        }
        request
    }

    fn resolve(&self, uri: &str) -> std::result::Result<Url, RequestError> {
        let trimmed = uri.trim();
        if trimmed.is_empty() {
            return Err(RequestError::EmptyUri);
        }

        let invalid = |source| RequestError::InvalidUri {
            uri: uri.to_string(),
            source,
        };
        match Url::parse(trimmed) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                self.base_url.join(trimmed).map_err(invalid)
            }
            Err(e) => Err(invalid(e)),
        }
    }
}
