//! Request types for marketplace API calls.
//!
//! This module provides the [`Request`] type and its builder. A request
//! carries only what the caller controls; the signing parameters
//! (`partner_id`, `timestamp`, `sign`, `access_token`, `shop_id`) are added by
//! the client on every attempt.

use std::collections::BTreeMap;
use std::fmt;

use crate::clients::errors::InvalidRequestError;

/// Query parameter names the client adds itself.
pub const RESERVED_QUERY_PARAMS: &[&str] =
    &["partner_id", "timestamp", "sign", "access_token", "shop_id"];

/// Path of the media space image upload endpoint.
pub const UPLOAD_IMAGE_PATH: &str = "/api/v2/media_space/upload_image";

/// Form field the image upload endpoint reads the file from.
pub const UPLOAD_IMAGE_FIELD: &str = "image";

/// HTTP methods used by the Open Platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HttpMethod {
    /// HTTP GET method for retrieving resources.
    Get,
    /// HTTP POST method for creating resources and most mutations.
    Post,
    /// HTTP PUT method for updating resources.
    Put,
    /// HTTP DELETE method for removing resources.
    Delete,
}

impl HttpMethod {
    pub(crate) const fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "get"),
            Self::Post => write!(f, "post"),
            Self::Put => write!(f, "put"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// A file sent as `multipart/form-data`.
///
/// The form is rebuilt from this description on every attempt, so a retried
/// upload resends the full payload.
#[derive(Clone, PartialEq, Eq)]
pub struct MultipartUpload {
    /// Form field holding the file.
    pub field_name: String,
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type of the file.
    pub mime_type: String,
    /// File contents.
    pub bytes: Vec<u8>,
    /// Additional text fields.
    pub fields: BTreeMap<String, String>,
}

impl MultipartUpload {
    /// Describes a file upload.
    #[must_use]
    pub fn new(
        field_name: impl Into<String>,
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            bytes,
            fields: BTreeMap::new(),
        }
    }

    /// Describes an image for the media space endpoint.
    ///
    /// The MIME type is inferred from the file extension.
    #[must_use]
    pub fn image(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let mime_type = mime_for(&file_name);
        Self::new(UPLOAD_IMAGE_FIELD, file_name, mime_type, bytes)
    }

    /// Adds a text field to the form.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Returns `true` if `mime_type` parses as a MIME type.
    #[must_use]
    pub fn has_valid_mime_type(&self) -> bool {
        reqwest::multipart::Part::bytes(Vec::new())
            .mime_str(&self.mime_type)
            .is_ok()
    }

    /// Builds the reqwest form for one attempt.
    pub(crate) fn to_form(&self) -> Result<reqwest::multipart::Form, reqwest::Error> {
        let part = reqwest::multipart::Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(&self.mime_type)?;

        let form = self
            .fields
            .iter()
            .fold(reqwest::multipart::Form::new(), |form, (name, value)| {
                form.text(name.clone(), value.clone())
            });
        Ok(form.part(self.field_name.clone(), part))
    }
}

impl fmt::Debug for MultipartUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartUpload")
            .field("field_name", &self.field_name)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .field("fields", &self.fields)
            .finish()
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// Body of a request.
#[derive(Clone, Debug, PartialEq)]
pub enum RequestBody {
    /// JSON body (`application/json`).
    Json(serde_json::Value),
    /// File upload (`multipart/form-data`).
    Multipart(MultipartUpload),
}

/// A call to the marketplace.
///
/// Use [`Request::builder`] to construct requests.
///
/// # Example
///
/// ```rust
/// use marketplace_api::clients::{HttpMethod, Request};
/// use serde_json::json;
///
/// let list = Request::builder(HttpMethod::Get, "/api/v2/product/get_item_list")
///     .query_param("offset", "0")
///     .query_param("page_size", "50")
///     .authenticated()
///     .build()
///     .unwrap();
/// assert!(list.need_auth);
///
/// let update = Request::builder(HttpMethod::Post, "/api/v2/product/update_stock")
///     .body(json!({"item_id": 1, "stock_list": []}))
///     .authenticated()
///     .build()
///     .unwrap();
/// assert!(update.body.is_some());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    /// The HTTP method.
    pub method: HttpMethod,
    /// Absolute API path, starting with `/`.
    pub path: String,
    /// Caller query parameters, kept sorted.
    pub query: BTreeMap<String, String>,
    /// The body, if any.
    pub body: Option<RequestBody>,
    /// Whether the call is signed with the shop's access token.
    pub need_auth: bool,
}

impl Request {
    /// Creates a new builder.
    #[must_use]
    pub fn builder(method: HttpMethod, path: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(method, path)
    }

    /// Builds an image upload to the media space endpoint.
    ///
    /// # Errors
    ///
    /// Never fails for this fixed shape; the `Result` mirrors [`RequestBuilder::build`].
    pub fn upload_image(
        file_name: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Result<Self, InvalidRequestError> {
        Self::builder(HttpMethod::Post, UPLOAD_IMAGE_PATH)
            .multipart(MultipartUpload::image(file_name, bytes))
            .build()
    }

    /// Returns `true` if this is a multipart upload.
    #[must_use]
    pub const fn is_multipart(&self) -> bool {
        matches!(self.body, Some(RequestBody::Multipart(_)))
    }

    /// Validates the request.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if:
    /// - `path` does not start with `/`
    /// - `method` is `Post` or `Put` but there is no body
    /// - a multipart body is used with a method other than `Post`
    /// - a multipart body declares an unparseable MIME type
    /// - a query parameter uses a signing parameter name
    pub fn verify(&self) -> Result<(), InvalidRequestError> {
        if !self.path.starts_with('/') {
            return Err(InvalidRequestError::RelativePath {
                path: self.path.clone(),
            });
        }

        if matches!(self.method, HttpMethod::Post | HttpMethod::Put) && self.body.is_none() {
            return Err(InvalidRequestError::MissingBody {
                method: self.method.to_string(),
            });
        }

        if self.is_multipart() && self.method != HttpMethod::Post {
            return Err(InvalidRequestError::MultipartMethod {
                method: self.method.to_string(),
            });
        }

        if let Some(RequestBody::Multipart(upload)) = &self.body {
            if !upload.has_valid_mime_type() {
                return Err(InvalidRequestError::InvalidMimeType {
                    mime_type: upload.mime_type.clone(),
                });
            }
        }

        if let Some(name) = self
            .query
            .keys()
            .find(|key| RESERVED_QUERY_PARAMS.contains(&key.as_str()))
        {
            return Err(InvalidRequestError::ReservedQueryParam { name: name.clone() });
        }

        Ok(())
    }
}

/// Builder for constructing [`Request`] instances.
#[derive(Debug)]
pub struct RequestBuilder {
    method: HttpMethod,
    path: String,
    query: BTreeMap<String, String>,
    body: Option<RequestBody>,
    need_auth: bool,
}

impl RequestBuilder {
    fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: BTreeMap::new(),
            body: None,
            need_auth: false,
        }
    }

    /// Adds a single query parameter.
    #[must_use]
    pub fn query_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Adds several query parameters.
    #[must_use]
    pub fn query<K, V>(mut self, params: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn body(mut self, body: impl Into<serde_json::Value>) -> Self {
        self.body = Some(RequestBody::Json(body.into()));
        self
    }

    /// Sets a multipart body.
    #[must_use]
    pub fn multipart(mut self, upload: MultipartUpload) -> Self {
        self.body = Some(RequestBody::Multipart(upload));
        self
    }

    /// Marks the request as shop-authenticated.
    #[must_use]
    pub const fn authenticated(self) -> Self {
        self.need_auth(true)
    }

    /// Sets whether the request is shop-authenticated.
    #[must_use]
    pub const fn need_auth(mut self, need_auth: bool) -> Self {
        self.need_auth = need_auth;
        self
    }

    /// Builds the [`Request`], validating it in the process.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidRequestError`] if the request fails validation.
    pub fn build(self) -> Result<Request, InvalidRequestError> {
        let request = Request {
            method: self.method,
            path: self.path,
            query: self.query,
            body: self.body,
            need_auth: self.need_auth,
        };
        request.verify()?;
        Ok(request)
    }
}
