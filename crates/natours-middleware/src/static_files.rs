//! Static file resolution.
//!
//! Maps a request path onto a file under the public root and builds the
//! response with caching validators:
//!
//! - `index.html` (configurable) for directories
//! - Weak `ETag` from size and modification time, honoring `If-None-Match`
//! - `Last-Modified`, honoring `If-Modified-Since`
//! - `Cache-Control: public, max-age=N`
//!
//! Paths are percent-decoded before resolution. Parent-directory segments,
//! hidden files and anything resolving outside the root are refused.
//!
//! All I/O here is blocking; the pipeline stage runs [`StaticFiles::handle`]
//! on the blocking pool.
//!
//! # Example
//!
//! ```rust
//! use natours_middleware::static_files::StaticFiles;
//!
//! let files = StaticFiles::new("./public").index("index.html").max_age(3600);
//! assert_eq!(files.index_file(), Some("index.html"));
//! ```

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::Full;
use natours_config::StaticFilesConfig;
use natours_core::Response;
use thiserror::Error;

/// Errors produced while resolving or reading a static file.
#[derive(Debug, Error)]
pub enum StaticFileError {
    /// No file for this path.
    #[error("file not found: {0}")]
    NotFound(String),

    /// The path is refused (traversal, hidden file, escapes the root).
    #[error("forbidden path: {0}")]
    Forbidden(String),

    /// Only GET and HEAD are served.
    #[error("method not allowed")]
    MethodNotAllowed,

    /// Reading the file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StaticFileError {
    /// Returns true for errors that mean "not a static file": the request
    /// should continue to the next stage.
    #[must_use]
    pub fn falls_through(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// File server rooted at a public directory.
#[derive(Debug, Clone)]
pub struct StaticFiles {
    root: PathBuf,
    index_file: Option<String>,
    max_age_secs: u64,
    etag_enabled: bool,
    last_modified_enabled: bool,
    mime_types: HashMap<String, String>,
}

impl StaticFiles {
    /// Serves files under `root`, with ETag and Last-Modified enabled.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            index_file: None,
            max_age_secs: 0,
            etag_enabled: true,
            last_modified_enabled: true,
            mime_types: HashMap::new(),
        }
    }

    /// Builds the server from the `static_files` section.
    #[must_use]
    pub fn from_config(config: &StaticFilesConfig) -> Self {
        let files = Self::new(&config.root)
            .max_age(config.max_age_secs)
            .etag(config.etag)
            .last_modified(config.last_modified);
        if config.index_file.is_empty() {
            files
        } else {
            files.index(config.index_file.as_str())
        }
    }

    /// Sets the file served for directory requests.
    #[must_use]
    pub fn index<S: Into<String>>(mut self, index: S) -> Self {
        self.index_file = Some(index.into());
        self
    }

    /// Sets the `max-age` of `Cache-Control`.
    #[must_use]
    pub fn max_age(mut self, secs: u64) -> Self {
        self.max_age_secs = secs;
        self
    }

    /// Enables or disables `ETag`.
    #[must_use]
    pub fn etag(mut self, enabled: bool) -> Self {
        self.etag_enabled = enabled;
        self
    }

    /// Enables or disables `Last-Modified`.
    #[must_use]
    pub fn last_modified(mut self, enabled: bool) -> Self {
        self.last_modified_enabled = enabled;
        self
    }

    /// Maps an extension (no leading dot) to a content type.
    #[must_use]
    pub fn mime_type(mut self, extension: impl Into<String>, mime: impl Into<String>) -> Self {
        self.mime_types
            .insert(extension.into().to_ascii_lowercase(), mime.into());
        self
    }

    /// The public root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The index file, if any.
    #[must_use]
    pub fn index_file(&self) -> Option<&str> {
        self.index_file.as_deref()
    }

    /// Serves `request_path`.
    ///
    /// # Errors
    ///
    /// [`StaticFileError::MethodNotAllowed`] for anything but GET and HEAD,
    /// [`StaticFileError::Forbidden`] for refused paths,
    /// [`StaticFileError::NotFound`] when nothing matches, and
    /// [`StaticFileError::Io`] when reading fails.
    pub fn handle(
        &self,
        request_path: &str,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<Response, StaticFileError> {
        if method != Method::GET && method != Method::HEAD {
            return Err(StaticFileError::MethodNotAllowed);
        }

        let path = self.resolve_path(request_path)?;
        if path.is_dir() {
            let index = self
                .index_file
                .as_ref()
                .map(|index| path.join(index))
                .filter(|index| index.is_file())
                .ok_or_else(|| StaticFileError::NotFound(request_path.to_string()))?;
            return self.serve_file(&index, headers, method);
        }
        self.serve_file(&path, headers, method)
    }

    fn resolve_path(&self, request_path: &str) -> Result<PathBuf, StaticFileError> {
        let decoded = urlencoding::decode(request_path)
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        if decoded.contains('\0') {
            return Err(StaticFileError::Forbidden("null byte in path".to_string()));
        }
        let relative = decoded.trim_start_matches('/');

        for component in Path::new(relative).components() {
            match component {
                Component::ParentDir => {
                    return Err(StaticFileError::Forbidden(
                        "directory traversal".to_string(),
                    ));
                }
                Component::Normal(name) if name.to_string_lossy().starts_with('.') => {
                    return Err(StaticFileError::Forbidden("hidden file".to_string()));
                }
                Component::Normal(_) | Component::CurDir => {}
                Component::RootDir | Component::Prefix(_) => {
                    return Err(StaticFileError::Forbidden("absolute path".to_string()));
                }
            }
        }

        let canonical = self
            .root
            .join(relative)
            .canonicalize()
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        let root = self
            .root
            .canonicalize()
            .map_err(|_| StaticFileError::NotFound(request_path.to_string()))?;
        if !canonical.starts_with(&root) {
            return Err(StaticFileError::Forbidden(
                "path escapes the public root".to_string(),
            ));
        }
        Ok(canonical)
    }

    fn serve_file(
        &self,
        path: &Path,
        headers: &HeaderMap,
        method: &Method,
    ) -> Result<Response, StaticFileError> {
        let metadata = std::fs::metadata(path)?;
        let modified = metadata.modified().ok();
        let etag = if self.etag_enabled {
            weak_etag(metadata.len(), modified)
        } else {
            None
        };

        if self.is_fresh(headers, etag.as_deref(), modified) {
            return Ok(self.not_modified(etag.as_deref()));
        }

        let body = if method == Method::HEAD {
            Bytes::new()
        } else {
            Bytes::from(std::fs::read(path)?)
        };

        let mut response = http::Response::new(Full::new(body));
        *response.status_mut() = StatusCode::OK;
        let out = response.headers_mut();
        out.insert(header::CONTENT_TYPE, header_value(&self.detect_mime_type(path)));
        out.insert(header::CONTENT_LENGTH, HeaderValue::from(metadata.len()));
        out.insert(header::CACHE_CONTROL, self.cache_control());
        out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("none"));
        if let Some(etag) = &etag {
            out.insert(header::ETAG, header_value(etag));
        }
        if self.last_modified_enabled {
            if let Some(modified) = modified {
                out.insert(
                    header::LAST_MODIFIED,
                    header_value(&httpdate::fmt_http_date(modified)),
                );
            }
        }
        Ok(response)
    }

    /// Conditional GET: `If-None-Match` takes precedence over
    /// `If-Modified-Since`.
    fn is_fresh(&self, headers: &HeaderMap, etag: Option<&str>, modified: Option<SystemTime>) -> bool {
        if let Some(if_none_match) = headers
            .get(header::IF_NONE_MATCH)
            .and_then(|v| v.to_str().ok())
        {
            let Some(etag) = etag else {
                return false;
            };
            return if_none_match.split(',').map(str::trim).any(|candidate| {
                candidate == "*" || strip_weak(candidate) == strip_weak(etag)
            });
        }

        if !self.last_modified_enabled {
            return false;
        }
        let since = headers
            .get(header::IF_MODIFIED_SINCE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| httpdate::parse_http_date(v).ok());
        match (modified, since) {
            (Some(modified), Some(since)) => unix_secs(modified) <= unix_secs(since),
            _ => false,
        }
    }

    fn not_modified(&self, etag: Option<&str>) -> Response {
        let mut response = http::Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::NOT_MODIFIED;
        response
            .headers_mut()
            .insert(header::CACHE_CONTROL, self.cache_control());
        if let Some(etag) = etag {
            response.headers_mut().insert(header::ETAG, header_value(etag));
        }
        response
    }

    fn cache_control(&self) -> HeaderValue {
        header_value(&format!("public, max-age={}", self.max_age_secs))
    }

    fn detect_mime_type(&self, path: &Path) -> String {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        if let Some(mime) = self.mime_types.get(&extension) {
            return mime.clone();
        }
        match extension.as_str() {
            "html" | "htm" => "text/html; charset=UTF-8",
            "css" => "text/css; charset=UTF-8",
            "js" | "mjs" => "application/javascript; charset=UTF-8",
            "json" | "map" => "application/json; charset=UTF-8",
            "txt" => "text/plain; charset=UTF-8",
            "xml" => "application/xml",
            "pug" => "text/plain; charset=UTF-8",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "gif" => "image/gif",
            "svg" => "image/svg+xml",
            "webp" => "image/webp",
            "ico" => "image/x-icon",
            "woff" => "font/woff",
            "woff2" => "font/woff2",
            "ttf" => "font/ttf",
            "otf" => "font/otf",
            "pdf" => "application/pdf",
            "mp4" => "video/mp4",
            "webm" => "video/webm",
            "wasm" => "application/wasm",
            "webmanifest" => "application/manifest+json",
            _ => "application/octet-stream",
        }
        .to_string()
    }
}

fn weak_etag(size: u64, modified: Option<SystemTime>) -> Option<String> {
    let millis = modified?.duration_since(UNIX_EPOCH).ok()?.as_millis();
    Some(format!("W/\"{size:x}-{millis:x}\""))
}

fn strip_weak(tag: &str) -> &str {
    tag.strip_prefix("W/").unwrap_or(tag)
}

fn unix_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use tempfile::TempDir;

    fn public_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Natours</h1>").unwrap();
        std::fs::create_dir(dir.path().join("css")).unwrap();
        std::fs::write(dir.path().join("css/style.css"), "body{}").unwrap();
        std::fs::create_dir(dir.path().join("img")).unwrap();
        std::fs::write(dir.path().join("img/logo white.png"), [0x89, b'P', b'N', b'G']).unwrap();
        std::fs::write(dir.path().join(".env"), "SECRET=1").unwrap();
        dir
    }

    fn get(files: &StaticFiles, path: &str) -> Result<Response, StaticFileError> {
        files.handle(path, &HeaderMap::new(), &Method::GET)
    }

    async fn body(response: Response) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_serves_file() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());

        let response = get(&files, "/css/style.css").unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/css; charset=UTF-8"
        );
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "6");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=0");
        assert!(response.headers()[header::ETAG]
            .to_str()
            .unwrap()
            .starts_with("W/\""));
        assert!(response.headers().contains_key(header::LAST_MODIFIED));
        assert_eq!(body(response).await, Bytes::from_static(b"body{}"));
    }

    #[tokio::test]
    async fn test_directory_index() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path()).index("index.html");

        let response = get(&files, "/").unwrap();
        assert_eq!(body(response).await, Bytes::from_static(b"<h1>Natours</h1>"));

        let files = StaticFiles::new(dir.path());
        assert!(matches!(get(&files, "/"), Err(StaticFileError::NotFound(_))));
    }

    #[test]
    fn test_percent_decoded_path() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());
        let response = get(&files, "/img/logo%20white.png").unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    }

    #[test]
    fn test_refused_paths() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());

        assert!(matches!(get(&files, "/../etc/passwd"), Err(StaticFileError::Forbidden(_))));
        assert!(matches!(get(&files, "/css/%2e%2e/%2e%2e/x"), Err(StaticFileError::Forbidden(_))));
        assert!(matches!(get(&files, "/.env"), Err(StaticFileError::Forbidden(_))));
        assert!(matches!(get(&files, "/missing.js"), Err(StaticFileError::NotFound(_))));
    }

    #[test]
    fn test_method_not_allowed() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());
        let err = files
            .handle("/css/style.css", &HeaderMap::new(), &Method::POST)
            .unwrap_err();
        assert!(matches!(err, StaticFileError::MethodNotAllowed));
        assert!(err.falls_through());
    }

    #[tokio::test]
    async fn test_head_has_no_body() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());
        let response = files
            .handle("/css/style.css", &HeaderMap::new(), &Method::HEAD)
            .unwrap();
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "6");
        assert!(body(response).await.is_empty());
    }

    #[test]
    fn test_if_none_match() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path());
        let etag = get(&files, "/css/style.css").unwrap().headers()[header::ETAG].clone();

        let mut headers = HeaderMap::new();
        headers.insert(header::IF_NONE_MATCH, etag.clone());
        let response = files.handle("/css/style.css", &headers, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers()[header::ETAG], etag);

        headers.insert(header::IF_NONE_MATCH, HeaderValue::from_static("\"other\""));
        let response = files.handle("/css/style.css", &headers, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_if_modified_since() {
        let dir = public_dir();
        let files = StaticFiles::new(dir.path()).etag(false);

        let mut headers = HeaderMap::new();
        let future = SystemTime::now() + std::time::Duration::from_secs(3600);
        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_str(&httpdate::fmt_http_date(future)).unwrap(),
        );
        let response = files.handle("/css/style.css", &headers, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);

        headers.insert(
            header::IF_MODIFIED_SINCE,
            HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"),
        );
        let response = files.handle("/css/style.css", &headers, &Method::GET).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_from_config() {
        let dir = public_dir();
        let config = StaticFilesConfig {
            root: dir.path().to_string_lossy().into_owned(),
            max_age_secs: 90,
            etag: false,
            ..StaticFilesConfig::default()
        };
        let files = StaticFiles::from_config(&config);
        assert_eq!(files.index_file(), Some("index.html"));

        let response = get(&files, "/").unwrap();
        assert_eq!(response.headers()[header::CACHE_CONTROL], "public, max-age=90");
        assert!(!response.headers().contains_key(header::ETAG));
    }

    #[test]
    fn test_custom_mime_type() {
        let dir = public_dir();
        std::fs::write(dir.path().join("tours.geojson"), "{}").unwrap();
        let files = StaticFiles::new(dir.path()).mime_type("geojson", "application/geo+json");
        let response = get(&files, "/tours.geojson").unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/geo+json");
    }
}
