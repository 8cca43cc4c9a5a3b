//! Response compression.
//!
//! Negotiates an encoding from `Accept-Encoding` (quality values honored,
//! client order breaking ties) and compresses bodies of compressible content
//! types once they reach the configured size. `Vary: Accept-Encoding` is
//! added to every successful response passing through this stage.

use std::collections::HashSet;
use std::io::Write;

use bytes::Bytes;
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use http::{header, HeaderValue, Method};
use http_body_util::{BodyExt, Full};
use natours_config::CompressionConfig;
use natours_core::{AppResult, BoxFuture, RequestContext, Response};
use thiserror::Error;

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// Compression algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    /// Gzip (RFC 1952).
    Gzip,
    /// Deflate (RFC 1951, zlib-less).
    Deflate,
    /// Brotli (RFC 7932).
    Brotli,
    /// No compression.
    Identity,
}

impl Algorithm {
    /// The `Content-Encoding` token.
    #[must_use]
    pub fn encoding_name(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Brotli => "br",
            Self::Identity => "identity",
        }
    }

    /// Parses an `Accept-Encoding` token.
    #[must_use]
    pub fn from_encoding(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "deflate" => Some(Self::Deflate),
            "br" => Some(Self::Brotli),
            "identity" => Some(Self::Identity),
            _ => None,
        }
    }
}

/// Compression level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionLevel {
    /// Fastest.
    Fast,
    /// zlib default (6).
    #[default]
    Default,
    /// Smallest output.
    Best,
    /// Explicit 0-9 level. Brotli scales it to 0-11.
    Custom(u32),
}

impl CompressionLevel {
    fn flate(self) -> Compression {
        match self {
            Self::Fast => Compression::fast(),
            Self::Default => Compression::default(),
            Self::Best => Compression::best(),
            Self::Custom(level) => Compression::new(level.min(9)),
        }
    }

    fn brotli_quality(self) -> i32 {
        match self {
            Self::Fast => 1,
            Self::Default => 6,
            Self::Best => 11,
            Self::Custom(level) => i32::try_from(level.min(9) * 11 / 9).unwrap_or(11),
        }
    }
}

/// Error produced by an encoder.
#[derive(Debug, Error)]
pub enum CompressionError {
    /// The encoder failed writing into its buffer.
    #[error("compression I/O error: {0}")]
    Io(#[from] std::io::Error),
}

const COMPRESSIBLE_TYPES: &[&str] = &[
    "application/json",
    "application/javascript",
    "application/xml",
    "application/xhtml+xml",
    "application/rss+xml",
    "application/atom+xml",
    "application/x-www-form-urlencoded",
    "application/ld+json",
    "application/manifest+json",
    "image/svg+xml",
    "image/x-icon",
    "font/ttf",
    "font/otf",
];

/// Response compression middleware.
#[derive(Debug, Clone)]
pub struct CompressionMiddleware {
    algorithms: Vec<Algorithm>,
    min_size: usize,
    level: CompressionLevel,
    extra_types: HashSet<String>,
}

impl Default for CompressionMiddleware {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl CompressionMiddleware {
    /// Gzip, deflate and brotli at the default level with a 1 KiB threshold.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a builder.
    #[must_use]
    pub fn builder() -> CompressionBuilder {
        CompressionBuilder::default()
    }

    /// Creates the middleware from the `compression` section.
    #[must_use]
    pub fn from_config(config: &CompressionConfig) -> Self {
        let mut algorithms = Vec::new();
        if config.gzip {
            algorithms.push(Algorithm::Gzip);
        }
        if config.deflate {
            algorithms.push(Algorithm::Deflate);
        }
        if config.brotli {
            algorithms.push(Algorithm::Brotli);
        }
        Self::builder()
            .algorithms(algorithms)
            .min_size(config.min_size_bytes)
            .level(CompressionLevel::Custom(config.level))
            .build()
    }

    /// Minimum body size that gets compressed.
    #[must_use]
    pub fn min_size(&self) -> usize {
        self.min_size
    }

    fn parse_accept_encoding(value: &str) -> Vec<(&str, f32)> {
        let mut encodings: Vec<(&str, f32)> = value
            .split(',')
            .filter_map(|part| {
                let mut pieces = part.split(';');
                let token = pieces.next()?.trim();
                if token.is_empty() {
                    return None;
                }
                let quality = pieces
                    .filter_map(|p| p.trim().strip_prefix("q="))
                    .find_map(|q| q.trim().parse::<f32>().ok())
                    .unwrap_or(1.0)
                    .clamp(0.0, 1.0);
                Some((token, quality))
            })
            .collect();
        // stable: equal qualities keep client order
        encodings.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        encodings
    }

    /// Picks the encoding for a request, or `None` to send identity.
    #[must_use]
    pub fn select_algorithm(&self, accept_encoding: &str) -> Option<Algorithm> {
        for (token, quality) in Self::parse_accept_encoding(accept_encoding) {
            if quality <= 0.0 {
                continue;
            }
            if token == "*" {
                return self.algorithms.first().copied();
            }
            match Algorithm::from_encoding(token) {
                Some(Algorithm::Identity) => return None,
                Some(algorithm) if self.algorithms.contains(&algorithm) => return Some(algorithm),
                _ => {}
            }
        }
        None
    }

    /// Returns true if a response of this content type is worth compressing.
    #[must_use]
    pub fn is_compressible(&self, content_type: &str) -> bool {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        essence.starts_with("text/")
            || essence.ends_with("+json")
            || essence.ends_with("+xml")
            || COMPRESSIBLE_TYPES.contains(&essence.as_str())
            || self.extra_types.contains(&essence)
    }

    /// Encodes `data` with `algorithm`.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError::Io`] if the encoder fails.
    pub fn compress(&self, data: &[u8], algorithm: Algorithm) -> Result<Vec<u8>, CompressionError> {
        match algorithm {
            Algorithm::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), self.level.flate());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Algorithm::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), self.level.flate());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Algorithm::Brotli => {
                let mut output = Vec::new();
                let params = brotli::enc::BrotliEncoderParams {
                    quality: self.level.brotli_quality(),
                    ..Default::default()
                };
                brotli::BrotliCompress(&mut std::io::Cursor::new(data), &mut output, &params)?;
                Ok(output)
            }
            Algorithm::Identity => Ok(data.to_vec()),
        }
    }

    fn skip_response(&self, response: &Response) -> bool {
        let headers = response.headers();
        if headers.contains_key(header::CONTENT_ENCODING) {
            return true;
        }
        let no_transform = headers
            .get_all(header::CACHE_CONTROL)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|directive| directive.trim().eq_ignore_ascii_case("no-transform"));
        if no_transform {
            return true;
        }
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        !self.is_compressible(content_type)
    }

    async fn encode(&self, response: Response, algorithm: Algorithm) -> Response {
        let (mut parts, body) = response.into_parts();
        let bytes = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(never) => match never {},
        };
        if bytes.len() < self.min_size {
            return Response::from_parts(parts, Full::new(bytes));
        }

        let compressed = match self.compress(&bytes, algorithm) {
            Ok(data) if data.len() < bytes.len() => data,
            Ok(_) => return Response::from_parts(parts, Full::new(bytes)),
            Err(e) => {
                tracing::warn!(error = %e, encoding = algorithm.encoding_name(), "compression failed");
                return Response::from_parts(parts, Full::new(bytes));
            }
        };

        parts.headers.insert(
            header::CONTENT_ENCODING,
            HeaderValue::from_static(algorithm.encoding_name()),
        );
        parts.headers.remove(header::CONTENT_LENGTH);
        Response::from_parts(parts, Full::new(Bytes::from(compressed)))
    }
}

impl Middleware for CompressionMiddleware {
    fn name(&self) -> &'static str {
        Stage::Compression.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            let algorithm = if *ctx.method() == Method::HEAD {
                None
            } else {
                ctx.header(header::ACCEPT_ENCODING.as_str())
                    .and_then(|value| self.select_algorithm(value))
            };

            let mut response = next.run(ctx).await?;
            response
                .headers_mut()
                .append(header::VARY, HeaderValue::from_static("Accept-Encoding"));

            match algorithm {
                Some(algorithm) if !self.skip_response(&response) => {
                    Ok(self.encode(response, algorithm).await)
                }
                _ => Ok(response),
            }
        })
    }
}

/// Builder for [`CompressionMiddleware`].
#[derive(Debug, Clone)]
pub struct CompressionBuilder {
    algorithms: Vec<Algorithm>,
    min_size: usize,
    level: CompressionLevel,
    extra_types: HashSet<String>,
}

impl Default for CompressionBuilder {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::Gzip, Algorithm::Deflate, Algorithm::Brotli],
            min_size: 1024,
            level: CompressionLevel::Default,
            extra_types: HashSet::new(),
        }
    }
}

impl CompressionBuilder {
    /// Sets the offered algorithms. Order decides what `*` resolves to.
    #[must_use]
    pub fn algorithms(mut self, algorithms: impl IntoIterator<Item = Algorithm>) -> Self {
        self.algorithms = algorithms
            .into_iter()
            .filter(|a| *a != Algorithm::Identity)
            .collect();
        self
    }

    /// Sets the minimum body size.
    #[must_use]
    pub fn min_size(mut self, bytes: usize) -> Self {
        self.min_size = bytes;
        self
    }

    /// Sets the level.
    #[must_use]
    pub fn level(mut self, level: CompressionLevel) -> Self {
        self.level = level;
        self
    }

    /// Adds a content type (essence only) to compress.
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.extra_types
            .insert(content_type.into().to_ascii_lowercase());
        self
    }

    /// Builds the middleware.
    #[must_use]
    pub fn build(self) -> CompressionMiddleware {
        CompressionMiddleware {
            algorithms: self.algorithms,
            min_size: self.min_size,
            level: self.level,
            extra_types: self.extra_types,
        }
    }
}
