//! Body decoding middleware.
//!
//! Turns the raw request bytes into a structured [`Payload`]. Decoders are
//! tried in a fixed order and the first one whose media type matches wins:
//!
//! | Media type                          | Payload   | Size cap |
//! |-------------------------------------|-----------|----------|
//! | `application/json`, `*/*+json`      | `Json`    | 100 KB   |
//! | `application/x-www-form-urlencoded` | `Form`    | 10 KB    |
//! | `text/plain`                        | `Text`    | none     |
//!
//! Bodies of any other type stay `Raw`. An empty body becomes an empty
//! JSON object. Oversized bodies fail with `413`, undecodable ones with
//! `400`.

use bytes::Bytes;
use http::StatusCode;
use natours_config::BodyConfig;
use natours_core::query::{parse_form_with_limit, QueryError};
use natours_core::{AppError, AppResult, BoxFuture, Payload, RequestContext, Response};

use crate::middleware::{Middleware, Next};
use crate::pipeline::Stage;

/// Parsed `Content-Type` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    essence: String,
    charset: Option<String>,
}

impl MediaType {
    /// Parses a `Content-Type` value; type and charset are lowercased.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let charset = parts.find_map(|param| {
            let (name, value) = param.split_once('=')?;
            name.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim().trim_matches('"').to_ascii_lowercase())
        });
        Self { essence, charset }
    }

    /// `type/subtype` without parameters.
    #[must_use]
    pub fn essence(&self) -> &str {
        &self.essence
    }

    /// The `charset` parameter, if any.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    fn is_json(&self) -> bool {
        self.essence == "application/json"
            || (self.essence.contains('/') && self.essence.ends_with("+json"))
    }

    fn is_form(&self) -> bool {
        self.essence == "application/x-www-form-urlencoded"
    }

    fn is_text(&self) -> bool {
        self.essence == "text/plain"
    }

    fn is_utf8(&self) -> bool {
        matches!(self.charset(), None | Some("utf-8" | "utf8"))
    }
}

/// Body decoding middleware.
#[derive(Debug, Clone)]
pub struct BodyDecoderMiddleware {
    json_limit: usize,
    json_strict: bool,
    form_limit: usize,
    form_parameter_limit: usize,
    text_enabled: bool,
}

impl Default for BodyDecoderMiddleware {
    fn default() -> Self {
        Self::from_config(&BodyConfig::default())
    }
}

impl BodyDecoderMiddleware {
    /// Creates a decoder with the default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a decoder from the `body` configuration section.
    #[must_use]
    pub fn from_config(config: &BodyConfig) -> Self {
        Self {
            json_limit: config.json_limit_bytes,
            json_strict: config.json_strict,
            form_limit: config.form_limit_bytes,
            form_parameter_limit: config.form_parameter_limit,
            text_enabled: config.text_enabled,
        }
    }

    /// Sets the JSON size cap in bytes.
    #[must_use]
    pub fn json_limit(mut self, bytes: usize) -> Self {
        self.json_limit = bytes;
        self
    }

    /// Sets the URL-encoded size cap in bytes.
    #[must_use]
    pub fn form_limit(mut self, bytes: usize) -> Self {
        self.form_limit = bytes;
        self
    }

    /// Enables or disables the `text/plain` decoder.
    #[must_use]
    pub fn text(mut self, enabled: bool) -> Self {
        self.text_enabled = enabled;
        self
    }

    /// Decodes the context's raw body in place.
    pub fn decode(&self, ctx: &mut RequestContext) -> AppResult<()> {
        let Payload::Raw(raw) = ctx.body() else {
            return Ok(());
        };
        if raw.is_empty() {
            ctx.set_body(Payload::Json(serde_json::Value::Object(serde_json::Map::new())));
            return Ok(());
        }

        let Some(media_type) = ctx.header("content-type").map(MediaType::parse) else {
            return Ok(());
        };

        let payload = if media_type.is_json() {
            self.decode_json(&media_type, raw)?
        } else if media_type.is_form() {
            self.decode_form(&media_type, raw)?
        } else if self.text_enabled && media_type.is_text() {
            decode_text(&media_type, raw)?
        } else {
            return Ok(());
        };

        ctx.set_body(payload);
        Ok(())
    }

    fn decode_json(&self, media_type: &MediaType, raw: &Bytes) -> AppResult<Payload> {
        if raw.len() > self.json_limit {
            return Err(AppError::payload_too_large());
        }
        ensure_utf8_charset(media_type)?;
        let text = utf8(raw)?;

        if self.json_strict {
            let first = text.trim_start().chars().next();
            if !matches!(first, Some('{' | '[')) {
                return Err(AppError::bad_request(format!(
                    "Unexpected token {} in JSON at position 0",
                    first.map_or_else(|| "end of input".to_string(), |c| c.to_string())
                )));
            }
        }

        serde_json::from_str(text)
            .map(Payload::Json)
            .map_err(|e| AppError::bad_request(format!("Invalid JSON: {e}")))
    }

    fn decode_form(&self, media_type: &MediaType, raw: &Bytes) -> AppResult<Payload> {
        if raw.len() > self.form_limit {
            return Err(AppError::payload_too_large());
        }
        ensure_utf8_charset(media_type)?;
        let text = utf8(raw)?;

        parse_form_with_limit(text, self.form_parameter_limit)
            .map(Payload::Form)
            .map_err(|err| match err {
                QueryError::TooManyParameters => {
                    AppError::new("too many parameters", StatusCode::PAYLOAD_TOO_LARGE)
                }
            })
    }
}

fn decode_text(media_type: &MediaType, raw: &Bytes) -> AppResult<Payload> {
    ensure_utf8_charset(media_type)?;
    utf8(raw).map(|text| Payload::Text(text.to_string()))
}

fn ensure_utf8_charset(media_type: &MediaType) -> AppResult<()> {
    if media_type.is_utf8() {
        return Ok(());
    }
    Err(AppError::new(
        format!(
            "unsupported charset \"{}\"",
            media_type.charset().unwrap_or_default().to_ascii_uppercase()
        ),
        StatusCode::UNSUPPORTED_MEDIA_TYPE,
    ))
}

fn utf8(raw: &Bytes) -> AppResult<&str> {
    std::str::from_utf8(raw).map_err(|_| AppError::bad_request("Request body is not valid UTF-8"))
}

impl Middleware for BodyDecoderMiddleware {
    fn name(&self) -> &'static str {
        Stage::BodyDecoder.name()
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        next: Next<'a>,
    ) -> BoxFuture<'a, AppResult<Response>> {
        Box::pin(async move {
            self.decode(ctx)?;
            next.run(ctx).await
        })
    }
}
