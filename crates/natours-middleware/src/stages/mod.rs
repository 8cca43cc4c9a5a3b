//! Pipeline stages, in execution order.
//!
//! 1. [`static_assets`] - Files from the public root
//! 2. [`request_logger`] - Per-request log line (development)
//! 3. [`rate_limit`] - Fixed-window limiter under `/api`
//! 4. [`body_decoder`] - JSON, URL-encoded and text bodies
//! 5. [`cookie_parser`] - `Cookie` header into a map
//! 6. [`sanitize`] - Operator-key removal and markup escaping
//! 7. [`parameter_pollution`] - Repeated parameter collapse
//! 8. [`compression`] - Response compression
//! 9. [`router_dispatch`] - Route groups and handlers
//! 10. [`not_found`] - Chain terminal
//! 11. [`error_normalization`] - Failure into the client envelope

pub mod body_decoder;
pub mod compression;
pub mod cookie_parser;
pub mod error_normalization;
pub mod not_found;
pub mod parameter_pollution;
pub mod rate_limit;
pub mod request_logger;
pub mod router_dispatch;
pub mod sanitize;
pub mod static_assets;

pub use body_decoder::BodyDecoderMiddleware;
pub use compression::CompressionMiddleware;
pub use cookie_parser::CookieParserMiddleware;
pub use error_normalization::ErrorNormalizer;
pub use parameter_pollution::ParameterPollutionMiddleware;
pub use rate_limit::{
    InMemoryStore, KeyExtractor, RateLimitBuilder, RateLimitMiddleware, RateLimitStore,
};
pub use request_logger::RequestLoggerMiddleware;
pub use router_dispatch::{RouteTable, RouterDispatcher};
pub use sanitize::SanitizeMiddleware;
pub use static_assets::StaticAssetsMiddleware;
