//! Client-side request pipeline for JSON cloud service APIs.
//!
//! Every request flows through the same stages: the configured
//! [`Authorizer`] attaches credentials (or is bypassed for custom
//! endpoints), the options are decorated with a fixed user agent, the
//! request is dispatched over a pooled hyper/rustls transport, the raw
//! outcome is normalized into one uniform success-or-[`ApiError`] shape,
//! and transient failures are retried with capped exponential backoff.
//!
//! On top of the pipeline sit multipart streaming uploads with duplex
//! progress reporting ([`Client::upload`]) and the access-policy
//! operations of a resource ([`Client::iam`]).
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use nimbus::{Client, ClientConfig, RequestOptions};
//! # async fn example(authorizer: Arc<dyn nimbus::Authorizer>) -> Result<(), nimbus::Error> {
//! let config = ClientConfig::builder(authorizer).build();
//! let client = Client::builder(config)
//!     .endpoint("https://pubsub.googleapis.com/v1")
//!     .build()?;
//!
//! let topic = client
//!     .request(RequestOptions::get("/projects/demo/topics/events"))
//!     .await?;
//! # let _ = topic;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod iam;
pub mod normalize;
pub mod request;
pub mod retry;
pub mod stream;
pub mod transport;
pub mod upload;

mod util;

pub use auth::{AuthError, AuthErrorKind, Authorizer, Credentials};
pub use client::{Client, ClientBuilder};
pub use config::{ClientConfig, ClientConfigBuilder};
pub use error::{ApiError, BoxError, Error, ResponseSnapshot, SubError, TransportErrorKind};
pub use executor::ApiSuccess;
pub use iam::{IamClient, Permissions};
pub use normalize::{parse_api_response, NormalizedBody, NormalizedResponse};
pub use request::{Part, PartBody, PartStream, RequestOptions, RequestPayload};
pub use retry::RetryPolicy;
pub use stream::{RequestStream, StreamEvent, UploadSink};
pub use transport::{
    HyperTransport, ReqBody, Transport, TransportFault, TransportRequest, TransportResponse,
};
pub use upload::UploadOptions;

/// Fixed user agent attached to every outbound request, last, so a
/// caller-supplied value never survives decoration.
pub const USER_AGENT_VALUE: &str = concat!("nimbus/", env!("CARGO_PKG_VERSION"));
