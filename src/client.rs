use std::sync::Arc;

use crate::auth::{AuthError, Credentials};
use crate::config::ClientConfig;
use crate::error::Error;
use crate::executor::{ApiSuccess, RequestExecutor};
use crate::iam::IamClient;
use crate::request::RequestOptions;
use crate::stream::{RequestStream, UploadSink};
use crate::transport::{HyperTransport, Transport};
use crate::upload::{run_upload, UploadOptions};

/// Entry point for issuing requests against one API endpoint. Cheap to
/// clone; all clones share the transport, its connection pool, and the
/// client configuration.
#[derive(Clone)]
pub struct Client {
    executor: Arc<RequestExecutor>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    pub fn builder(config: ClientConfig) -> ClientBuilder {
        ClientBuilder {
            config,
            endpoint: None,
            transport: None,
        }
    }

    /// Issues one request and waits for its terminal outcome.
    pub async fn request(&self, options: RequestOptions) -> Result<ApiSuccess, Error> {
        self.executor.execute(options).await
    }

    /// Issues one request in streaming mode: the outcome arrives as events
    /// on the returned stream, and `abort` cancels the in-flight attempt or
    /// its backoff wait.
    pub fn request_stream(&self, options: RequestOptions) -> RequestStream {
        let (stream, _sink) = RequestStream::new();
        let handle = stream.handle();
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            executor.execute_stream(options, handle).await;
        });
        stream
    }

    /// Starts a multipart streaming upload. Content written to the returned
    /// sink is framed and sent as it arrives; the stream reports the
    /// response and exactly one terminal event.
    pub fn upload(&self, options: UploadOptions) -> (RequestStream, UploadSink) {
        let (mut stream, sink) = RequestStream::new();
        // A freshly created stream always has its content side available.
        if let Some(content) = stream.take_content() {
            let handle = stream.handle();
            let executor = Arc::clone(&self.executor);
            tokio::spawn(async move {
                run_upload(executor, options, content, handle).await;
            });
        }
        (stream, sink)
    }

    /// Starts an upload over a caller-provided stream. Fails when the
    /// stream's content side has already been bound to another upload.
    pub fn upload_with_stream(
        &self,
        options: UploadOptions,
        stream: &mut RequestStream,
    ) -> Result<(), Error> {
        let content = stream.take_content().ok_or(Error::StreamAlreadyBound)?;
        let handle = stream.handle();
        let executor = Arc::clone(&self.executor);
        tokio::spawn(async move {
            run_upload(executor, options, content, handle).await;
        });
        Ok(())
    }

    /// Access-policy operations for one resource path.
    pub fn iam(&self, resource: impl Into<String>) -> IamClient {
        IamClient::new(Arc::clone(&self.executor), resource.into())
    }

    /// Current credentials, straight from the configured authorizer.
    pub async fn credentials(&self) -> Result<Credentials, AuthError> {
        self.executor.config().authorizer().credentials().await
    }
}

pub struct ClientBuilder {
    config: ClientConfig,
    endpoint: Option<String>,
    transport: Option<Arc<dyn Transport>>,
}

impl ClientBuilder {
    /// Base endpoint requests resolve against, for example
    /// `https://pubsub.googleapis.com/v1`.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Replaces the default hyper transport, mainly for tests and emulators.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<Client, Error> {
        let endpoint = self.endpoint.ok_or(Error::Validation {
            message: "An api endpoint is required.",
        })?;
        let max_response_body_bytes = self.config.max_response_body_bytes();
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HyperTransport::with_max_response_body_bytes(
                max_response_body_bytes,
            )?),
        };
        let executor = RequestExecutor::new(transport, Arc::new(self.config), endpoint);
        Ok(Client {
            executor: Arc::new(executor),
        })
    }
}
