use http::StatusCode;

use crate::{
    brick::BrickRequest,
    concepts::{BrickResponse, Transport},
    errors::Error,
};

/// A [`Transport`] that sends Brick requests over HTTPS with `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    pub client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        HttpTransport::default()
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        HttpTransport { client }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpTransportError {
    #[error("Invalid request: {0}")]
    Request(#[from] Error),
    #[error("HTTP request error: {0}")]
    HttpRequestError(#[from] reqwest::Error),
    #[error("Unexpected status {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Serialization/Deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl Transport for HttpTransport {
    type Error = HttpTransportError;

    async fn send(&self, request: BrickRequest) -> Result<Vec<BrickResponse>, Self::Error> {
        let url = request.url()?;

        let response = self
            .client
            .request(request.method, url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Brick API responded with {status}: {body}");

        if !status.is_success() {
            return Err(HttpTransportError::Status { status, body });
        }

        Ok(BrickResponse::parse_stream(&body)?)
    }
}
