//! Seams between the request-building core and the network.

use crate::{brick::BrickRequest, types::AnyJson};

/// One JSON object received from the Brick API.
///
/// A single response body may carry several objects back to back; each one
/// becomes its own `BrickResponse`.
#[derive(Debug, Clone, PartialEq)]
pub struct BrickResponse {
    /// The parsed object.
    pub body: AnyJson,
    /// The exact text it was parsed from.
    pub raw: String,
}

impl BrickResponse {
    /// Splits a body into its consecutive JSON objects.
    pub fn parse_stream(body: &str) -> Result<Vec<BrickResponse>, serde_json::Error> {
        let mut stream = serde_json::Deserializer::from_str(body).into_iter::<AnyJson>();
        let mut responses = Vec::new();
        let mut start = 0;

        while let Some(value) = stream.next() {
            let value = value?;
            let end = stream.byte_offset();
            responses.push(BrickResponse {
                body: value,
                raw: body[start..end].trim().to_string(),
            });
            start = end;
        }

        Ok(responses)
    }
}

/// Delivers prepared Brick requests.
///
/// Failures are returned as-is; implementations do not retry.
pub trait Transport {
    type Error: std::error::Error;

    fn send(
        &self,
        request: BrickRequest,
    ) -> impl Future<Output = Result<Vec<BrickResponse>, Self::Error>>;
}
