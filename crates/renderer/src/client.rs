//! Shared JSON-over-HTTP plumbing for the service clients.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::RendererError;

/// A base URL plus an optional bearer credential on a pooled
/// [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct ServiceClient {
    service: &'static str,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl ServiceClient {
    pub fn new(service: &'static str, base_url: impl Into<String>) -> Self {
        Self::with_client(service, reqwest::Client::new(), base_url)
    }

    /// Reuse an existing [`reqwest::Client`] for connection pooling.
    pub fn with_client(
        service: &'static str,
        client: reqwest::Client,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            service,
            client,
            base_url,
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST {base_url}{path}` with a JSON body, parsing a JSON reply.
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, RendererError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        self.parse_response(response).await
    }

    /// `DELETE {base_url}{path}`, ignoring any reply body.
    pub async fn delete(&self, path: &str) -> Result<(), RendererError> {
        let mut request = self.client.delete(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;
        self.ensure_success(response).await?;
        Ok(())
    }

    /// Decode a base64 image field from a service reply.
    pub fn decode_image(&self, encoded: &str) -> Result<Vec<u8>, RendererError> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| self.invalid(format!("image is not valid base64: {e}")))?;
        if bytes.is_empty() {
            return Err(self.invalid("image is empty"));
        }
        Ok(bytes)
    }

    pub fn invalid(&self, message: impl Into<String>) -> RendererError {
        RendererError::InvalidPayload {
            service: self.service,
            message: message.into(),
        }
    }

    // ---- private helpers ----

    /// Return the response unchanged on success, or an
    /// [`RendererError::Api`] carrying the status and body text.
    async fn ensure_success(
        &self,
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RendererError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RendererError::Api {
                service: self.service,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, RendererError> {
        let response = self.ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

/// Base64-encode bytes for a request body.
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = ServiceClient::new("renderer", "http://renderer:9000/");
        assert_eq!(client.base_url(), "http://renderer:9000");
    }

    #[test]
    fn image_round_trips_through_base64() {
        let client = ServiceClient::new("renderer", "http://renderer");
        let bytes = vec![0x89, b'P', b'N', b'G'];
        assert_eq!(client.decode_image(&encode_image(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn bad_base64_is_invalid_payload() {
        let client = ServiceClient::new("vision", "http://vision");
        assert_matches!(
            client.decode_image("!!not base64!!"),
            Err(RendererError::InvalidPayload { service: "vision", .. })
        );
        assert_matches!(
            client.decode_image(""),
            Err(RendererError::InvalidPayload { .. })
        );
    }
}
