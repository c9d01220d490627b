//! Client for the component-identification (vision) service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokenlift_core::checkpoint::IdentifiedComponent;
use tokenlift_core::collaborators::ComponentIdentifier;
use tokenlift_core::error::StageError;

use crate::client::{encode_image, ServiceClient};

#[derive(Debug, Serialize)]
struct IdentifyRequest {
    /// Base64-encoded screenshot.
    image: String,
}

#[derive(Debug, Deserialize)]
struct IdentifyResponse {
    components: Vec<IdentifiedComponent>,
}

/// [`ComponentIdentifier`] calling `POST {base_url}/identify` with a
/// bearer API key.
#[derive(Debug, Clone)]
pub struct VisionClient {
    client: ServiceClient,
}

impl VisionClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url, api_key)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: ServiceClient::with_client("vision", client, base_url).with_api_key(api_key),
        }
    }
}

/// Drop components the service returned with unusable geometry or
/// confidence.
fn sanitize(components: Vec<IdentifiedComponent>) -> Vec<IdentifiedComponent> {
    components
        .into_iter()
        .filter(|c| {
            let b = &c.bounding_box;
            b.width > 0.0 && b.height > 0.0 && (0.0..=1.0).contains(&c.confidence)
        })
        .collect()
}

#[async_trait]
impl ComponentIdentifier for VisionClient {
    async fn identify(&self, screenshot: &[u8]) -> Result<Vec<IdentifiedComponent>, StageError> {
        let request = IdentifyRequest {
            image: encode_image(screenshot),
        };
        let response: IdentifyResponse = self.client.post_json("/identify", &request).await?;

        let received = response.components.len();
        let components = sanitize(response.components);
        if components.len() < received {
            tracing::warn!(
                dropped = received - components.len(),
                "Vision service returned unusable components"
            );
        }
        Ok(components)
    }
}
