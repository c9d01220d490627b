//! Client rendering generated components for visual comparison.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokenlift_core::checkpoint::{ExtractedTokens, IdentifiedComponent};
use tokenlift_core::collaborators::ComponentRenderer;
use tokenlift_core::error::StageError;

use crate::client::ServiceClient;

#[derive(Debug, Serialize)]
struct RenderComponentRequest<'a> {
    component: &'a IdentifiedComponent,
    tokens: &'a ExtractedTokens,
}

#[derive(Debug, Deserialize)]
struct RenderComponentResponse {
    /// Base64-encoded PNG.
    image: String,
}

/// [`ComponentRenderer`] calling `POST {base_url}/render-component` on the
/// rendering service.
#[derive(Debug, Clone)]
pub struct HttpComponentRenderer {
    client: ServiceClient,
}

impl HttpComponentRenderer {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client: ServiceClient::with_client("component renderer", client, base_url),
        }
    }
}

#[async_trait]
impl ComponentRenderer for HttpComponentRenderer {
    async fn render_component(
        &self,
        component: &IdentifiedComponent,
        tokens: &ExtractedTokens,
    ) -> Result<Vec<u8>, StageError> {
        let request = RenderComponentRequest { component, tokens };
        let response: RenderComponentResponse =
            self.client.post_json("/render-component", &request).await?;
        Ok(self.client.decode_image(&response.image)?)
    }
}
