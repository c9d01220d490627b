//! Client for the headless-browser rendering service.
//!
//! Endpoints used:
//!
//! | Method | Path | Purpose |
//! |---|---|---|
//! | POST | `/render` | load a URL, return a session id and a base64 screenshot |
//! | POST | `/sessions/{id}/styles` | resolve styles of a selector in that session |
//! | DELETE | `/sessions/{id}` | close the session |

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokenlift_core::collaborators::{PageHandle, PageRenderer, PseudoClass, RenderedPage, StyleMap};
use tokenlift_core::error::StageError;

use crate::client::ServiceClient;

#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    url: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderResponse {
    session_id: String,
    /// Base64-encoded PNG.
    screenshot: String,
}

#[derive(Debug, Serialize)]
struct StylesRequest<'a> {
    selector: &'a str,
    properties: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pseudo: Option<PseudoClass>,
}

#[derive(Debug, Deserialize)]
struct StylesResponse {
    found: bool,
    #[serde(default)]
    styles: StyleMap,
}

/// [`PageRenderer`] backed by the rendering service.
#[derive(Debug, Clone)]
pub struct HttpPageRenderer {
    client: ServiceClient,
}

impl HttpPageRenderer {
    /// * `base_url` - e.g. `http://renderer:9000`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client: ServiceClient::with_client("renderer", client, base_url),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpPageRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, StageError> {
        let response: RenderResponse = self.client.post_json("/render", &RenderRequest { url }).await?;
        let screenshot = self.client.decode_image(&response.screenshot)?;

        tracing::debug!(
            session_id = %response.session_id,
            screenshot_bytes = screenshot.len(),
            "Page rendered"
        );

        Ok(RenderedPage {
            screenshot,
            dom: Arc::new(HttpPageHandle {
                client: self.client.clone(),
                session_id: response.session_id,
            }),
        })
    }
}

/// DOM access to one rendering session.
#[derive(Debug, Clone)]
pub struct HttpPageHandle {
    client: ServiceClient,
    session_id: String,
}

impl HttpPageHandle {
    async fn styles(
        &self,
        selector: &str,
        properties: &[String],
        pseudo: Option<PseudoClass>,
    ) -> Result<StylesResponse, StageError> {
        let path = format!("/sessions/{}/styles", self.session_id);
        let body = StylesRequest {
            selector,
            properties,
            pseudo,
        };
        Ok(self.client.post_json(&path, &body).await?)
    }
}

#[async_trait]
impl PageHandle for HttpPageHandle {
    async fn computed_styles(
        &self,
        selector: &str,
        properties: &[String],
    ) -> Result<Option<StyleMap>, StageError> {
        let response = self.styles(selector, properties, None).await?;
        Ok(response.found.then_some(response.styles))
    }

    async fn pseudo_styles(
        &self,
        selector: &str,
        pseudo: PseudoClass,
        properties: &[String],
    ) -> Result<StyleMap, StageError> {
        let response = self.styles(selector, properties, Some(pseudo)).await?;
        Ok(response.styles)
    }

    async fn close(&self) -> Result<(), StageError> {
        self.client
            .delete(&format!("/sessions/{}", self.session_id))
            .await?;
        tracing::debug!(session_id = %self.session_id, "Render session closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Accept one connection, answer `status_line` with an empty body and
    /// return the request head.
    async fn serve_once(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let reply = format!("{status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
            socket.write_all(reply.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (base_url, handle)
    }

    fn handle(base_url: &str) -> HttpPageHandle {
        HttpPageHandle {
            client: ServiceClient::new("renderer", base_url),
            session_id: "s-42".into(),
        }
    }

    #[tokio::test]
    async fn close_deletes_the_session() {
        let (base_url, server) = serve_once("HTTP/1.1 204 No Content").await;

        handle(&base_url).close().await.unwrap();

        let head = server.await.unwrap();
        assert!(head.starts_with("DELETE /sessions/s-42 HTTP/1.1"), "{head}");
    }

    #[tokio::test]
    async fn close_reports_service_errors() {
        let (base_url, server) = serve_once("HTTP/1.1 404 Not Found").await;

        let err = handle(&base_url).close().await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.message.contains("404"));
        server.await.unwrap();
    }

    #[test]
    fn styles_request_omits_absent_pseudo() {
        let properties = vec!["color".to_string()];
        let json = serde_json::to_value(StylesRequest {
            selector: ".btn",
            properties: &properties,
            pseudo: None,
        })
        .unwrap();
        assert!(json.get("pseudo").is_none());

        let json = serde_json::to_value(StylesRequest {
            selector: ".btn",
            properties: &properties,
            pseudo: Some(PseudoClass::Hover),
        })
        .unwrap();
        assert_eq!(json["pseudo"], "hover");
    }

    #[test]
    fn render_response_reads_camel_case() {
        let response: RenderResponse =
            serde_json::from_str(r#"{"sessionId":"s-1","screenshot":"aGk="}"#).unwrap();
        assert_eq!(response.session_id, "s-1");
    }

    #[test]
    fn styles_response_defaults_to_empty_map() {
        let response: StylesResponse = serde_json::from_str(r#"{"found":false}"#).unwrap();
        assert!(!response.found);
        assert!(response.styles.is_empty());
    }
}
