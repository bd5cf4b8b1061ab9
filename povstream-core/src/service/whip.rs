use tracing::debug;

use crate::{Error, Result};

/// Answer returned by a successful WHIP publish.
#[derive(Debug, Clone)]
pub struct WhipAnswer {
    pub sdp_answer: String,
    /// Upstream session resource to later DELETE, from the `Location` header.
    pub resource_url: Option<String>,
}

/// Upstream rejection carrying the provider's status and body, passed through
/// to the caller unchanged.
#[derive(Debug, Clone)]
pub struct WhipRejection {
    pub status: u16,
    pub body: String,
}

/// Thin client for WHIP-style publish against a provisioned ingress endpoint.
///
/// Owned explicitly by its caller; holds no hidden connection state, so
/// multiple concurrent POV sessions are safe.
#[derive(Clone)]
pub struct WhipClient {
    http: reqwest::Client,
}

impl WhipClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }

    /// Forward an SDP offer to the ingress endpoint, bearer-authenticated
    /// with the stream key.
    pub async fn publish(
        &self,
        server_url: &str,
        stream_key: &str,
        sdp_offer: String,
    ) -> Result<std::result::Result<WhipAnswer, WhipRejection>> {
        let response = self
            .http
            .post(server_url)
            .header(http::header::CONTENT_TYPE, "application/sdp")
            .bearer_auth(stream_key)
            .body(sdp_offer)
            .send()
            .await?;

        let status = response.status();
        let resource_url = response
            .headers()
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        if !status.is_success() {
            return Ok(Err(WhipRejection {
                status: status.as_u16(),
                body,
            }));
        }

        debug!(resource_url = ?resource_url, "WHIP publish accepted");
        Ok(Ok(WhipAnswer {
            sdp_answer: body,
            resource_url,
        }))
    }

    /// DELETE a previously returned session resource. A 404 means the
    /// resource is already gone and counts as success (idempotent delete).
    pub async fn delete_resource(&self, resource_url: &str, stream_key: &str) -> Result<()> {
        let response = self
            .http
            .delete(resource_url)
            .bearer_auth(stream_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() && status != http::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamProvisioning(format!(
                "WHIP delete failed ({status}): {body}"
            )));
        }

        Ok(())
    }
}

impl Default for WhipClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_publish_returns_answer_and_resource() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer key1"))
            .and(header("content-type", "application/sdp"))
            .respond_with(
                ResponseTemplate::new(201)
                    .insert_header("location", "/whip/resource/42")
                    .set_body_string("v=0 answer"),
            )
            .mount(&server)
            .await;

        let client = WhipClient::new();
        let answer = client
            .publish(&server.uri(), "key1", "v=0 offer".to_string())
            .await
            .expect("request")
            .expect("accepted");

        assert_eq!(answer.sdp_answer, "v=0 answer");
        assert_eq!(answer.resource_url.as_deref(), Some("/whip/resource/42"));
    }

    #[tokio::test]
    async fn test_publish_passes_upstream_rejection_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("bad key"))
            .mount(&server)
            .await;

        let client = WhipClient::new();
        let rejection = client
            .publish(&server.uri(), "key1", "v=0 offer".to_string())
            .await
            .expect("request")
            .expect_err("rejected");

        assert_eq!(rejection.status, 403);
        assert_eq!(rejection.body, "bad key");
    }

    #[tokio::test]
    async fn test_delete_tolerates_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = WhipClient::new();
        client
            .delete_resource(&server.uri(), "key1")
            .await
            .expect("404 is success");
    }

    #[tokio::test]
    async fn test_delete_propagates_other_errors() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = WhipClient::new();
        let err = client
            .delete_resource(&server.uri(), "key1")
            .await
            .expect_err("500 propagates");
        assert!(matches!(err, Error::UpstreamProvisioning(_)));
    }
}
