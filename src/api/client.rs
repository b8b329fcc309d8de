//! Spheron API client implementation.
//!
//! This module provides the HTTP gateway for the Spheron compute API:
//! JSON request/response calls with bearer authentication plus the
//! long-lived deployment event subscription.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use crate::config::ProviderConfig;
use crate::error::{ApiError, DeploymentError, Result};

use super::ComputeApi;
use super::stream::read_terminal_event;
use super::types::{
    AckResponse, Cluster, CreateFromTemplateRequest, CreateInstanceRequest, DeploymentEventData,
    Domain, DomainRequest, HealthCheckUpdate, Instance, InstanceCreated, InstanceOrder,
    MachineImage, MarketplaceApp, Organization, TokenScope, UpdateInstanceRequest,
};

/// Default request timeout in seconds. Provisioning calls can be slow, so
/// the timeout is generous.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Spheron API client.
#[derive(Debug)]
pub struct SpheronClient {
    /// HTTP client.
    http: Client,
    /// API base URL.
    api_url: String,
    /// Access token.
    token: String,
    /// Organization id derived from the token scope, resolved once.
    organization_id: OnceCell<String>,
    /// Caller-imposed deadline on deployment waits.
    deployment_deadline: Option<Duration>,
}

/// Error envelope the API returns on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    message: String,
}

impl SpheronClient {
    /// Creates a new Spheron API client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| ApiError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            api_url: config.api_url.clone(),
            token: config.token.clone(),
            organization_id: OnceCell::new(),
            deployment_deadline: None,
        })
    }

    /// Sets a deadline on deployment waits. Without one, a wait blocks
    /// until the transport gives up.
    #[must_use]
    pub const fn with_deployment_deadline(mut self, deadline: Duration) -> Self {
        self.deployment_deadline = Some(deadline);
        self
    }

    /// Resolves the organization id for the access token, once.
    ///
    /// # Errors
    ///
    /// Returns an error if the token scope cannot be fetched or spans
    /// more than one organization.
    pub async fn organization_id(&self) -> Result<&str> {
        let id = self
            .organization_id
            .get_or_try_init(|| async {
                let scope: TokenScope = self.get("/v1/api-keys/scope").await?;

                if scope.organizations.len() != 1 {
                    return Err(ApiError::remote(
                        "Unsupported token! Please use a single scope token.",
                    )
                    .into());
                }

                Ok::<_, crate::error::SpheronError>(scope.organizations[0].id.clone())
            })
            .await?;

        Ok(id)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        query: &[(&str, &str)],
    ) -> Result<T> {
        trace!("{method} {path}");

        let mut request = self
            .http
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(&self.token);

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("Request failed: {e}")))?;

        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::decode_error(status, path, &text).into());
        }

        response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(format!("Failed to parse response: {e}")).into())
    }

    /// Maps a non-2xx response to an error, decoding the `{message}`
    /// envelope when present and falling back to the HTTP status line.
    fn decode_error(status: StatusCode, path: &str, body: &str) -> ApiError {
        let message = serde_json::from_str::<ErrorEnvelope>(body)
            .map(|envelope| envelope.message)
            .ok();

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized {
                message: message.unwrap_or_else(|| String::from("Invalid access token")),
            },
            StatusCode::NOT_FOUND => ApiError::NotFound {
                path: path.to_string(),
            },
            _ => message.map_or_else(
                || ApiError::remote(format!("API request failed with status: {status}")),
                ApiError::remote,
            ),
        }
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::GET, path, None, &[]).await
    }

    async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<T> {
        self.request(Method::GET, path, None, query).await
    }

    async fn post<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::invalid_response(format!("Failed to encode request: {e}")))?;
        self.request(Method::POST, path, Some(body), &[]).await
    }

    async fn post_empty<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.request(Method::POST, path, None, &[]).await
    }

    async fn patch<B: serde::Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        let body = serde_json::to_value(body)
            .map_err(|e| ApiError::invalid_response(format!("Failed to encode request: {e}")))?;
        self.request(Method::PATCH, path, Some(body), &[]).await
    }

    // Delete endpoints return inconsistent bodies, so only the status
    // is checked.
    async fn delete_empty(&self, path: &str) -> Result<()> {
        let response = self
            .http
            .delete(format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::decode_error(status, path, &text).into());
        }

        Ok(())
    }

    /// Opens the deployment event subscription for `topic_id` and reads
    /// it until a terminal event.
    async fn subscribe_and_read(&self, topic_id: &str) -> Result<DeploymentEventData> {
        debug!(topic = topic_id, "subscribing to deployment events");

        let response = self
            .http
            .get(format!("{}/v1/subscribe", self.api_url))
            .query(&[("sessionId", topic_id)])
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ApiError::transport(format!("Subscribe request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Self::decode_error(status, "/v1/subscribe", &text).into());
        }

        let chunks = Box::pin(response.bytes_stream().map(|r| r.map_err(io::Error::other)));
        read_terminal_event(chunks, topic_id).await
    }
}

#[async_trait]
impl ComputeApi for SpheronClient {
    async fn organization(&self) -> Result<Organization> {
        let id = self.organization_id().await?.to_string();
        self.get(&format!("/v1/organization/{id}")).await
    }

    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<InstanceCreated> {
        debug!(cluster = %request.cluster_name, "creating cluster instance");
        self.post("/v1/cluster-instance/create", request).await
    }

    async fn update_instance(
        &self,
        id: &str,
        request: &UpdateInstanceRequest,
    ) -> Result<InstanceCreated> {
        debug!(id, "updating cluster instance");
        self.patch(&format!("/v1/cluster-instance/{id}/update"), request)
            .await
    }

    async fn update_health_check(
        &self,
        id: &str,
        request: &HealthCheckUpdate,
    ) -> Result<AckResponse> {
        self.patch(
            &format!("/v1/cluster-instance/{id}/update/health-check"),
            request,
        )
        .await
    }

    async fn close_instance(&self, id: &str) -> Result<AckResponse> {
        debug!(id, "closing cluster instance");
        self.post_empty(&format!("/v1/cluster-instance/{id}/close"))
            .await
    }

    async fn instance(&self, id: &str) -> Result<Instance> {
        #[derive(Deserialize)]
        struct Response {
            instance: Instance,
        }

        let response: Response = self.get(&format!("/v1/cluster-instance/{id}")).await?;
        Ok(response.instance)
    }

    async fn instance_order(&self, id: &str) -> Result<InstanceOrder> {
        #[derive(Deserialize)]
        struct Response {
            order: InstanceOrder,
        }

        let response: Response = self
            .get(&format!("/v1/cluster-instance/order/{id}"))
            .await?;
        Ok(response.order)
    }

    async fn create_from_template(
        &self,
        request: &CreateFromTemplateRequest,
    ) -> Result<InstanceCreated> {
        debug!(template = %request.template_id, "creating instance from template");
        self.post("/v1/cluster-instance/template", request).await
    }

    async fn marketplace_apps(&self) -> Result<Vec<MarketplaceApp>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            cluster_templates: Vec<MarketplaceApp>,
        }

        let response: Response = self.get("/v1/cluster-templates").await?;
        Ok(response.cluster_templates)
    }

    async fn machine_images(&self) -> Result<Vec<MachineImage>> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Response {
            akash_machine_images: Vec<MachineImage>,
        }

        let response: Response = self
            .get_with_query("/v1/compute-machine-image", &[("skip", "0"), ("limit", "10")])
            .await?;
        Ok(response.akash_machine_images)
    }

    async fn cluster(&self, id: &str) -> Result<Cluster> {
        #[derive(Deserialize)]
        struct Response {
            cluster: Cluster,
        }

        let response: Response = self.get(&format!("/v1/cluster/{id}")).await?;
        Ok(response.cluster)
    }

    async fn add_domain(&self, instance_id: &str, request: &DomainRequest) -> Result<Domain> {
        #[derive(Deserialize)]
        struct Response {
            domain: Domain,
        }

        let response: Response = self
            .post(&format!("/v1/cluster-instance/{instance_id}/domains"), request)
            .await?;
        Ok(response.domain)
    }

    async fn update_domain(
        &self,
        instance_id: &str,
        domain_id: &str,
        request: &DomainRequest,
    ) -> Result<Domain> {
        #[derive(Deserialize)]
        struct Response {
            domain: Domain,
        }

        let response: Response = self
            .patch(
                &format!("/v1/cluster-instance/{instance_id}/domains/{domain_id}"),
                request,
            )
            .await?;
        Ok(response.domain)
    }

    async fn delete_domain(&self, instance_id: &str, domain_id: &str) -> Result<()> {
        self.delete_empty(&format!(
            "/v1/cluster-instance/{instance_id}/domains/{domain_id}"
        ))
        .await
    }

    async fn domains(&self, instance_id: &str) -> Result<Vec<Domain>> {
        #[derive(Deserialize)]
        struct Response {
            domains: Vec<Domain>,
        }

        let response: Response = self
            .get(&format!("/v1/cluster-instance/{instance_id}/domains"))
            .await?;
        Ok(response.domains)
    }

    async fn wait_for_deployment(&self, topic_id: &str) -> Result<DeploymentEventData> {
        // The deadline covers the whole wait, subscription included.
        match self.deployment_deadline {
            Some(deadline) => tokio::time::timeout(deadline, self.subscribe_and_read(topic_id))
                .await
                .map_err(|_| DeploymentError::TimedOut {
                    topic: topic_id.to_string(),
                    elapsed_secs: deadline.as_secs(),
                })?,
            None => self.subscribe_and_read(topic_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpheronError;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> SpheronClient {
        let config = ProviderConfig::new("test-token").with_api_url(server.uri());
        SpheronClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_organization_id_requires_single_scope() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api-keys/scope"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organizations": [
                    {"id": "org-1", "name": "one", "username": "one"},
                    {"id": "org-2", "name": "two", "username": "two"}
                ]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.organization_id().await.unwrap_err();
        assert!(matches!(err, SpheronError::Api(ApiError::Remote { .. })));
    }

    #[tokio::test]
    async fn test_organization_id_is_resolved_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api-keys/scope"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "organizations": [{"id": "org-1", "name": "one", "username": "one"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.organization_id().await.unwrap(), "org-1");
        assert_eq!(client.organization_id().await.unwrap(), "org-1");
    }

    #[tokio::test]
    async fn test_error_envelope_message_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/cluster-instance/abc/close"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"message": "Instance already closed"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.close_instance("abc").await.unwrap_err();
        assert!(err.is_already_closed());
    }

    #[tokio::test]
    async fn test_undecodable_error_falls_back_to_status_line() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/cluster-instance/abc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.instance("abc").await.unwrap_err();
        match err {
            SpheronError::Api(ApiError::Remote { message }) => {
                assert!(message.contains("500"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized_is_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/api-keys/scope"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.organization_id().await.unwrap_err();
        assert!(matches!(
            err,
            SpheronError::Api(ApiError::Unauthorized { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_deployment_reads_subscription() {
        let server = MockServer::start().await;
        let body = "event: message\n\
                    data: {\"type\":1,\"session\":\"topic-1\"}\n\
                    event: message\n\
                    data: {\"type\":2,\"data\":{\"ports\":[{\"containerPort\":8000,\"exposedPort\":30001}]},\"session\":\"topic-1\"}\n";
        Mock::given(method("GET"))
            .and(path("/v1/subscribe"))
            .and(query_param("sessionId", "topic-1"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let data = client.wait_for_deployment("topic-1").await.unwrap();
        assert_eq!(data.ports[0].exposed_port, 30001);
    }

    #[tokio::test]
    async fn test_wait_for_deployment_deadline_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/subscribe"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("event: message\n", "text/event-stream")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server)
            .await
            .with_deployment_deadline(Duration::from_millis(100));
        let err = client.wait_for_deployment("topic-2").await.unwrap_err();
        assert!(matches!(
            err,
            SpheronError::Deployment(DeploymentError::TimedOut { .. })
        ));
    }
}
