//! [`AlertingApi`] over the REST API.

use alert_model::{Condition, ConditionKind, InfraCondition};
use alert_reconciler::{
    AlertingApi, ApiError, ChannelDefinition, ExternalChannel, ExternalPolicy, PolicyDefinition,
};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};
use url::Url;

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::wire::{
    ApmEnvelope, ApmList, ChannelEnvelope, ChannelList, ChannelPayload, Created, InfraEnvelope,
    InfraList, NrqlEnvelope, NrqlList, PolicyEnvelope, PolicyList, PolicyPayload,
    WireApmCondition, WireChannel, WireInfraCondition, WireNrqlCondition, WirePolicy,
};

/// Header carrying the admin API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Page size for infrastructure condition listings.
const INFRA_PAGE_SIZE: usize = 50;

/// HTTP client for the alerting service.
#[derive(Debug, Clone)]
pub struct HttpAlertingApi {
    http: reqwest::Client,
    base_url: Url,
    infra_base_url: Url,
}

impl HttpAlertingApi {
    /// Creates a client authenticating with `api_key`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError` if the configuration or key is unusable.
    pub fn new(config: &ClientConfig, api_key: &str) -> Result<Self> {
        config.validate()?;

        let mut key = HeaderValue::from_str(api_key).map_err(|_| ClientError::InvalidApiKey)?;
        key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, key);

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .default_headers(headers)
            .user_agent(concat!("alert-operator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        let base_url = config.base_url()?;
        let infra_base_url = config.infra_base_url()?;
        info!(%base_url, %infra_base_url, "alerting API client ready");

        Ok(Self {
            http,
            base_url,
            infra_base_url,
        })
    }

    fn url(&self, path: &str) -> std::result::Result<Url, ApiError> {
        join(&self.base_url, path)
    }

    fn infra_url(&self, path: &str) -> std::result::Result<Url, ApiError> {
        join(&self.infra_base_url, path)
    }

    /// Sends a request, mapping 404 to `NotFound` and other failures to
    /// `Status` with the response body.
    async fn execute(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> std::result::Result<Response, ApiError> {
        let request = request
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        debug!(method = %request.method(), url = %request.url(), "alerting API request");

        let response = self
            .http
            .execute(request)
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ApiError::not_found(what));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> std::result::Result<T, ApiError> {
        self.execute(request, what)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::Decode(format!("{what}: {e}")))
    }

    async fn list_infra(&self, policy_id: i64) -> std::result::Result<Vec<Condition>, ApiError> {
        let url = self.infra_url("alerts/conditions")?;
        let mut conditions = Vec::new();
        loop {
            let offset = conditions.len();
            let page: InfraList = self
                .fetch(
                    self.http.get(url.clone()).query(&[
                        ("policy_id", policy_id.to_string()),
                        ("limit", INFRA_PAGE_SIZE.to_string()),
                        ("offset", offset.to_string()),
                    ]),
                    &format!("infra conditions of policy {policy_id}"),
                )
                .await?;
            let received = page.data.len();
            conditions.extend(
                page.data
                    .into_iter()
                    .map(|c| Condition::Infra(InfraCondition::from(c))),
            );
            // A missing `meta` decodes as a total of zero; only a short page ends the listing then.
            let total = page.meta.total;
            if received < INFRA_PAGE_SIZE || (total > 0 && conditions.len() >= total) {
                return Ok(conditions);
            }
        }
    }
}

fn join(base: &Url, path: &str) -> std::result::Result<Url, ApiError> {
    base.join(path)
        .map_err(|e| ApiError::Transport(format!("invalid endpoint '{path}': {e}")))
}

fn decode<T, W>(what: &str, wire: W) -> std::result::Result<T, ApiError>
where
    T: TryFrom<W, Error = String>,
{
    T::try_from(wire).map_err(|e| ApiError::Decode(format!("{what}: {e}")))
}

impl From<WirePolicy> for ExternalPolicy {
    fn from(p: WirePolicy) -> Self {
        Self {
            id: p.id,
            name: p.name,
            incident_preference: p.incident_preference,
        }
    }
}

impl From<WireChannel> for ExternalChannel {
    fn from(c: WireChannel) -> Self {
        Self {
            id: c.id,
            name: c.name,
            channel_type: c.channel_type,
            policy_ids: c.links.policy_ids,
        }
    }
}

impl AlertingApi for HttpAlertingApi {
    async fn get_policy(&self, id: i64) -> std::result::Result<ExternalPolicy, ApiError> {
        let url = self.url(&format!("alerts_policies/{id}.json"))?;
        let body: PolicyEnvelope<WirePolicy> =
            self.fetch(self.http.get(url), &format!("policy {id}")).await?;
        Ok(body.policy.into())
    }

    async fn find_policy_by_name(
        &self,
        name: &str,
    ) -> std::result::Result<Option<ExternalPolicy>, ApiError> {
        let url = self.url("alerts_policies.json")?;
        let body: PolicyList = self
            .fetch(
                self.http.get(url).query(&[("filter[name]", name)]),
                &format!("policies named '{name}'"),
            )
            .await?;
        // The name filter is a substring match.
        Ok(body
            .policies
            .into_iter()
            .find(|p| p.name == name)
            .map(Into::into))
    }

    async fn create_policy(
        &self,
        definition: &PolicyDefinition,
    ) -> std::result::Result<ExternalPolicy, ApiError> {
        let url = self.url("alerts_policies.json")?;
        let payload = PolicyEnvelope {
            policy: PolicyPayload {
                name: &definition.name,
                incident_preference: definition.incident_preference,
            },
        };
        let body: PolicyEnvelope<WirePolicy> = self
            .fetch(
                self.http.post(url).json(&payload),
                &format!("policy '{}'", definition.name),
            )
            .await?;
        Ok(body.policy.into())
    }

    async fn update_policy(
        &self,
        id: i64,
        definition: &PolicyDefinition,
    ) -> std::result::Result<ExternalPolicy, ApiError> {
        let url = self.url(&format!("alerts_policies/{id}.json"))?;
        let payload = PolicyEnvelope {
            policy: PolicyPayload {
                name: &definition.name,
                incident_preference: definition.incident_preference,
            },
        };
        let body: PolicyEnvelope<WirePolicy> = self
            .fetch(self.http.put(url).json(&payload), &format!("policy {id}"))
            .await?;
        Ok(body.policy.into())
    }

    async fn delete_policy(&self, id: i64) -> std::result::Result<(), ApiError> {
        let url = self.url(&format!("alerts_policies/{id}.json"))?;
        self.execute(self.http.delete(url), &format!("policy {id}"))
            .await?;
        Ok(())
    }

    async fn list_conditions(
        &self,
        policy_id: i64,
        kind: ConditionKind,
    ) -> std::result::Result<Vec<Condition>, ApiError> {
        let what = format!("{kind} conditions of policy {policy_id}");
        match kind {
            ConditionKind::Nrql => {
                let url = self.url("alerts_nrql_conditions.json")?;
                let body: NrqlList = self
                    .fetch(self.http.get(url).query(&[("policy_id", policy_id)]), &what)
                    .await?;
                body.nrql_conditions
                    .into_iter()
                    .map(|c| decode(&what, c).map(Condition::Nrql))
                    .collect()
            }
            ConditionKind::Apm => {
                let url = self.url("alerts_conditions.json")?;
                let body: ApmList = self
                    .fetch(self.http.get(url).query(&[("policy_id", policy_id)]), &what)
                    .await?;
                body.conditions
                    .into_iter()
                    .map(|c| decode(&what, c).map(Condition::Apm))
                    .collect()
            }
            ConditionKind::Infra => self.list_infra(policy_id).await,
        }
    }

    async fn create_condition(
        &self,
        policy_id: i64,
        condition: &Condition,
    ) -> std::result::Result<i64, ApiError> {
        let what = format!("{condition} under policy {policy_id}");
        let id = match condition {
            Condition::Nrql(c) => {
                let url = self.url(&format!("alerts_nrql_conditions/policies/{policy_id}.json"))?;
                let payload = NrqlEnvelope {
                    nrql_condition: WireNrqlCondition::from(c),
                };
                let body: NrqlEnvelope<Created> =
                    self.fetch(self.http.post(url).json(&payload), &what).await?;
                body.nrql_condition.id
            }
            Condition::Apm(c) => {
                let url = self.url(&format!("alerts_conditions/policies/{policy_id}.json"))?;
                let payload = ApmEnvelope {
                    condition: WireApmCondition::from(c),
                };
                let body: ApmEnvelope<Created> =
                    self.fetch(self.http.post(url).json(&payload), &what).await?;
                body.condition.id
            }
            Condition::Infra(c) => {
                let url = self.infra_url("alerts/conditions")?;
                let payload = InfraEnvelope {
                    data: WireInfraCondition::for_policy(policy_id, c),
                };
                let body: InfraEnvelope<Created> =
                    self.fetch(self.http.post(url).json(&payload), &what).await?;
                body.data.id
            }
        };
        debug!(policy_id, condition_id = id, "created condition");
        Ok(id)
    }

    async fn delete_condition(
        &self,
        kind: ConditionKind,
        id: i64,
    ) -> std::result::Result<(), ApiError> {
        let url = match kind {
            ConditionKind::Nrql => self.url(&format!("alerts_nrql_conditions/{id}.json"))?,
            ConditionKind::Apm => self.url(&format!("alerts_conditions/{id}.json"))?,
            ConditionKind::Infra => self.infra_url(&format!("alerts/conditions/{id}"))?,
        };
        self.execute(self.http.delete(url), &format!("{kind} condition {id}"))
            .await?;
        Ok(())
    }

    async fn get_channel(&self, id: i64) -> std::result::Result<ExternalChannel, ApiError> {
        let url = self.url(&format!("alerts_channels/{id}.json"))?;
        let body: ChannelEnvelope<WireChannel> =
            self.fetch(self.http.get(url), &format!("channel {id}")).await?;
        Ok(body.channel.into())
    }

    async fn create_channel(
        &self,
        definition: &ChannelDefinition,
    ) -> std::result::Result<ExternalChannel, ApiError> {
        let url = self.url("alerts_channels.json")?;
        let what = format!("channel '{}'", definition.name);
        let payload = ChannelEnvelope {
            channel: ChannelPayload::new(&definition.name, &definition.config),
        };
        let body: ChannelList = self
            .fetch(self.http.post(url).json(&payload), &what)
            .await?;
        body.channels
            .into_iter()
            .next()
            .map(Into::into)
            .ok_or_else(|| ApiError::Decode(format!("{what}: response listed no channel")))
    }

    async fn delete_channel(&self, id: i64) -> std::result::Result<(), ApiError> {
        let url = self.url(&format!("alerts_channels/{id}.json"))?;
        self.execute(self.http.delete(url), &format!("channel {id}"))
            .await?;
        Ok(())
    }

    async fn link_policy(
        &self,
        policy_id: i64,
        channel_id: i64,
    ) -> std::result::Result<(), ApiError> {
        let url = self.url("alerts_policy_channels.json")?;
        self.execute(
            self.http
                .put(url)
                .query(&[("policy_id", policy_id), ("channel_ids", channel_id)]),
            &format!("link of channel {channel_id} to policy {policy_id}"),
        )
        .await?;
        Ok(())
    }

    async fn unlink_policy(
        &self,
        policy_id: i64,
        channel_id: i64,
    ) -> std::result::Result<(), ApiError> {
        let url = self.url("alerts_policy_channels.json")?;
        self.execute(
            self.http
                .delete(url)
                .query(&[("policy_id", policy_id), ("channel_id", channel_id)]),
            &format!("link of channel {channel_id} to policy {policy_id}"),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_model::{
        ApmCondition, ApmConditionType, ChannelConfig, ChannelType, ConditionScope,
        IncidentPreference, InfraConditionType, InfraThreshold, Threshold, TimeFunction,
    };
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, HttpAlertingApi) {
        let server = MockServer::start().await;
        let config = ClientConfig::new(
            format!("{}/v2", server.uri()),
            format!("{}/infra/v2", server.uri()),
        );
        let api = HttpAlertingApi::new(&config, "secret-key").unwrap();
        (server, api)
    }

    fn cpu() -> Condition {
        Condition::Apm(ApmCondition {
            name: "cpu high".to_string(),
            condition_type: ApmConditionType::ApmAppMetric,
            metric: "cpu".to_string(),
            entities: vec![42],
            condition_scope: Some(ConditionScope::Application),
            critical_threshold: Threshold::above(80.0, 5),
            warning_threshold: None,
            user_defined: None,
            enabled: true,
            runbook_url: None,
            external_id: None,
        })
    }

    mod construction_tests {
        use super::*;

        #[test]
        fn rejects_unprintable_key() {
            let err = HttpAlertingApi::new(&ClientConfig::default(), "bad\nkey").unwrap_err();
            assert!(matches!(err, ClientError::InvalidApiKey));
        }

        #[test]
        fn rejects_invalid_config() {
            let config = ClientConfig::new("nope", "nope");
            assert!(HttpAlertingApi::new(&config, "key").is_err());
        }
    }

    mod policy_tests {
        use super::*;

        #[tokio::test]
        async fn create_sends_key_and_payload() {
            let (server, api) = setup().await;
            Mock::given(method("POST"))
                .and(path("/v2/alerts_policies.json"))
                .and(header(API_KEY_HEADER, "secret-key"))
                .and(body_partial_json(json!({
                    "policy": {"name": "cpu", "incident_preference": "PER_CONDITION"}
                })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                    "policy": {"id": 17, "name": "cpu", "incident_preference": "PER_CONDITION"}
                })))
                .expect(1)
                .mount(&server)
                .await;

            let created = api
                .create_policy(&PolicyDefinition {
                    name: "cpu".to_string(),
                    incident_preference: IncidentPreference::PerCondition,
                })
                .await
                .unwrap();
            assert_eq!(created.id, 17);
            assert_eq!(created.incident_preference, IncidentPreference::PerCondition);
        }

        #[tokio::test]
        async fn find_by_name_requires_exact_match() {
            let (server, api) = setup().await;
            Mock::given(method("GET"))
                .and(path("/v2/alerts_policies.json"))
                .and(query_param("filter[name]", "cpu"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "policies": [
                        {"id": 1, "name": "cpu-staging", "incident_preference": "PER_POLICY"},
                        {"id": 2, "name": "cpu", "incident_preference": "PER_POLICY"}
                    ]
                })))
                .mount(&server)
                .await;

            let found = api.find_policy_by_name("cpu").await.unwrap().unwrap();
            assert_eq!(found.id, 2);
        }

        #[tokio::test]
        async fn missing_policy_is_not_found() {
            let (server, api) = setup().await;
            Mock::given(method("GET"))
                .and(path("/v2/alerts_policies/9.json"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            let err = api.get_policy(9).await.unwrap_err();
            assert!(err.is_not_found());
        }

        #[tokio::test]
        async fn server_error_carries_body() {
            let (server, api) = setup().await;
            Mock::given(method("DELETE"))
                .and(path("/v2/alerts_policies/9.json"))
                .respond_with(ResponseTemplate::new(500).set_body_string("try later"))
                .mount(&server)
                .await;

            let err = api.delete_policy(9).await.unwrap_err();
            assert_eq!(
                err,
                ApiError::Status {
                    status: 500,
                    body: "try later".to_string()
                }
            );
        }

        #[tokio::test]
        async fn malformed_body_is_decode_error() {
            let (server, api) = setup().await;
            Mock::given(method("GET"))
                .and(path("/v2/alerts_policies/9.json"))
                .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
                .mount(&server)
                .await;

            assert!(matches!(
                api.get_policy(9).await.unwrap_err(),
                ApiError::Decode(_)
            ));
        }
    }

    mod condition_tests {
        use super::*;

        #[tokio::test]
        async fn apm_list_and_create() {
            let (server, api) = setup().await;
            Mock::given(method("GET"))
                .and(path("/v2/alerts_conditions.json"))
                .and(query_param("policy_id", "17"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "conditions": [{
                        "id": 300,
                        "type": "apm_app_metric",
                        "name": "cpu high",
                        "enabled": true,
                        "entities": ["42"],
                        "metric": "cpu",
                        "condition_scope": "application",
                        "terms": [{"duration": "5", "operator": "above", "priority": "critical", "threshold": "80", "time_function": "all"}]
                    }]
                })))
                .mount(&server)
                .await;
            Mock::given(method("POST"))
                .and(path("/v2/alerts_conditions/policies/17.json"))
                .and(body_partial_json(json!({"condition": {"metric": "cpu", "entities": ["42"]}})))
                .respond_with(
                    ResponseTemplate::new(201).set_body_json(json!({"condition": {"id": 301}})),
                )
                .expect(1)
                .mount(&server)
                .await;

            let listed = api.list_conditions(17, ConditionKind::Apm).await.unwrap();
            assert_eq!(listed.len(), 1);
            assert_eq!(listed[0].external_id(), Some(300));
            assert!(listed[0].same_rule(&cpu()));

            assert_eq!(api.create_condition(17, &cpu()).await.unwrap(), 301);
        }

        #[tokio::test]
        async fn nrql_uses_own_endpoints() {
            let (server, api) = setup().await;
            Mock::given(method("GET"))
                .and(path("/v2/alerts_nrql_conditions.json"))
                .and(query_param("policy_id", "17"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "nrql_conditions": [{
                        "id": 5,
                        "name": "errors",
                        "terms": [{"duration": "5", "operator": "above", "priority": "critical", "threshold": "1", "time_function": "all"}],
                        "nrql": {"query": "SELECT count(*) FROM TransactionError", "since_value": "3"}
                    }]
                })))
                .mount(&server)
                .await;
            Mock::given(method("DELETE"))
                .and(path("/v2/alerts_nrql_conditions/5.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
                .expect(1)
                .mount(&server)
                .await;

            let listed = api.list_conditions(17, ConditionKind::Nrql).await.unwrap();
            assert_eq!(listed[0].name(), "errors");
            api.delete_condition(ConditionKind::Nrql, 5).await.unwrap();
        }

        #[tokio::test]
        async fn infra_goes_to_infra_api() {
            let (server, api) = setup().await;
            Mock::given(method("POST"))
                .and(path("/infra/v2/alerts/conditions"))
                .and(body_partial_json(json!({"data": {"policy_id": 17, "type": "infra_metric"}})))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({"data": {"id": 77}})))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("DELETE"))
                .and(path("/infra/v2/alerts/conditions/77"))
                .respond_with(ResponseTemplate::new(204))
                .expect(1)
                .mount(&server)
                .await;

            let disk = Condition::Infra(InfraCondition {
                name: "disk".to_string(),
                condition_type: InfraConditionType::InfraMetric,
                event: Some("StorageSample".to_string()),
                select: Some("diskUsedPercent".to_string()),
                comparison: None,
                where_clause: None,
                integration_provider: None,
                critical_threshold: InfraThreshold {
                    value: 90.0,
                    duration_minutes: 10,
                    time_function: TimeFunction::All,
                },
                warning_threshold: None,
                enabled: true,
                runbook_url: None,
                external_id: None,
            });
            assert_eq!(api.create_condition(17, &disk).await.unwrap(), 77);
            api.delete_condition(ConditionKind::Infra, 77).await.unwrap();
        }

        #[tokio::test]
        async fn infra_listing_follows_pages() {
            let (server, api) = setup().await;
            let condition = |id: usize| {
                json!({
                    "id": id,
                    "type": "infra_host_not_reporting",
                    "name": format!("host {id}"),
                    "critical_threshold": {"value": 1, "duration_minutes": 5}
                })
            };
            let first: Vec<_> = (0..50).map(condition).collect();
            Mock::given(method("GET"))
                .and(path("/infra/v2/alerts/conditions"))
                .and(query_param("offset", "0"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "data": first, "meta": {"total": 51}
                })))
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/infra/v2/alerts/conditions"))
                .and(query_param("offset", "50"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "data": [condition(50)], "meta": {"total": 51}
                })))
                .mount(&server)
                .await;

            let listed = api.list_conditions(17, ConditionKind::Infra).await.unwrap();
            assert_eq!(listed.len(), 51);
        }

        #[tokio::test]
        async fn infra_listing_without_meta_reads_until_short_page() {
            let (server, api) = setup().await;
            let condition = |id: usize| {
                json!({
                    "id": id,
                    "type": "infra_process_running",
                    "name": format!("process {id}"),
                    "critical_threshold": {"value": 0, "duration_minutes": 1}
                })
            };
            let first: Vec<_> = (0..50).map(condition).collect();
            let second: Vec<_> = (50..53).map(condition).collect();
            Mock::given(method("GET"))
                .and(path("/infra/v2/alerts/conditions"))
                .and(query_param("offset", "0"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": first})))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("GET"))
                .and(path("/infra/v2/alerts/conditions"))
                .and(query_param("offset", "50"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": second})))
                .expect(1)
                .mount(&server)
                .await;

            let listed = api.list_conditions(17, ConditionKind::Infra).await.unwrap();
            assert_eq!(listed.len(), 53);
        }
    }

    mod channel_tests {
        use super::*;

        #[tokio::test]
        async fn create_reads_first_listed_channel() {
            let (server, api) = setup().await;
            Mock::given(method("POST"))
                .and(path("/v2/alerts_channels.json"))
                .and(body_partial_json(json!({
                    "channel": {"name": "team", "type": "slack", "configuration": {"url": "https://hooks.example/x"}}
                })))
                .respond_with(ResponseTemplate::new(201).set_body_json(json!({
                    "channels": [{"id": 8, "name": "team", "type": "slack", "links": {"policy_ids": []}}]
                })))
                .mount(&server)
                .await;

            let created = api
                .create_channel(&ChannelDefinition {
                    name: "team".to_string(),
                    config: ChannelConfig::Slack {
                        url: "https://hooks.example/x".to_string(),
                        channel: None,
                    },
                })
                .await
                .unwrap();
            assert_eq!(created.id, 8);
            assert_eq!(created.channel_type, ChannelType::Slack);
        }

        #[tokio::test]
        async fn get_reports_links() {
            let (server, api) = setup().await;
            Mock::given(method("GET"))
                .and(path("/v2/alerts_channels/8.json"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "channel": {"id": 8, "name": "team", "type": "webhook", "links": {"policy_ids": [17, 18]}}
                })))
                .mount(&server)
                .await;

            let channel = api.get_channel(8).await.unwrap();
            assert_eq!(channel.policy_ids, vec![17, 18]);
        }

        #[tokio::test]
        async fn link_and_unlink_use_query_parameters() {
            let (server, api) = setup().await;
            Mock::given(method("PUT"))
                .and(path("/v2/alerts_policy_channels.json"))
                .and(query_param("policy_id", "17"))
                .and(query_param("channel_ids", "8"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"policy": {}})))
                .expect(1)
                .mount(&server)
                .await;
            Mock::given(method("DELETE"))
                .and(path("/v2/alerts_policy_channels.json"))
                .and(query_param("policy_id", "17"))
                .and(query_param("channel_id", "8"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"channel": {}})))
                .expect(1)
                .mount(&server)
                .await;

            api.link_policy(17, 8).await.unwrap();
            api.unlink_policy(17, 8).await.unwrap();
        }

        #[tokio::test]
        async fn unlink_of_missing_channel_is_not_found() {
            let (server, api) = setup().await;
            Mock::given(method("DELETE"))
                .and(path("/v2/alerts_policy_channels.json"))
                .respond_with(ResponseTemplate::new(404))
                .mount(&server)
                .await;

            assert!(api.unlink_policy(17, 8).await.unwrap_err().is_not_found());
        }
    }
}
