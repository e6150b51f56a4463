//! JSON shapes of the REST API and their mapping to the resource model.
//!
//! The API is inconsistent about numbers: thresholds, durations and entity
//! ids are sent as strings and may come back as either. Outgoing values are
//! always strings; incoming values accept both.

use std::collections::BTreeMap;
use std::fmt::Display;

use alert_model::{
    ApmCondition, ApmConditionType, ChannelConfig, ChannelType, ConditionScope,
    IncidentPreference, InfraCondition, InfraConditionType, InfraThreshold, NrqlCondition,
    Threshold, ThresholdOperator, TimeFunction, UserDefinedMetric, UserValueFunction,
    ValueFunction,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseNumber {
    Number(f64),
    Text(String),
}

fn loose_f64<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
    match LooseNumber::deserialize(d)? {
        LooseNumber::Number(n) => Ok(n),
        LooseNumber::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn loose_u32<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
    let value = loose_f64(d)?;
    if value.fract() != 0.0 || value < 0.0 || value > f64::from(u32::MAX) {
        return Err(serde::de::Error::custom(format!("expected a whole number, got {value}")));
    }
    Ok(value as u32)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LooseId {
    Number(i64),
    Text(String),
}

fn loose_ids<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<i64>, D::Error> {
    Vec::<LooseId>::deserialize(d)?
        .into_iter()
        .map(|id| match id {
            LooseId::Number(n) => Ok(n),
            LooseId::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        })
        .collect()
}

fn as_text<S: Serializer, T: Display>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

fn ids_as_text<S: Serializer>(ids: &[i64], s: S) -> Result<S::Ok, S::Error> {
    s.collect_seq(ids.iter().map(ToString::to_string))
}

const fn enabled() -> bool {
    true
}

/// A created object; only the id is read back.
#[derive(Debug, Deserialize)]
pub(crate) struct Created {
    pub(crate) id: i64,
}

// Policies

#[derive(Debug, Serialize)]
pub(crate) struct PolicyPayload<'a> {
    pub(crate) name: &'a str,
    pub(crate) incident_preference: IncidentPreference,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WirePolicy {
    pub(crate) id: i64,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) incident_preference: IncidentPreference,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct PolicyEnvelope<T> {
    pub(crate) policy: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PolicyList {
    #[serde(default)]
    pub(crate) policies: Vec<WirePolicy>,
}

// Threshold terms shared by NRQL and APM conditions

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Priority {
    Critical,
    Warning,
}

#[derive(Debug, Serialize, Deserialize)]
struct Term {
    #[serde(serialize_with = "as_text", deserialize_with = "loose_u32")]
    duration: u32,
    operator: ThresholdOperator,
    priority: Priority,
    #[serde(serialize_with = "as_text", deserialize_with = "loose_f64")]
    threshold: f64,
    #[serde(default)]
    time_function: TimeFunction,
}

impl Term {
    const fn new(priority: Priority, threshold: &Threshold) -> Self {
        Self {
            duration: threshold.duration_minutes,
            operator: threshold.operator,
            priority,
            threshold: threshold.value,
            time_function: threshold.time_function,
        }
    }

    const fn threshold(&self) -> Threshold {
        Threshold {
            operator: self.operator,
            value: self.threshold,
            duration_minutes: self.duration,
            time_function: self.time_function,
        }
    }
}

fn terms(critical: &Threshold, warning: Option<&Threshold>) -> Vec<Term> {
    let mut terms = vec![Term::new(Priority::Critical, critical)];
    if let Some(warning) = warning {
        terms.push(Term::new(Priority::Warning, warning));
    }
    terms
}

fn split_terms(name: &str, terms: &[Term]) -> Result<(Threshold, Option<Threshold>), String> {
    let find = |priority| terms.iter().find(|t| t.priority == priority).map(Term::threshold);
    let critical = find(Priority::Critical)
        .ok_or_else(|| format!("condition '{name}' has no critical term"))?;
    Ok((critical, find(Priority::Warning)))
}

// NRQL conditions

#[derive(Debug, Serialize, Deserialize)]
struct NrqlQuery {
    query: String,
    #[serde(serialize_with = "as_text", deserialize_with = "loose_u32")]
    since_value: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireNrqlCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    name: String,
    #[serde(default = "enabled")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runbook_url: Option<String>,
    #[serde(default)]
    value_function: ValueFunction,
    terms: Vec<Term>,
    nrql: NrqlQuery,
}

impl From<&NrqlCondition> for WireNrqlCondition {
    fn from(c: &NrqlCondition) -> Self {
        Self {
            id: None,
            name: c.name.clone(),
            enabled: c.enabled,
            runbook_url: c.runbook_url.clone(),
            value_function: c.value_function,
            terms: terms(&c.alert_threshold, c.warning_threshold.as_ref()),
            nrql: NrqlQuery {
                query: c.query.clone(),
                since_value: c.since_minutes,
            },
        }
    }
}

impl TryFrom<WireNrqlCondition> for NrqlCondition {
    type Error = String;

    fn try_from(w: WireNrqlCondition) -> Result<Self, Self::Error> {
        let (alert_threshold, warning_threshold) = split_terms(&w.name, &w.terms)?;
        Ok(Self {
            name: w.name,
            query: w.nrql.query,
            since_minutes: w.nrql.since_value,
            value_function: w.value_function,
            alert_threshold,
            warning_threshold,
            enabled: w.enabled,
            runbook_url: w.runbook_url,
            external_id: w.id,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct NrqlEnvelope<T> {
    pub(crate) nrql_condition: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct NrqlList {
    #[serde(default)]
    pub(crate) nrql_conditions: Vec<WireNrqlCondition>,
}

// APM conditions

#[derive(Debug, Serialize, Deserialize)]
struct WireUserDefined {
    metric: String,
    value_function: UserValueFunction,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireApmCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(rename = "type")]
    condition_type: ApmConditionType,
    name: String,
    #[serde(default = "enabled")]
    enabled: bool,
    #[serde(default, serialize_with = "ids_as_text", deserialize_with = "loose_ids")]
    entities: Vec<i64>,
    metric: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    condition_scope: Option<ConditionScope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runbook_url: Option<String>,
    terms: Vec<Term>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_defined: Option<WireUserDefined>,
}

impl From<&ApmCondition> for WireApmCondition {
    fn from(c: &ApmCondition) -> Self {
        Self {
            id: None,
            condition_type: c.condition_type,
            name: c.name.clone(),
            enabled: c.enabled,
            entities: c.entities.clone(),
            metric: c.metric.clone(),
            condition_scope: c.condition_scope,
            runbook_url: c.runbook_url.clone(),
            terms: terms(&c.critical_threshold, c.warning_threshold.as_ref()),
            user_defined: c.user_defined.as_ref().map(|u| WireUserDefined {
                metric: u.metric.clone(),
                value_function: u.value_function,
            }),
        }
    }
}

impl TryFrom<WireApmCondition> for ApmCondition {
    type Error = String;

    fn try_from(w: WireApmCondition) -> Result<Self, Self::Error> {
        let (critical_threshold, warning_threshold) = split_terms(&w.name, &w.terms)?;
        Ok(Self {
            name: w.name,
            condition_type: w.condition_type,
            metric: w.metric,
            entities: w.entities,
            condition_scope: w.condition_scope,
            critical_threshold,
            warning_threshold,
            user_defined: w.user_defined.map(|u| UserDefinedMetric {
                metric: u.metric,
                value_function: u.value_function,
            }),
            enabled: w.enabled,
            runbook_url: w.runbook_url,
            external_id: w.id,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ApmEnvelope<T> {
    pub(crate) condition: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApmList {
    #[serde(default)]
    pub(crate) conditions: Vec<WireApmCondition>,
}

// Infrastructure conditions

#[derive(Debug, Serialize, Deserialize)]
struct WireInfraThreshold {
    #[serde(deserialize_with = "loose_f64")]
    value: f64,
    #[serde(deserialize_with = "loose_u32")]
    duration_minutes: u32,
    #[serde(default)]
    time_function: TimeFunction,
}

impl From<&InfraThreshold> for WireInfraThreshold {
    fn from(t: &InfraThreshold) -> Self {
        Self {
            value: t.value,
            duration_minutes: t.duration_minutes,
            time_function: t.time_function,
        }
    }
}

impl From<WireInfraThreshold> for InfraThreshold {
    fn from(t: WireInfraThreshold) -> Self {
        Self {
            value: t.value,
            duration_minutes: t.duration_minutes,
            time_function: t.time_function,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireInfraCondition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    policy_id: Option<i64>,
    #[serde(rename = "type")]
    condition_type: InfraConditionType,
    name: String,
    #[serde(default = "enabled")]
    enabled: bool,
    #[serde(default, rename = "event_type", skip_serializing_if = "Option::is_none")]
    event: Option<String>,
    #[serde(default, rename = "select_value", skip_serializing_if = "Option::is_none")]
    select: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    comparison: Option<ThresholdOperator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    where_clause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    integration_provider: Option<String>,
    critical_threshold: WireInfraThreshold,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    warning_threshold: Option<WireInfraThreshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    runbook_url: Option<String>,
}

impl WireInfraCondition {
    pub(crate) fn for_policy(policy_id: i64, c: &InfraCondition) -> Self {
        Self {
            id: None,
            policy_id: Some(policy_id),
            condition_type: c.condition_type,
            name: c.name.clone(),
            enabled: c.enabled,
            event: c.event.clone(),
            select: c.select.clone(),
            comparison: c.comparison,
            where_clause: c.where_clause.clone(),
            integration_provider: c.integration_provider.clone(),
            critical_threshold: (&c.critical_threshold).into(),
            warning_threshold: c.warning_threshold.as_ref().map(Into::into),
            runbook_url: c.runbook_url.clone(),
        }
    }
}

impl From<WireInfraCondition> for InfraCondition {
    fn from(w: WireInfraCondition) -> Self {
        Self {
            name: w.name,
            condition_type: w.condition_type,
            event: w.event,
            select: w.select,
            comparison: w.comparison,
            where_clause: w.where_clause,
            integration_provider: w.integration_provider,
            critical_threshold: w.critical_threshold.into(),
            warning_threshold: w.warning_threshold.map(Into::into),
            enabled: w.enabled,
            runbook_url: w.runbook_url,
            external_id: w.id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct InfraEnvelope<T> {
    pub(crate) data: T,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct InfraMeta {
    #[serde(default)]
    pub(crate) total: usize,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InfraList {
    #[serde(default)]
    pub(crate) data: Vec<WireInfraCondition>,
    #[serde(default)]
    pub(crate) meta: InfraMeta,
}

// Channels

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ChannelConfiguration {
    Slack {
        url: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        channel: Option<String>,
    },
    Email {
        recipients: String,
        include_json_attachment: bool,
    },
    Webhook {
        base_url: String,
        #[serde(skip_serializing_if = "BTreeMap::is_empty")]
        headers: BTreeMap<String, String>,
    },
}

impl From<&ChannelConfig> for ChannelConfiguration {
    fn from(config: &ChannelConfig) -> Self {
        match config {
            ChannelConfig::Slack { url, channel } => Self::Slack {
                url: url.clone(),
                channel: channel.clone(),
            },
            ChannelConfig::Email {
                recipients,
                include_json_attachment,
            } => Self::Email {
                recipients: recipients.join(","),
                include_json_attachment: *include_json_attachment,
            },
            ChannelConfig::Webhook { base_url, headers } => Self::Webhook {
                base_url: base_url.clone(),
                headers: headers.clone(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ChannelPayload<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    channel_type: ChannelType,
    configuration: ChannelConfiguration,
}

impl<'a> ChannelPayload<'a> {
    pub(crate) fn new(name: &'a str, config: &ChannelConfig) -> Self {
        Self {
            name,
            channel_type: config.channel_type(),
            configuration: config.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Links {
    #[serde(default)]
    pub(crate) policy_ids: Vec<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WireChannel {
    pub(crate) id: i64,
    pub(crate) name: String,
    #[serde(rename = "type")]
    pub(crate) channel_type: ChannelType,
    #[serde(default)]
    pub(crate) links: Links,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChannelEnvelope<T> {
    pub(crate) channel: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChannelList {
    #[serde(default)]
    pub(crate) channels: Vec<WireChannel>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cpu_apm() -> ApmCondition {
        ApmCondition {
            name: "cpu high".to_string(),
            condition_type: ApmConditionType::ApmAppMetric,
            metric: "cpu".to_string(),
            entities: vec![42, 7],
            condition_scope: Some(ConditionScope::Application),
            critical_threshold: Threshold::above(80.0, 5),
            warning_threshold: Some(Threshold::above(60.5, 5)),
            user_defined: None,
            enabled: true,
            runbook_url: None,
            external_id: None,
        }
    }

    mod condition_tests {
        use super::*;

        #[test]
        fn apm_numbers_are_sent_as_text() {
            let body = serde_json::to_value(WireApmCondition::from(&cpu_apm())).unwrap();
            assert_eq!(body["entities"], json!(["42", "7"]));
            assert_eq!(body["terms"][0]["threshold"], json!("80"));
            assert_eq!(body["terms"][0]["duration"], json!("5"));
            assert_eq!(body["terms"][0]["priority"], json!("critical"));
            assert_eq!(body["terms"][1]["threshold"], json!("60.5"));
            assert_eq!(body["type"], json!("apm_app_metric"));
            assert!(body.get("id").is_none());
        }

        #[test]
        fn apm_response_maps_back_to_same_rule() {
            let response = json!({
                "id": 991,
                "type": "apm_app_metric",
                "name": "cpu high",
                "enabled": true,
                "entities": ["7", 42],
                "metric": "cpu",
                "condition_scope": "application",
                "terms": [
                    {"duration": "5", "operator": "above", "priority": "warning", "threshold": "60.5", "time_function": "all"},
                    {"duration": 5, "operator": "above", "priority": "critical", "threshold": 80, "time_function": "all"}
                ]
            });
            let wire: WireApmCondition = serde_json::from_value(response).unwrap();
            let condition = ApmCondition::try_from(wire).unwrap();
            assert_eq!(condition.external_id, Some(991));
            let local = alert_model::Condition::Apm(cpu_apm());
            assert!(local.same_rule(&alert_model::Condition::Apm(condition)));
        }

        #[test]
        fn missing_critical_term_is_rejected() {
            let response = json!({
                "id": 1,
                "name": "errors",
                "terms": [{"duration": "5", "operator": "above", "priority": "warning", "threshold": "1"}],
                "nrql": {"query": "SELECT count(*) FROM TransactionError", "since_value": "3"}
            });
            let wire: WireNrqlCondition = serde_json::from_value(response).unwrap();
            let err = NrqlCondition::try_from(wire).unwrap_err();
            assert!(err.contains("no critical term"));
        }

        #[test]
        fn nrql_query_block() {
            let condition = NrqlCondition {
                name: "errors".to_string(),
                query: "SELECT count(*) FROM TransactionError".to_string(),
                since_minutes: 3,
                value_function: ValueFunction::Sum,
                alert_threshold: Threshold::above(10.0, 5),
                warning_threshold: None,
                enabled: false,
                runbook_url: Some("https://runbooks/errors".to_string()),
                external_id: Some(4),
            };
            let body = serde_json::to_value(WireNrqlCondition::from(&condition)).unwrap();
            assert_eq!(body["nrql"]["since_value"], json!("3"));
            assert_eq!(body["value_function"], json!("sum"));
            assert_eq!(body["enabled"], json!(false));
            assert_eq!(body["terms"].as_array().unwrap().len(), 1);
            assert!(body.get("id").is_none());
        }

        #[test]
        fn infra_fields_are_renamed() {
            let condition = InfraCondition {
                name: "disk".to_string(),
                condition_type: InfraConditionType::InfraMetric,
                event: Some("StorageSample".to_string()),
                select: Some("diskUsedPercent".to_string()),
                comparison: Some(ThresholdOperator::Above),
                where_clause: None,
                integration_provider: None,
                critical_threshold: InfraThreshold {
                    value: 90.0,
                    duration_minutes: 10,
                    time_function: TimeFunction::Any,
                },
                warning_threshold: None,
                enabled: true,
                runbook_url: None,
                external_id: None,
            };
            let body =
                serde_json::to_value(WireInfraCondition::for_policy(12, &condition)).unwrap();
            assert_eq!(body["policy_id"], json!(12));
            assert_eq!(body["event_type"], json!("StorageSample"));
            assert_eq!(body["select_value"], json!("diskUsedPercent"));
            assert_eq!(body["critical_threshold"]["time_function"], json!("any"));
        }
    }

    mod channel_tests {
        use super::*;

        #[test]
        fn email_recipients_are_joined() {
            let config = ChannelConfig::Email {
                recipients: vec!["a@example.com".to_string(), "b@example.com".to_string()],
                include_json_attachment: true,
            };
            let body = serde_json::to_value(ChannelPayload::new("oncall", &config)).unwrap();
            assert_eq!(
                body,
                json!({
                    "name": "oncall",
                    "type": "email",
                    "configuration": {
                        "recipients": "a@example.com,b@example.com",
                        "include_json_attachment": true
                    }
                })
            );
        }

        #[test]
        fn channel_links_default_to_empty() {
            let channel: WireChannel =
                serde_json::from_value(json!({"id": 3, "name": "team", "type": "slack"})).unwrap();
            assert!(channel.links.policy_ids.is_empty());
            assert_eq!(channel.channel_type, ChannelType::Slack);
        }
    }
}
