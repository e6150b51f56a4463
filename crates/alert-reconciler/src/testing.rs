//! Fixtures shared by unit tests.

use alert_model::{
    AlertPolicy, ApmCondition, ApmConditionType, ChannelConfig, Condition, ConditionScope,
    InfraCondition, InfraConditionType, InfraThreshold, NotificationChannel, NrqlCondition,
    ObjectMeta, Threshold, ThresholdOperator, TimeFunction, ValueFunction,
};

pub(crate) fn apm(metric: &str, threshold: f64) -> Condition {
    Condition::Apm(ApmCondition {
        name: format!("{metric} high"),
        condition_type: ApmConditionType::ApmAppMetric,
        metric: metric.to_string(),
        entities: vec![42],
        condition_scope: Some(ConditionScope::Application),
        critical_threshold: Threshold::above(threshold, 5),
        warning_threshold: None,
        user_defined: None,
        enabled: true,
        runbook_url: None,
        external_id: None,
    })
}

pub(crate) fn nrql(name: &str, query: &str) -> Condition {
    Condition::Nrql(NrqlCondition {
        name: name.to_string(),
        query: query.to_string(),
        since_minutes: 3,
        value_function: ValueFunction::SingleValue,
        alert_threshold: Threshold::above(1.0, 5),
        warning_threshold: None,
        enabled: true,
        runbook_url: None,
        external_id: None,
    })
}

pub(crate) fn infra(name: &str, value: f64) -> Condition {
    Condition::Infra(InfraCondition {
        name: name.to_string(),
        condition_type: InfraConditionType::InfraMetric,
        event: Some("SystemSample".to_string()),
        select: Some("cpuPercent".to_string()),
        comparison: Some(ThresholdOperator::Above),
        where_clause: None,
        integration_provider: None,
        critical_threshold: InfraThreshold {
            value,
            duration_minutes: 5,
            time_function: TimeFunction::All,
        },
        warning_threshold: None,
        enabled: true,
        runbook_url: None,
        external_id: None,
    })
}

pub(crate) fn policy(namespace: &str, name: &str) -> AlertPolicy {
    AlertPolicy::new(ObjectMeta::new(namespace, name))
}

pub(crate) fn slack(namespace: &str, name: &str) -> NotificationChannel {
    NotificationChannel::new(
        ObjectMeta::new(namespace, name),
        ChannelConfig::Slack {
            url: "https://hooks.slack.com/services/T000/B000/XXXX".to_string(),
            channel: Some("#alerts".to_string()),
        },
    )
}
