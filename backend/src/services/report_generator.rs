//! Report generator — deterministic assembly of the canonical incident
//! report from pipeline outputs.

use chrono::Utc;

use crate::models::{
    Anomaly, AnomalyDetailsSection, BlastRadiusSection, Diagnosis, Incident, IncidentReport,
    MonitoredTable, Remediation, ReportAction, RootCauseSection, TimelineEvent,
};

pub struct ReportGenerator;

impl ReportGenerator {
    /// Build a complete incident report. Works with whatever subset of the
    /// pipeline succeeded: diagnosis and remediation are both optional.
    pub fn generate(
        &self,
        incident: &Incident,
        anomaly: &Anomaly,
        table: &MonitoredTable,
        diagnosis: Option<&Diagnosis>,
        remediation: Option<&Remediation>,
    ) -> IncidentReport {
        let kind = anomaly.kind.as_str();
        let label = type_label(kind);
        let title = format!("{} on {}", label, table.fqn);

        let anomaly_details = build_anomaly_details(anomaly, &table.fqn);
        let root_cause = build_root_cause(diagnosis, &table.fqn);
        let blast_radius = build_blast_radius(diagnosis);
        let recommended_actions = build_actions(remediation);
        let timeline = build_timeline(anomaly, incident, &table.fqn, diagnosis, remediation);
        let summary =
            build_summary(&label, &table.fqn, incident.severity.as_str(), &root_cause, &blast_radius);

        IncidentReport {
            incident_id: incident.id,
            title,
            severity: incident.severity,
            status: incident.status,
            generated_at: Utc::now(),
            summary,
            anomaly_details,
            root_cause,
            blast_radius,
            recommended_actions,
            timeline,
        }
    }
}

/// Human-readable label for an anomaly type. `freshness_breach` is accepted
/// for compatibility with historical rows; it is never emitted by sentinels.
fn type_label(kind: &str) -> String {
    match kind {
        "schema_drift" => "Schema Drift".to_string(),
        "freshness_violation" | "freshness_breach" => "Freshness Breach".to_string(),
        other => crate::services::executor::title_case(other),
    }
}

fn build_anomaly_details(anomaly: &Anomaly, table_fqn: &str) -> AnomalyDetailsSection {
    let detail: serde_json::Value =
        serde_json::from_str(&anomaly.detail).unwrap_or(serde_json::Value::Null);
    let changes = match detail {
        serde_json::Value::Array(items) => items,
        other => vec![other],
    };

    AnomalyDetailsSection {
        kind: anomaly.kind.as_str().to_string(),
        table: table_fqn.to_string(),
        detected_at: anomaly.detected_at,
        changes,
    }
}

fn build_root_cause(diagnosis: Option<&Diagnosis>, table_fqn: &str) -> RootCauseSection {
    match diagnosis {
        None => RootCauseSection {
            explanation: "Analysis unavailable".to_string(),
            source_table: table_fqn.to_string(),
            confidence: 0.0,
        },
        Some(diagnosis) => RootCauseSection {
            explanation: diagnosis.root_cause.clone(),
            source_table: diagnosis.root_cause_table.clone(),
            confidence: diagnosis.confidence,
        },
    }
}

fn build_blast_radius(diagnosis: Option<&Diagnosis>) -> BlastRadiusSection {
    match diagnosis {
        None => BlastRadiusSection { total_affected: 0, affected_tables: Vec::new() },
        Some(diagnosis) => BlastRadiusSection {
            total_affected: diagnosis.blast_radius.len() as i64,
            affected_tables: diagnosis.blast_radius.clone(),
        },
    }
}

fn build_actions(remediation: Option<&Remediation>) -> Vec<ReportAction> {
    let Some(remediation) = remediation else {
        return Vec::new();
    };
    remediation
        .actions
        .iter()
        .map(|action| ReportAction {
            action: action.action_type.clone(),
            description: action.description.clone(),
            priority: action.priority,
            status: match action.status {
                crate::models::ActionStatus::PendingApproval => "pending_approval".to_string(),
                crate::models::ActionStatus::Manual => "manual".to_string(),
            },
        })
        .collect()
}

/// Chronological pipeline history: detection, incident creation, then the
/// enrichment steps that actually ran.
fn build_timeline(
    anomaly: &Anomaly,
    incident: &Incident,
    table_fqn: &str,
    diagnosis: Option<&Diagnosis>,
    remediation: Option<&Remediation>,
) -> Vec<TimelineEvent> {
    let label = type_label(anomaly.kind.as_str());
    let mut events = vec![
        TimelineEvent {
            timestamp: anomaly.detected_at,
            event: format!("Anomaly detected: {} on {}", label, table_fqn),
        },
        TimelineEvent {
            timestamp: incident.created_at,
            event: format!("Incident created (severity: {})", incident.severity.as_str()),
        },
    ];

    if let Some(diagnosis) = diagnosis {
        events.push(TimelineEvent {
            timestamp: incident.created_at,
            event: format!(
                "Root cause identified: {} (confidence: {:.0}%)",
                diagnosis.root_cause,
                diagnosis.confidence * 100.0
            ),
        });
    }

    if let Some(remediation) = remediation {
        events.push(TimelineEvent {
            timestamp: remediation.generated_at,
            event: format!("Remediation plan generated: {} action(s)", remediation.actions.len()),
        });
    }

    events
}

fn build_summary(
    label: &str,
    table_fqn: &str,
    severity: &str,
    root_cause: &RootCauseSection,
    blast_radius: &BlastRadiusSection,
) -> String {
    let mut parts = vec![format!("{} detected on {} ({} severity).", label, table_fqn, severity)];

    if root_cause.confidence > 0.0 {
        parts.push(format!("Root cause: {}.", root_cause.explanation));
    } else {
        parts.push("Root cause analysis unavailable.".to_string());
    }

    if blast_radius.total_affected > 0 {
        parts.push(format!("{} downstream table(s) affected.", blast_radius.total_affected));
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_type_labels() {
        assert_eq!(type_label("schema_drift"), "Schema Drift");
        assert_eq!(type_label("freshness_violation"), "Freshness Breach");
        assert_eq!(type_label("freshness_breach"), "Freshness Breach");
    }

    #[test]
    fn unknown_types_are_title_cased() {
        assert_eq!(type_label("volume_anomaly"), "Volume Anomaly");
    }
}
