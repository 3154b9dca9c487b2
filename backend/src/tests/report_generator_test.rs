// Report generator: canonical document assembly and stability

use chrono::Utc;

use crate::models::{
    ActionStatus, Anomaly, AnomalyKind, Diagnosis, Incident, IncidentReport, IncidentStatus,
    MonitoredTable, Recommendation, Remediation, RemediationAction, Severity,
};
use crate::services::report_generator::ReportGenerator;

fn table() -> MonitoredTable {
    let now = Utc::now();
    MonitoredTable {
        id: 1,
        connection_id: 1,
        schema_name: "analytics".to_string(),
        table_name: "orders".to_string(),
        fqn: "analytics.orders".to_string(),
        check_types: "[\"schema\"]".to_string(),
        freshness_sla_minutes: None,
        created_at: now,
        updated_at: now,
    }
}

fn anomaly(detail: &str) -> Anomaly {
    Anomaly {
        id: 7,
        table_id: 1,
        kind: AnomalyKind::SchemaDrift,
        severity: Severity::Critical,
        detail: detail.to_string(),
        detected_at: Utc::now(),
    }
}

fn incident() -> Incident {
    let now = Utc::now();
    Incident {
        id: 42,
        anomaly_id: 7,
        status: IncidentStatus::PendingReview,
        severity: Severity::Critical,
        diagnosis: None,
        blast_radius: None,
        remediation: None,
        report: None,
        resolved_at: None,
        resolved_by: None,
        dismiss_reason: None,
        created_at: now,
        updated_at: now,
    }
}

fn diagnosis() -> Diagnosis {
    Diagnosis {
        root_cause: "Upstream migration dropped the price column".to_string(),
        root_cause_table: "raw.orders".to_string(),
        blast_radius: vec!["analytics.daily_revenue".to_string()],
        severity: Severity::Critical,
        confidence: 0.9,
        recommendations: vec![Recommendation {
            action: "revert".to_string(),
            description: "Restore the column".to_string(),
            sql: Some("ALTER TABLE raw.orders ADD COLUMN price FLOAT".to_string()),
            priority: 1,
        }],
    }
}

fn remediation() -> Remediation {
    Remediation {
        actions: vec![RemediationAction {
            action_type: "revert".to_string(),
            description: "Restore the column".to_string(),
            priority: 1,
            sql: Some("ALTER TABLE raw.orders ADD COLUMN price FLOAT".to_string()),
            status: ActionStatus::PendingApproval,
        }],
        summary: "summary".to_string(),
        generated_at: Utc::now(),
    }
}

#[test]
fn full_report_carries_every_section() {
    let report = ReportGenerator.generate(
        &incident(),
        &anomaly(r#"[{"change":"column_deleted","column":"price"}]"#),
        &table(),
        Some(&diagnosis()),
        Some(&remediation()),
    );

    assert_eq!(report.incident_id, 42);
    assert_eq!(report.title, "Schema Drift on analytics.orders");
    assert_eq!(report.severity, Severity::Critical);
    assert_eq!(report.status, IncidentStatus::PendingReview);

    assert_eq!(report.anomaly_details.kind, "schema_drift");
    assert_eq!(report.anomaly_details.changes.len(), 1);
    assert_eq!(report.anomaly_details.changes[0]["column"], "price");

    assert_eq!(report.root_cause.source_table, "raw.orders");
    assert_eq!(report.blast_radius.total_affected, 1);
    assert_eq!(report.recommended_actions.len(), 1);
    assert_eq!(report.recommended_actions[0].status, "pending_approval");

    // Detection, creation, root cause, remediation - in order.
    assert_eq!(report.timeline.len(), 4);
    for pair in report.timeline.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }

    assert!(report.summary.contains("Schema Drift detected on analytics.orders"));
    assert!(report.summary.contains("1 downstream table(s) affected."));
}

#[test]
fn missing_diagnosis_uses_defaults() {
    let report = ReportGenerator.generate(
        &incident(),
        &anomaly(r#"[{"change":"column_deleted","column":"price"}]"#),
        &table(),
        None,
        None,
    );

    assert_eq!(report.root_cause.explanation, "Analysis unavailable");
    assert_eq!(report.root_cause.source_table, "analytics.orders");
    assert_eq!(report.root_cause.confidence, 0.0);
    assert_eq!(report.blast_radius.total_affected, 0);
    assert!(report.recommended_actions.is_empty());
    assert_eq!(report.timeline.len(), 2);
    assert!(report.summary.contains("Root cause analysis unavailable."));
}

#[test]
fn scalar_detail_is_wrapped_into_a_list() {
    let report = ReportGenerator.generate(
        &incident(),
        &anomaly(r#"{"last_update":"2026-08-01T00:00:00Z","sla_minutes":60,"minutes_overdue":30.0}"#),
        &table(),
        None,
        None,
    );
    assert_eq!(report.anomaly_details.changes.len(), 1);
    assert_eq!(report.anomaly_details.changes[0]["sla_minutes"], 60);
}

#[test]
fn report_round_trips_through_json() {
    let report = ReportGenerator.generate(
        &incident(),
        &anomaly(r#"[{"change":"column_deleted","column":"price"}]"#),
        &table(),
        Some(&diagnosis()),
        Some(&remediation()),
    );

    let json = serde_json::to_string(&report).unwrap();
    let decoded: IncidentReport = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded, report);

    // Stable through a second round trip as well.
    let json_again = serde_json::to_string(&decoded).unwrap();
    assert_eq!(json, json_again);
}
