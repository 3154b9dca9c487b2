//! Executor — turns a diagnosis into an actionable remediation plan.
//!
//! Remediation is advisory only: actions carrying SQL are queued for
//! approval, the rest are marked manual. Nothing here touches a warehouse.

use chrono::Utc;

use crate::models::{
    ActionStatus, Anomaly, Diagnosis, Remediation, RemediationAction,
};

/// Blast-radius tables listed in the summary before eliding.
const SUMMARY_BLAST_LIMIT: usize = 10;

pub struct Executor;

impl Executor {
    /// Create a remediation plan from an anomaly and its diagnosis.
    pub fn prepare(&self, anomaly: &Anomaly, diagnosis: &Diagnosis) -> Remediation {
        let actions = diagnosis
            .recommendations
            .iter()
            .map(|rec| RemediationAction {
                action_type: rec.action.clone(),
                description: rec.description.clone(),
                priority: rec.priority,
                sql: rec.sql.clone(),
                status: if rec.sql.is_some() {
                    ActionStatus::PendingApproval
                } else {
                    ActionStatus::Manual
                },
            })
            .collect();

        Remediation {
            actions,
            summary: format_summary(anomaly, diagnosis),
            generated_at: Utc::now(),
        }
    }
}

/// Human-readable markdown summary of the incident.
fn format_summary(anomaly: &Anomaly, diagnosis: &Diagnosis) -> String {
    let mut lines = vec![
        format!("**Incident: {}**", title_case(anomaly.kind.as_str())),
        format!("Severity: {}", diagnosis.severity.as_str().to_uppercase()),
        format!("Confidence: {:.0}%", diagnosis.confidence * 100.0),
        String::new(),
        format!("**Root Cause:** {}", diagnosis.root_cause),
        format!("**Source Table:** {}", diagnosis.root_cause_table),
    ];

    if !diagnosis.blast_radius.is_empty() {
        lines.push(format!(
            "**Blast Radius:** {} downstream tables affected",
            diagnosis.blast_radius.len()
        ));
        for table in diagnosis.blast_radius.iter().take(SUMMARY_BLAST_LIMIT) {
            lines.push(format!("  - {}", table));
        }
        if diagnosis.blast_radius.len() > SUMMARY_BLAST_LIMIT {
            lines.push(format!(
                "  ... and {} more",
                diagnosis.blast_radius.len() - SUMMARY_BLAST_LIMIT
            ));
        }
    }

    lines.push(String::new());
    lines.push(format!("**Recommended Actions:** {}", diagnosis.recommendations.len()));
    for (i, rec) in diagnosis.recommendations.iter().enumerate() {
        lines.push(format!("  {}. [{}] {}", i + 1, rec.action, rec.description));
    }

    lines.join("\n")
}

/// "schema_drift" -> "Schema Drift"
pub fn title_case(snake: &str) -> String {
    snake
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AnomalyKind, Recommendation, Severity};
    use chrono::Utc;

    fn anomaly() -> Anomaly {
        Anomaly {
            id: 1,
            table_id: 1,
            kind: AnomalyKind::SchemaDrift,
            severity: Severity::Critical,
            detail: "[]".to_string(),
            detected_at: Utc::now(),
        }
    }

    fn diagnosis(recommendations: Vec<Recommendation>, blast_radius: Vec<String>) -> Diagnosis {
        Diagnosis {
            root_cause: "Upstream job dropped a column".to_string(),
            root_cause_table: "raw.orders".to_string(),
            blast_radius,
            severity: Severity::Critical,
            confidence: 0.85,
            recommendations,
        }
    }

    #[test]
    fn sql_actions_need_approval_and_order_is_preserved() {
        let recs = vec![
            Recommendation {
                action: "revert".to_string(),
                description: "Revert the migration".to_string(),
                sql: Some("ALTER TABLE raw.orders ADD COLUMN price FLOAT".to_string()),
                priority: 1,
            },
            Recommendation {
                action: "notify".to_string(),
                description: "Tell the upstream team".to_string(),
                sql: None,
                priority: 2,
            },
        ];
        let remediation = Executor.prepare(&anomaly(), &diagnosis(recs, Vec::new()));

        assert_eq!(remediation.actions.len(), 2);
        assert_eq!(remediation.actions[0].action_type, "revert");
        assert_eq!(remediation.actions[0].status, ActionStatus::PendingApproval);
        assert_eq!(remediation.actions[1].action_type, "notify");
        assert_eq!(remediation.actions[1].status, ActionStatus::Manual);
    }

    #[test]
    fn summary_includes_severity_confidence_and_root_cause() {
        let remediation = Executor.prepare(&anomaly(), &diagnosis(Vec::new(), Vec::new()));
        assert!(remediation.summary.contains("**Incident: Schema Drift**"));
        assert!(remediation.summary.contains("Severity: CRITICAL"));
        assert!(remediation.summary.contains("Confidence: 85%"));
        assert!(remediation.summary.contains("Upstream job dropped a column"));
        assert!(remediation.summary.contains("raw.orders"));
    }

    #[test]
    fn summary_elides_long_blast_radius() {
        let blast: Vec<String> = (0..14).map(|i| format!("analytics.table_{}", i)).collect();
        let remediation = Executor.prepare(&anomaly(), &diagnosis(Vec::new(), blast));
        assert!(remediation.summary.contains("14 downstream tables affected"));
        assert!(remediation.summary.contains("analytics.table_9"));
        assert!(!remediation.summary.contains("analytics.table_10"));
        assert!(remediation.summary.contains("... and 4 more"));
    }

    #[test]
    fn title_case_handles_underscores() {
        assert_eq!(title_case("schema_drift"), "Schema Drift");
        assert_eq!(title_case("freshness_violation"), "Freshness Violation");
        assert_eq!(title_case("weird"), "Weird");
    }
}
