use serde_json::{Value, json};

use crate::utils::anomaly::{ACTIONS_BLOCK_ID, Anomaly, AnomalyError, FeedbackAction};
use crate::utils::slack::MessageContent;

/// The alert posted when an anomaly is detected: a summary, the root causes
/// and the three feedback buttons.
pub fn anomaly_detected(anomaly: &Anomaly) -> Result<MessageContent, AnomalyError> {
    let monitor_id = anomaly.monitor_id()?;
    let impact = &anomaly.impact;

    let text = format!(
        "Cost anomaly detected for {}: total impact ${:.2} ({:.2}%)",
        display_or_dash(&anomaly.dimensional_value),
        impact.total_impact,
        impact.total_impact_percentage
    );

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "AWS Cost Anomaly Detected", "emoji": true }
        }),
        json!({
            "type": "section",
            "fields": [
                mrkdwn(format!("*Total impact:*\n${:.2} ({:.2}%)", impact.total_impact, impact.total_impact_percentage)),
                mrkdwn(format!("*Period:*\n{} ~ {}",
                    anomaly.anomaly_start_date.format("%Y-%m-%d"),
                    anomaly.anomaly_end_date.format("%Y-%m-%d"))),
                mrkdwn(format!("*Actual / expected:*\n${:.2} / ${:.2}", impact.total_actual_spend, impact.total_expected_spend)),
                mrkdwn(format!("*Monitor:*\n{}", display_or_dash(&monitor_id))),
                mrkdwn(format!("*Dimension:*\n{}", display_or_dash(&anomaly.dimensional_value))),
                mrkdwn(format!("*Score:*\n{:.2} (max {:.2})", anomaly.anomaly_score.current_score, anomaly.anomaly_score.max_score)),
            ]
        }),
    ];

    if !anomaly.root_causes.is_empty() {
        let causes: Vec<String> = anomaly
            .root_causes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let title = c.title();
                format!("{}. {}", i + 1, if title.is_empty() { "Total" } else { title.as_str() })
            })
            .collect();
        blocks.push(json!({
            "type": "section",
            "text": mrkdwn(format!("*Root causes:*\n{}", causes.join("\n")))
        }));
    }

    if !anomaly.anomaly_details_link.is_empty() {
        blocks.push(json!({
            "type": "context",
            "elements": [mrkdwn(format!("<{}|View in Cost Explorer> | AnomalyID `{}`",
                anomaly.anomaly_details_link, anomaly.anomaly_id))]
        }));
    }

    blocks.push(feedback_actions(&anomaly.anomaly_id));

    Ok(MessageContent { text, blocks })
}

/// The actions block holding one button per feedback type.
pub fn feedback_actions(anomaly_id: &str) -> Value {
    let elements: Vec<Value> = FeedbackAction::ALL
        .iter()
        .map(|action| {
            json!({
                "type": "button",
                "action_id": action.action_id(),
                "text": { "type": "plain_text", "text": action.button_text() },
                "value": action.button_value(anomaly_id),
            })
        })
        .collect();

    json!({
        "type": "actions",
        "block_id": ACTIONS_BLOCK_ID,
        "elements": elements,
    })
}

pub fn update_total_impact(previous: f64, current: f64) -> String {
    format!("Update Total Impact `{previous:.6}` to `{current:.6}`")
}

pub fn feedback_provided(button_text: &str, anomaly_id: &str, user_name: &str) -> String {
    format!("Feedback of `{button_text}` was provided for AnomalyID `{anomaly_id}` by user `{user_name}` .")
}

pub fn subscription_confirmed(topic_arn: &str) -> String {
    format!("confirmed sns subscription for {topic_arn}")
}

fn mrkdwn(text: String) -> Value {
    json!({ "type": "mrkdwn", "text": text })
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() { "-" } else { value }
}
