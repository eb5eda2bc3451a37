#[cfg(test)]
pub mod tests {
    use crate::reactor::init::{EventSource, dispatch};
    use crate::reactor::{Handler, InteractionPayload, SnsNotification, message};
    use crate::tests::anomaly_tests::tests::sample_anomaly;
    use crate::utils::anomaly::{ACTIONS_BLOCK_ID, Anomaly, FeedbackAction};
    use crate::utils::config::Config;
    use crate::utils::database::{AnomalySlackMessage, AnomalyStore};
    use crate::utils::generator::GraphGenerator;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use serde_json::{Value, json};

    struct Servers {
        slack: MockServer,
        aws: MockServer,
    }

    impl Servers {
        fn start() -> Self {
            let servers = Servers {
                slack: MockServer::start(),
                aws: MockServer::start(),
            };
            servers.slack.mock(|when, then| {
                when.method(POST).path("/auth.test");
                then.status(200)
                    .json_body(json!({ "ok": true, "team_id": "T0001", "user_id": "U1" }));
            });
            servers
        }

        fn config(&self, no_error_report: bool) -> Config {
            Config {
                slack_token: "xoxb-test".to_string(),
                slack_channel: "C123".to_string(),
                slack_api_url: self.slack.url("/"),
                cost_explorer_endpoint: self.aws.url("/"),
                organizations_endpoint: self.aws.url("/"),
                database_path: None,
                no_error_report,
                font_path: None,
                log_level: "debug".to_string(),
            }
        }

        async fn handler(&self, no_error_report: bool) -> Handler {
            Handler::new(self.config(no_error_report)).await.unwrap()
        }

        fn mock_costs(&self) {
            self.aws.mock(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AWSInsightsIndexService.GetCostAndUsage");
                then.status(200).json_body(json!({
                    "ResultsByTime": [
                        {
                            "TimePeriod": { "Start": "2024-03-07", "End": "2024-03-08" },
                            "Total": { "NetUnblendedCost": { "Amount": "10.0", "Unit": "USD" } }
                        },
                        {
                            "TimePeriod": { "Start": "2024-03-08", "End": "2024-03-09" },
                            "Total": { "NetUnblendedCost": { "Amount": "80.0", "Unit": "USD" } }
                        }
                    ]
                }));
            });
        }

        fn mock_uploads(&self) -> (httpmock::Mock<'_>, httpmock::Mock<'_>) {
            let upload_url = self.slack.url("/upload/F0001");
            self.slack.mock(|when, then| {
                when.method(POST).path("/upload/F0001");
                then.status(200).body("OK");
            });
            let get_url = self.slack.mock(|when, then| {
                when.method(POST).path("/files.getUploadURLExternal");
                then.status(200).json_body(json!({
                    "ok": true,
                    "upload_url": upload_url,
                    "file_id": "F0001"
                }));
            });
            let complete = self.slack.mock(|when, then| {
                when.method(POST).path("/files.completeUploadExternal");
                then.status(200).json_body(json!({ "ok": true, "files": [] }));
            });
            (get_url, complete)
        }
    }

    /// The sample anomaly narrowed to its account-scoped root cause.
    fn single_cause_anomaly() -> Value {
        let mut v = sample_anomaly();
        let first = v["rootCauses"][0].clone();
        v["rootCauses"] = json!([first]);
        v
    }

    // Group 1: SNS envelope tests
    mod envelope_tests {
        use super::*;

        #[test]
        fn test_parse_envelope() {
            let body = json!({
                "Type": "Notification",
                "MessageId": "m-1",
                "TopicArn": "arn:aws:sns:us-east-1:123456789012:anomalies",
                "Message": "{\"anomalyId\":\"x\"}",
                "SubscribeURL": ""
            });
            let n = SnsNotification::parse(&body.to_string()).unwrap();
            assert_eq!(n.kind, "Notification");
            assert_eq!(n.message_id, "m-1");
            assert_eq!(n.message, "{\"anomalyId\":\"x\"}");
        }

        #[test]
        fn test_raw_body_is_a_notification() {
            let raw = single_cause_anomaly().to_string();
            let n = SnsNotification::parse(&raw).unwrap();
            assert_eq!(n.kind, "Notification");
            assert_eq!(n.message, raw);
        }

        #[test]
        fn test_invalid_body() {
            assert!(SnsNotification::parse("not json").is_err());
        }
    }

    // Group 2: Message building tests
    mod message_tests {
        use super::*;

        #[test]
        fn test_alert_ends_with_feedback_buttons() {
            let anomaly = Anomaly::from_json(&sample_anomaly().to_string()).unwrap();
            let content = message::anomaly_detected(&anomaly).unwrap();

            assert!(content.text.contains("300.00"));
            let actions = content.blocks.last().unwrap();
            assert_eq!(actions["type"], "actions");
            assert_eq!(actions["block_id"], ACTIONS_BLOCK_ID);
            let ids: Vec<&str> = actions["elements"]
                .as_array()
                .unwrap()
                .iter()
                .map(|e| e["action_id"].as_str().unwrap())
                .collect();
            assert_eq!(ids, vec!["yes", "no", "planed_activity"]);
            assert_eq!(
                actions["elements"][0]["value"],
                FeedbackAction::Yes.button_value("xyz-anomaly")
            );
        }

        #[test]
        fn test_alert_requires_valid_monitor_arn() {
            let mut v = sample_anomaly();
            v["monitorArn"] = json!("bogus");
            let anomaly = Anomaly::from_json(&v.to_string()).unwrap();
            assert!(message::anomaly_detected(&anomaly).is_err());
        }

        #[test]
        fn test_fixed_texts() {
            assert_eq!(
                message::update_total_impact(100.0, 300.5),
                "Update Total Impact `100.000000` to `300.500000`"
            );
            assert_eq!(
                message::feedback_provided("Not an issue", "xyz", "alice"),
                "Feedback of `Not an issue` was provided for AnomalyID `xyz` by user `alice` ."
            );
        }
    }

    // Group 3: Anomaly detected flow tests
    mod anomaly_flow_tests {
        use super::*;

        #[tokio::test]
        async fn test_notification_posts_alert_and_charts() {
            let servers = Servers::start();
            servers.mock_costs();
            let post = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(200).json_body(json!({ "ok": true, "ts": "1.1" }));
            });
            let (get_url, complete) = servers.mock_uploads();

            let handler = servers.handler(false).await;
            let body = json!({
                "Type": "Notification",
                "MessageId": "m-1",
                "TopicArn": "arn:aws:sns:us-east-1:123456789012:anomalies",
                "Message": single_cause_anomaly().to_string()
            });
            dispatch(&handler, EventSource::Sns, &body.to_string())
                .await
                .unwrap();

            post.assert_calls(1);
            get_url.assert_calls(1);
            complete.assert_calls(1);
        }

        #[tokio::test]
        async fn test_repeated_notification_updates_thread() {
            let servers = Servers::start();
            servers.mock_costs();
            let update_text = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage").json_body(json!({
                    "channel": "C123",
                    "text": "Update Total Impact `100.000000` to `300.000000`",
                    "thread_ts": "1.1"
                }));
                then.status(200).json_body(json!({ "ok": true, "ts": "1.2" }));
            });
            let update = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.update");
                then.status(200).json_body(json!({ "ok": true, "ts": "1.1" }));
            });
            let (_, complete) = servers.mock_uploads();

            let store = AnomalyStore::in_memory().await.unwrap();
            store
                .save(&AnomalySlackMessage {
                    anomaly_id: "xyz-anomaly".to_string(),
                    slack_team_id: "T0001".to_string(),
                    slack_message_ts: "1.1".to_string(),
                    total_impact: 100.0,
                })
                .await
                .unwrap();
            let handler = servers.handler(false).await.with_store(store);

            let anomaly = Anomaly::from_json(&single_cause_anomaly().to_string()).unwrap();
            handler.post_anomaly_detected(&anomaly).await.unwrap();

            update_text.assert_calls(1);
            update.assert_calls(1);
            complete.assert_calls(1);
        }

        #[tokio::test]
        async fn test_first_notification_is_recorded() {
            let servers = Servers::start();
            servers.mock_costs();
            servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(200).json_body(json!({ "ok": true, "ts": "9.9" }));
            });
            servers.mock_uploads();

            let handler = servers
                .handler(false)
                .await
                .with_store(AnomalyStore::in_memory().await.unwrap());
            let anomaly = Anomaly::from_json(&single_cause_anomaly().to_string()).unwrap();
            handler.post_anomaly_detected(&anomaly).await.unwrap();

            let saved = handler
                .store
                .as_ref()
                .unwrap()
                .get("xyz-anomaly", "T0001")
                .await
                .unwrap()
                .unwrap();
            assert_eq!(saved.slack_message_ts, "9.9");
            assert_eq!(saved.total_impact, 300.0);
        }

        #[tokio::test]
        async fn test_failure_is_reported_to_channel() {
            let servers = Servers::start();
            servers.aws.mock(|when, then| {
                when.method(POST).path("/");
                then.status(500).json_body(json!({ "__type": "InternalServerError", "message": "boom" }));
            });
            let report = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(200).json_body(json!({ "ok": true, "ts": "1.1" }));
            });

            let handler = servers.handler(false).await;
            let raw = single_cause_anomaly().to_string();
            assert!(dispatch(&handler, EventSource::Sns, &raw).await.is_err());
            report.assert_calls(1);
        }

        #[tokio::test]
        async fn test_failure_report_can_be_disabled() {
            let servers = Servers::start();
            servers.aws.mock(|when, then| {
                when.method(POST).path("/");
                then.status(500).json_body(json!({ "__type": "InternalServerError", "message": "boom" }));
            });
            let report = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(200).json_body(json!({ "ok": true, "ts": "1.1" }));
            });

            let handler = servers.handler(true).await;
            let raw = single_cause_anomaly().to_string();
            assert!(dispatch(&handler, EventSource::Sns, &raw).await.is_err());
            report.assert_calls(0);
        }

        #[tokio::test]
        async fn test_subscription_confirmation() {
            let servers = Servers::start();
            let confirm = servers.aws.mock(|when, then| {
                when.method(GET).path("/confirm").query_param("Token", "abc");
                then.status(200).body("<ConfirmSubscriptionResponse/>");
            });
            let post = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage").json_body(json!({
                    "channel": "C123",
                    "text": "confirmed sns subscription for arn:aws:sns:us-east-1:123456789012:anomalies"
                }));
                then.status(200).json_body(json!({ "ok": true, "ts": "1.1" }));
            });

            let handler = servers.handler(false).await;
            let body = json!({
                "Type": "SubscriptionConfirmation",
                "MessageId": "m-0",
                "Token": "abc",
                "TopicArn": "arn:aws:sns:us-east-1:123456789012:anomalies",
                "SubscribeURL": servers.aws.url("/confirm?Token=abc")
            });
            handler.handle_sns(&body.to_string()).await.unwrap();

            confirm.assert();
            post.assert();
        }

        #[tokio::test]
        async fn test_unknown_type_is_ignored() {
            let servers = Servers::start();
            let handler = servers.handler(false).await;
            let body = json!({ "Type": "UnsubscribeConfirmation", "MessageId": "m-2", "TopicArn": "t" });
            handler.handle_sns(&body.to_string()).await.unwrap();
        }
    }

    // Group 4: Feedback relay tests
    mod feedback_tests {
        use super::*;

        fn interaction(block_id: &str, action_id: &str, value: &str) -> String {
            let payload = json!({
                "type": "block_actions",
                "user": { "id": "U42", "name": "alice", "username": "alice" },
                "channel": { "id": "C999" },
                "message": { "ts": "1700000000.000100" },
                "actions": [{
                    "action_id": action_id,
                    "block_id": block_id,
                    "value": value,
                    "text": { "type": "plain_text", "text": "Accurate anomaly" }
                }]
            });
            url::form_urlencoded::Serializer::new(String::new())
                .append_pair("payload", &payload.to_string())
                .finish()
        }

        #[test]
        fn test_parse_form_payload() {
            let body = interaction(ACTIONS_BLOCK_ID, "yes", "action=YES&anomaly_id=xyz");
            let payload = InteractionPayload::parse(&body).unwrap();
            let action = payload.feedback_action().unwrap();
            assert_eq!(action.action_id, "yes");
            assert_eq!(payload.user.name, "alice");
        }

        #[tokio::test]
        async fn test_feedback_is_relayed_and_acknowledged() {
            let servers = Servers::start();
            let feedback = servers.aws.mock(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AWSInsightsIndexService.ProvideAnomalyFeedback")
                    .json_body(json!({ "AnomalyId": "xyz", "Feedback": "YES" }));
                then.status(200).json_body(json!({ "AnomalyId": "xyz" }));
            });
            let reply = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage").json_body(json!({
                    "channel": "C999",
                    "text": "Feedback of `Accurate anomaly` was provided for AnomalyID `xyz` by user `alice` .",
                    "thread_ts": "1700000000.000100",
                    "reply_broadcast": true
                }));
                then.status(200).json_body(json!({ "ok": true, "ts": "1.3" }));
            });

            let handler = servers.handler(false).await;
            let body = interaction(ACTIONS_BLOCK_ID, "yes", "action=YES&anomaly_id=xyz");
            dispatch(&handler, EventSource::SlackAction, &body)
                .await
                .unwrap();

            feedback.assert();
            reply.assert();
        }

        #[tokio::test]
        async fn test_empty_channel_falls_back_to_container() {
            let servers = Servers::start();
            servers.aws.mock(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AWSInsightsIndexService.ProvideAnomalyFeedback");
                then.status(200).json_body(json!({ "AnomalyId": "xyz" }));
            });
            let reply = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage").json_body(json!({
                    "channel": "C777",
                    "text": "Feedback of `Accurate anomaly` was provided for AnomalyID `xyz` by user `alice` .",
                    "thread_ts": "2.2",
                    "reply_broadcast": true
                }));
                then.status(200).json_body(json!({ "ok": true, "ts": "2.3" }));
            });

            let payload = json!({
                "type": "block_actions",
                "user": { "id": "U42", "name": "alice", "username": "alice" },
                "channel": { "id": "" },
                "message": { "ts": "" },
                "container": { "channel_id": "C777", "message_ts": "2.2" },
                "actions": [{
                    "action_id": "yes",
                    "block_id": ACTIONS_BLOCK_ID,
                    "value": "action=YES&anomaly_id=xyz",
                    "text": { "type": "plain_text", "text": "Accurate anomaly" }
                }]
            });

            let handler = servers.handler(false).await;
            handler
                .handle_slack_action(&payload.to_string())
                .await
                .unwrap();
            reply.assert();
        }

        #[tokio::test]
        async fn test_other_blocks_are_ignored() {
            let servers = Servers::start();
            let any_aws = servers.aws.mock(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({}));
            });

            let handler = servers.handler(false).await;
            let body = interaction("some-other-block", "yes", "action=YES&anomaly_id=xyz");
            handler.handle_slack_action(&body).await.unwrap();
            any_aws.assert_calls(0);
        }

        #[tokio::test]
        async fn test_unknown_action_is_reported_in_thread() {
            let servers = Servers::start();
            let report = servers.slack.mock(|when, then| {
                when.method(POST).path("/chat.postMessage");
                then.status(200).json_body(json!({ "ok": true, "ts": "1.4" }));
            });

            let handler = servers.handler(false).await;
            let body = interaction(ACTIONS_BLOCK_ID, "maybe", "action=YES&anomaly_id=xyz");
            assert!(handler.handle_slack_action(&body).await.is_err());
            report.assert_calls(1);
        }
    }

    // Group 5: Graph generation tests
    mod generator_tests {
        use super::*;

        #[test]
        fn test_period_pads_eight_days() {
            let anomaly = Anomaly::from_json(&sample_anomaly().to_string()).unwrap();
            let (start, end) = GraphGenerator::period(&anomaly);
            assert_eq!(start.to_string(), "2024-02-29");
            assert_eq!(end.to_string(), "2024-03-18");
            assert_eq!(
                GraphGenerator::chart_name("xyz", 0),
                "anomaly-xyz-root-cause1.png"
            );
        }

        #[tokio::test]
        async fn test_one_chart_per_root_cause() {
            let servers = Servers::start();
            servers.aws.mock(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AWSInsightsIndexService.GetCostAndUsage");
                then.status(200).json_body(json!({
                    "ResultsByTime": [{
                        "TimePeriod": { "Start": "2024-03-08", "End": "2024-03-09" },
                        "Total": { "NetUnblendedCost": { "Amount": "5", "Unit": "USD" } },
                        "Groups": [
                            { "Keys": ["111111111111"], "Metrics": { "NetUnblendedCost": { "Amount": "3", "Unit": "USD" } } },
                            { "Keys": ["222222222222"], "Metrics": { "NetUnblendedCost": { "Amount": "2", "Unit": "USD" } } }
                        ]
                    }]
                }));
            });
            let describe = servers.aws.mock(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AWSOrganizationsV20161128.DescribeAccount");
                then.status(400).json_body(json!({ "__type": "AccessDeniedException", "Message": "denied" }));
            });

            let handler = servers.handler(false).await;
            let anomaly = Anomaly::from_json(&sample_anomaly().to_string()).unwrap();
            let charts = GraphGenerator::new(&handler.cost_explorer, &handler.accounts, &handler.font)
                .generate(&anomaly)
                .await
                .unwrap();

            assert_eq!(charts.len(), 2);
            assert_eq!(charts[0].name, "anomaly-xyz-anomaly-root-cause1.png");
            assert_eq!(charts[1].name, "anomaly-xyz-anomaly-root-cause2.png");
            assert_eq!(charts[1].title, "us-west-2,Amazon S3");
            // the org-wide cause looks up both accounts once each
            describe.assert_calls(2);
            for chart in &charts {
                let img = image::load_from_memory(&chart.chart.data).unwrap();
                assert_eq!((img.width(), img.height()), (800, 400));
            }
        }
    }
}
