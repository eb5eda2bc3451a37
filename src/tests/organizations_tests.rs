#[cfg(test)]
pub mod tests {
    use crate::utils::organizations::{AccountDirectory, OrganizationsError};
    use httpmock::Method::POST;
    use httpmock::MockServer;
    use serde_json::json;
    use std::time::Duration;

    // Group 1: Account lookup tests
    mod lookup_tests {
        use super::*;

        #[tokio::test]
        async fn test_label_uses_account_name() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/")
                    .header("x-amz-target", "AWSOrganizationsV20161128.DescribeAccount")
                    .json_body(json!({ "AccountId": "111111111111" }));
                then.status(200).json_body(json!({
                    "Account": { "Id": "111111111111", "Name": "production" }
                }));
            });

            let dir = AccountDirectory::new(&server.url("/")).unwrap();
            assert_eq!(dir.label_for("111111111111").await, "production(111111111111)");
            mock.assert();
        }

        #[tokio::test]
        async fn test_answers_are_cached() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({
                    "Account": { "Id": "111111111111", "Name": "production" }
                }));
            });

            let dir = AccountDirectory::new(&server.url("/")).unwrap();
            for _ in 0..3 {
                assert_eq!(
                    dir.account_name("111111111111").await.unwrap().as_deref(),
                    Some("production")
                );
            }
            mock.assert_calls(1);
        }

        #[tokio::test]
        async fn test_expired_entries_are_refetched() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({
                    "Account": { "Id": "111111111111", "Name": "production" }
                }));
            });

            let dir = AccountDirectory::new(&server.url("/"))
                .unwrap()
                .with_ttl(Duration::ZERO);
            dir.account_name("111111111111").await.unwrap();
            dir.account_name("111111111111").await.unwrap();
            mock.assert_calls(2);
        }

        #[tokio::test]
        async fn test_access_denied_falls_back_to_id() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/");
                then.status(400).json_body(json!({
                    "__type": "AccessDeniedException",
                    "Message": "You don't have permissions to access this resource."
                }));
            });

            let dir = AccountDirectory::new(&server.url("/")).unwrap();
            assert_eq!(dir.label_for("222222222222").await, "222222222222");
            // the miss is cached too
            assert_eq!(dir.label_for("222222222222").await, "222222222222");
            mock.assert_calls(1);
        }

        #[tokio::test]
        async fn test_missing_account_is_cached() {
            let server = MockServer::start();
            let mock = server.mock(|when, then| {
                when.method(POST).path("/");
                then.status(400).json_body(json!({
                    "__type": "AccountNotFoundException",
                    "Message": "You specified an account that doesn't exist."
                }));
            });

            let dir = AccountDirectory::new(&server.url("/")).unwrap();
            for _ in 0..3 {
                assert_eq!(dir.label_for("999999999999").await, "999999999999");
            }
            mock.assert_calls(1);
        }

        #[tokio::test]
        async fn test_access_denied_error() {
            let server = MockServer::start();
            let _mock = server.mock(|when, then| {
                when.method(POST).path("/");
                then.status(400).json_body(json!({
                    "__type": "com.amazonaws.organizations#AccessDeniedException",
                    "message": "denied"
                }));
            });

            let dir = AccountDirectory::new(&server.url("/")).unwrap();
            let err = dir.account_name("222222222222").await.unwrap_err();
            assert!(err.is_access_denied());
            assert!(matches!(err, OrganizationsError::Api { .. }));
        }

        #[tokio::test]
        async fn test_account_without_name() {
            let server = MockServer::start();
            let _mock = server.mock(|when, then| {
                when.method(POST).path("/");
                then.status(200).json_body(json!({ "Account": { "Id": "333333333333" } }));
            });

            let dir = AccountDirectory::new(&server.url("/")).unwrap();
            assert_eq!(dir.label_for("333333333333").await, "333333333333");
        }
    }
}
