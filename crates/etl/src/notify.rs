//! Reporting ETL outcomes.
//!
//! Triggers and workers both end in a small summary. [`parse_message`] turns
//! either shape into a [`TriggerResponse`], which is posted to a webhook.
//! Posting is best effort: a notification that cannot be delivered is logged
//! and dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::trigger::StateMachineInput;
use crate::worker::{WorkerResponse, render_errors};

const TRIGGER_ERROR_MESSAGE: &str = "The following errors were encountered";
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EtlStatus {
    Pass,
    Fail,
}

impl EtlStatus {
    pub fn parse_response(response: &TriggerResponse) -> Self {
        match response.error_message {
            None => EtlStatus::Pass,
            Some(_) => EtlStatus::Fail,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub message: String,
    pub error_message: Option<String>,
}

impl TriggerResponse {
    /// Summarise the outcome of a trigger.
    pub fn from_trigger(outcome: &anyhow::Result<StateMachineInput>) -> Self {
        match outcome {
            Ok(input) => Self {
                message: format!("Started {} ETL '{}'", input.etl_type, input.name()),
                error_message: None,
            },
            Err(err) => Self {
                message: "ETL trigger failed".to_owned(),
                error_message: Some(render_errors(TRIGGER_ERROR_MESSAGE, &[err])),
            },
        }
    }
}

impl From<&WorkerResponse> for TriggerResponse {
    fn from(response: &WorkerResponse) -> Self {
        let count = |n: Option<usize>| n.map_or_else(|| "None".to_owned(), |n| n.to_string());
        Self {
            message: format!(
                "ETL stage '{}' generated {} output records with {} input records remaining to be processed",
                response.stage_name,
                count(response.processed_records),
                count(response.unprocessed_records),
            ),
            error_message: response.error_message.clone(),
        }
    }
}

/// Recognise a trigger response or a worker response; anything else is `None`.
pub fn parse_message(message: Value) -> Option<TriggerResponse> {
    if let Ok(response) = serde_json::from_value::<TriggerResponse>(message.clone()) {
        return Some(response);
    }
    serde_json::from_value::<WorkerResponse>(message)
        .ok()
        .map(|response| TriggerResponse::from(&response))
}

/// Sink for ETL notifications.
pub trait Notifier {
    fn notify(&self, status: EtlStatus, response: &TriggerResponse);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct Notification<'a> {
    status: EtlStatus,
    message: &'a str,
    error_message: Option<&'a str>,
}

/// Posts notifications as JSON to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::blocking::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn post(&self, notification: &Notification<'_>) -> Result<(), reqwest::Error> {
        self.client
            .post(&self.url)
            .json(notification)
            .send()?
            .error_for_status()?;
        Ok(())
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, status: EtlStatus, response: &TriggerResponse) {
        let notification = Notification {
            status,
            message: &response.message,
            error_message: response.error_message.as_deref(),
        };
        match self.post(&notification) {
            Ok(()) => tracing::info!(?status, url = %self.url, "etl notification sent"),
            Err(err) => tracing::warn!(?status, url = %self.url, error = %err, "etl notification not sent"),
        }
    }
}

/// Parse `message`, notify about it and return its status.
///
/// Messages of an unknown shape are logged and produce no notification.
pub fn notify(notifier: &dyn Notifier, message: Value) -> Option<EtlStatus> {
    let Some(response) = parse_message(message) else {
        tracing::warn!("unrecognised etl message");
        return None;
    };
    let status = EtlStatus::parse_response(&response);
    notifier.notify(status, &response);
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(EtlStatus, TriggerResponse)>>);

    impl Notifier for Recorder {
        fn notify(&self, status: EtlStatus, response: &TriggerResponse) {
            self.0.lock().unwrap().push((status, response.clone()));
        }
    }

    #[test]
    fn status_follows_the_error_message() {
        let pass = TriggerResponse {
            message: String::new(),
            error_message: None,
        };
        let fail = TriggerResponse {
            message: String::new(),
            error_message: Some("oops".into()),
        };
        assert_eq!(EtlStatus::parse_response(&pass), EtlStatus::Pass);
        assert_eq!(EtlStatus::parse_response(&fail), EtlStatus::Fail);
        assert_eq!(serde_json::to_value(EtlStatus::Pass).unwrap(), json!("PASS"));
    }

    #[test]
    fn trigger_responses_pass_through() {
        let message = json!({"message": "i'm a trigger response", "error_message": "oops"});
        assert_eq!(
            parse_message(message),
            Some(TriggerResponse {
                message: "i'm a trigger response".into(),
                error_message: Some("oops".into()),
            })
        );
    }

    #[test]
    fn worker_responses_are_summarised() {
        let message = json!({
            "stage_name": "bulk",
            "processed_records": 123,
            "unprocessed_records": 321,
            "error_message": "whoops",
        });
        assert_eq!(
            parse_message(message),
            Some(TriggerResponse {
                message: "ETL stage 'bulk' generated 123 output records with 321 input records remaining to be processed".into(),
                error_message: Some("whoops".into()),
            })
        );
    }

    #[test]
    fn unknown_messages_are_ignored() {
        let recorder = Recorder::default();
        assert_eq!(parse_message(json!({"foo": "bar"})), None);
        assert_eq!(notify(&recorder, json!({"foo": "bar"})), None);
        assert!(recorder.0.lock().unwrap().is_empty());
    }

    #[test]
    fn notify_reports_the_status() {
        let recorder = Recorder::default();
        let message = json!({
            "stage_name": "load",
            "processed_records": null,
            "unprocessed_records": null,
            "error_message": "boom",
        });
        assert_eq!(notify(&recorder, message), Some(EtlStatus::Fail));
        let sent = recorder.0.lock().unwrap();
        assert_eq!(sent[0].0, EtlStatus::Fail);
        assert!(sent[0].1.message.contains("generated None output records"));
    }

    #[test]
    fn trigger_outcomes_become_responses() {
        let input = StateMachineInput::bulk(0).with_timestamp("t");
        let response = TriggerResponse::from_trigger(&Ok(input));
        assert_eq!(response.message, "Started bulk ETL 'bulk.0.0.t'");
        assert_eq!(response.error_message, None);

        let response = TriggerResponse::from_trigger(&Err(anyhow::anyhow!("no source")));
        assert_eq!(
            response.error_message.as_deref(),
            Some("The following errors were encountered\n  -- Error 1 --\n  no source")
        );
    }

    #[test]
    fn undeliverable_notifications_are_swallowed() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/etl").unwrap();
        let response = TriggerResponse {
            message: "done".into(),
            error_message: None,
        };
        notifier.notify(EtlStatus::Pass, &response);
        assert_eq!(notifier.url(), "http://127.0.0.1:9/etl");
    }
}
