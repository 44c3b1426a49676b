//! Request and response bodies of the reporting service API.
//!
//! Field names are fixed by the service. Timestamps travel as RFC 3339 strings.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// Launch mode.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Mode {
    #[default]
    Default,
    Debug,
}

/// Execution status of a launch or an item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum Status {
    Passed,
    Failed,
    Stopped,
    Skipped,
    Interrupted,
    Cancelled,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum ItemType {
    Suite,
    Story,
    Test,
    Scenario,
    Step,
    BeforeClass,
    BeforeGroups,
    BeforeMethod,
    BeforeSuite,
    BeforeTest,
    AfterClass,
    AfterGroups,
    AfterMethod,
    AfterSuite,
    AfterTest,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// Timestamp sent to the service. Caller supplied values keep their offset.
pub type Timestamp = DateTime<FixedOffset>;

pub(crate) fn now() -> Timestamp {
    Utc::now().fixed_offset()
}

/// Start launch request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StartLaunch {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Defaults to the time the request is built.
    pub start_time: Option<Timestamp>,
    pub mode: Mode,
}

impl StartLaunch {
    pub fn new(name: impl Into<String>) -> StartLaunch {
        StartLaunch {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> StartLaunch {
        self.description = description.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> StartLaunch
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn start_time(mut self, start_time: Timestamp) -> StartLaunch {
        self.start_time = Some(start_time);
        self
    }

    pub fn mode(mut self, mode: Mode) -> StartLaunch {
        self.mode = mode;
        self
    }

    pub(crate) fn stamped(mut self) -> StartLaunch {
        self.start_time.get_or_insert_with(now);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartLaunchResponse {
    #[serde(default)]
    pub number: i64,
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FinishLaunchPayload {
    pub status: Status,
    pub end_time: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishLaunchResponse {
    pub id: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub number: i64,
}

/// Key/value parameter of a parameterized test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub key: String,
    pub value: String,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Parameter {
        Parameter {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Start item request. `launch_id` is filled in by the session.
#[derive(Debug, Clone)]
pub struct StartItem {
    pub name: String,
    pub item_type: ItemType,
    pub description: String,
    pub tags: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub start_time: Option<Timestamp>,
}

impl StartItem {
    pub fn new(name: impl Into<String>, item_type: ItemType) -> StartItem {
        StartItem {
            name: name.into(),
            item_type,
            description: String::new(),
            tags: Vec::new(),
            parameters: Vec::new(),
            start_time: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> StartItem {
        self.description = description.into();
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> StartItem
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> StartItem {
        self.parameters.push(Parameter::new(key, value));
        self
    }

    pub fn start_time(mut self, start_time: Timestamp) -> StartItem {
        self.start_time = Some(start_time);
        self
    }

    pub(crate) fn into_payload(self, launch_id: &str) -> StartItemPayload {
        StartItemPayload {
            name: self.name,
            description: self.description,
            tags: self.tags,
            start_time: self.start_time.unwrap_or_else(now),
            launch_id: launch_id.to_string(),
            item_type: self.item_type,
            parameters: self.parameters,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StartItemPayload {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub start_time: Timestamp,
    pub launch_id: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub parameters: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartItemResponse {
    pub id: String,
    #[serde(rename = "uniqueId", default)]
    pub unique_id: String,
}

/// Defect classification attached to a finished item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub issue_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

impl Issue {
    pub fn new(issue_type: impl Into<String>) -> Issue {
        Issue {
            issue_type: issue_type.into(),
            comment: None,
        }
    }

    /// Marks an item as "no defect". Skipped items get it unless told otherwise.
    pub fn not_issue() -> Issue {
        Issue::new("NOT_ISSUE")
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Issue {
        self.comment = Some(comment.into());
        self
    }
}

/// Finish item request.
#[derive(Debug, Clone)]
pub struct FinishItem {
    pub status: Status,
    pub end_time: Option<Timestamp>,
    pub issue: Option<Issue>,
}

impl FinishItem {
    pub fn new(status: Status) -> FinishItem {
        FinishItem {
            status,
            end_time: None,
            issue: None,
        }
    }

    pub fn end_time(mut self, end_time: Timestamp) -> FinishItem {
        self.end_time = Some(end_time);
        self
    }

    pub fn issue(mut self, issue: Issue) -> FinishItem {
        self.issue = Some(issue);
        self
    }

    pub(crate) fn into_payload(self) -> FinishItemPayload {
        let issue = match (self.issue, self.status) {
            (None, Status::Skipped) => Some(Issue::not_issue()),
            (issue, _) => issue,
        };
        FinishItemPayload {
            status: self.status,
            end_time: self.end_time.unwrap_or_else(now),
            issue,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct FinishItemPayload {
    pub status: Status,
    pub end_time: Timestamp,
    pub issue: Option<Issue>,
}

/// Message response of finish item and link issue calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub msg: String,
}

/// One log entry. Batched entries carry their own target item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub item_id: String,
    pub time: Timestamp,
    pub message: String,
    pub level: LogLevel,
}

impl LogEntry {
    pub fn new(item_id: impl Into<String>, message: impl Into<String>, level: LogLevel) -> LogEntry {
        LogEntry {
            item_id: item_id.into(),
            time: now(),
            message: message.into(),
            level,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogResponse {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct LinkIssuePayload {
    pub issues: Vec<ExternalIssue>,
    #[serde(rename = "testItemIds")]
    pub test_item_ids: Vec<i64>,
}

/// Ticket in the external bug tracking system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalIssue {
    pub bts_project: String,
    pub bts_url: String,
    pub submit_date: i64,
    pub ticket_id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetItemResponse {
    pub id: i64,
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::str::FromStr;

    #[test]
    fn skipped_without_issue_is_not_issue() {
        let payload = FinishItem::new(Status::Skipped).into_payload();
        assert_eq!(payload.issue, Some(Issue::not_issue()));
    }

    #[test]
    fn skipped_keeps_explicit_issue() {
        let issue = Issue::new("PRODUCT_BUG").comment("flaky");
        let payload = FinishItem::new(Status::Skipped)
            .issue(issue.clone())
            .into_payload();
        assert_eq!(payload.issue, Some(issue));
    }

    #[test]
    fn passed_has_no_issue() {
        let payload = FinishItem::new(Status::Passed).into_payload();
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["issue"], serde_json::Value::Null);
        assert_eq!(value["status"], json!("PASSED"));
    }

    #[test]
    fn start_item_payload_fields() {
        let start_time = Timestamp::parse_from_rfc3339("2019-02-01T14:21:30.049304+03:00").unwrap();
        let payload = StartItem::new("test_item", ItemType::BeforeClass)
            .description("desc")
            .tags(["tag1"])
            .parameter("key", "value")
            .start_time(start_time)
            .into_payload("launch_id");

        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({
                "name": "test_item",
                "description": "desc",
                "tags": ["tag1"],
                "start_time": "2019-02-01T14:21:30.049304+03:00",
                "launch_id": "launch_id",
                "type": "BEFORE_CLASS",
                "parameters": [{"key": "key", "value": "value"}],
            })
        );
    }

    #[test]
    fn link_issue_uses_camel_case() {
        let payload = LinkIssuePayload {
            issues: vec![ExternalIssue {
                bts_project: "PRJ".into(),
                bts_url: "https://jira".into(),
                submit_date: 1,
                ticket_id: "PRJ-1".into(),
                url: "https://jira/PRJ-1".into(),
            }],
            test_item_ids: vec![42],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["testItemIds"], json!([42]));
        assert_eq!(value["issues"][0]["btsProject"], json!("PRJ"));
        assert_eq!(value["issues"][0]["ticketId"], json!("PRJ-1"));
    }

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(Status::from_str("skipped").unwrap(), Status::Skipped);
        assert_eq!(Status::Interrupted.to_string(), "INTERRUPTED");
        assert_eq!(ItemType::from_str("AFTER_SUITE").unwrap(), ItemType::AfterSuite);
    }
}
