//! notification_templates, notification_campaigns, user_notifications, workflows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{notification_campaigns, notification_templates, user_notifications, workflows};

pub const CHANNEL_IN_APP: &str = "in_app";
pub const CHANNEL_TELEGRAM: &str = "telegram";

pub fn is_valid_channel(channel: &str) -> bool {
    matches!(channel, CHANNEL_IN_APP | CHANNEL_TELEGRAM)
}

/// Column width of template names and subjects.
pub const MAX_TEMPLATE_FIELD: usize = 255;

fn check_length(field: &str, value: &str) -> Result<(), String> {
    if value.chars().count() > MAX_TEMPLATE_FIELD {
        return Err(format!("{field} must be at most {MAX_TEMPLATE_FIELD} characters"));
    }
    Ok(())
}

// ── Templates ──

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = notification_templates)]
pub struct NotificationTemplate {
    pub id: i64,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub channel: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = notification_templates)]
pub struct NewTemplate {
    pub name: String,
    pub subject: String,
    pub body: String,
    #[serde(default = "default_channel")]
    pub channel: String,
}

fn default_channel() -> String {
    CHANNEL_IN_APP.to_string()
}

impl NewTemplate {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() || self.subject.trim().is_empty() {
            return Err("name and subject are required".to_string());
        }
        check_length("name", &self.name)?;
        check_length("subject", &self.subject)?;
        if !is_valid_channel(&self.channel) {
            return Err(format!("unknown channel: {}", self.channel));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = notification_templates)]
pub struct TemplateChanges {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub channel: Option<String>,
}

impl TemplateChanges {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.name {
            check_length("name", name)?;
        }
        if let Some(subject) = &self.subject {
            check_length("subject", subject)?;
        }
        if let Some(channel) = &self.channel {
            if !is_valid_channel(channel) {
                return Err(format!("unknown channel: {channel}"));
            }
        }
        Ok(())
    }
}

// ── Campaigns ──

/// Campaign lifecycle: `draft -> scheduled -> sending -> sent | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Sent,
    Failed,
}

impl CampaignStatus {
    /// Statuses a send request may start from.
    pub const PENDING: [CampaignStatus; 2] = [CampaignStatus::Draft, CampaignStatus::Scheduled];

    pub fn as_str(self) -> &'static str {
        match self {
            CampaignStatus::Draft => "draft",
            CampaignStatus::Scheduled => "scheduled",
            CampaignStatus::Sending => "sending",
            CampaignStatus::Sent => "sent",
            CampaignStatus::Failed => "failed",
        }
    }
}

impl FromStr for CampaignStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "draft" => Ok(CampaignStatus::Draft),
            "scheduled" => Ok(CampaignStatus::Scheduled),
            "sending" => Ok(CampaignStatus::Sending),
            "sent" => Ok(CampaignStatus::Sent),
            "failed" => Ok(CampaignStatus::Failed),
            other => Err(format!("unknown campaign status: {other}")),
        }
    }
}

/// Who receives a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    All,
    Admins,
    Roadmap(i64),
}

impl FromStr for Audience {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Audience::All),
            "admins" => Ok(Audience::Admins),
            _ => s
                .strip_prefix("roadmap:")
                .and_then(|id| id.parse().ok())
                .map(Audience::Roadmap)
                .ok_or_else(|| format!("unknown audience: {s}")),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::All => write!(f, "all"),
            Audience::Admins => write!(f, "admins"),
            Audience::Roadmap(id) => write!(f, "roadmap:{id}"),
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = notification_campaigns)]
pub struct Campaign {
    pub id: i64,
    pub name: String,
    pub template_id: i64,
    pub audience: String,
    pub status: String,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub recipients: i32,
    pub failures: i32,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn status(&self) -> Result<CampaignStatus, String> {
        self.status.parse()
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = notification_campaigns)]
pub struct NewCampaign {
    pub name: String,
    pub template_id: i64,
    pub audience: String,
    pub status: String,
    pub created_by: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub template_id: i64,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_audience() -> String {
    "all".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ScheduleRequest {
    pub scheduled_at: DateTime<Utc>,
}

/// Result of a campaign or workflow delivery.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    pub recipients: i32,
    pub delivered: i32,
    pub failures: i32,
}

impl DeliveryReport {
    /// Final status once delivery finished: failed only when there were
    /// recipients and none of them was reached.
    pub fn final_status(&self) -> CampaignStatus {
        if self.recipients > 0 && self.delivered == 0 {
            CampaignStatus::Failed
        } else {
            CampaignStatus::Sent
        }
    }
}

// ── Inbox ──

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = user_notifications)]
pub struct UserNotification {
    pub id: i64,
    pub user_id: i64,
    pub campaign_id: Option<i64>,
    pub subject: String,
    pub body: String,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_notifications)]
pub struct NewUserNotification {
    pub user_id: i64,
    pub campaign_id: Option<i64>,
    pub subject: String,
    pub body: String,
}

// ── Workflows ──

pub const TRIGGER_USER_REGISTERED: &str = "user_registered";
pub const TRIGGER_PURCHASE_COMPLETED: &str = "purchase_completed";
pub const TRIGGER_ENROLLMENT_CREATED: &str = "enrollment_created";

pub fn is_valid_trigger(trigger: &str) -> bool {
    matches!(
        trigger,
        TRIGGER_USER_REGISTERED | TRIGGER_PURCHASE_COMPLETED | TRIGGER_ENROLLMENT_CREATED
    )
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = workflows)]
pub struct Workflow {
    pub id: i64,
    pub name: String,
    pub trigger_event: String,
    pub template_id: i64,
    pub active: bool,
    pub runs: i32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Insertable)]
#[diesel(table_name = workflows)]
pub struct NewWorkflow {
    pub name: String,
    pub trigger_event: String,
    pub template_id: i64,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

impl NewWorkflow {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("name is required".to_string());
        }
        if !is_valid_trigger(&self.trigger_event) {
            return Err(format!("unknown trigger: {}", self.trigger_event));
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, AsChangeset)]
#[diesel(table_name = workflows)]
pub struct WorkflowChanges {
    pub name: Option<String>,
    pub trigger_event: Option<String>,
    pub template_id: Option<i64>,
    pub active: Option<bool>,
}

impl WorkflowChanges {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(trigger) = &self.trigger_event {
            if !is_valid_trigger(trigger) {
                return Err(format!("unknown trigger: {trigger}"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_parses_and_round_trips() {
        assert_eq!("all".parse::<Audience>(), Ok(Audience::All));
        assert_eq!("admins".parse::<Audience>(), Ok(Audience::Admins));
        assert_eq!("roadmap:7".parse::<Audience>(), Ok(Audience::Roadmap(7)));
        assert_eq!(Audience::Roadmap(7).to_string(), "roadmap:7");
        assert!("roadmap:x".parse::<Audience>().is_err());
        assert!("everyone".parse::<Audience>().is_err());
    }

    #[test]
    fn stored_statuses_parse_back() {
        for status in [
            CampaignStatus::Draft,
            CampaignStatus::Scheduled,
            CampaignStatus::Sending,
            CampaignStatus::Sent,
            CampaignStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<CampaignStatus>(), Ok(status));
        }
        assert!("queued".parse::<CampaignStatus>().is_err());
        assert!(!CampaignStatus::PENDING.contains(&CampaignStatus::Sending));
    }

    #[test]
    fn delivery_with_no_successes_fails() {
        let report = DeliveryReport {
            recipients: 3,
            delivered: 0,
            failures: 3,
        };
        assert_eq!(report.final_status(), CampaignStatus::Failed);

        let partial = DeliveryReport {
            recipients: 3,
            delivered: 1,
            failures: 2,
        };
        assert_eq!(partial.final_status(), CampaignStatus::Sent);

        assert_eq!(DeliveryReport::default().final_status(), CampaignStatus::Sent);
    }

    #[test]
    fn template_subjects_fit_their_column() {
        let mut template = NewTemplate {
            name: "Welcome".to_string(),
            subject: "s".repeat(MAX_TEMPLATE_FIELD),
            body: "Hi {{name}}".to_string(),
            channel: CHANNEL_IN_APP.to_string(),
        };
        assert!(template.validate().is_ok());
        template.subject.push('s');
        assert!(template.validate().is_err());

        let changes = TemplateChanges {
            subject: Some("s".repeat(MAX_TEMPLATE_FIELD + 1)),
            ..Default::default()
        };
        assert!(changes.validate().is_err());
    }

    #[test]
    fn workflow_triggers_are_checked() {
        let wf = NewWorkflow {
            name: "Welcome".to_string(),
            trigger_event: "user_deleted".to_string(),
            template_id: 1,
            active: true,
        };
        assert!(wf.validate().is_err());
    }
}
