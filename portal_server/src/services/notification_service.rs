//! Notification templates, campaigns, delivery and the user inbox.
//!
//! Delivery is shared with workflows: a template is rendered per recipient
//! and either written to the inbox (`in_app`) or posted to the recipient's
//! linked Telegram chat (`telegram`).

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use regex::{Captures, Regex};
use tokio::sync::Notify;

use crate::error::ApiError;
use crate::migration::DbPool;
use crate::models::notification::{
    Audience, Campaign, CampaignStatus, CreateCampaignRequest, DeliveryReport, NewCampaign,
    NewTemplate, NewUserNotification, NotificationTemplate, TemplateChanges, UserNotification,
    CHANNEL_TELEGRAM,
};
use crate::models::user::{User, ROLE_ADMIN};
use crate::schema::{enrollments, notification_campaigns, notification_templates, user_notifications, users};
use crate::services::telegram_service::{self, TelegramClient};

/// A `sending` campaign untouched for this long is resumed by the scheduler.
pub const STALE_SENDING_MINUTES: i64 = 15;

/// Telegram recipients between two heartbeats of a running campaign.
const HEARTBEAT_EVERY: usize = 25;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([a-zA-Z_]+)\s*\}\}").expect("valid placeholder regex"));

/// Substitute `{{name}}` and `{{email}}` for a recipient. Unknown
/// placeholders are left untouched.
pub fn render_template(text: &str, user: &User) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match &caps[1] {
            "name" => user.display_name.clone(),
            "email" => user.email.clone(),
            _ => caps[0].to_string(),
        })
        .into_owned()
}

// ── Templates ──

pub async fn list_templates(
    conn: &mut AsyncPgConnection,
) -> anyhow::Result<Vec<NotificationTemplate>> {
    let results = notification_templates::table
        .order(notification_templates::name.asc())
        .select(NotificationTemplate::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn get_template(
    conn: &mut AsyncPgConnection,
    id: i64,
) -> anyhow::Result<NotificationTemplate> {
    notification_templates::table
        .find(id)
        .select(NotificationTemplate::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Template").into())
}

pub async fn create_template(
    conn: &mut AsyncPgConnection,
    new: &NewTemplate,
) -> anyhow::Result<NotificationTemplate> {
    let result = diesel::insert_into(notification_templates::table)
        .values(new)
        .returning(NotificationTemplate::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!(template_id = result.id, name = %result.name, "Template created");
    Ok(result)
}

pub async fn update_template(
    conn: &mut AsyncPgConnection,
    id: i64,
    changes: &TemplateChanges,
) -> anyhow::Result<NotificationTemplate> {
    let result = diesel::update(notification_templates::table.find(id))
        .set((changes, notification_templates::updated_at.eq(Utc::now())))
        .returning(NotificationTemplate::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

pub async fn delete_template(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(notification_templates::table.find(id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Template").into());
    }
    Ok(())
}

// ── Campaigns ──

pub async fn create_campaign(
    conn: &mut AsyncPgConnection,
    req: CreateCampaignRequest,
    created_by: i64,
) -> anyhow::Result<Campaign> {
    if req.name.trim().is_empty() {
        return Err(ApiError::bad_request("name is required").into());
    }
    let audience: Audience = req.audience.parse().map_err(ApiError::BadRequest)?;
    get_template(conn, req.template_id)
        .await
        .map_err(|_| ApiError::bad_request("template_id does not exist"))?;

    let result = diesel::insert_into(notification_campaigns::table)
        .values(&NewCampaign {
            name: req.name.trim().to_string(),
            template_id: req.template_id,
            audience: audience.to_string(),
            status: CampaignStatus::Draft.as_str().to_string(),
            created_by: Some(created_by),
        })
        .returning(Campaign::as_returning())
        .get_result(conn)
        .await?;

    tracing::info!(campaign_id = result.id, audience = %audience, "Campaign created");
    Ok(result)
}

pub async fn list_campaigns(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Campaign>> {
    let results = notification_campaigns::table
        .order(notification_campaigns::id.desc())
        .select(Campaign::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn get_campaign(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<Campaign> {
    notification_campaigns::table
        .find(id)
        .select(Campaign::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Campaign").into())
}

pub async fn delete_campaign(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<()> {
    let campaign = get_campaign(conn, id).await?;
    if campaign.status() == Ok(CampaignStatus::Sending) {
        return Err(ApiError::conflict("Campaign is being sent").into());
    }
    diesel::delete(notification_campaigns::table.find(id))
        .execute(conn)
        .await?;
    Ok(())
}

/// Move a draft campaign to `scheduled`.
pub async fn schedule_campaign(
    conn: &mut AsyncPgConnection,
    id: i64,
    scheduled_at: chrono::DateTime<Utc>,
) -> anyhow::Result<Campaign> {
    let updated = diesel::update(
        notification_campaigns::table
            .filter(notification_campaigns::id.eq(id))
            .filter(notification_campaigns::status.eq(CampaignStatus::Draft.as_str())),
    )
    .set((
        notification_campaigns::status.eq(CampaignStatus::Scheduled.as_str()),
        notification_campaigns::scheduled_at.eq(Some(scheduled_at)),
        notification_campaigns::updated_at.eq(Utc::now()),
    ))
    .returning(Campaign::as_returning())
    .get_result(conn)
    .await
    .optional()?;

    match updated {
        Some(campaign) => {
            tracing::info!(campaign_id = id, %scheduled_at, "Campaign scheduled");
            Ok(campaign)
        }
        None => {
            let current = get_campaign(conn, id).await?;
            Err(ApiError::conflict(format!(
                "Campaign is {}, only draft campaigns can be scheduled",
                current.status
            ))
            .into())
        }
    }
}

/// Queue a draft or scheduled campaign for immediate delivery. The
/// scheduler claims and delivers it outside the request.
pub async fn queue_send(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<Campaign> {
    let now = Utc::now();
    let queued = diesel::update(
        notification_campaigns::table
            .filter(notification_campaigns::id.eq(id))
            .filter(
                notification_campaigns::status
                    .eq_any(CampaignStatus::PENDING.map(CampaignStatus::as_str)),
            ),
    )
    .set((
        notification_campaigns::status.eq(CampaignStatus::Scheduled.as_str()),
        notification_campaigns::scheduled_at.eq(Some(now)),
        notification_campaigns::updated_at.eq(now),
    ))
    .returning(Campaign::as_returning())
    .get_result(conn)
    .await
    .optional()?;

    match queued {
        Some(campaign) => {
            tracing::info!(campaign_id = id, "Campaign queued for sending");
            Ok(campaign)
        }
        None => {
            let current = get_campaign(conn, id).await?;
            Err(ApiError::conflict(format!(
                "Campaign is {}, only draft or scheduled campaigns can be sent",
                current.status
            ))
            .into())
        }
    }
}

/// `sending` campaigns last touched before this instant were abandoned by a
/// sender that stopped before recording the outcome.
pub fn stale_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - chrono::Duration::minutes(STALE_SENDING_MINUTES)
}

/// Claim a due scheduled campaign. The status switch is a single conditional
/// UPDATE so two schedulers never deliver the same campaign.
async fn claim_due(
    conn: &mut AsyncPgConnection,
    id: i64,
    now: DateTime<Utc>,
) -> anyhow::Result<Option<Campaign>> {
    let claimed = diesel::update(
        notification_campaigns::table
            .filter(notification_campaigns::id.eq(id))
            .filter(notification_campaigns::status.eq(CampaignStatus::Scheduled.as_str()))
            .filter(notification_campaigns::scheduled_at.le(now)),
    )
    .set((
        notification_campaigns::status.eq(CampaignStatus::Sending.as_str()),
        notification_campaigns::updated_at.eq(now),
    ))
    .returning(Campaign::as_returning())
    .get_result(conn)
    .await
    .optional()?;
    Ok(claimed)
}

/// Take over a `sending` campaign nobody has touched since `cutoff`.
async fn reclaim_stale(
    conn: &mut AsyncPgConnection,
    id: i64,
    cutoff: DateTime<Utc>,
) -> anyhow::Result<Option<Campaign>> {
    let reclaimed = diesel::update(
        notification_campaigns::table
            .filter(notification_campaigns::id.eq(id))
            .filter(notification_campaigns::status.eq(CampaignStatus::Sending.as_str()))
            .filter(notification_campaigns::updated_at.lt(cutoff)),
    )
    .set(notification_campaigns::updated_at.eq(Utc::now()))
    .returning(Campaign::as_returning())
    .get_result(conn)
    .await
    .optional()?;
    Ok(reclaimed)
}

/// Keep a long delivery from looking abandoned.
async fn touch_campaign(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<()> {
    diesel::update(
        notification_campaigns::table
            .filter(notification_campaigns::id.eq(id))
            .filter(notification_campaigns::status.eq(CampaignStatus::Sending.as_str())),
    )
    .set(notification_campaigns::updated_at.eq(Utc::now()))
    .execute(conn)
    .await?;
    Ok(())
}

/// Deliver a claimed campaign and record the outcome.
async fn run_campaign(
    conn: &mut AsyncPgConnection,
    telegram: &TelegramClient,
    campaign: &Campaign,
) -> anyhow::Result<Campaign> {
    let id = campaign.id;
    tracing::info!(campaign_id = id, audience = %campaign.audience, "Sending campaign");

    let report = match deliver_campaign(conn, telegram, campaign).await {
        Ok(report) => report,
        Err(e) => {
            tracing::error!(campaign_id = id, "Campaign delivery failed: {e:#}");
            finish_campaign(conn, id, CampaignStatus::Failed, DeliveryReport::default()).await?;
            return Err(e);
        }
    };

    let status = report.final_status();
    let result = finish_campaign(conn, id, status, report).await?;
    tracing::info!(
        campaign_id = id,
        recipients = report.recipients,
        delivered = report.delivered,
        failures = report.failures,
        status = status.as_str(),
        "Campaign finished"
    );
    Ok(result)
}

async fn deliver_campaign(
    conn: &mut AsyncPgConnection,
    telegram: &TelegramClient,
    campaign: &Campaign,
) -> anyhow::Result<DeliveryReport> {
    let audience: Audience = campaign
        .audience
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let template = get_template(conn, campaign.template_id).await?;
    let recipients = resolve_audience(conn, audience).await?;
    deliver(conn, telegram, &template, Some(campaign.id), &recipients).await
}

async fn finish_campaign(
    conn: &mut AsyncPgConnection,
    id: i64,
    status: CampaignStatus,
    report: DeliveryReport,
) -> anyhow::Result<Campaign> {
    let now = Utc::now();
    let result = diesel::update(notification_campaigns::table.find(id))
        .set((
            notification_campaigns::status.eq(status.as_str()),
            notification_campaigns::recipients.eq(report.recipients),
            notification_campaigns::failures.eq(report.failures),
            notification_campaigns::sent_at.eq(Some(now)),
            notification_campaigns::updated_at.eq(now),
        ))
        .returning(Campaign::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

/// Active users a campaign audience addresses.
pub async fn resolve_audience(
    conn: &mut AsyncPgConnection,
    audience: Audience,
) -> anyhow::Result<Vec<User>> {
    let results = match audience {
        Audience::All => {
            users::table
                .filter(users::active.eq(true))
                .order(users::id.asc())
                .select(User::as_select())
                .load(conn)
                .await?
        }
        Audience::Admins => {
            users::table
                .filter(users::active.eq(true))
                .filter(users::role.eq(ROLE_ADMIN))
                .order(users::id.asc())
                .select(User::as_select())
                .load(conn)
                .await?
        }
        Audience::Roadmap(roadmap_id) => {
            users::table
                .inner_join(enrollments::table)
                .filter(users::active.eq(true))
                .filter(enrollments::roadmap_id.eq(roadmap_id))
                .order(users::id.asc())
                .select(User::as_select())
                .load(conn)
                .await?
        }
    };
    Ok(results)
}

/// Render and deliver a template to each recipient over the template's channel.
pub async fn deliver(
    conn: &mut AsyncPgConnection,
    telegram: &TelegramClient,
    template: &NotificationTemplate,
    campaign_id: Option<i64>,
    recipients: &[User],
) -> anyhow::Result<DeliveryReport> {
    let mut report = DeliveryReport {
        recipients: recipients.len() as i32,
        ..Default::default()
    };
    if recipients.is_empty() {
        return Ok(report);
    }

    if template.channel == CHANNEL_TELEGRAM {
        let ids: Vec<i64> = recipients.iter().map(|u| u.id).collect();
        let chats: HashMap<i64, i64> = telegram_service::chat_ids_for(conn, &ids)
            .await?
            .into_iter()
            .collect();

        for (sent, user) in recipients.iter().enumerate() {
            if let Some(id) = campaign_id.filter(|_| sent > 0 && sent % HEARTBEAT_EVERY == 0) {
                if let Err(e) = touch_campaign(conn, id).await {
                    tracing::warn!(campaign_id = id, "Campaign heartbeat failed: {e:#}");
                }
            }
            let Some(&chat_id) = chats.get(&user.id) else {
                report.failures += 1;
                continue;
            };
            let text = format!(
                "{}\n\n{}",
                render_template(&template.subject, user),
                render_template(&template.body, user)
            );
            match telegram.send_message(chat_id, &text).await {
                Ok(true) => report.delivered += 1,
                Ok(false) => report.failures += 1,
                Err(e) => {
                    tracing::warn!(user_id = user.id, "Telegram delivery failed: {e:#}");
                    report.failures += 1;
                }
            }
        }
    } else {
        let rows: Vec<NewUserNotification> = recipients
            .iter()
            .map(|user| NewUserNotification {
                user_id: user.id,
                campaign_id,
                subject: render_template(&template.subject, user),
                body: render_template(&template.body, user),
            })
            .collect();
        let inserted = diesel::insert_into(user_notifications::table)
            .values(&rows)
            .execute(conn)
            .await?;
        report.delivered = inserted as i32;
        report.failures = report.recipients - report.delivered;
    }

    crate::metrics::notifications_sent(&template.channel, report.delivered as u64);
    Ok(report)
}

// ── Scheduler ──

/// Send due campaigns forever. Spawned as a background tokio task; `wakeup`
/// cuts the poll interval short when a campaign is queued.
pub async fn run_scheduler(
    pool: DbPool,
    telegram: TelegramClient,
    poll_secs: u64,
    wakeup: Arc<Notify>,
) {
    tracing::info!(poll_secs, "Campaign scheduler started");

    loop {
        if let Err(e) = send_due_campaigns(&pool, &telegram).await {
            tracing::error!("Campaign scheduler error: {e:#}");
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(poll_secs.max(1))) => {}
            _ = wakeup.notified() => {}
        }
    }
}

async fn send_due_campaigns(pool: &DbPool, telegram: &TelegramClient) -> anyhow::Result<()> {
    let mut conn = pool.get().await?;
    let now = Utc::now();
    let cutoff = stale_cutoff(now);

    let due: Vec<i64> = notification_campaigns::table
        .filter(notification_campaigns::status.eq(CampaignStatus::Scheduled.as_str()))
        .filter(notification_campaigns::scheduled_at.le(now))
        .order(notification_campaigns::scheduled_at.asc())
        .select(notification_campaigns::id)
        .load(&mut conn)
        .await?;

    let stale: Vec<i64> = notification_campaigns::table
        .filter(notification_campaigns::status.eq(CampaignStatus::Sending.as_str()))
        .filter(notification_campaigns::updated_at.lt(cutoff))
        .order(notification_campaigns::id.asc())
        .select(notification_campaigns::id)
        .load(&mut conn)
        .await?;

    for id in due {
        // Another instance may have claimed it first.
        let Some(campaign) = claim_due(&mut conn, id, now).await? else {
            tracing::debug!(campaign_id = id, "Campaign already claimed");
            continue;
        };
        if let Err(e) = run_campaign(&mut conn, telegram, &campaign).await {
            tracing::error!(campaign_id = id, "Scheduled send failed: {e:#}");
        }
    }

    for id in stale {
        let Some(campaign) = reclaim_stale(&mut conn, id, cutoff).await? else {
            continue;
        };
        tracing::warn!(campaign_id = id, "Resuming abandoned campaign send");
        if let Err(e) = run_campaign(&mut conn, telegram, &campaign).await {
            tracing::error!(campaign_id = id, "Resumed send failed: {e:#}");
        }
    }
    Ok(())
}

// ── Inbox ──

pub async fn list_inbox(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    unread_only: bool,
) -> anyhow::Result<Vec<UserNotification>> {
    let mut query = user_notifications::table
        .filter(user_notifications::user_id.eq(user_id))
        .into_boxed();
    if unread_only {
        query = query.filter(user_notifications::read_at.is_null());
    }
    let results = query
        .order(user_notifications::id.desc())
        .limit(200)
        .select(UserNotification::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

/// Mark one of the user's notifications read. Already-read rows keep their
/// original timestamp.
pub async fn mark_read(
    conn: &mut AsyncPgConnection,
    user_id: i64,
    id: i64,
) -> anyhow::Result<UserNotification> {
    let notification = user_notifications::table
        .filter(user_notifications::id.eq(id))
        .filter(user_notifications::user_id.eq(user_id))
        .select(UserNotification::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or(ApiError::not_found("Notification"))?;

    if notification.read_at.is_some() {
        return Ok(notification);
    }

    let result = diesel::update(user_notifications::table.find(id))
        .set(user_notifications::read_at.eq(Some(Utc::now())))
        .returning(UserNotification::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

pub async fn mark_all_read(conn: &mut AsyncPgConnection, user_id: i64) -> anyhow::Result<usize> {
    let updated = diesel::update(
        user_notifications::table
            .filter(user_notifications::user_id.eq(user_id))
            .filter(user_notifications::read_at.is_null()),
    )
    .set(user_notifications::read_at.eq(Some(Utc::now())))
    .execute(conn)
    .await?;
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str, email: &str) -> User {
        let now = Utc::now();
        User {
            id: 1,
            email: email.to_string(),
            password_hash: String::new(),
            display_name: name.to_string(),
            role: "user".to_string(),
            active: true,
            failed_logins: 0,
            locked_until: None,
            last_login_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn renders_known_placeholders() {
        let ada = user("Ada", "ada@example.com");
        assert_eq!(
            render_template("Hi {{name}}, we wrote to {{ email }}.", &ada),
            "Hi Ada, we wrote to ada@example.com."
        );
    }

    #[test]
    fn unknown_placeholders_are_kept() {
        let ada = user("Ada", "ada@example.com");
        assert_eq!(
            render_template("{{name}} earned {{points}} points", &ada),
            "Ada earned {{points}} points"
        );
        assert_eq!(render_template("no placeholders", &ada), "no placeholders");
    }

    #[test]
    fn sending_campaigns_go_stale_after_the_heartbeat_window() {
        let now = Utc::now();
        let cutoff = stale_cutoff(now);
        assert!(now > cutoff);
        assert!(now - chrono::Duration::minutes(STALE_SENDING_MINUTES - 1) > cutoff);
        assert!(now - chrono::Duration::minutes(STALE_SENDING_MINUTES + 1) < cutoff);
    }

    #[test]
    fn substituted_values_are_not_rendered_again() {
        let tricky = user("{{email}}", "x@example.com");
        assert_eq!(render_template("{{name}}", &tricky), "{{email}}");
    }
}
