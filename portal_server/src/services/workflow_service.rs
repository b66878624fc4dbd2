//! Workflows: notifications fired by portal events.

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::error::ApiError;
use crate::models::notification::{DeliveryReport, NewWorkflow, Workflow, WorkflowChanges};
use crate::models::user::User;
use crate::schema::workflows;
use crate::services::notification_service;
use crate::services::telegram_service::TelegramClient;

pub async fn list_workflows(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Workflow>> {
    let results = workflows::table
        .order(workflows::id.asc())
        .select(Workflow::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn get_workflow(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<Workflow> {
    workflows::table
        .find(id)
        .select(Workflow::as_select())
        .first(conn)
        .await
        .optional()?
        .ok_or_else(|| ApiError::not_found("Workflow").into())
}

pub async fn create_workflow(
    conn: &mut AsyncPgConnection,
    new: &NewWorkflow,
) -> anyhow::Result<Workflow> {
    let result = diesel::insert_into(workflows::table)
        .values(new)
        .returning(Workflow::as_returning())
        .get_result(conn)
        .await?;
    tracing::info!(workflow_id = result.id, trigger = %result.trigger_event, "Workflow created");
    Ok(result)
}

pub async fn update_workflow(
    conn: &mut AsyncPgConnection,
    id: i64,
    changes: &WorkflowChanges,
) -> anyhow::Result<Workflow> {
    let result = diesel::update(workflows::table.find(id))
        .set((changes, workflows::updated_at.eq(Utc::now())))
        .returning(Workflow::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

pub async fn delete_workflow(conn: &mut AsyncPgConnection, id: i64) -> anyhow::Result<()> {
    let deleted = diesel::delete(workflows::table.find(id))
        .execute(conn)
        .await?;
    if deleted == 0 {
        return Err(ApiError::not_found("Workflow").into());
    }
    Ok(())
}

/// Executes a single workflow for the user that raised the event.
#[async_trait]
trait WorkflowRunner: Send {
    async fn run(&mut self, workflow: &Workflow) -> anyhow::Result<DeliveryReport>;
}

struct Dispatcher<'a> {
    conn: &'a mut AsyncPgConnection,
    telegram: &'a TelegramClient,
    user: &'a User,
}

#[async_trait]
impl<'a> WorkflowRunner for Dispatcher<'a> {
    async fn run(&mut self, workflow: &Workflow) -> anyhow::Result<DeliveryReport> {
        let template = notification_service::get_template(self.conn, workflow.template_id).await?;
        let report = notification_service::deliver(
            self.conn,
            self.telegram,
            &template,
            None,
            std::slice::from_ref(self.user),
        )
        .await?;

        diesel::update(workflows::table.find(workflow.id))
            .set((
                workflows::runs.eq(workflows::runs + 1),
                workflows::last_run_at.eq(Some(Utc::now())),
            ))
            .execute(self.conn)
            .await?;
        Ok(report)
    }
}

/// Run every workflow in turn. A failing workflow is logged and the rest
/// still run. Returns how many succeeded.
async fn run_all(runner: &mut dyn WorkflowRunner, workflows: &[Workflow], trigger: &str) -> usize {
    let mut succeeded = 0;
    for workflow in workflows {
        match runner.run(workflow).await {
            Ok(report) => {
                succeeded += 1;
                crate::metrics::workflow_run(trigger);
                tracing::info!(
                    workflow_id = workflow.id,
                    trigger,
                    delivered = report.delivered,
                    "Workflow ran"
                );
            }
            Err(e) => {
                tracing::error!(workflow_id = workflow.id, trigger, "Workflow run failed: {e:#}");
            }
        }
    }
    succeeded
}

/// Run every active workflow for `trigger` against `user`.
///
/// Never fails: errors are logged so the request that raised the event
/// still succeeds.
pub async fn fire(
    conn: &mut AsyncPgConnection,
    telegram: &TelegramClient,
    trigger: &str,
    user: &User,
) {
    let active: Vec<Workflow> = match workflows::table
        .filter(workflows::trigger_event.eq(trigger))
        .filter(workflows::active.eq(true))
        .order(workflows::id.asc())
        .select(Workflow::as_select())
        .load(conn)
        .await
    {
        Ok(active) => active,
        Err(e) => {
            tracing::error!(trigger, user_id = user.id, "Loading workflows failed: {e:#}");
            return;
        }
    };
    if active.is_empty() {
        return;
    }

    let mut dispatcher = Dispatcher { conn, telegram, user };
    let succeeded = run_all(&mut dispatcher, &active, trigger).await;
    if succeeded < active.len() {
        tracing::warn!(
            trigger,
            user_id = user.id,
            failed = active.len() - succeeded,
            "Some workflows failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    /// Fails the workflows whose ids it is given and records every call.
    struct FakeRunner {
        failing: Vec<i64>,
        calls: Vec<i64>,
    }

    #[async_trait]
    impl WorkflowRunner for FakeRunner {
        async fn run(&mut self, workflow: &Workflow) -> anyhow::Result<DeliveryReport> {
            self.calls.push(workflow.id);
            if self.failing.contains(&workflow.id) {
                anyhow::bail!("insert into user_notifications failed");
            }
            Ok(DeliveryReport {
                recipients: 1,
                delivered: 1,
                failures: 0,
            })
        }
    }

    fn workflow(id: i64) -> Workflow {
        let now = Utc::now();
        Workflow {
            id,
            name: format!("workflow-{id}"),
            trigger_event: "user_registered".to_string(),
            template_id: 1,
            active: true,
            runs: 0,
            last_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn a_failing_workflow_does_not_stop_the_rest() {
        let mut runner = FakeRunner {
            failing: vec![2],
            calls: Vec::new(),
        };
        let workflows = [workflow(1), workflow(2), workflow(3)];

        let succeeded = run_all(&mut runner, &workflows, "user_registered").await;

        assert_eq!(succeeded, 2);
        assert_eq!(runner.calls, vec![1, 2, 3]);
    }
}
