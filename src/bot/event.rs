use serde::Deserialize;
use serde_json::Value;
use tracing::trace;

use crate::{
    github::{IssueRef, IssueService},
    webhooks::github::{IssueCommentEvent, IssuesEvent},
};

/// The webhook payloads the bot reacts to.
#[derive(Debug)]
pub enum WebhookPayload {
    /// An issue was opened, its description may hold a command.
    IssueOpened(IssuesEvent),
    /// A comment was posted on an issue or pull request.
    CommentCreated(IssueCommentEvent),
}

impl WebhookPayload {
    /// Reads an `issues` payload. Anything but a freshly opened issue with a description is
    /// ignored.
    pub fn from_issues(payload: &Value) -> Option<Self> {
        let event = match IssuesEvent::deserialize(payload) {
            Ok(event) => event,
            Err(e) => {
                trace!("payload isn't an issues event: {}", e);
                return None;
            }
        };

        if event.action != "opened" {
            trace!("ignoring issues event with action `{}`", event.action);
            return None;
        }

        if event.issue.body.as_deref().map_or(true, str::is_empty) {
            trace!("issue #{} was opened without a body", event.issue.number);
            return None;
        }

        Some(Self::IssueOpened(event))
    }

    /// Reads an `issue_comment` payload. Only newly created comments are of interest.
    pub fn from_issue_comment(payload: &Value) -> Option<Self> {
        let event = match IssueCommentEvent::deserialize(payload) {
            Ok(event) => event,
            Err(e) => {
                trace!("payload isn't an issue comment event: {}", e);
                return None;
            }
        };

        if event.action != "created" {
            trace!("ignoring issue comment event with action `{}`", event.action);
            return None;
        }

        if event.comment.body.is_empty() {
            trace!("comment {} has an empty body", event.comment.id);
            return None;
        }

        Some(Self::CommentCreated(event))
    }

    pub fn text(&self) -> &str {
        match self {
            // checked when building the payload
            Self::IssueOpened(event) => event.issue.body.as_deref().unwrap_or_default(),
            Self::CommentCreated(event) => &event.comment.body,
        }
    }

    pub fn repository_full_name(&self) -> &str {
        match self {
            Self::IssueOpened(event) => &event.repository.full_name,
            Self::CommentCreated(event) => &event.repository.full_name,
        }
    }

    pub fn issue_number(&self) -> u64 {
        match self {
            Self::IssueOpened(event) => event.issue.number,
            Self::CommentCreated(event) => event.issue.number,
        }
    }

    pub fn sender_login(&self) -> &str {
        match self {
            Self::IssueOpened(event) => &event.sender.login,
            Self::CommentCreated(event) => &event.sender.login,
        }
    }
}

/// What triggered the bot, with the thread to answer on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub repository_full_name: String,
    pub issue: IssueRef,
    pub sender_login: String,
    pub text: String,
}

impl Event {
    pub async fn resolve(
        payload: &WebhookPayload,
        issues: &dyn IssueService,
    ) -> anyhow::Result<Self> {
        let repository_full_name = payload.repository_full_name().to_owned();
        let issue = issues
            .resolve_issue(&repository_full_name, payload.issue_number())
            .await?;

        Ok(Self {
            repository_full_name,
            issue,
            sender_login: payload.sender_login().to_owned(),
            text: payload.text().to_owned(),
        })
    }
}
