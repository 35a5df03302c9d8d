use anyhow::anyhow;
use rocket::{
    http::Status,
    request::{FromRequest, Outcome},
    response::Debug,
    serde::json::Json,
    Request, State,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, trace};

use crate::bot::{BotHandler, BotResponse};

pub mod events;
pub use events::*;

const X_GITHUB_EVENT: &str = "X-GitHub-Event";

/// GitHub delivers with either content type, only JSON bodies are understood.
#[rocket::post("/api/webhooks/github", data = "<payload>")]
pub async fn github_webhook(
    event: GitHubEventType,
    payload: Json<Value>,
    bot: &State<BotHandler>,
) -> Result<Json<BotResponse>, Debug<anyhow::Error>> {
    info!("received {:?} event", event);
    trace!("payload: {}", payload.0);

    let reply = match event {
        GitHubEventType::Issues => bot.issues(&payload).await?,
        GitHubEventType::IssueComment => bot.issue_comment(&payload).await?,
        GitHubEventType::Other => {
            trace!("not an event the bot reacts to");
            None
        }
    };

    if let Some(reply) = &reply {
        let thread = match &reply.issue.html_url {
            Some(url) => url.to_string(),
            None => reply.issue.to_string(),
        };
        info!("answered with {} on {}", reply.outcome.kind(), thread);
    }

    Ok(Json(BotResponse::from(reply.as_ref())))
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GitHubEventType {
    Issues,
    IssueComment,
    #[serde(other)]
    Other,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for GitHubEventType {
    type Error = anyhow::Error;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let event_types = request.headers().get(X_GITHUB_EVENT).collect::<Vec<_>>();
        if event_types.len() != 1 {
            return Outcome::Error((
                Status::BadRequest,
                anyhow!("request header needs exactly one event type"),
            ));
        }

        let event_type = Value::String(event_types[0].to_owned());

        match serde_json::from_value::<GitHubEventType>(event_type) {
            Ok(ev_type) => Outcome::Success(ev_type),
            Err(e) => Outcome::Error((Status::BadRequest, anyhow!(e))),
        }
    }
}
