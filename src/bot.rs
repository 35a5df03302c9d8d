use std::{any::Any, fmt::Write, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use crate::github::{IssueRef, IssueService};

pub mod command;
use command::{CommandHandler, CommandRegistry, CommandSummary};

pub mod event;
use event::{Event, WebhookPayload};

pub mod mention;
use mention::{Mention, ParsedInvocation};

pub mod router;
use router::{route, CommandFailure, Outcome};

pub(crate) mod message_builder;
use message_builder::MessageBuilder;

pub(crate) mod utils;
use utils::{keep_tail, shorten_content, shorten_to};

/// Message returned to webhook callers when the bot had nothing to do.
pub const NOTHING_FOR_ME: &str = "Nothing for me";

// GitHub refuses comments over 65536 chars
const FAILURE_HEADLINE_LENGTH: usize = 200;
const FAILURE_TRACE_LENGTH: usize = 60_000;

/// Turns webhook payloads into command invocations, and answers on the originating thread.
pub struct BotHandler {
    mention: Mention,
    registry: Arc<CommandRegistry>,
    issues: Arc<dyn IssueService>,
}

/// Everything the bot did for one addressed event.
#[derive(Debug)]
pub struct Reply {
    pub issue: IssueRef,
    pub outcome: Outcome,
    /// The comment body, whether or not it could be posted.
    pub message: String,
    pub published: bool,
}

/// JSON body answered to the webhook caller.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BotResponse {
    pub message: String,
    pub outcome: Option<String>,
    /// Whether `message` made it to the issue.
    pub published: bool,
}

impl From<Option<&Reply>> for BotResponse {
    fn from(reply: Option<&Reply>) -> Self {
        match reply {
            Some(reply) => Self {
                message: reply.message.clone(),
                outcome: Some(reply.outcome.kind().to_owned()),
                published: reply.published,
            },
            None => Self {
                message: NOTHING_FOR_ME.to_owned(),
                outcome: None,
                published: false,
            },
        }
    }
}

impl BotHandler {
    /// Creates a bot answering to `@bot_name` with the commands `handler` registers.
    pub fn new<H: CommandHandler>(
        handler: H,
        bot_name: &str,
        issues: Arc<dyn IssueService>,
    ) -> anyhow::Result<Self> {
        let mention = Mention::new(bot_name)?;
        let registry = CommandRegistry::from_handler(handler)?;
        if registry.is_empty() {
            warn!("{} has no command, it will only answer with help", mention.token());
        } else {
            debug!(
                "{} answers to {} command(s)",
                mention.token(),
                registry.len()
            );
        }

        Ok(Self {
            mention,
            registry: Arc::new(registry),
            issues,
        })
    }

    pub fn commands(&self) -> Vec<CommandSummary> {
        self.registry.summaries()
    }

    /// Handles an `issues` webhook payload.
    pub async fn issues(&self, payload: &Value) -> anyhow::Result<Option<Reply>> {
        match WebhookPayload::from_issues(payload) {
            Some(payload) => self.handle(payload).await,
            None => Ok(None),
        }
    }

    /// Handles an `issue_comment` webhook payload.
    pub async fn issue_comment(&self, payload: &Value) -> anyhow::Result<Option<Reply>> {
        match WebhookPayload::from_issue_comment(payload) {
            Some(payload) => self.handle(payload).await,
            None => Ok(None),
        }
    }

    /// Runs the command addressed to the bot in `payload`, if any, and posts the result.
    ///
    /// Returns `None` when nothing in the payload was meant for the bot. A comment that couldn't
    /// be posted doesn't make this fail, check [`Reply::published`].
    pub async fn handle(&self, payload: WebhookPayload) -> anyhow::Result<Option<Reply>> {
        let invocation = match self.mention.parse(payload.text()) {
            Some(invocation) => invocation,
            None => {
                trace!("no line addressed to {}", self.mention.token());
                return Ok(None);
            }
        };

        let event = Event::resolve(&payload, self.issues.as_ref()).await?;
        info!(
            "{} asked `{}` on {}#{}",
            event.sender_login,
            invocation.command_line(),
            event.repository_full_name,
            event.issue.number
        );

        let outcome = self.dispatch(invocation, event.issue.clone()).await;
        let message = render(&outcome);

        trace!(
            "answering {} on {}: `{}`",
            outcome.kind(),
            event.issue,
            shorten_content(&message)
        );
        let published = match self.issues.post_comment(&event.issue, &message).await {
            Ok(()) => true,
            Err(e) => {
                warn!("couldn't post answer on {}: {:#}", event.issue, e);
                false
            }
        };

        Ok(Some(Reply {
            issue: event.issue,
            outcome,
            message,
            published,
        }))
    }

    /// Routes on a blocking thread: commands may take a while, and a panicking one must not take
    /// the bot down.
    async fn dispatch(&self, invocation: ParsedInvocation, issue: IssueRef) -> Outcome {
        let registry = Arc::clone(&self.registry);
        let command_line = invocation.command_line();

        let routed =
            tokio::task::spawn_blocking(move || route(&invocation, &registry, &issue)).await;

        match routed {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = if e.is_panic() {
                    panic_message(e.into_panic())
                } else {
                    "command was cancelled".to_owned()
                };
                warn!("`{}` didn't complete: {}", command_line, reason);

                let error = anyhow::anyhow!("command panicked: {}", reason);
                Outcome::Failure(CommandFailure::new(command_line, &error))
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Formats an outcome as the comment posted on the issue.
pub fn render(outcome: &Outcome) -> String {
    let mut message = MessageBuilder::new();

    match outcome {
        // plain text goes out as is
        Outcome::Success(output) => return output.clone(),

        Outcome::Help(commands) => write_help(&mut message, commands),

        Outcome::Unrecognized {
            command_line,
            commands,
        } => {
            write!(message, "I didn't understand your command:").unwrap();
            message.fenced("bash", command_line);
            write!(message, "in this context, sorry :(").unwrap();
            message.line();
            message.line();
            write_help(&mut message, commands);
        }

        Outcome::Failure(failure) => {
            // the whole message is in the trace, only its first line goes in the sentence
            let headline = failure.message.lines().next().unwrap_or_default();
            write!(message, "I tried to run ").unwrap();
            message.code(&shorten_to(&failure.command_line, FAILURE_HEADLINE_LENGTH));
            write!(
                message,
                " but it failed: {}",
                shorten_to(headline, FAILURE_HEADLINE_LENGTH)
            )
            .unwrap();
            message.line();
            message.fenced("text", &keep_tail(&failure.trace, FAILURE_TRACE_LENGTH));
        }
    }

    message.build()
}

fn write_help(message: &mut MessageBuilder, commands: &[CommandSummary]) {
    write!(message, "This is what I can do:").unwrap();
    message.line();

    for command in commands {
        let mut usage = command.name.clone();
        for parameter in &command.parameter_names {
            write!(usage, " <{}>", parameter).unwrap();
        }

        message.list_item();
        message.code(&usage);
        if let Some(doc) = &command.doc {
            write!(message, ": {}", doc).unwrap();
        }
        message.line();
    }

    message.list_item();
    message.code("help");
    write!(message, ": this help message").unwrap();
}
