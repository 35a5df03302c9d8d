use std::fmt::Write;

use tracing::{debug, info, warn};

use crate::{
    bot::{
        command::{CommandRegistry, CommandSummary},
        mention::ParsedInvocation,
    },
    github::IssueRef,
};

const HELP_COMMAND: &str = "help";

/// What came out of routing one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The user asked for help, or just mentioned the bot.
    Help(Vec<CommandSummary>),
    /// The command ran, this is what it returned.
    Success(String),
    /// No command has that name.
    Unrecognized {
        command_line: String,
        commands: Vec<CommandSummary>,
    },
    /// The command ran and failed.
    Failure(CommandFailure),
}

impl Outcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Help(_) => "help",
            Self::Success(_) => "success",
            Self::Unrecognized { .. } => "unrecognized",
            Self::Failure(_) => "failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command_line: String,
    pub message: String,
    /// The error followed by its causes, one per line. Never includes a backtrace.
    pub trace: String,
}

impl CommandFailure {
    pub fn new(command_line: String, error: &anyhow::Error) -> Self {
        Self {
            command_line,
            message: error.to_string(),
            trace: cause_chain(error),
        }
    }
}

fn cause_chain(error: &anyhow::Error) -> String {
    let mut trace = error.to_string();
    let mut causes = error.chain().skip(1).peekable();
    if causes.peek().is_some() {
        trace.push_str("\n\nCaused by:");
        for (i, cause) in causes.enumerate() {
            write!(trace, "\n    {}: {}", i, cause).unwrap();
        }
    }
    trace
}

/// Resolves an invocation against the registry and runs the matching command.
///
/// A registered `help` command takes precedence over the built-in help message.
pub fn route(
    invocation: &ParsedInvocation,
    registry: &CommandRegistry,
    issue: &IssueRef,
) -> Outcome {
    let name = invocation.command_name.as_str();

    let command = match registry.get(name) {
        Some(command) => command,
        None if invocation.is_help_request() || name == HELP_COMMAND => {
            debug!("help requested on {}", issue);
            return Outcome::Help(registry.summaries());
        }
        None => {
            debug!("unknown command `{}` on {}", name, issue);
            return Outcome::Unrecognized {
                command_line: invocation.command_line(),
                commands: registry.summaries(),
            };
        }
    };

    info!(
        "running `{}` on {} with arguments {:?}",
        command.name, issue, invocation.arguments
    );

    match command.invoke(issue, &invocation.arguments) {
        Ok(output) => Outcome::Success(output),
        Err(e) => {
            warn!("command `{}` failed on {}: {:#}", command.name, issue, e);
            Outcome::Failure(CommandFailure::new(invocation.command_line(), &e))
        }
    }
}

#[cfg(test)]
mod tests {
    use anyhow::{anyhow, bail, Context};

    use super::*;
    use crate::bot::{
        command::{CommandHandler, CommandSet},
        mention::Mention,
    };

    fn issue() -> IssueRef {
        IssueRef {
            repository: "lmazuel/TestingRepo".to_owned(),
            number: 18,
            html_url: None,
        }
    }

    fn invocation(text: &str) -> ParsedInvocation {
        Mention::new("AutorestCI").unwrap().parse(text).unwrap()
    }

    struct Echo;

    impl CommandHandler for Echo {
        fn register(commands: &mut CommandSet<Self>) {
            commands
                .command("command1", &["param1"], |_, _, args| {
                    Ok(format!("I did something with {}", args[0]))
                })
                .command("unhappy", &[], |_, _, _| -> anyhow::Result<String> {
                    bail!("Not happy")
                })
                .command("nested", &[], |_, _, _| -> anyhow::Result<String> {
                    Err(anyhow!("disk full")).context("couldn't write artifact")
                })
                .command("count", &[], |_, issue, _| Ok(issue.number));
        }
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::from_handler(Echo).unwrap()
    }

    #[test]
    fn bare_mention_and_help_list_commands() {
        for text in ["@AutorestCI", "@AutorestCI help"] {
            match route(&invocation(text), &registry(), &issue()) {
                Outcome::Help(commands) => {
                    let names: Vec<_> = commands.iter().map(|c| c.name.as_str()).collect();
                    assert_eq!(names, vec!["command1", "unhappy", "nested", "count"]);
                }
                other => panic!("expected help, got {:?}", other),
            }
        }
    }

    #[test]
    fn success_carries_the_returned_text() {
        let outcome = route(
            &invocation("@AutorestCI command1 myparameter"),
            &registry(),
            &issue(),
        );
        assert_eq!(
            outcome,
            Outcome::Success("I did something with myparameter".to_owned())
        );
    }

    #[test]
    fn non_text_results_are_stringified() {
        let outcome = route(&invocation("@AutorestCI count"), &registry(), &issue());
        assert_eq!(outcome, Outcome::Success("18".to_owned()));
    }

    #[test]
    fn errors_become_failures() {
        match route(&invocation("@AutorestCI unhappy"), &registry(), &issue()) {
            Outcome::Failure(failure) => {
                assert_eq!(failure.message, "Not happy");
                assert_eq!(failure.command_line, "unhappy");
                assert_eq!(failure.trace, "Not happy");
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn failure_trace_keeps_the_cause_chain() {
        match route(&invocation("@AutorestCI nested"), &registry(), &issue()) {
            Outcome::Failure(failure) => {
                assert_eq!(failure.message, "couldn't write artifact");
                assert_eq!(
                    failure.trace,
                    "couldn't write artifact\n\nCaused by:\n    0: disk full"
                );
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn argument_count_mismatch_is_a_failure() {
        for text in ["@AutorestCI command1", "@AutorestCI command1 a b"] {
            let outcome = route(&invocation(text), &registry(), &issue());
            assert_eq!(outcome.kind(), "failure", "for {}", text);
        }
    }

    #[test]
    fn unknown_commands_are_echoed() {
        let outcome = route(
            &invocation("@AutorestCI Command1   myparameter"),
            &registry(),
            &issue(),
        );
        match outcome {
            Outcome::Unrecognized {
                command_line,
                commands,
            } => {
                assert_eq!(command_line, "Command1 myparameter");
                assert_eq!(commands.len(), 4);
            }
            other => panic!("expected unrecognized, got {:?}", other),
        }
    }

    #[test]
    fn routing_is_deterministic() {
        let registry = registry();
        for text in [
            "@AutorestCI",
            "@AutorestCI command1 x",
            "@AutorestCI unhappy",
            "@AutorestCI nope",
        ] {
            let first = route(&invocation(text), &registry, &issue());
            let second = route(&invocation(text), &registry, &issue());
            assert_eq!(first.kind(), second.kind(), "for {}", text);
            assert_eq!(first, second, "for {}", text);
        }
    }

    #[test]
    fn failure_trace_has_no_backtrace() {
        let error = anyhow!("disk full")
            .context("couldn't write artifact")
            .context("build failed");
        let failure = CommandFailure::new("build 1".to_owned(), &error);

        assert_eq!(failure.message, "build failed");
        assert_eq!(
            failure.trace,
            "build failed\n\n\
             Caused by:\n    \
             0: couldn't write artifact\n    \
             1: disk full"
        );
        assert!(!failure.trace.contains("backtrace"));
    }

    struct OwnHelp;

    impl CommandHandler for OwnHelp {
        fn register(commands: &mut CommandSet<Self>) {
            commands.command("help", &[], |_, _, _| Ok("custom help"));
        }
    }

    #[test]
    fn registered_help_command_wins() {
        let registry = CommandRegistry::from_handler(OwnHelp).unwrap();
        let outcome = route(&invocation("@AutorestCI help"), &registry, &issue());
        assert_eq!(outcome, Outcome::Success("custom help".to_owned()));

        let outcome = route(&invocation("@AutorestCI"), &registry, &issue());
        assert_eq!(outcome.kind(), "help");
    }
}
