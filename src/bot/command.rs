use std::{collections::HashSet, fmt::Display, sync::Arc};

use anyhow::bail;

use crate::github::IssueRef;

type HandlerFn<H> =
    Box<dyn Fn(&H, &IssueRef, &[String]) -> anyhow::Result<String> + Send + Sync + 'static>;
type BoundFn = Box<dyn Fn(&IssueRef, &[String]) -> anyhow::Result<String> + Send + Sync + 'static>;

/// An object exposing commands to the bot.
///
/// Only what `register` declares can be invoked or shows up in the help message, in declaration
/// order.
pub trait CommandHandler: Send + Sync + Sized + 'static {
    fn register(commands: &mut CommandSet<Self>);
}

struct Declared<H> {
    name: String,
    parameter_names: Vec<String>,
    doc: Option<String>,
    run: HandlerFn<H>,
}

/// Commands declared by a [`CommandHandler`], before they're bound to the handler.
pub struct CommandSet<H> {
    declared: Vec<Declared<H>>,
}

impl<H: 'static> CommandSet<H> {
    fn new() -> Self {
        Self {
            declared: Vec::new(),
        }
    }

    /// Declares a command. `run` receives the issue the command was typed on, then the user's
    /// arguments, whose count always matches `parameter_names`.
    pub fn command<F, R>(&mut self, name: &str, parameter_names: &[&str], run: F) -> &mut Self
    where
        F: Fn(&H, &IssueRef, &[String]) -> anyhow::Result<R> + Send + Sync + 'static,
        R: Display,
    {
        self.declared.push(Declared {
            name: name.to_owned(),
            parameter_names: parameter_names.iter().map(|&p| p.to_owned()).collect(),
            doc: None,
            run: Box::new(move |handler: &H, issue: &IssueRef, args: &[String]| {
                run(handler, issue, args).map(|output| output.to_string())
            }),
        });
        self
    }

    /// Documents the last declared command. Must follow a call to [`CommandSet::command`].
    pub fn doc(&mut self, doc: &str) -> &mut Self {
        debug_assert!(
            !self.declared.is_empty(),
            "`{}` documents no command, declare one first",
            doc
        );
        if let Some(last) = self.declared.last_mut() {
            last.doc = Some(doc.to_owned());
        }
        self
    }
}

/// A registered command, bound to its handler.
pub struct Command {
    pub name: String,
    pub order_index: usize,
    pub parameter_names: Vec<String>,
    pub doc: Option<String>,
    run: BoundFn,
}

impl Command {
    /// Runs the command, refusing argument lists that don't match the declared parameters.
    pub fn invoke(&self, issue: &IssueRef, arguments: &[String]) -> anyhow::Result<String> {
        if arguments.len() != self.parameter_names.len() {
            bail!(
                "{} takes {} argument(s) ({}), but {} were given",
                self.name,
                self.parameter_names.len(),
                self.parameter_names.join(", "),
                arguments.len()
            );
        }

        (self.run)(issue, arguments)
    }

    pub fn summary(&self) -> CommandSummary {
        CommandSummary {
            name: self.name.clone(),
            parameter_names: self.parameter_names.clone(),
            doc: self.doc.clone(),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("order_index", &self.order_index)
            .field("parameter_names", &self.parameter_names)
            .finish_non_exhaustive()
    }
}

/// How a command is presented in the help message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSummary {
    pub name: String,
    pub parameter_names: Vec<String>,
    pub doc: Option<String>,
}

/// The commands of one handler, in the order it declared them.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Command>,
}

impl CommandRegistry {
    pub fn from_handler<H: CommandHandler>(handler: H) -> anyhow::Result<Self> {
        let mut set = CommandSet::new();
        H::register(&mut set);

        let handler = Arc::new(handler);
        let mut seen = HashSet::new();
        let mut commands = Vec::with_capacity(set.declared.len());

        for (order_index, declared) in set.declared.into_iter().enumerate() {
            if !seen.insert(declared.name.clone()) {
                bail!("command `{}` is registered twice", declared.name);
            }
            if declared.name.is_empty() || declared.name.contains(char::is_whitespace) {
                bail!("`{}` isn't a valid command name", declared.name);
            }

            let handler = Arc::clone(&handler);
            let run = declared.run;
            commands.push(Command {
                name: declared.name,
                order_index,
                parameter_names: declared.parameter_names,
                doc: declared.doc,
                run: Box::new(move |issue: &IssueRef, args: &[String]| {
                    run(&handler, issue, args)
                }),
            });
        }

        Ok(Self { commands })
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Command> {
        self.commands.iter().find(|command| command.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter()
    }

    pub fn summaries(&self) -> Vec<CommandSummary> {
        self.iter().map(Command::summary).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue() -> IssueRef {
        IssueRef {
            repository: "lmazuel/TestingRepo".to_owned(),
            number: 17,
            html_url: None,
        }
    }

    struct Numbers {
        base: u64,
    }

    impl Numbers {
        fn not_a_command(&self) -> u64 {
            self.base
        }
    }

    impl CommandHandler for Numbers {
        fn register(commands: &mut CommandSet<Self>) {
            commands
                .command("zadd", &["value"], |numbers, _issue, args| {
                    Ok(numbers.base + args[0].parse::<u64>()?)
                })
                .doc("Adds a value to the base")
                .command("base", &[], |numbers, _issue, _args| {
                    Ok(numbers.not_a_command())
                })
                .command("where", &[], |_numbers, issue, _args| Ok(issue.to_string()));
        }
    }

    #[test]
    fn keeps_declaration_order() {
        let registry = CommandRegistry::from_handler(Numbers { base: 40 }).unwrap();
        let names: Vec<_> = registry.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["zadd", "base", "where"]);

        let indices: Vec<_> = registry.iter().map(|c| c.order_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(registry.get("not_a_command").is_none());
    }

    #[test]
    fn records_parameters_and_docs() {
        let registry = CommandRegistry::from_handler(Numbers { base: 40 }).unwrap();
        let summaries = registry.summaries();
        assert_eq!(
            summaries[0],
            CommandSummary {
                name: "zadd".to_owned(),
                parameter_names: vec!["value".to_owned()],
                doc: Some("Adds a value to the base".to_owned()),
            }
        );
        assert!(summaries[1].parameter_names.is_empty());
        assert_eq!(summaries[1].doc, None);
    }

    #[test]
    fn invokes_with_issue_and_stringifies_output() {
        let registry = CommandRegistry::from_handler(Numbers { base: 40 }).unwrap();

        let sum = registry.get("zadd").unwrap().invoke(&issue(), &["2".to_owned()]);
        assert_eq!(sum.unwrap(), "42");

        let location = registry.get("where").unwrap().invoke(&issue(), &[]);
        assert_eq!(location.unwrap(), "lmazuel/TestingRepo#17");
    }

    #[test]
    fn rejects_wrong_argument_count() {
        let registry = CommandRegistry::from_handler(Numbers { base: 40 }).unwrap();
        let zadd = registry.get("zadd").unwrap();

        let err = zadd.invoke(&issue(), &[]).unwrap_err();
        assert!(err.to_string().contains("takes 1 argument(s) (value)"));

        let err = zadd
            .invoke(&issue(), &["1".to_owned(), "2".to_owned()])
            .unwrap_err();
        assert!(err.to_string().contains("2 were given"));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = CommandRegistry::from_handler(Numbers { base: 40 }).unwrap();
        assert!(registry.get("ZADD").is_none());
        assert!(registry.get("zad").is_none());
    }

    struct Twice;

    impl CommandHandler for Twice {
        fn register(commands: &mut CommandSet<Self>) {
            commands
                .command("same", &[], |_, _, _| Ok("one"))
                .command("same", &[], |_, _, _| Ok("two"));
        }
    }

    #[test]
    fn duplicate_names_are_refused() {
        let err = CommandRegistry::from_handler(Twice).unwrap_err();
        assert!(err.to_string().contains("registered twice"));
    }

    struct DocFirst;

    impl CommandHandler for DocFirst {
        fn register(commands: &mut CommandSet<Self>) {
            commands
                .doc("orphan documentation")
                .command("late", &[], |_, _, _| Ok("late"));
        }
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "documents no command")]
    fn doc_needs_a_command() {
        let _ = CommandRegistry::from_handler(DocFirst);
    }
}
