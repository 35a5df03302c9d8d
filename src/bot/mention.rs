use anyhow::Context;
use regex::Regex;

/// A command line addressed to the bot, e.g. `@AutorestCI build 1234`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInvocation {
    /// Empty when the mention isn't followed by anything, which asks for help.
    pub command_name: String,
    pub arguments: Vec<String>,
}

impl ParsedInvocation {
    pub fn is_help_request(&self) -> bool {
        self.command_name.is_empty()
    }

    /// The command as the user typed it, minus the mention, whitespace normalized.
    pub fn command_line(&self) -> String {
        std::iter::once(self.command_name.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Finds lines of text that start with the bot's mention token.
#[derive(Debug, Clone)]
pub struct Mention {
    token: String,
    line: Regex,
}

impl Mention {
    /// `bot_name` may be given with or without its leading `@`.
    pub fn new(bot_name: &str) -> anyhow::Result<Self> {
        let name = bot_name.trim().trim_start_matches('@');
        anyhow::ensure!(!name.is_empty(), "bot name can't be empty");

        let token = format!("@{}", name);
        let line = Regex::new(&format!(r"(?i)^\s*{}(?:\s+(.*))?$", regex::escape(&token)))
            .with_context(|| format!("couldn't build mention matcher for {}", token))?;

        Ok(Self { token, line })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Returns the invocation on the first line addressed to the bot, or `None` when no line is.
    pub fn parse(&self, text: &str) -> Option<ParsedInvocation> {
        let captures = text.lines().find_map(|line| self.line.captures(line))?;

        let mut words = captures
            .get(1)
            .map_or("", |rest| rest.as_str())
            .split_whitespace()
            .map(str::to_owned);

        Some(ParsedInvocation {
            command_name: words.next().unwrap_or_default(),
            arguments: words.collect(),
        })
    }
}
