use std::fmt::Write;

/// Builds GitHub-flavored markdown comments.
#[derive(Default)]
pub struct MessageBuilder {
    pub(crate) text: String,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn build(self) -> String {
        self.text
    }

    /// Ends the current line.
    pub fn line(&mut self) {
        self.text.push('\n');
    }

    /// Leaves exactly one blank line after what was written so far.
    pub fn paragraph(&mut self) {
        while !self.text.is_empty() && !self.text.ends_with("\n\n") {
            self.line();
        }
    }

    pub fn list_item(&mut self) {
        self.text.push_str("- ");
    }

    /// Inline code span, delimited so that backticks in `code` can't close it early.
    pub fn code(&mut self, code: &str) {
        let ticks = "`".repeat(longest_backtick_run(code) + 1);
        // a span starting or ending with a backtick needs padding
        let pad = if code.starts_with('`') || code.ends_with('`') {
            " "
        } else {
            ""
        };
        write!(self.text, "{ticks}{pad}{code}{pad}{ticks}").unwrap();
    }

    /// Fenced code block, on its own lines. The fence grows past any run of backticks in `content`.
    pub fn fenced(&mut self, language: &str, content: &str) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.line();
        }

        let fence = "`".repeat(longest_backtick_run(content).max(2) + 1);
        writeln!(self.text, "{fence}{language}").unwrap();
        self.text.push_str(content.trim_end_matches('\n'));
        self.line();
        writeln!(self.text, "{fence}").unwrap();
    }
}

fn longest_backtick_run(s: &str) -> usize {
    s.split(|c| c != '`').map(str::len).max().unwrap_or(0)
}

impl std::fmt::Write for MessageBuilder {
    fn write_str(&mut self, s: &str) -> std::fmt::Result {
        self.text.push_str(s);
        Ok(())
    }
}

impl std::convert::From<MessageBuilder> for String {
    fn from(msg: MessageBuilder) -> Self {
        msg.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_span_outgrows_backticks() {
        let mut msgbld = MessageBuilder::new();

        msgbld.code("build");
        write!(&mut msgbld, " and ").unwrap();
        msgbld.code("a `quoted` arg");
        write!(&mut msgbld, " and ").unwrap();
        msgbld.code("`edge`");

        assert_eq!(
            msgbld.build(),
            "`build` and ``a `quoted` arg`` and `` `edge` ``"
        );
    }

    #[test]
    fn fenced_block_starts_on_its_own_line() {
        let mut msgbld = MessageBuilder::new();

        write!(&mut msgbld, "It failed:").unwrap();
        msgbld.fenced("text", "Not happy\n");

        assert_eq!(msgbld.build(), "It failed:\n```text\nNot happy\n```\n");
    }

    #[test]
    fn paragraphs_are_separated_once() {
        let mut msgbld = MessageBuilder::new();

        msgbld.paragraph();
        write!(&mut msgbld, "# Title").unwrap();
        msgbld.paragraph();
        msgbld.list_item();
        write!(&mut msgbld, "item").unwrap();
        msgbld.line();
        msgbld.paragraph();
        write!(&mut msgbld, "done").unwrap();

        assert_eq!(msgbld.build(), "# Title\n\n- item\n\ndone");
    }

    #[test]
    fn fence_outgrows_content() {
        let mut msgbld = MessageBuilder::new();

        msgbld.fenced("", "```rust\nfn main() {}\n```");

        let message: String = msgbld.into();
        assert!(message.starts_with("````\n"));
        assert!(message.ends_with("\n````\n"));
    }
}
