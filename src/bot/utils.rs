pub(crate) fn shorten_content(content: &str) -> String {
    shorten_to(content, 72)
}

/// Keeps the first `max_length` chars of `content`.
pub(crate) fn shorten_to(content: &str, max_length: usize) -> String {
    if content.chars().count() <= max_length {
        content.to_owned()
    } else {
        content.chars().take(max_length).collect::<String>() + "…"
    }
}

/// Keeps the last `max_length` chars of `content`, where build tools print what went wrong.
pub(crate) fn keep_tail(content: &str, max_length: usize) -> String {
    let length = content.chars().count();
    if length <= max_length {
        content.to_owned()
    } else {
        "…".to_owned() + &content.chars().skip(length - max_length).collect::<String>()
    }
}
