//! Text preprocessing for spoken output.
//!
//! Chat replies arrive as markdown; formatting characters must not be
//! spoken. Segments are stripped down to plain text right before they are
//! handed to synthesis.

/// Strip markdown formatting from text, producing plain text suitable for
/// speech.
///
/// Handles fenced code blocks (replaced with a short spoken placeholder),
/// inline code, headings, emphasis, links, images, list markers,
/// blockquotes, horizontal rules, and stray HTML tags. Whitespace is
/// collapsed and the result trimmed; an all-formatting input yields an
/// empty string.
#[must_use]
pub fn strip_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_fence = false;
    let mut fence_announced = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") {
            in_fence = !in_fence;
            if !in_fence {
                fence_announced = false;
            }
            continue;
        }
        if in_fence {
            if !fence_announced {
                push_word(&mut out, "Code omitted.");
                fence_announced = true;
            }
            continue;
        }
        if is_rule(trimmed) {
            continue;
        }

        let spoken = strip_inline(strip_line_prefix(trimmed));
        if !spoken.trim().is_empty() {
            push_word(&mut out, spoken.trim());
        }
    }

    collapse_spaces(&out)
}

/// Append `word` to `out`, separating with a single space.
fn push_word(out: &mut String, word: &str) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(word);
}

/// Horizontal rule: three or more identical `-` / `*` / `_` characters.
fn is_rule(line: &str) -> bool {
    let mut chars = line.chars().filter(|c| !c.is_whitespace());
    let Some(first) = chars.next() else {
        return false;
    };
    if !matches!(first, '-' | '*' | '_') {
        return false;
    }
    let mut count = 1;
    for c in chars {
        if c != first {
            return false;
        }
        count += 1;
    }
    count >= 3
}

/// Strip leading blockquote, heading, and list markers from a line.
fn strip_line_prefix(line: &str) -> &str {
    let mut rest = line;

    while let Some(stripped) = rest.strip_prefix('>') {
        rest = stripped.trim_start();
    }
    if rest.starts_with('#') {
        rest = rest.trim_start_matches('#').trim_start();
    }
    for marker in ["- ", "* ", "+ "] {
        if let Some(stripped) = rest.strip_prefix(marker) {
            return stripped;
        }
    }
    // Numbered list: digits followed by `. ` or `) `
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let tail = &rest[digits..];
        if let Some(stripped) = tail.strip_prefix(". ").or_else(|| tail.strip_prefix(") ")) {
            return stripped;
        }
    }

    rest
}

/// Strip inline markdown: links, images, inline code, emphasis, HTML tags.
fn strip_inline(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut chars = line.chars().peekable();
    let mut in_tag = false;

    while let Some(c) = chars.next() {
        match c {
            _ if in_tag => {
                if c == '>' {
                    in_tag = false;
                }
            }
            '<' => in_tag = true,
            // Emphasis / strikethrough markers vanish
            '*' | '~' => {}
            '_' => {
                // Underscores double as identifiers (snake_case); only
                // strip when doubled, the unambiguous emphasis form.
                if chars.peek() == Some(&'_') {
                    chars.next();
                } else {
                    out.push('_');
                }
            }
            '`' => {
                // Inline code: unwrap contents up to the closing backtick
                for inner in chars.by_ref() {
                    if inner == '`' {
                        break;
                    }
                    out.push(inner);
                }
            }
            '!' if chars.peek() == Some(&'[') => {
                chars.next();
                let alt = take_until(&mut chars, ']');
                skip_paren_target(&mut chars);
                if !alt.is_empty() {
                    out.push_str("image: ");
                    out.push_str(&alt);
                }
            }
            '[' => {
                let label = take_until(&mut chars, ']');
                skip_paren_target(&mut chars);
                out.push_str(&label);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Consume characters up to (and including) `end`, returning the prefix.
fn take_until(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, end: char) -> String {
    let mut taken = String::new();
    for c in chars.by_ref() {
        if c == end {
            break;
        }
        taken.push(c);
    }
    taken
}

/// Consume a `(url)` target if one immediately follows.
fn skip_paren_target(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    if chars.peek() == Some(&'(') {
        chars.next();
        for c in chars.by_ref() {
            if c == ')' {
                break;
            }
        }
    }
}

/// Collapse runs of whitespace into single spaces and trim.
fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut prev_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !prev_space && !out.is_empty() {
                out.push(' ');
            }
            prev_space = true;
        } else {
            out.push(c);
            prev_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}
