//! Best-effort cleanup of HTML email bodies.
//!
//! [`sanitize`] strips quoted replies, signatures and forwarded-header
//! blocks; [`to_plain_text`] renders a plain-text view. Both are pure,
//! deterministic and total: in the worst case the input comes back
//! unchanged. This is pattern matching over strings, not an HTML parser.
//! The plain text is only a preview/search artifact; the original HTML
//! stays verbatim on the message.

/// Markers that, appearing after an `<hr>`, identify the rest of the body
/// as a quoted or forwarded section.
const QUOTE_MARKERS: &[&str] = &[
    "wrote:",
    "from:",
    "original message",
    "forwarded message",
];

/// Header labels that make up a forwarded-header block.
const FORWARD_HEADERS: &[&str] = &["from:", "sent:", "date:", "to:", "cc:", "subject:"];

/// Strip quoted replies, signatures and forward preambles from an HTML body.
#[must_use]
pub fn sanitize(html: &str) -> String {
    let mut out = strip_tag_blocks(html, "blockquote", |_| true);
    out = strip_tag_blocks(&out, "div", |open_tag| {
        let tag = open_tag.to_ascii_lowercase();
        tag.contains("gmail_signature") || tag.contains("gmail_quote") || tag.contains("signature")
    });
    out = strip_reply_preambles(&out);
    out = strip_forward_block(&out);
    out = strip_hr_trailer(&out);
    out = strip_plain_signature(&out);
    collapse_empty_blocks(&out)
}

/// Render an HTML body as plain text.
#[must_use]
pub fn to_plain_text(html: &str) -> String {
    let mut text = strip_container(html, "script");
    text = strip_container(&text, "style");
    text = break_blocks(&text);
    text = strip_tags(&text);
    text = decode_entities(&text);
    collapse_blank_lines(&text)
}

/// Case-insensitive substring search. ASCII needles only; a match position
/// is always a char boundary because ASCII bytes never occur inside a
/// multi-byte UTF-8 sequence.
fn find_ci(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    if from > haystack.len() || needle.is_empty() {
        return None;
    }
    haystack.as_bytes()[from..]
        .windows(needle.len())
        .position(|window| window.eq_ignore_ascii_case(needle.as_bytes()))
        .map(|pos| from + pos)
}

/// Remove whole `<tag>...</tag>` blocks (nesting-aware) where the opening
/// tag satisfies `matches`.
fn strip_tag_blocks(html: &str, tag: &str, matches: impl Fn(&str) -> bool) -> String {
    let open_prefix = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(start) = find_ci(html, &open_prefix, cursor) {
        let Some(open_end) = html[start..].find('>') else {
            break;
        };
        let open_tag = &html[start..=start + open_end];

        if !matches(open_tag) {
            out.push_str(&html[cursor..=start + open_end]);
            cursor = start + open_end + 1;
            continue;
        }

        // Walk forward counting nested opens of the same tag.
        let mut depth = 1;
        let mut scan = start + open_end + 1;
        let end = loop {
            let next_open = find_ci(html, &open_prefix, scan);
            let next_close = find_ci(html, &close, scan);
            match (next_open, next_close) {
                (Some(o), Some(c)) if o < c => {
                    depth += 1;
                    scan = o + open_prefix.len();
                }
                (_, Some(c)) => {
                    depth -= 1;
                    let after = html[c..].find('>').map_or(html.len(), |p| c + p + 1);
                    if depth == 0 {
                        break after;
                    }
                    scan = after;
                }
                // Unbalanced markup: drop to the end of the input.
                _ => break html.len(),
            }
        };

        out.push_str(&html[cursor..start]);
        cursor = end;
    }

    out.push_str(&html[cursor..]);
    out
}

/// Remove a `<tag>...</tag>` container together with its contents, without
/// nesting awareness (script/style do not nest).
fn strip_container(html: &str, tag: &str) -> String {
    let open_prefix = format!("<{tag}");
    let close = format!("</{tag}");

    let mut out = String::with_capacity(html.len());
    let mut cursor = 0;

    while let Some(start) = find_ci(html, &open_prefix, cursor) {
        out.push_str(&html[cursor..start]);
        match find_ci(html, &close, start) {
            Some(c) => {
                cursor = html[c..].find('>').map_or(html.len(), |p| c + p + 1);
            }
            None => {
                cursor = html.len();
            }
        }
    }

    out.push_str(&html[cursor..]);
    out
}

/// Remove "On <date> ... wrote:" reply preambles.
///
/// Searches for a "wrote:" and walks back a bounded distance to the nearest
/// "On " opener; everything between is dropped.
fn strip_reply_preambles(html: &str) -> String {
    const LOOKBACK: usize = 200;

    let mut out = html.to_string();
    loop {
        let Some(wrote) = find_ci(&out, " wrote:", 0) else {
            return out;
        };
        let window_start = wrote.saturating_sub(LOOKBACK);
        let mut on_pos = None;
        let mut probe = window_start;
        while let Some(pos) = find_ci(&out, "on ", probe) {
            if pos >= wrote {
                break;
            }
            on_pos = Some(pos);
            probe = pos + 3;
        }
        let Some(start) = on_pos else {
            // A bare "wrote:" with no opener; leave it and stop rather than
            // loop on the same match.
            return out;
        };
        out.replace_range(start..wrote + " wrote:".len(), "");
    }
}

/// Remove a forwarded-message marker and the header lines that follow it.
fn strip_forward_block(html: &str) -> String {
    let marker = ["forwarded message", "begin forwarded message"]
        .iter()
        .filter_map(|m| find_ci(html, m, 0))
        .min();
    let Some(marker_pos) = marker else {
        return html.to_string();
    };

    // Back up over the dashed decoration around the marker line.
    let mut start = marker_pos;
    while start > 0 && matches!(html.as_bytes()[start - 1], b'-' | b' ') {
        start -= 1;
    }

    // Consume the marker line plus every consecutive header line after it.
    let mut end = line_end(html, marker_pos);
    loop {
        let line_start = end;
        let line_stop = line_end(html, line_start);
        if line_stop <= line_start {
            break;
        }
        let text = strip_tags(&html[line_start..line_stop]);
        let text = decode_entities(&text);
        let trimmed = text.trim().to_ascii_lowercase();
        let is_header = FORWARD_HEADERS.iter().any(|h| trimmed.starts_with(h));
        if trimmed.is_empty() || is_header {
            end = line_stop;
            if end >= html.len() {
                break;
            }
        } else {
            break;
        }
    }

    let mut out = String::with_capacity(html.len());
    out.push_str(&html[..start]);
    out.push_str(&html[end..]);
    out
}

/// Position just past the current line, where lines break on `\n` or `<br>`.
fn line_end(html: &str, from: usize) -> usize {
    let newline = html[from..].find('\n').map(|p| from + p + 1);
    let br = find_ci(html, "<br", from)
        .map(|p| html[p..].find('>').map_or(html.len(), |q| p + q + 1));
    match (newline, br) {
        (Some(n), Some(b)) => n.min(b),
        (Some(n), None) => n,
        (None, Some(b)) => b,
        (None, None) => html.len(),
    }
}

/// Truncate at an `<hr>` whose remainder is a quoted or forwarded section.
fn strip_hr_trailer(html: &str) -> String {
    let mut probe = 0;
    while let Some(pos) = find_ci(html, "<hr", probe) {
        let tail = &html[pos..];
        if QUOTE_MARKERS.iter().any(|m| find_ci(tail, m, 0).is_some()) {
            return html[..pos].to_string();
        }
        probe = pos + 3;
    }
    html.to_string()
}

/// Truncate at the conventional "-- " signature delimiter on its own line.
fn strip_plain_signature(html: &str) -> String {
    find_ci(html, "\n-- \n", 0).map_or_else(|| html.to_string(), |pos| html[..pos].to_string())
}

/// Collapse empty block elements and runs of `<br>` left behind by the
/// removal passes.
fn collapse_empty_blocks(html: &str) -> String {
    let mut out = html.to_string();
    for (open, close) in [("<div>", "</div>"), ("<p>", "</p>")] {
        loop {
            let Some(start) = find_empty_pair(&out, open, close) else {
                break;
            };
            out.replace_range(start.0..start.1, "");
        }
    }

    // Three or more consecutive <br> become two.
    let mut probe = 0;
    while let Some((start, end, count)) = br_run(&out, probe) {
        if count > 2 {
            out.replace_range(start..end, "<br><br>");
            probe = start + "<br><br>".len();
        } else {
            probe = end;
        }
    }
    out
}

/// Find an `open`...`close` pair containing only whitespace or `&nbsp;`.
fn find_empty_pair(html: &str, open: &str, close: &str) -> Option<(usize, usize)> {
    let mut probe = 0;
    while let Some(start) = find_ci(html, open, probe) {
        let content_start = start + open.len();
        if let Some(end) = find_ci(html, close, content_start) {
            let inner = html[content_start..end].replace("&nbsp;", " ");
            if inner.trim().is_empty() {
                return Some((start, end + close.len()));
            }
        }
        probe = start + open.len();
    }
    None
}

/// Find the next run of consecutive `<br>` tags and its length.
fn br_run(html: &str, from: usize) -> Option<(usize, usize, usize)> {
    let start = find_ci(html, "<br", from)?;
    let mut end = start;
    let mut count = 0;
    loop {
        match find_ci(html, "<br", end) {
            Some(pos) if html[end..pos].trim().is_empty() => {
                end = html[pos..].find('>').map_or(html.len(), |p| pos + p + 1);
                count += 1;
            }
            _ => break,
        }
    }
    Some((start, end, count))
}

/// Replace `<br>` and closing block tags with newlines.
fn break_blocks(html: &str) -> String {
    let mut out = html.to_string();
    let breaks = [
        "<br>", "<br/>", "<br />", "</p>", "</div>", "</li>", "</tr>", "</h1>", "</h2>", "</h3>",
        "</h4>", "</h5>", "</h6>", "</blockquote>", "</table>",
    ];
    for tag in breaks {
        let mut result = String::with_capacity(out.len());
        let mut cursor = 0;
        while let Some(pos) = find_ci(&out, tag, cursor) {
            result.push_str(&out[cursor..pos]);
            result.push('\n');
            cursor = pos + tag.len();
        }
        result.push_str(&out[cursor..]);
        out = result;
    }
    out
}

/// Drop remaining tags. An unterminated `<` is kept literally so the
/// function stays total on malformed input.
fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        match rest[start..].find('>') {
            Some(end) => rest = &rest[start + end + 1..],
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the common HTML entities. `&amp;` goes last so freshly decoded
/// ampersands are not re-expanded.
fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// Trim trailing spaces per line and collapse runs of blank lines.
fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;
    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}
