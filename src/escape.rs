//! Escaping for text and paths embedded in an ffmpeg filter-graph directive.
//!
//! ffmpeg unescapes a filter argument twice: once while splitting the graph into filters
//! (`[ ] , ;` are separators) and once while splitting a filter's options (`:` separates them).
//! [`escape_filter_text`] and [`escape_filter_path`] produce option-level values;
//! [`quote_filter_arg`] wraps such a value for the graph level.

use std::path::{Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::Result;

/// Prepare arbitrary text as a filter option value (e.g. `drawtext` text).
///
/// The text is NFC-normalized, then escaped in order: `\` becomes `\\`, `'` becomes `\'`, and
/// `:` is replaced by ` - ` because ffmpeg splits filter options on it. Whitespace directly
/// around a colon is absorbed by the replacement, so `a: b` reads `a - b`.
pub fn escape_filter_text(text: &str) -> String {
    let normalized: String = text.nfc().collect();
    let escaped = normalized.replace('\\', "\\\\").replace('\'', "\\'");

    let mut out = String::with_capacity(escaped.len());
    let mut chars = escaped.chars().peekable();
    while let Some(c) = chars.next() {
        if c != ':' {
            out.push(c);
            continue;
        }

        let kept = out.trim_end().len();
        out.truncate(kept);
        out.push_str(" - ");
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    out
}

/// Render `path` as a filter option value such as the `subtitles` file name.
///
/// The path is made absolute (relative to the current directory) and uses forward slashes.
/// Quotes and colons, including a drive-letter colon, are backslash-escaped for the option
/// parser.
pub fn escape_filter_path(path: &Path) -> Result<String> {
    let absolute = absolute_path(path)?;
    let forward = absolute.to_string_lossy().replace('\\', "/");
    Ok(forward.replace('\'', "\\'").replace(':', "\\:"))
}

/// Single-quote an option value for the graph level.
///
/// Inside quotes the graph parser keeps everything literally, backslashes included, so an
/// embedded `'` closes the quote, is emitted as `\'` and the quote is reopened.
pub fn quote_filter_arg(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Graph-level and option-level token splitting as ffmpeg does it: a backslash escapes the
/// next character, quoted runs are copied verbatim, and `terms` end the token.
#[cfg(test)]
pub(crate) fn split_filter_token(input: &str, terms: &str) -> (String, String) {
    let mut out = String::new();
    let mut chars = input.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.extend(chars.next()),
            '\'' => out.extend(chars.by_ref().take_while(|&q| q != '\'')),
            c if terms.contains(c) => return (out, c.to_string() + chars.as_str()),
            c => out.push(c),
        }
    }
    (out, String::new())
}

fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_replaces_colons() {
        assert_eq!(
            escape_filter_text(r#"It's a test: "quoted""#),
            r#"It\'s a test - "quoted""#
        );
    }

    #[test]
    fn backslashes_are_escaped_before_quotes() {
        assert_eq!(escape_filter_text(r"a\'b"), r"a\\\'b");
        assert_eq!(escape_filter_text(r"C:\temp"), r"C - \\temp");
    }

    #[test]
    fn bare_colons_are_spaced() {
        assert_eq!(escape_filter_text("10:30"), "10 - 30");
        assert_eq!(escape_filter_text("::"), " - - ");
    }

    #[test]
    fn output_never_contains_a_colon() {
        let out = escape_filter_text("Breaking: AI: what's next?: \u{ff1a}");
        assert!(!out.contains(':'));
    }

    #[test]
    fn text_is_nfc_normalized() {
        // "e" followed by a combining acute accent composes to "é".
        assert_eq!(escape_filter_text("Caf\u{0065}\u{0301}"), "Caf\u{00e9}");
    }

    #[test]
    fn absolute_paths_keep_their_shape() -> anyhow::Result<()> {
        assert_eq!(
            escape_filter_path(Path::new("/tmp/reel/subtitles.srt"))?,
            "/tmp/reel/subtitles.srt"
        );
        Ok(())
    }

    #[test]
    fn relative_paths_become_absolute() -> anyhow::Result<()> {
        let out = escape_filter_path(Path::new("work/subtitles.srt"))?;
        assert!(out.starts_with('/'));
        assert!(out.ends_with("work/subtitles.srt"));
        Ok(())
    }

    #[test]
    fn quotes_and_colons_in_paths_are_escaped() -> anyhow::Result<()> {
        assert_eq!(
            escape_filter_path(Path::new("/tmp/it's:here.srt"))?,
            r"/tmp/it\'s\:here.srt"
        );
        Ok(())
    }

    #[test]
    fn quoting_reopens_around_apostrophes() {
        assert_eq!(quote_filter_arg("plain"), "'plain'");
        assert_eq!(quote_filter_arg(r"It\'s"), r"'It\'\''s'");
    }

    #[test]
    fn apostrophes_survive_both_parse_levels() {
        for text in ["Apple's new chip, finally", r"back\slash", "O'Neil's 'quote'"] {
            let quoted = quote_filter_arg(&escape_filter_text(text));
            let (graph_level, rest) = split_filter_token(&quoted, "[],;");
            assert!(rest.is_empty(), "{quoted} split early at {rest}");
            let (value, rest) = split_filter_token(&graph_level, ":");
            assert!(rest.is_empty());
            assert_eq!(value, text);
        }
    }

    #[test]
    fn quoted_paths_survive_both_parse_levels() -> anyhow::Result<()> {
        let quoted = quote_filter_arg(&escape_filter_path(Path::new("/tmp/O'Brien/a:b.srt"))?);
        let (graph_level, _) = split_filter_token(&quoted, "[],;");
        let (value, rest) = split_filter_token(&graph_level, ":");
        assert!(rest.is_empty());
        assert_eq!(value, "/tmp/O'Brien/a:b.srt");
        Ok(())
    }
}
