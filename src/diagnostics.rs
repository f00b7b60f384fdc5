use crate::error::Error;

/// ANSI bold.
const BOLD: &str = "\x1b[1m";
/// ANSI reset.
const RESET: &str = "\x1b[0m";

/// Render an error as markdown with bold headings and print to stderr.
pub fn print_error(e: &Error) {
    let md = render_error(e);
    for line in md.lines() {
        if line.starts_with('#') {
            eprintln!("{BOLD}{line}{RESET}");
        } else {
            eprintln!("{line}");
        }
    }
}

/// Render an error as a structured markdown diagnostic: what happened and,
/// where there is one, how to fix it.
pub fn render_error(e: &Error) -> String {
    return match e {
        Error::InvalidReference { code, reason } => render_invalid_reference(code, reason),
        Error::UnknownDocumentKind { tag } => render_unknown_kind(tag),
        Error::NoMatch { code } => render_no_match(code),
        _ => render_generic(e),
    };
}

/// Errors that need no more than a heading and the message.
fn render_generic(e: &Error) -> String {
    return match e {
        Error::FileNotFound { path } => format!(
            "\
# Error: File Not Found

`{}` does not exist.
",
            path.display()
        ),

        Error::InvalidConfig { reason } => format!(
            "\
# Error: Invalid Config

{reason}

## Fix

Correct the value in `.filinglens.toml`, or delete the line to use the default.
"
        ),

        Error::MarkupParse { reason } => format!(
            "\
# Error: Unreadable Markup

{reason}

The document is shown as raw text without highlights.
"
        ),

        Error::Io(e) => format!(
            "\
# Error: I/O

{e}
"
        ),
        Error::Json(e) => format!(
            "\
# Error: JSON

{e}
"
        ),
        Error::TomlDe(e) => format!(
            "\
# Error: Invalid TOML

{e}
"
        ),
        _ => format!(
            "\
# Error

{e}
"
        ),
    };
}

/// Malformed reference code, with the accepted formats.
fn render_invalid_reference(code: &str, reason: &str) -> String {
    return format!(
        "\
# Error: Invalid Reference

`{code}` is not a usable reference code: {reason}.

## Fix

Reference codes are `#` followed by 8 hex characters, e.g. `#54b9a1c0`.
Page-oriented kinds also accept a trailing 4-digit page index, e.g. `#0003`.
"
    );
}

/// Unrecognized kind tag, with the known tags.
fn render_unknown_kind(tag: &str) -> String {
    return format!(
        "\
# Error: Unknown Document Kind

`{tag}` does not name a known document kind.

## Fix

Use a form type such as `10-K`, `10-Q`, `8-K`, `6-K`, `EX-99.1`, `DEF 14A`,
`DEFA14A`, `PRE 14A`, `transcript`, `intl`, `pdf`, or `xlsx`.
"
    );
}

/// Reference absent from the document.
fn render_no_match(code: &str) -> String {
    return format!(
        "\
# Error: No Match

Nothing in the document carries reference `#{code}`.

The document is shown without highlights.
"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_reference_has_fix_section() {
        let md = render_error(&Error::InvalidReference {
            code: "#54b9".to_string(),
            reason: "expected 8 characters after the sigil, got 4".to_string(),
        });
        assert!(md.starts_with("# Error: Invalid Reference"));
        assert!(md.contains("## Fix"));
        assert!(md.contains("`#54b9`"));
    }

    #[test]
    fn unknown_kind_names_the_tag() {
        let md = render_error(&Error::UnknownDocumentKind { tag: "S-1".to_string() });
        assert!(md.contains("`S-1`"));
    }

    #[test]
    fn generic_errors_still_render_a_heading() {
        let md = render_error(&Error::FileNotFound {
            path: "missing.html".into(),
        });
        assert!(md.starts_with("# Error: File Not Found"));
    }
}
