//! Action parsing.
//!
//! Supported actions:
//! - `{{ .Content }}` (raw HTML)
//! - `{{ .Site.key }}`, `{{ .Page.key }}` (escaped)
//! - `{{ partial "name" }}`, `{{ template "name" . }}`
//! - `{{/* comment */}}`
//!
//! `{{-` and `-}}` trim surrounding whitespace.

use super::TemplateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Root {
    Site,
    Page,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Segment {
    Text(String),
    Content,
    Field { root: Root, path: Vec<String> },
    Include(String),
}

pub(super) fn parse(name: &str, source: &str) -> Result<Vec<Segment>, TemplateError> {
    let mut segments = Vec::new();
    let mut rest = source;
    let mut trim_next = false;

    while let Some(start) = rest.find("{{") {
        let mut text = &rest[..start];
        if trim_next {
            text = text.trim_start();
        }

        let after = &rest[start + 2..];
        let end = after.find("}}").ok_or_else(|| syntax(name, "unclosed action"))?;
        let mut inner = &after[..end];
        rest = &after[end + 2..];

        if let Some(stripped) = inner.strip_prefix('-') {
            text = text.trim_end();
            inner = stripped;
        }
        trim_next = false;
        if let Some(stripped) = inner.strip_suffix('-') {
            trim_next = true;
            inner = stripped;
        }

        if !text.is_empty() {
            segments.push(Segment::Text(text.to_owned()));
        }
        if let Some(segment) = parse_action(name, inner)? {
            segments.push(segment);
        }
    }

    let tail = if trim_next { rest.trim_start() } else { rest };
    if !tail.is_empty() {
        segments.push(Segment::Text(tail.to_owned()));
    }
    Ok(segments)
}

fn parse_action(name: &str, inner: &str) -> Result<Option<Segment>, TemplateError> {
    // Markdown conversion escapes quotes inside content bodies
    let inner = inner.replace("&quot;", "\"");
    let action = inner.trim();

    if action.starts_with("/*") && action.ends_with("*/") {
        return Ok(None);
    }

    if let Some(field) = action.strip_prefix('.') {
        return parse_field(name, field).map(Some);
    }

    let mut words = action.splitn(2, char::is_whitespace);
    let keyword = words.next().unwrap_or_default();
    let args = words.next().unwrap_or_default().trim();

    match keyword {
        "partial" => Ok(Some(Segment::Include(quoted(name, args)?))),
        "template" => {
            let args = args.strip_suffix('.').map_or(args, str::trim_end);
            Ok(Some(Segment::Include(quoted(name, args)?)))
        }
        _ => Err(syntax(name, format!("unsupported action `{{{{ {action} }}}}`"))),
    }
}

fn parse_field(name: &str, field: &str) -> Result<Segment, TemplateError> {
    let mut parts = field.split('.');
    let head = parts.next().unwrap_or_default();
    let path: Vec<String> = parts.map(str::to_owned).collect();

    if path.iter().any(String::is_empty) {
        return Err(syntax(name, format!("malformed field `.{field}`")));
    }

    match head {
        "Content" if path.is_empty() => Ok(Segment::Content),
        "Site" => Ok(Segment::Field {
            root: Root::Site,
            path,
        }),
        "Page" => Ok(Segment::Field {
            root: Root::Page,
            path,
        }),
        _ => Err(syntax(name, format!("unknown field `.{field}`"))),
    }
}

fn quoted(name: &str, args: &str) -> Result<String, TemplateError> {
    args.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .filter(|s| !s.is_empty() && !s.contains('"'))
        .map(str::to_owned)
        .ok_or_else(|| syntax(name, format!("expected a quoted name, found `{args}`")))
}

fn syntax(name: &str, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        template: name.to_owned(),
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Segment {
        Segment::Text(s.to_owned())
    }

    #[test]
    fn test_parse_mixed() {
        let segments = parse("t", "<h1>{{ .Page.title }}</h1>{{ .Content }}").unwrap();
        assert_eq!(
            segments,
            vec![
                text("<h1>"),
                Segment::Field {
                    root: Root::Page,
                    path: vec!["title".into()]
                },
                text("</h1>"),
                Segment::Content,
            ]
        );
    }

    #[test]
    fn test_parse_includes() {
        let segments = parse("t", r#"{{ partial "nav.html" }}{{ template "foot" . }}"#).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Include("nav.html".into()),
                Segment::Include("foot".into())
            ]
        );
    }

    #[test]
    fn test_parse_escaped_quotes() {
        let segments = parse("t", "{{ partial &quot;nav.html&quot; }}").unwrap();
        assert_eq!(segments, vec![Segment::Include("nav.html".into())]);
    }

    #[test]
    fn test_parse_comment_and_trim() {
        let segments = parse("t", "a  {{- /* note */ -}}\n  b").unwrap();
        assert_eq!(segments, vec![text("a"), text("b")]);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse("t", "{{ .Content").is_err());
        assert!(parse("t", "{{ range .Pages }}").is_err());
        assert!(parse("t", "{{ .Title }}").is_err());
        assert!(parse("t", "{{ partial nav }}").is_err());
        assert!(parse("t", "{{ .Site..x }}").is_err());
    }
}
