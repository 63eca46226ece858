//! YAML frontmatter extraction for markdown artifacts.
//!
//! Artifacts are user-authored files; anything goes. Invalid YAML is
//! treated as an empty frontmatter rather than a failure, and scalar
//! values are coerced to strings so a bare `status: active` and a quoted
//! `status: "active"` read the same.

use serde_yaml::Value;

/// Parsed frontmatter head of one markdown document.
#[derive(Debug, Clone, Default)]
pub struct Frontmatter {
    mapping: Option<serde_yaml::Mapping>,
    /// Set when a fenced block was present but did not parse as YAML.
    pub parse_error: Option<String>,
}

impl Frontmatter {
    /// Coerced string lookup. Numbers, booleans, and timestamps all
    /// stringify; nested structures do not.
    pub fn get(&self, key: &str) -> Option<String> {
        let value = self
            .mapping
            .as_ref()?
            .iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)?;
        coerce_scalar(value)
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.as_ref().is_none_or(|m| m.is_empty())
    }
}

fn coerce_scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Split a document into its frontmatter and body.
///
/// The head must open with `---` on the very first line and close with
/// the next `---`/`...` line. Anything else is body.
pub fn split(raw: &str) -> (Frontmatter, &str) {
    let Some(rest) = raw
        .strip_prefix("---\n")
        .or_else(|| raw.strip_prefix("---\r\n"))
    else {
        return (Frontmatter::default(), raw);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let head = &rest[..offset];
            let body = &rest[offset + line.len()..];
            let frontmatter = match serde_yaml::from_str::<Value>(head) {
                Ok(Value::Mapping(mapping)) => Frontmatter {
                    mapping: Some(mapping),
                    parse_error: None,
                },
                Ok(_) => Frontmatter {
                    mapping: None,
                    parse_error: Some(
                        "frontmatter is not a mapping".to_owned(),
                    ),
                },
                Err(err) => Frontmatter {
                    mapping: None,
                    parse_error: Some(format!("invalid YAML: {err}")),
                },
            };
            return (frontmatter, body);
        }
        offset += line.len();
    }

    // Unterminated fence: the whole document is body.
    (Frontmatter::default(), raw)
}

/// First `#` heading of the body, used as a title fallback.
pub fn body_title(body: &str) -> Option<&str> {
    body.lines().find_map(|line| {
        line.strip_prefix("# ").map(str::trim).filter(|t| !t.is_empty())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_head_and_body() {
        let doc = "---\ntitle: \"Demo\"\nstatus: active\n---\n# Heading\nbody\n";
        let (fm, body) = split(doc);
        assert_eq!(fm.get("title").as_deref(), Some("Demo"));
        assert_eq!(fm.get("status").as_deref(), Some("active"));
        assert!(body.starts_with("# Heading"));
    }

    #[test]
    fn missing_fence_is_all_body() {
        let (fm, body) = split("just text\n");
        assert!(fm.is_empty());
        assert!(fm.parse_error.is_none());
        assert_eq!(body, "just text\n");
    }

    #[test]
    fn invalid_yaml_reads_as_empty_with_error() {
        let doc = "---\n: [unbalanced\n---\nbody\n";
        let (fm, body) = split(doc);
        assert!(fm.is_empty());
        assert!(fm.parse_error.is_some());
        assert_eq!(body, "body\n");
    }

    #[test]
    fn unterminated_fence_is_all_body() {
        let doc = "---\ntitle: x\nno closing fence";
        let (fm, body) = split(doc);
        assert!(fm.is_empty());
        assert_eq!(body, doc);
    }

    #[test]
    fn scalars_coerce_to_strings() {
        let doc = "---\ncount: 42\nflag: true\n---\n";
        let (fm, _) = split(doc);
        assert_eq!(fm.get("count").as_deref(), Some("42"));
        assert_eq!(fm.get("flag").as_deref(), Some("true"));
    }

    #[test]
    fn body_title_finds_first_heading() {
        assert_eq!(
            body_title("para\n# My Title\n# Second\n"),
            Some("My Title")
        );
        assert_eq!(body_title("no heading"), None);
    }
}
