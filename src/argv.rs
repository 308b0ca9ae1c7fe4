//! Whitespace-token template expansion.
//!
//! A template is a shell-syntax-free command line: tokens separated by
//! whitespace, each optionally containing `%s` placeholders filled
//! positionally from a flat argument list. `%%` is a literal percent.

use crate::errors::{SpawnError, SpawnResult};

/// Number of `%s` placeholders in `template`. `%%` escapes count zero.
pub fn placeholder_count(template: &str) -> usize {
    let mut count = 0;
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            continue;
        }
        match chars.peek() {
            Some('%') => {
                chars.next();
            }
            Some('s') => {
                chars.next();
                count += 1;
            }
            _ => {}
        }
    }
    count
}

/// Expand `template` into a concrete argv, consuming `args` left to right,
/// one value per `%s` marker per token.
///
/// With no args at all the tokens pass through verbatim (the template is
/// already a literal argv).
pub fn resolve(template: &str, args: &[&str]) -> SpawnResult<Vec<String>> {
    let parts: Vec<&str> = template.split_whitespace().collect();
    if parts.is_empty() {
        return Err(SpawnError::EmptyTemplate);
    }
    if args.is_empty() {
        return Ok(parts.into_iter().map(str::to_string).collect());
    }
    let mut rest = args;
    let mut argv = Vec::with_capacity(parts.len());
    for part in parts {
        let needed = placeholder_count(part);
        if rest.len() < needed {
            return Err(SpawnError::MissingArgs {
                template: template.to_string(),
                supplied: args.len(),
            });
        }
        let (taken, remaining) = rest.split_at(needed);
        argv.push(fill(template, part, taken)?);
        rest = remaining;
    }
    Ok(argv)
}

fn fill(template: &str, token: &str, args: &[&str]) -> SpawnResult<String> {
    let mut out = String::with_capacity(token.len());
    let mut values = args.iter();
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some('s') => {
                if let Some(value) = values.next() {
                    out.push_str(value);
                }
            }
            other => {
                let mut found = String::from('%');
                if let Some(ch) = other {
                    found.push(ch);
                }
                return Err(SpawnError::BadPlaceholder {
                    template: template.to_string(),
                    found,
                });
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_template_passes_through() {
        let argv = resolve("ls -la /tmp", &[]).expect("resolve");
        assert_eq!(argv, ["ls", "-la", "/tmp"]);
    }

    #[test]
    fn placeholders_consume_left_to_right() {
        let argv = resolve("grep %s %s", &["needle", "haystack.txt"]).expect("resolve");
        assert_eq!(argv, ["grep", "needle", "haystack.txt"]);
    }

    #[test]
    fn multiple_markers_in_one_token() {
        let argv = resolve("tar -C %s/%s", &["/srv", "data"]).expect("resolve");
        assert_eq!(argv, ["tar", "-C", "/srv/data"]);
    }

    #[test]
    fn doubled_marker_is_literal_and_consumes_nothing() {
        let argv = resolve("printf 100%% %s", &["done"]).expect("resolve");
        assert_eq!(argv, ["printf", "100%", "done"]);
    }

    #[test]
    fn too_few_args() {
        let err = resolve("cp %s %s", &["only-one"]).unwrap_err();
        assert!(matches!(err, SpawnError::MissingArgs { supplied: 1, .. }));
    }

    #[test]
    fn unknown_conversion_is_rejected() {
        let err = resolve("printf %d", &["7"]).unwrap_err();
        assert!(matches!(err, SpawnError::BadPlaceholder { .. }));
    }

    #[test]
    fn empty_template() {
        let err = resolve("  ", &[]).unwrap_err();
        assert!(matches!(err, SpawnError::EmptyTemplate));
    }

    #[test]
    fn counting_skips_escapes() {
        assert_eq!(placeholder_count("%s%%%s"), 2);
        assert_eq!(placeholder_count("%%"), 0);
        assert_eq!(placeholder_count("plain"), 0);
    }
}
