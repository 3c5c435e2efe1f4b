//! Entry-point extraction from generated scene code.
//!
//! The renderer has to be told which class to render. The rule is fixed:
//! the first class declaration in file order with a base whose name ends in
//! `Scene` (`Scene`, `ThreeDScene`, `manim.MovingCameraScene`, ...).
//!
//! Matching is line based. Comments and the bodies of triple-quoted strings
//! are skipped; a declaration inside a single-quoted string is not.

use std::borrow::Cow;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::error;

const TRIPLE_QUOTES: [&str; 2] = ["\"\"\"", "'''"];

/// `class Name(bases):`, allowing the base list to span lines.
static CLASS_DECL: Lazy<Option<Regex>> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*class[ \t]+([A-Za-z_][A-Za-z0-9_]*)[ \t]*\(([^)]*)\)[ \t]*:").ok()
});

/// Finds the scene class to render in `source`.
///
/// # Examples
///
/// ```
/// use manimate_server::find_scene_class;
///
/// let source = "from manim import *\n\nclass Intro(Scene):\n    def construct(self):\n        pass\n";
/// assert_eq!(find_scene_class(source).as_deref(), Some("Intro"));
/// assert_eq!(find_scene_class("x = 1"), None);
/// ```
#[must_use]
pub fn find_scene_class(source: &str) -> Option<String> {
    let Some(regex) = CLASS_DECL.as_ref() else {
        error!("Scene class pattern failed to compile");
        return None;
    };
    let source = blank_triple_quoted(source);
    regex
        .captures_iter(&source)
        .find(|caps| caps.get(2).is_some_and(|bases| has_scene_base(bases.as_str())))
        .and_then(|caps| caps.get(1))
        .map(|name| name.as_str().to_string())
}

/// Replaces the body of every triple-quoted string with spaces, keeping line
/// breaks so line-anchored matching still sees the surrounding code.
fn blank_triple_quoted(source: &str) -> Cow<'_, str> {
    if !TRIPLE_QUOTES.iter().any(|quote| source.contains(quote)) {
        return Cow::Borrowed(source);
    }

    let mut out = String::with_capacity(source.len());
    let mut rest = source;
    while let Some((start, quote)) = TRIPLE_QUOTES
        .iter()
        .filter_map(|quote| rest.find(quote).map(|i| (i, *quote)))
        .min_by_key(|(i, _)| *i)
    {
        let body_start = start + quote.len();
        out.push_str(&rest[..body_start]);

        let body = &rest[body_start..];
        let end = body.find(quote).unwrap_or(body.len());
        out.extend(body[..end].chars().map(|c| if c == '\n' { c } else { ' ' }));

        rest = &body[end..];
        if rest.is_empty() {
            break;
        }
        out.push_str(quote);
        rest = &rest[quote.len()..];
    }
    out.push_str(rest);

    Cow::Owned(out)
}

fn has_scene_base(bases: &str) -> bool {
    bases
        .split(',')
        .map(str::trim)
        .filter(|base| !base.contains('='))
        .filter_map(|base| base.rsplit('.').next())
        .any(|name| name.ends_with("Scene"))
}

/// Reads the source file at `path` and finds its scene class.
///
/// Returns `Ok(None)` when no scene class is declared.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub async fn extract_scene_class(path: &Path) -> std::io::Result<Option<String>> {
    let source = tokio::fs::read_to_string(path).await?;
    Ok(find_scene_class(&source))
}
