//! Path templates and the `(template, method)` pairs responses are observed by.

use std::fmt;

use crate::Method;

/// One `/`-separated segment of a [`PathTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Segment {
    /// Must equal the request path segment exactly.
    Literal(String),
    /// `{name}`: matches any single segment.
    Placeholder(String),
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            Some(name) => Self::Placeholder(name.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Self::Literal(literal) => literal == segment,
            Self::Placeholder(_) => true,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(literal) => f.write_str(literal),
            Self::Placeholder(name) => write!(f, "{{{name}}}"),
        }
    }
}

/// A parsed path template such as `/users/{id}/posts`.
///
/// A leading `/` is not significant: `/users/{id}` and `users/{id}` are the
/// same template. Equality compares the parsed segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    /// Parse a template.
    #[must_use]
    pub fn new(template: &str) -> Self {
        let segments = normalize(template).split('/').map(Segment::parse).collect();
        Self { segments }
    }

    /// Parsed segments.
    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Returns `true` if `path` has as many segments as the template and each
    /// literal segment is equal.
    ///
    /// The path's leading `/` is ignored.
    #[must_use]
    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        let mut remaining = self.segments.iter();
        for segment in path.split('/') {
            match remaining.next() {
                Some(expected) if expected.matches(segment) => {}
                _ => return false,
            }
        }
        remaining.next().is_none()
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for PathTemplate {
    fn from(template: &str) -> Self {
        Self::new(template)
    }
}

fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// A `(path template, method)` pair identifying an observed endpoint.
///
/// # Example
///
/// ```
/// use tether_core::{ApiPath, Method};
///
/// let path = ApiPath::new("/users/{id}", Method::Get);
/// assert!(path.matches("users/42", Method::Get));
/// assert!(!path.matches("users/42/extra", Method::Get));
/// assert!(!path.matches("groups/42", Method::Get));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ApiPath {
    template: PathTemplate,
    method: Method,
}

impl ApiPath {
    /// Creates a new API path.
    #[must_use]
    pub fn new(template: impl Into<PathTemplate>, method: Method) -> Self {
        Self {
            template: template.into(),
            method,
        }
    }

    /// The path template.
    #[must_use]
    pub const fn template(&self) -> &PathTemplate {
        &self.template
    }

    /// The HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Returns `true` if a request with `method` on `path` is observed by this pair.
    #[must_use]
    pub fn matches(&self, path: &str, method: Method) -> bool {
        self.method == method && self.template.matches(path)
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} /{}", self.method, self.template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_matches_any_segment() {
        let template = PathTemplate::new("/users/{id}");
        assert!(template.matches("users/42"));
        assert!(template.matches("/users/alice"));
    }

    #[test]
    fn segment_count_must_match() {
        let template = PathTemplate::new("users/{id}");
        assert!(!template.matches("users/42/extra"));
        assert!(!template.matches("users"));
    }

    #[test]
    fn literal_segments_must_match() {
        let template = PathTemplate::new("users/{id}");
        assert!(!template.matches("groups/42"));
    }

    #[test]
    fn leading_slash_is_not_significant() {
        assert_eq!(PathTemplate::new("/a/{b}"), PathTemplate::new("a/{b}"));
        assert_eq!(
            ApiPath::new("/a/{b}", Method::Get),
            ApiPath::new("a/{b}", Method::Get)
        );
    }

    #[test]
    fn method_must_match() {
        let path = ApiPath::new("users/{id}", Method::Get);
        assert!(!path.matches("users/1", Method::Delete));
    }

    #[test]
    fn display_round_trips_template() {
        let path = ApiPath::new("/users/{id}/posts", Method::Post);
        assert_eq!(path.to_string(), "POST /users/{id}/posts");
    }

    #[test]
    fn empty_template_matches_root() {
        let template = PathTemplate::new("/");
        assert!(template.matches("/"));
        assert!(template.matches(""));
        assert!(!template.matches("users"));
    }
}
