use axum::http::Method;
use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// RouteError
///
/// Raised when a path template cannot be compiled into a matcher.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route template must start with '/': {0}")]
    MissingLeadingSlash(String),
    #[error("malformed path variable in segment '{segment}' of {template}")]
    MalformedVariable { template: String, segment: String },
    #[error("path variable '{name}' appears twice in {template}")]
    DuplicateVariable { template: String, name: String },
}

/// PathParams
///
/// The variables captured from a matched path, keyed by the name used in the
/// route template. Lives for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Route
///
/// One registered entry: the verb it answers, the template it was declared
/// with, the compiled matcher and the handler. Immutable once registered.
struct Route<H> {
    method: Method,
    template: String,
    pattern: Regex,
    handler: H,
}

/// RouteMatch
///
/// The outcome of a successful dispatch.
#[derive(Debug)]
pub struct RouteMatch<'a, H> {
    pub handler: &'a H,
    pub template: &'a str,
    pub params: PathParams,
}

/// RouteTable
///
/// An ordered list of `(verb, template, handler)` routes. Registration order is
/// match priority: the first route whose verb equals the request verb and
/// whose pattern matches the whole path wins. There is no specificity ranking,
/// so overlapping templates must be registered most-specific first.
///
/// A path that only matches under another verb is simply skipped, which lets a
/// later route with the same shape and the right verb match. If nothing matches
/// the caller gets `None` and answers "not found"; the table never produces a
/// "method not allowed" outcome.
pub struct RouteTable<H> {
    routes: Vec<Route<H>>,
}

impl<H> Default for RouteTable<H> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<H> RouteTable<H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route at the lowest priority.
    ///
    /// # Panics
    /// Panics if `template` is not a valid route template. Templates are
    /// compile-time literals, so this mirrors `axum::Router::route`.
    pub fn register(&mut self, method: Method, template: &str, handler: H) -> &mut Self {
        if let Err(e) = self.try_register(method, template, handler) {
            panic!("invalid route template: {e}");
        }
        self
    }

    /// Fallible form of [`RouteTable::register`].
    pub fn try_register(
        &mut self,
        method: Method,
        template: &str,
        handler: H,
    ) -> Result<&mut Self, RouteError> {
        let pattern = compile_template(template)?;
        self.routes.push(Route {
            method,
            template: template.to_string(),
            pattern,
            handler,
        });
        Ok(self)
    }

    /// Resolves `(method, path)` to the first matching route and the variables
    /// captured from the path.
    pub fn dispatch(&self, method: &Method, path: &str) -> Option<RouteMatch<'_, H>> {
        self.routes
            .iter()
            .filter(|route| route.method == *method)
            .find_map(|route| {
                let captures = route.pattern.captures(path)?;
                let params = route
                    .pattern
                    .capture_names()
                    .enumerate()
                    .skip(1)
                    .filter_map(|(index, name)| {
                        let name = name?;
                        let value = captures.get(index)?;
                        Some((name, value.as_str()))
                    })
                    .collect();
                Some(RouteMatch {
                    handler: &route.handler,
                    template: &route.template,
                    params,
                })
            })
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered `(verb, template)` pairs in priority order.
    pub fn entries(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes.iter().map(|r| (&r.method, r.template.as_str()))
    }
}

/// Turns `/groups/{groupId}/expenses` into `^/groups/(?P<groupId>[^/]+)/expenses$`.
fn compile_template(template: &str) -> Result<Regex, RouteError> {
    if !template.starts_with('/') {
        return Err(RouteError::MissingLeadingSlash(template.to_string()));
    }

    let mut seen: Vec<&str> = Vec::new();
    let mut source = String::from("^");

    for segment in template.split('/').skip(1) {
        source.push('/');
        if let Some(inner) = segment.strip_prefix('{') {
            let name = inner.strip_suffix('}').filter(|n| is_variable_name(n)).ok_or_else(|| {
                RouteError::MalformedVariable {
                    template: template.to_string(),
                    segment: segment.to_string(),
                }
            })?;
            if seen.contains(&name) {
                return Err(RouteError::DuplicateVariable {
                    template: template.to_string(),
                    name: name.to_string(),
                });
            }
            seen.push(name);
            source.push_str(&format!("(?P<{name}>[^/]+)"));
        } else if segment.contains('{') || segment.contains('}') {
            return Err(RouteError::MalformedVariable {
                template: template.to_string(),
                segment: segment.to_string(),
            });
        } else {
            source.push_str(&regex::escape(segment));
        }
    }
    source.push('$');

    // Every piece is either escaped or a validated group, so this cannot fail
    // short of hitting the regex size limit.
    Regex::new(&source).map_err(|_| RouteError::MalformedVariable {
        template: template.to_string(),
        segment: template.to_string(),
    })
}

fn is_variable_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> RouteTable<&'static str> {
        let mut table = RouteTable::new();
        table
            .register(Method::GET, "/groups", "list_groups")
            .register(Method::GET, "/groups/{groupId}", "get_group")
            .register(Method::GET, "/groups/{groupId}/expenses", "list_expenses")
            .register(Method::POST, "/groups/{groupId}/expenses", "create_expense")
            .register(
                Method::GET,
                "/groups/{groupId}/expenses/{expenseId}",
                "get_expense",
            );
        table
    }

    #[test]
    fn matches_fixed_path_without_variables() {
        let table = table();
        let hit = table.dispatch(&Method::GET, "/groups").unwrap();
        assert_eq!(*hit.handler, "list_groups");
        assert!(hit.params.is_empty());
    }

    #[test]
    fn extracts_exactly_the_named_captures() {
        let table = table();
        let hit = table
            .dispatch(&Method::GET, "/groups/g-1/expenses/e-9")
            .unwrap();
        assert_eq!(*hit.handler, "get_expense");
        assert_eq!(hit.template, "/groups/{groupId}/expenses/{expenseId}");
        assert_eq!(hit.params.len(), 2);
        assert_eq!(hit.params.get("groupId"), Some("g-1"));
        assert_eq!(hit.params.get("expenseId"), Some("e-9"));
    }

    #[test]
    fn verb_mismatch_falls_through_to_later_route() {
        let table = table();
        let hit = table
            .dispatch(&Method::POST, "/groups/g-1/expenses")
            .unwrap();
        assert_eq!(*hit.handler, "create_expense");
        assert_eq!(hit.params.get("groupId"), Some("g-1"));
    }

    #[test]
    fn wrong_verb_only_is_not_found() {
        let table = table();
        assert!(table.dispatch(&Method::DELETE, "/groups/g-1").is_none());
        assert!(table.dispatch(&Method::POST, "/groups").is_none());
    }

    #[test]
    fn unknown_paths_are_not_found() {
        let table = table();
        for path in ["/", "/group", "/groups/", "/groups/g-1/users/x", "groups", ""] {
            assert!(table.dispatch(&Method::GET, path).is_none(), "{path}");
        }
        assert!(RouteTable::<()>::new().dispatch(&Method::GET, "/").is_none());
    }

    #[test]
    fn variable_never_spans_a_slash() {
        let table = table();
        // Would match `/groups/{groupId}` only if the capture could cross '/'.
        assert!(table.dispatch(&Method::GET, "/groups/a/b").is_none());
        assert!(table.dispatch(&Method::GET, "/groups//expenses").is_none());
    }

    #[test]
    fn first_registered_route_wins_over_more_specific_later_one() {
        let mut table = RouteTable::new();
        table
            .register(Method::GET, "/expenses/{expenseId}", "generic")
            .register(Method::GET, "/expenses/categories", "categories");
        let hit = table.dispatch(&Method::GET, "/expenses/categories").unwrap();
        assert_eq!(*hit.handler, "generic");
        assert_eq!(hit.params.get("expenseId"), Some("categories"));

        let mut table = RouteTable::new();
        table
            .register(Method::GET, "/expenses/categories", "categories")
            .register(Method::GET, "/expenses/{expenseId}", "generic");
        let hit = table.dispatch(&Method::GET, "/expenses/categories").unwrap();
        assert_eq!(*hit.handler, "categories");
        assert!(hit.params.is_empty());
    }

    #[test]
    fn literal_segments_are_not_regex() {
        let mut table = RouteTable::new();
        table.register(Method::GET, "/v1.0/items", "dotted");
        assert!(table.dispatch(&Method::GET, "/v1.0/items").is_some());
        assert!(table.dispatch(&Method::GET, "/v1x0/items").is_none());
    }

    #[test]
    fn rejects_invalid_templates() {
        let mut table = RouteTable::new();
        assert_eq!(
            table.try_register(Method::GET, "groups", ()).err(),
            Some(RouteError::MissingLeadingSlash("groups".into()))
        );
        assert!(matches!(
            table.try_register(Method::GET, "/groups/{groupId", ()),
            Err(RouteError::MalformedVariable { .. })
        ));
        assert!(matches!(
            table.try_register(Method::GET, "/groups/{1abc}", ()),
            Err(RouteError::MalformedVariable { .. })
        ));
        assert!(matches!(
            table.try_register(Method::GET, "/a{b}", ()),
            Err(RouteError::MalformedVariable { .. })
        ));
        assert!(matches!(
            table.try_register(Method::GET, "/{id}/x/{id}", ()),
            Err(RouteError::DuplicateVariable { .. })
        ));
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "invalid route template")]
    fn register_panics_on_invalid_template() {
        RouteTable::new().register(Method::GET, "/{", ());
    }
}
