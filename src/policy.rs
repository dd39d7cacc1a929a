//! Route permission policy.
//!
//! Maps `(method, path)` to the [`Access`] a route requires. Templates use
//! `{name}` segments that match exactly one non-empty path segment. Rules
//! are tried in order and the first match wins; an unknown route yields
//! `None` so the HTTP layer can answer 404/405 without consulting the
//! authorization core.

use crate::security::Access;
use http::Method;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One row of the route table as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteRule {
    /// HTTP method, e.g. `PATCH`.
    pub method: String,
    /// Path template, e.g. `/patients/{id}`.
    pub path: String,
    /// Required permission; absent for public routes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub permission: Option<String>,
}

impl RouteRule {
    fn new(method: &str, path: &str, permission: Option<&str>) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            permission: permission.map(str::to_string),
        }
    }
}

/// A route rule that could not be compiled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// Not an HTTP method token.
    #[error("invalid HTTP method '{0}'")]
    InvalidMethod(String),
    /// Malformed path template.
    #[error("invalid route path '{path}': {reason}")]
    InvalidPath {
        /// The template as written.
        path: String,
        /// What is wrong with it.
        reason: &'static str,
    },
    /// `permission = ""` is neither public nor protected.
    #[error("route {method} {path} has an empty permission")]
    EmptyPermission {
        /// Method of the rule.
        method: String,
        /// Path of the rule.
        path: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
}

#[derive(Debug, Clone)]
struct CompiledRoute {
    method: Method,
    template: String,
    segments: Vec<Segment>,
    access: Access,
}

impl CompiledRoute {
    fn compile(method: Method, template: &str, access: Access) -> Self {
        let segments = template
            .split('/')
            .skip(1)
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with('{') && s.ends_with('}') {
                    Segment::Param
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self {
            method,
            template: template.to_string(),
            segments,
            access,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        if &self.method != method {
            return false;
        }
        let Some(rest) = path.strip_prefix('/') else {
            return false;
        };
        if rest.is_empty() {
            return self.segments.is_empty();
        }
        let mut parts = rest.split('/');
        for segment in &self.segments {
            match (segment, parts.next()) {
                (_, None) => return false,
                (_, Some("")) => return false,
                (Segment::Param, Some(_)) => {}
                (Segment::Literal(lit), Some(part)) if lit == part => {}
                (Segment::Literal(_), Some(_)) => return false,
            }
        }
        parts.next().is_none()
    }
}

/// Ordered table of route access rules.
#[derive(Debug, Clone, Default)]
pub struct RoutePolicy {
    routes: Vec<CompiledRoute>,
}

impl RoutePolicy {
    /// Compile a table of rules.
    pub fn new(rules: &[RouteRule]) -> Result<Self, PolicyError> {
        let mut routes = Vec::with_capacity(rules.len());
        for rule in rules {
            let method = rule
                .method
                .to_ascii_uppercase()
                .parse::<Method>()
                .map_err(|_| PolicyError::InvalidMethod(rule.method.clone()))?;
            validate_template(&rule.path)?;
            let access = match rule.permission.as_deref() {
                None => Access::Public,
                Some("") => {
                    return Err(PolicyError::EmptyPermission {
                        method: rule.method.clone(),
                        path: rule.path.clone(),
                    })
                }
                Some(permission) => Access::Requires(permission.to_string()),
            };
            routes.push(CompiledRoute::compile(method, &rule.path, access));
        }
        Ok(Self { routes })
    }

    /// The clinic service's route table.
    pub fn clinic() -> Self {
        let routes = clinic_rules()
            .into_iter()
            .filter_map(|rule| {
                let method = rule.method.parse::<Method>().ok()?;
                let access = rule.permission.map_or(Access::Public, Access::Requires);
                Some(CompiledRoute::compile(method, &rule.path, access))
            })
            .collect();
        Self { routes }
    }

    /// Access rule for a request; `None` when no route matches.
    ///
    /// A query string, if present, is ignored.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<Access> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        self.routes
            .iter()
            .find(|route| route.matches(method, path))
            .map(|route| route.access.clone())
    }

    /// `(method, template, access)` for every rule, in order.
    pub fn entries(&self) -> impl Iterator<Item = (&Method, &str, &Access)> {
        self.routes
            .iter()
            .map(|route| (&route.method, route.template.as_str(), &route.access))
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True for an empty table.
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn validate_template(path: &str) -> Result<(), PolicyError> {
    let invalid = |reason| PolicyError::InvalidPath {
        path: path.to_string(),
        reason,
    };
    if !path.starts_with('/') {
        return Err(invalid("must start with '/'"));
    }
    if path.contains('?') {
        return Err(invalid("must not contain a query string"));
    }
    for segment in path.split('/').skip(1) {
        if segment.is_empty() && path != "/" {
            return Err(invalid("empty segment"));
        }
        let opens = segment.starts_with('{');
        let closes = segment.ends_with('}');
        if opens != closes || (opens && segment.len() < 3) {
            return Err(invalid("parameters must look like '{name}'"));
        }
        if !opens && (segment.contains('{') || segment.contains('}')) {
            return Err(invalid("parameters must span a whole segment"));
        }
    }
    Ok(())
}

/// Rules of the clinic service: doctors are listed publicly, everything
/// else needs a `<verb>:<resource>` permission.
pub fn clinic_rules() -> Vec<RouteRule> {
    vec![
        RouteRule::new("GET", "/", None),
        RouteRule::new("GET", "/doctors", None),
        RouteRule::new("POST", "/doctors", Some("post:doctors")),
        RouteRule::new("PATCH", "/doctors/{id}", Some("patch:doctors")),
        RouteRule::new("DELETE", "/doctors/{id}", Some("delete:doctors")),
        RouteRule::new("GET", "/patients", Some("get:patients")),
        RouteRule::new("POST", "/patients", Some("post:patients")),
        RouteRule::new("PATCH", "/patients/{id}", Some("patch:patients")),
        RouteRule::new("DELETE", "/patients/{id}", Some("delete:patients")),
        RouteRule::new("GET", "/appointments", Some("get:appointments")),
        RouteRule::new(
            "GET",
            "/appointments/doctor/{id}",
            Some("get:appointments-doctor"),
        ),
        RouteRule::new("POST", "/appointments", Some("post:appointments")),
        RouteRule::new("PATCH", "/appointments/{id}", Some("patch:appointments")),
        RouteRule::new("DELETE", "/appointments/{id}", Some("delete:appointments")),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requires(permission: &str) -> Option<Access> {
        Some(Access::Requires(permission.to_string()))
    }

    #[test]
    fn test_clinic_table() {
        let policy = RoutePolicy::clinic();
        assert_eq!(policy.len(), clinic_rules().len());

        assert_eq!(policy.lookup(&Method::GET, "/"), Some(Access::Public));
        assert_eq!(policy.lookup(&Method::GET, "/doctors"), Some(Access::Public));
        assert_eq!(policy.lookup(&Method::POST, "/doctors"), requires("post:doctors"));
        assert_eq!(
            policy.lookup(&Method::DELETE, "/doctors/12"),
            requires("delete:doctors")
        );
        assert_eq!(policy.lookup(&Method::GET, "/patients"), requires("get:patients"));
        assert_eq!(
            policy.lookup(&Method::GET, "/appointments/doctor/3"),
            requires("get:appointments-doctor")
        );
        assert_eq!(
            policy.lookup(&Method::PATCH, "/appointments/9"),
            requires("patch:appointments")
        );
    }

    #[test]
    fn test_unknown_routes() {
        let policy = RoutePolicy::clinic();
        assert_eq!(policy.lookup(&Method::GET, "/doctors/1"), None);
        assert_eq!(policy.lookup(&Method::PUT, "/patients/1"), None);
        assert_eq!(policy.lookup(&Method::GET, "/nurses"), None);
        assert_eq!(policy.lookup(&Method::DELETE, "/doctors/"), None);
        assert_eq!(policy.lookup(&Method::DELETE, "/doctors/1/extra"), None);
        assert_eq!(policy.lookup(&Method::GET, "doctors"), None);
    }

    #[test]
    fn test_query_string_is_ignored() {
        let policy = RoutePolicy::clinic();
        assert_eq!(
            policy.lookup(&Method::GET, "/patients?page=2"),
            requires("get:patients")
        );
    }

    #[test]
    fn test_first_rule_wins() {
        let rules = vec![
            RouteRule::new("GET", "/patients/{id}", Some("get:patient")),
            RouteRule::new("GET", "/patients/me", None),
        ];
        let policy = RoutePolicy::new(&rules).unwrap();
        assert_eq!(policy.lookup(&Method::GET, "/patients/me"), requires("get:patient"));
    }

    #[test]
    fn test_lowercase_method_is_accepted() {
        let policy = RoutePolicy::new(&[RouteRule::new("get", "/x", Some("get:x"))]).unwrap();
        assert_eq!(policy.lookup(&Method::GET, "/x"), requires("get:x"));
    }

    #[test]
    fn test_invalid_rules() {
        assert!(matches!(
            RoutePolicy::new(&[RouteRule::new("GE T", "/x", None)]),
            Err(PolicyError::InvalidMethod(_))
        ));
        for path in ["x", "/a//b", "/a/{", "/a/{}", "/a/b{id}", "/a?b"] {
            assert!(
                matches!(
                    RoutePolicy::new(&[RouteRule::new("GET", path, None)]),
                    Err(PolicyError::InvalidPath { .. })
                ),
                "{path}"
            );
        }
        assert!(matches!(
            RoutePolicy::new(&[RouteRule::new("GET", "/x", Some(""))]),
            Err(PolicyError::EmptyPermission { .. })
        ));
    }

    #[test]
    fn test_entries_keep_order() {
        let policy = RoutePolicy::clinic();
        let (method, template, access) = policy.entries().nth(2).unwrap();
        assert_eq!(*method, Method::POST);
        assert_eq!(template, "/doctors");
        assert_eq!(access, &Access::Requires("post:doctors".into()));
    }
}
