//! Method names for imported HTTP operations.
//!
//! `GET /users` becomes `get_users`, `GET /users/{id}` becomes `get_user`,
//! `POST /users` becomes `create_user`. A trailing static segment that
//! already reads as an action (`/auth/login`, `/users/{id}/verify-email`)
//! is used as the name directly, even when path parameters follow it
//! (`/verify/{token}`).

use rpcgen_common::{pluralize, singularize, to_snake_case};

/// Leading words that mark a path segment as an action rather than a resource.
pub const ACTION_WORDS: &[&str] = &[
    "accept",
    "activate",
    "biometric",
    "check",
    "deactivate",
    "import",
    "login",
    "logout",
    "register",
    "reset",
    "verify",
];

/// A path segment split into static text or a `{param}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Static(&'a str),
    Param(&'a str),
}

/// Split a path template into segments, skipping empty ones.
pub fn segments(path: &str) -> Vec<Segment<'_>> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(param) => Segment::Param(param),
            None => Segment::Static(s),
        })
        .collect()
}

/// Name of the last `{param}` in the path.
pub fn last_path_param(path: &str) -> Option<&str> {
    segments(path).into_iter().rev().find_map(|s| match s {
        Segment::Param(p) => Some(p),
        Segment::Static(_) => None,
    })
}

fn is_action(segment: &str) -> bool {
    segment
        .split('_')
        .next()
        .is_some_and(|first| ACTION_WORDS.contains(&first))
}

/// Synthesize the method name for an operation (without any prefix).
pub fn function_name(method: &str, path: &str) -> String {
    let segs = segments(path);
    let ends_with_param = matches!(segs.last(), Some(Segment::Param(_)));
    let resource = segs
        .iter()
        .rev()
        .find_map(|s| match s {
            Segment::Static(s) => Some(to_snake_case(s)),
            Segment::Param(_) => None,
        })
        .unwrap_or_else(|| "root".to_string());

    if is_action(&resource) {
        return resource;
    }

    let single = singularize(&resource);
    match method {
        "get" if ends_with_param => format!("get_{single}"),
        "get" => format!("get_{}", pluralize(&single)),
        "post" => format!("create_{single}"),
        "put" | "patch" => format!("update_{single}"),
        "delete" => format!("delete_{single}"),
        other => format!("{other}_{single}"),
    }
}
