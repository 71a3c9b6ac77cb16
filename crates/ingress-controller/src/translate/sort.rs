use crate::ir::{IrRoute, PathType};
use std::cmp::Ordering;

fn path_type_rank(path_type: PathType) -> u8 {
    match path_type {
        PathType::Exact => 0,
        PathType::Prefix => 1,
        PathType::Regex => 2,
    }
}

/// First-match order: exact before prefix before regex, longer paths first,
/// then lexicographic, then routes with header, query or method constraints
/// ahead of those without. The remaining keys only make the order total.
pub fn compare_routes(a: &IrRoute, b: &IrRoute) -> Ordering {
    let (x, y) = (&a.matcher, &b.matcher);
    path_type_rank(x.path_type)
        .cmp(&path_type_rank(y.path_type))
        .then_with(|| y.path.len().cmp(&x.path.len()))
        .then_with(|| x.path.cmp(&y.path))
        .then_with(|| y.headers.len().cmp(&x.headers.len()))
        .then_with(|| y.query_params.len().cmp(&x.query_params.len()))
        .then_with(|| y.method.is_some().cmp(&x.method.is_some()))
        .then_with(|| x.headers.cmp(&y.headers))
        .then_with(|| x.query_params.cmp(&y.query_params))
        .then_with(|| x.method.cmp(&y.method))
        .then_with(|| a.destination.sort_key().cmp(&b.destination.sort_key()))
}

pub fn sort_routes(routes: &mut [IrRoute]) {
    routes.sort_by(compare_routes);
}
