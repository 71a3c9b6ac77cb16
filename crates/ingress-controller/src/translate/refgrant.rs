use crate::store::Snapshot;
use kube::ResourceExt;

/// One side of a cross namespace reference.
#[derive(Debug, Clone, Copy)]
pub struct RefEnd<'a> {
    pub group: &'a str,
    pub kind: &'a str,
    pub namespace: &'a str,
}

/// Whether `from` may reference the object `name` described by `to`. Same
/// namespace references are always allowed; anything else needs a
/// ReferenceGrant in the target namespace.
pub fn is_permitted(snapshot: &Snapshot, from: RefEnd<'_>, to: RefEnd<'_>, name: &str) -> bool {
    if from.namespace == to.namespace {
        return true;
    }

    snapshot
        .reference_grants
        .iter()
        .filter(|grant| grant.namespace().as_deref() == Some(to.namespace))
        .any(|grant| {
            let from_ok = grant.spec.from.iter().any(|f| {
                f.group == from.group && f.kind == from.kind && f.namespace == from.namespace
            });
            let to_ok = grant.spec.to.iter().any(|t| {
                t.group == to.group
                    && t.kind == to.kind
                    && t.name.as_deref().map_or(true, |n| n == name)
            });
            from_ok && to_ok
        })
}
