use crate::store::ObjectKey;
use std::fmt;
use tracing::warn;

/// A problem found while translating one source object. Translation of the
/// remaining objects goes on regardless.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: &'static str,
    pub key: ObjectKey,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.key, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Diagnostics(Vec<Diagnostic>);

impl Diagnostics {
    pub fn push(&mut self, kind: &'static str, key: &ObjectKey, message: impl Into<String>) {
        self.0.push(Diagnostic {
            kind,
            key: key.clone(),
            message: message.into(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.0.extend(other.0);
    }

    /// Diagnostics recorded against one object.
    pub fn for_object<'a>(
        &'a self,
        kind: &'a str,
        key: &'a ObjectKey,
    ) -> impl Iterator<Item = &'a Diagnostic> + 'a {
        self.0
            .iter()
            .filter(move |d| d.kind == kind && &d.key == key)
    }

    pub fn emit(&self) {
        for diagnostic in &self.0 {
            warn!(
                kind = diagnostic.kind,
                object = %diagnostic.key,
                "{}",
                diagnostic.message
            );
        }
    }
}
