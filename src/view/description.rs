//! Caller-authored view descriptions: which fields and nested relations an
//! endpoint wants for one response shape.

/// A declarative selection tree. Each endpoint declares one statically; the
/// compiler validates it against the entity's fetch spec per request.
///
/// Relation declaration order is preserved; annotation steps run in
/// depth-first declaration order.
#[derive(Clone, Debug, Default)]
pub struct ViewDescription {
    pub fields: Vec<String>,
    pub relations: Vec<(String, ViewDescription)>,
}

impl ViewDescription {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ViewDescription {
            fields: fields.into_iter().map(Into::into).collect(),
            relations: Vec::new(),
        }
    }

    /// Add a nested relation sub-view. A bare field list is shorthand for a
    /// fields-only sub-view.
    pub fn relation(mut self, key: impl Into<String>, sub: impl Into<ViewDescription>) -> Self {
        self.relations.push((key.into(), sub.into()));
        self
    }

    /// One-line rendering for error messages.
    pub(crate) fn summary(&self) -> String {
        let mut parts = self.fields.clone();
        parts.extend(self.relations.iter().map(|(k, _)| format!("{k}.*")));
        format!("[{}]", parts.join(", "))
    }
}

impl<S: Into<String>> From<Vec<S>> for ViewDescription {
    fn from(fields: Vec<S>) -> Self {
        ViewDescription::fields(fields)
    }
}

impl<S: Into<String> + Clone, const N: usize> From<[S; N]> for ViewDescription {
    fn from(fields: [S; N]) -> Self {
        ViewDescription::fields(fields.to_vec())
    }
}
