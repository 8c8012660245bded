//! Per-request fetch context, passed unchanged through compile, execute, and
//! annotate. Relation context filters and annotators read it to scope results
//! to the current viewer.

/// The authenticated viewer, as resolved by the upstream auth layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: i64,
}

#[derive(Clone, Debug, Default)]
pub struct FetchContext {
    /// `None` is an anonymous viewer.
    pub user: Option<CurrentUser>,
}

impl FetchContext {
    pub fn anonymous() -> Self {
        FetchContext { user: None }
    }

    pub fn for_user(id: i64) -> Self {
        FetchContext {
            user: Some(CurrentUser { id }),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }
}
