//! Lingua SDK: declarative entity-view resolution backend for a
//! language-learning content platform.

pub mod case;
pub mod context;
pub mod entities;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod record;
pub mod repo;
pub mod response;
pub mod routes;
pub mod sql;
pub mod state;
pub mod view;

pub use context::{CurrentUser, FetchContext};
pub use error::{AppError, SpecError, ViewError};
pub use record::{Populated, Record};
pub use repo::{PgRepository, Repository};
pub use response::{success_many, success_one};
pub use routes::{common_routes_with_ready, content_routes};
pub use state::AppState;
pub use view::{
    compile, execute_view, resolve_at_path, Annotator, Cardinality, EntityFetchSpec, FetchPlan,
    FetchSpecRegistry, FieldFetchSpec, RelationFilters, RelationSpec, TableMeta, ViewDescription,
};
