//! Declarative entity-view resolution: fetch specs, view descriptions, plan
//! compilation, path resolution, and execution.

pub mod annotate;
pub mod description;
pub mod executor;
pub mod filter;
pub mod path;
pub mod plan;
pub mod spec;

pub use annotate::Annotator;
pub use description::ViewDescription;
pub use executor::execute_view;
pub use filter::RelationFilters;
pub use path::resolve_at_path;
pub use plan::{compile, AnnotationStep, FetchPlan, FilteredPopulate};
pub use spec::{
    Cardinality, EntityFetchSpec, FetchSpecRegistry, FetchSpecRegistryBuilder, FieldFetchSpec,
    RelationSpec, TableMeta,
};
