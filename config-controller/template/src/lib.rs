#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod registry;
mod resolver;

pub use self::registry::{Entry, Registry};
pub use self::resolver::{
    resolve_namespace_templates, resolve_service_color_templates, NamespaceRequest, ResolveError,
    ServiceColorRequest,
};
