#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod builder;
mod context;
mod engine;

pub use self::builder::{build_input, BuildError, ProxyInput};
pub use self::context::{match_context, proxy_context};
pub use self::engine::{RenderError, Renderer, VarRenderer};
