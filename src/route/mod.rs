//! 静态路由

mod compiler;

pub use compiler::{DEFAULT_TABLE_BASE, RouteMode, RouteOptions, RoutingCompiler};
