mod dispatch;
mod route_compiler;
mod viz;
