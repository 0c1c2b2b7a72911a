pub mod dispatch;
pub mod net;
pub mod role;
pub mod route;
pub mod tc;
pub mod testbed;
pub mod topo;
pub mod viz;

#[cfg(test)]
mod test;
