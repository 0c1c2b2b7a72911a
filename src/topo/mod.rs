//! 拓扑描述
//!
//! 邻接文本的解析与序列化。

mod parser;
mod topology;

pub use parser::{ParseError, ParsedTopology, parse_topology};
pub use topology::Topology;
