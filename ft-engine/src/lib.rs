pub mod checker;
pub mod config;
pub mod error;
pub mod node;
pub mod path;
pub mod protocol;
pub mod server;
pub mod transport;
pub mod tree;

pub use error::FtError;
pub use node::{Node, NodeKind, Seed};
pub use path::FtPath;
pub use tree::{FileTree, Metrics, NodeStat};
