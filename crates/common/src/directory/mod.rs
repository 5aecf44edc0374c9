//! The node directory: resolves a key to the nearest enclosing node that
//! offers a capability, the way a filesystem resolves inherited permissions.

mod node;
mod registry;

pub use node::{Capability, DataNode, ExecutableNode, Node, NodeKind, NodeRef, SchemaNode};
pub use registry::NodeRegistry;
