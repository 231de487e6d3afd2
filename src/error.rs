//! Error taxonomy for cooking.
//!
//! Cook failures are values, not panics: every node cook resolves to a
//! `CookResult`, and the job decides per variant whether the failure is
//! local to a node or aborts the pass.
//!
//! | variant        | scope                                   |
//! |----------------|-----------------------------------------|
//! | `Node`         | one node's transform failed             |
//! | `Compile`      | script node could not compile its source|
//! | `Upstream`     | an input came from a failed node        |
//! | `Circular`     | static cycle, aborts the whole job      |
//! | `Reentrant`    | evaluation re-entered a node            |
//! | `MissingNode`  | a referenced path does not resolve      |
//! | `Deadlock`     | worklist stalled (internal invariant)   |
//! | `Internal`     | any other invariant violation           |
//! | `Canceled`     | job was superseded                      |

use thiserror::Error;

use crate::geometry::AttributeError;
use crate::graph::NodePath;

pub type CookResult<T> = Result<T, CookError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CookError {
    #[error("{0}")]
    Node(String),
    #[error("compile error{}: {message}", location_hint(.line, .column))]
    Compile {
        message: String,
        line: Option<u32>,
        column: Option<u32>,
    },
    #[error("circular dependency: {}", format_cycle(.cycle))]
    Circular { cycle: Vec<NodePath> },
    #[error("upstream node {path} failed")]
    Upstream { path: NodePath },
    #[error("node {0} re-entered while resolving")]
    Reentrant(NodePath),
    #[error("no node at {0}")]
    MissingNode(NodePath),
    #[error("cook worklist deadlocked with {0} nodes remaining")]
    Deadlock(usize),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("cook canceled")]
    Canceled,
    #[error(transparent)]
    Attribute(#[from] AttributeError),
}

impl CookError {
    /// Create a node-level error from any message.
    pub fn node(msg: impl Into<String>) -> Self {
        CookError::Node(msg.into())
    }

    /// Fatal errors abort the current job; everything else stays local to a node.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CookError::Deadlock(_) | CookError::Internal(_))
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, CookError::Upstream { .. })
    }
}

impl From<crate::host::CompileError> for CookError {
    fn from(err: crate::host::CompileError) -> Self {
        CookError::Compile {
            message: err.message,
            line: err.line,
            column: err.column,
        }
    }
}

fn location_hint(line: &Option<u32>, column: &Option<u32>) -> String {
    match (*line, *column) {
        (Some(l), Some(c)) => format!(" at {}:{}", l, c),
        (Some(l), None) => format!(" at line {}", l),
        _ => String::new(),
    }
}

fn format_cycle(cycle: &[NodePath]) -> String {
    cycle
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_location() {
        let err = CookError::Compile {
            message: "unexpected token".into(),
            line: Some(3),
            column: Some(7),
        };
        assert_eq!(err.to_string(), "compile error at 3:7: unexpected token");
    }

    #[test]
    fn test_cycle_message() {
        let err = CookError::Circular {
            cycle: vec![NodePath::parse("/a"), NodePath::parse("/b"), NodePath::parse("/a")],
        };
        assert_eq!(err.to_string(), "circular dependency: /a -> /b -> /a");
        assert!(!err.is_fatal());
        assert!(CookError::Deadlock(2).is_fatal());
    }
}
