use std::fmt;

use serde::{Deserialize, Serialize};

/// A control-flow automaton location, identified by number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CfaNode(pub u32);

impl CfaNode {
    pub fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CfaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N{}", self.0)
    }
}
