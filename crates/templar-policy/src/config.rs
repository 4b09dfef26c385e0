use serde::{Deserialize, Serialize};

/// Options of the policy domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    /// Track parity of `x + y` templates in addition to single variables.
    pub track_sum_congruences: bool,
}
