//! What the HTTP front does with a request whose host has no route.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnmatchedHostPolicy {
    /// Forward to the request's own authority over plain HTTP, headers untouched.
    #[default]
    PassThrough,
    /// Answer 502 without contacting anything.
    Reject,
}

impl UnmatchedHostPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            UnmatchedHostPolicy::PassThrough => "pass-through",
            UnmatchedHostPolicy::Reject => "reject",
        }
    }
}

impl std::fmt::Display for UnmatchedHostPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
