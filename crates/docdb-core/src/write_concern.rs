use crate::error::{CoreError, CoreResult};
use crate::values::{as_flag, as_integer, Document, Value};
use serde::{Deserialize, Serialize};

/// How many members must acknowledge a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Acknowledgment {
    Unacknowledged,
    Nodes(u32),
    Majority,
}

/// The acknowledgment level requested for a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteConcern {
    #[serde(default = "default_w")]
    pub w: Acknowledgment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wtimeout_ms: Option<u64>,
    #[serde(default)]
    pub journal: bool,
}

fn default_w() -> Acknowledgment {
    Acknowledgment::Nodes(1)
}

impl Default for WriteConcern {
    fn default() -> Self {
        Self::acknowledged()
    }
}

impl WriteConcern {
    pub fn acknowledged() -> Self {
        Self {
            w: default_w(),
            wtimeout_ms: None,
            journal: false,
        }
    }

    pub fn unacknowledged() -> Self {
        Self {
            w: Acknowledgment::Unacknowledged,
            wtimeout_ms: None,
            journal: false,
        }
    }

    pub fn is_acknowledged(&self) -> bool {
        self.w != Acknowledgment::Unacknowledged
    }

    /// Parse a `writeConcern` command document: `{w, wtimeout, j}`.
    pub fn from_document(doc: &Document) -> CoreResult<Self> {
        let w = match doc.get("w") {
            None => default_w(),
            Some(Value::String(s)) if s == "majority" => Acknowledgment::Majority,
            Some(value) => match as_integer(value) {
                Some(0) => Acknowledgment::Unacknowledged,
                Some(n) if n > 0 => Acknowledgment::Nodes(u32::try_from(n).map_err(|_| {
                    CoreError::InvalidArgument(format!("w value out of range: {n}"))
                })?),
                _ => {
                    return Err(CoreError::InvalidArgument(format!(
                        "unsupported write concern w: {value}"
                    )))
                }
            },
        };
        let wtimeout_ms = match doc.get("wtimeout") {
            None => None,
            Some(value) => match as_integer(value) {
                Some(0) => None,
                Some(ms) if ms > 0 => Some(ms as u64),
                _ => {
                    return Err(CoreError::InvalidArgument(format!(
                        "wtimeout must be a non-negative integer: {value}"
                    )))
                }
            },
        };
        let journal = doc.get("j").and_then(as_flag).unwrap_or(false);
        Ok(Self {
            w,
            wtimeout_ms,
            journal,
        })
    }
}
