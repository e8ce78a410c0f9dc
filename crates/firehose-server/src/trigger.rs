//! Trigger options and the descriptive metadata shown to operators.
//!
//! None of this is consulted by dispatch; it describes the `event` option a
//! registration carries and renders a one-line summary of it.

use firehose_core::{FirehoseError, Result, WILDCARD};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Trigger name in the catalog.
pub const TRIGGER_NAME: &str = "firehose";

/// Schema `$id`.
pub const SCHEMA_ID: &str = "http://spica.internal/function/triggers/firehose/schema";

/// Capability flags a trigger advertises to the catalog.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TriggerFlag {
    /// Cannot be subscribed to from the outside; it is driven by client traffic.
    NotSubscribable,
}

/// Catalog entry for this trigger.
#[derive(Clone, Debug, Serialize)]
pub struct TriggerDescriptor {
    /// Trigger name.
    pub name: &'static str,
    /// Advertised flags.
    pub flags: Vec<TriggerFlag>,
}

/// The catalog entry for the firehose trigger.
pub fn descriptor() -> TriggerDescriptor {
    TriggerDescriptor {
        name: TRIGGER_NAME,
        flags: vec![TriggerFlag::NotSubscribable],
    }
}

/// Options of one registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirehoseOptions {
    /// `connection`, `close`, a custom event name, or `*`.
    pub event: String,
}

impl FirehoseOptions {
    /// Options for `event`.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
        }
    }

    /// Parse options from their JSON form, enforcing the schema shape:
    /// an object with a required string `event` and no other keys.
    pub fn from_value(value: Value) -> Result<Self> {
        if !value.is_object() {
            return Err(FirehoseError::InvalidOptions(
                "options must be an object".into(),
            ));
        }
        serde_json::from_value(value).map_err(|e| FirehoseError::InvalidOptions(e.to_string()))
    }

    /// Whether this registration listens to the wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.event == WILDCARD
    }
}

/// A label rendered next to a registration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Info {
    /// Material icon name.
    pub icon: String,
    /// Summary text.
    pub text: String,
    /// Presentation kind.
    #[serde(rename = "type")]
    pub kind: String,
}

/// JSON schema of [`FirehoseOptions`].
pub fn schema() -> Value {
    json!({
        "$id": SCHEMA_ID,
        "title": "Firehose",
        "description": "A low latency realtime trigger for functions",
        "type": "object",
        "required": ["event"],
        "properties": {
            "event": {
                "title": "Event",
                "description": "For connection events use 'connection' or 'close'. For custom events use the event name or '*' for all events.",
                "type": "string"
            }
        },
        "additionalProperties": false
    })
}

/// Operator-facing summary of `options`.
pub fn info(options: &FirehoseOptions) -> Vec<Info> {
    let text = if options.is_wildcard() {
        "Firehose: All events".to_owned()
    } else {
        format!("Firehose: on {}", options.event)
    };
    vec![Info {
        icon: "compare_arrows".into(),
        text,
        kind: "label".into(),
    }]
}
