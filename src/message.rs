//! The single outbound envelope every broadcast message is wrapped in.

use serde::Serialize;

use crate::errors::EncodeError;

/// An event name paired with its JSON payload, the wire shape every message
/// sent to a client takes.
#[derive(Debug, Serialize)]
pub struct Message<T> {
	event: String,
	payload: T,
}

impl<T: Serialize> Message<T> {
	/// Builds a message for `event`.
	#[must_use]
	pub fn new(event: impl Into<String>, payload: T) -> Self {
		Self { event: event.into(), payload }
	}

	/// Encodes this message as a JSON string, ready to hand to the hub.
	pub fn encode(&self) -> Result<String, EncodeError> {
		Ok(serde_json::to_string(self)?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn encodes_event_and_payload_as_a_flat_json_object() {
		let message = Message::new("stats:proportion:turnout", serde_json::json!({"turnout": 42}));
		let encoded = message.encode().unwrap();
		let value: serde_json::Value = serde_json::from_str(&encoded).unwrap();
		assert_eq!(value["event"], "stats:proportion:turnout");
		assert_eq!(value["payload"]["turnout"], 42);
	}
}
