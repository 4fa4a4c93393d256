//! Producer and consumer adapters for the durable message broker (§4.2).

mod consumer;
mod publisher;

pub use consumer::{Consumer, Delivery};
pub use gateway_core::schema::queue;
pub use publisher::Publisher;

#[cfg(test)]
mod tests {
    use gateway_core::QueueMessage;

    #[test]
    fn queue_message_round_trips_through_json() {
        let message = QueueMessage {
            workflow_id: "W1".into(),
            workspace_id: "S1".into(),
            job_id: "J1".into(),
            input_file_grp: "DEFAULT".into(),
        };
        let bytes = serde_json::to_vec(&message).unwrap();
        let parsed: QueueMessage = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(parsed.job_id, "J1");
    }

    #[test]
    fn unknown_fields_in_payload_are_ignored() {
        let raw = br#"{"workflow_id":"W1","workspace_id":"S1","job_id":"J1","input_file_grp":"DEFAULT","extra":"ignored"}"#;
        let parsed: QueueMessage = serde_json::from_slice(raw).unwrap();
        assert_eq!(parsed.workflow_id, "W1");
    }

    #[test]
    fn malformed_payload_fails_to_parse() {
        let raw = b"not-json";
        let result: Result<QueueMessage, _> = serde_json::from_slice(raw);
        assert!(result.is_err());
    }
}
