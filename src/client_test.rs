use super::*;
use crate::error::TransportError;

fn client() -> WinetClient {
    WinetClient::new(ClientConfig::new("127.0.0.1:9")).expect("client")
}

#[tokio::test]
async fn new_client_is_disconnected_without_token() {
    let client = client();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert_eq!(client.token().await, "");
    assert!(client.pending_calls().is_empty());
}

#[tokio::test]
async fn call_while_disconnected_fails_and_withdraws() {
    let client = client();

    let err = client.get_state().await.expect_err("not connected");
    assert!(matches!(err, ClientError::Transport(TransportError::NotConnected)));
    assert!(!client.pending_calls().is_pending(SERVICE_STATE));
}

#[tokio::test]
async fn failed_handshake_keeps_empty_token() {
    let client = client();

    assert!(client.authenticate().await.is_err());
    assert_eq!(client.token().await, "");
}

#[test]
fn device_fields_carry_numeric_id() {
    let fields = device_fields(3);
    assert_eq!(fields.get("dev_id"), Some(&Value::from(3)));
}
