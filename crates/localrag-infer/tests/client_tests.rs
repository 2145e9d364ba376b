use localrag_core::config::InferenceSettings;
use localrag_core::traits::InferenceClient;
use localrag_core::types::GenerateRequest;
use localrag_infer::OllamaClient;

fn unreachable_settings() -> InferenceSettings {
    InferenceSettings {
        // Port 9 (discard) on loopback refuses connections on typical hosts.
        base_url: "http://127.0.0.1:9/".into(),
        timeout_secs: 2,
        fallback_models: vec!["alpha".into(), "beta".into()],
        ..InferenceSettings::default()
    }
}

#[tokio::test]
async fn list_models_falls_back_when_backend_is_down() {
    let client = OllamaClient::new(&unreachable_settings()).expect("client");
    assert_eq!(client.list_models().await, vec!["alpha".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn generate_surfaces_connection_failure_as_error() {
    let client = OllamaClient::new(&unreachable_settings()).expect("client");
    let req = GenerateRequest::new("alpha", "hi");
    assert!(client.generate(&req).await.is_err());
    assert!(client.generate_stream(&req).await.is_err());
}

#[test]
fn trailing_slash_is_trimmed_from_base_url() {
    let client = OllamaClient::new(&unreachable_settings()).expect("client");
    assert_eq!(client.base_url(), "http://127.0.0.1:9");
}
