/// Smoke-test for `ReqwestTransport` behind the resilient client.
///
/// Warms a session on the target host, fetches the URL and prints what came
/// back. Settings come from `SNIFFER_*` variables.
///
/// Run with:
///   cargo run -p sniffer-client --example live_smoke -- https://www.fravega.com/
use sniffer_client::ReqwestTransport;
use sniffer_core::{FetchClient, RequestOptions, SnifferConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sniffer_core=debug".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "https://example.com/".to_string());

    let config = SnifferConfig::from_env()?;
    let transport = ReqwestTransport::new(config.transport.clone())?;
    let client = FetchClient::new(transport, config.client_for("smoke"));

    println!("Fetching {url} …");
    let response = client.get(&url, &RequestOptions::default()).await?;
    println!(
        "HTTP {} from {} ({} bytes, profile {})",
        response.status,
        response.url,
        response.body.len(),
        client.transport().profile_name().await
    );

    let stats = client.breaker().stats();
    println!("Breaker '{}': {}", stats.name, stats.state);

    client.close().await;
    Ok(())
}
