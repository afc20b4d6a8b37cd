//! Health probe against a running server.

use std::time::Duration;

use anyhow::Context;
use console::style;
use serde_json::Value;

/// Fetch `{url}/health`, failing when the server reports a problem.
pub async fn cmd_check_health(url: &str) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()?;

    let endpoint = format!("{}/health", url.trim_end_matches('/'));
    let response = client
        .get(&endpoint)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", endpoint))?;

    let status = response.status();
    let body: Value = response.json().await.unwrap_or(Value::Null);

    if !status.is_success() {
        eprintln!("{} {} returned {}", style("✗").red(), endpoint, status);
        anyhow::bail!("Server is unhealthy: {}", body);
    }

    println!("{} {} returned {}", style("✓").green(), endpoint, status);
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
