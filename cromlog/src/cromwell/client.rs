use anyhow::{bail, Context};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use url::Url;

use super::{credentials::Credentials, metadata::WorkflowMetadata};

pub const API_VERSION: &str = "v1";
const WORKFLOW_ID_PREFIX: &str = "cromwell-";
const JSON_MIME: &str = "application/json";

/// Strips the `cromwell-` prefix AWS Batch job names carry, so IDs can be
/// pasted from either place.
pub fn normalize_workflow_id(workflow_id: &str) -> &str {
    workflow_id
        .strip_prefix(WORKFLOW_ID_PREFIX)
        .unwrap_or(workflow_id)
}

pub fn make_metadata_url(
    server_url: &str,
    workflow_id: &str,
) -> anyhow::Result<Url> {
    let base = server_url.strip_suffix('/').unwrap_or(server_url);
    let mut url = Url::parse(&format!(
        "{base}/api/workflows/{API_VERSION}/{workflow_id}/metadata"
    ))
    .with_context(|| format!("Invalid Cromwell server URL: {server_url}"))?;
    url.query_pairs_mut().append_pair("expandSubWorkflows", "true");
    Ok(url)
}

/// Fetches the metadata of a workflow, with sub-workflows expanded.
#[tracing::instrument(level = "debug", skip(credentials))]
pub async fn fetch_metadata(
    credentials: &Credentials,
    workflow_id: &str,
) -> anyhow::Result<WorkflowMetadata> {
    let url = make_metadata_url(
        &credentials.url,
        normalize_workflow_id(workflow_id),
    )?;

    tracing::debug!(%url, "Calling Cromwell API...");
    let res = reqwest::Client::new()
        .get(url.clone())
        .header(CONTENT_TYPE, JSON_MIME)
        .header(ACCEPT, JSON_MIME)
        .basic_auth(&credentials.username, Some(&credentials.password))
        .send()
        .await
        .with_context(|| format!("Failed to reach Cromwell at {url}"))?;

    let code = res.status();
    tracing::debug!(status = ?code, "Cromwell API call completed");
    let res = res
        .text()
        .await
        .with_context(|| format!("Failed to read response from {url}"))?;
    tracing::trace!(response = %res, "Cromwell API response received");

    if !code.is_success() {
        bail!(
            "Failed to fetch workflow metadata!\nCode: {code}\nResponse: {res}"
        );
    }

    let metadata: WorkflowMetadata = serde_json::from_str(&res)
        .with_context(|| {
            format!("Failed to parse workflow metadata from {url}")
        })?;
    tracing::info!(
        status = %metadata.status,
        calls = metadata.calls.len(),
        "Workflow metadata loaded"
    );

    Ok(metadata)
}

#[test]
fn metadata_url_test() -> anyhow::Result<()> {
    let expected = "https://cromwell.example.org/api/workflows/v1/\
                    36d9d431-02c7/metadata?expandSubWorkflows=true";
    assert_eq!(
        make_metadata_url("https://cromwell.example.org", "36d9d431-02c7")?
            .as_str(),
        expected
    );
    assert_eq!(
        make_metadata_url("https://cromwell.example.org/", "36d9d431-02c7")?
            .as_str(),
        expected
    );
    assert!(make_metadata_url("not a url", "id").is_err());
    Ok(())
}

#[test]
fn normalize_workflow_id_test() {
    assert_eq!(normalize_workflow_id("cromwell-66431c43"), "66431c43");
    assert_eq!(normalize_workflow_id("66431c43"), "66431c43");
}

/// Serves one canned HTTP response on a local port and hands back the raw
/// request it received.
#[cfg(test)]
async fn serve_once(
    response: impl Into<String>,
) -> anyhow::Result<(String, tokio::task::JoinHandle<String>)> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let response = response.into();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let url = format!("http://{}", listener.local_addr()?);
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0; 8192];
        let n = socket.read(&mut buf).await.unwrap();
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    });
    Ok((url, handle))
}

#[cfg(test)]
fn test_credentials(url: String) -> Credentials {
    Credentials {
        url,
        username: "cromwell".into(),
        password: "secret".into(),
    }
}

#[tokio::test]
async fn fetch_metadata_sends_authorized_request() -> anyhow::Result<()> {
    let body = r#"{"status":"Failed","calls":{"Wf.Task":[]}}"#;
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let (url, server) = serve_once(response).await?;

    let metadata =
        fetch_metadata(&test_credentials(url), "cromwell-66431c43").await?;
    assert!(metadata.is_failed());
    assert_eq!(metadata.calls.len(), 1);

    let request = server.await?;
    assert!(
        request.starts_with(
            "GET /api/workflows/v1/66431c43/metadata?expandSubWorkflows=true"
        ),
        "{request}"
    );
    assert!(request.to_lowercase().contains("authorization: basic"));
    Ok(())
}

#[tokio::test]
async fn fetch_metadata_reports_status_and_body() -> anyhow::Result<()> {
    let (url, _server) = serve_once(
        "HTTP/1.1 404 Not Found\r\nContent-Length: 17\r\n\
         Connection: close\r\n\r\nUnrecognized id 1",
    )
    .await?;

    let err = fetch_metadata(&test_credentials(url), "1")
        .await
        .unwrap_err()
        .to_string();
    assert!(err.contains("Code: 404"), "{err}");
    assert!(err.contains("Unrecognized id 1"), "{err}");
    Ok(())
}

#[tokio::test]
async fn truncated_body_names_the_url() -> anyhow::Result<()> {
    let (url, _server) = serve_once(
        "HTTP/1.1 200 OK\r\nContent-Length: 64\r\n\
         Connection: close\r\n\r\n{\"status\"",
    )
    .await?;

    let err = fetch_metadata(&test_credentials(url.clone()), "wf-1")
        .await
        .unwrap_err()
        .to_string();
    assert!(err.starts_with("Failed to read response from"), "{err}");
    assert!(err.contains(&url), "{err}");
    Ok(())
}
