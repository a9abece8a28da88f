use std::future::Future;

use aws_sdk_cloudwatchlogs::Client;

use super::config::{AwsConfigProvider, LogGroupProvider};
use crate::inspect::LogEvent;

/// Reads a whole log stream from the beginning.
#[tracing::instrument(level = "debug", skip(config))]
pub async fn get_log_events(
    config: &(impl AwsConfigProvider + LogGroupProvider),
    log_stream_name: &str,
) -> anyhow::Result<Vec<LogEvent>> {
    let client = Client::new(config.get_aws_config());

    let events = read_all_pages(|next_token| {
        let req = client
            .get_log_events()
            .log_group_name(config.get_log_group_name())
            .log_stream_name(log_stream_name)
            .start_from_head(true)
            .set_next_token(next_token);
        async move {
            let res = req.send().await?;
            let page: Vec<LogEvent> = res
                .events
                .unwrap_or_default()
                .into_iter()
                .map(|e| LogEvent {
                    timestamp: e.timestamp,
                    message: e.message.unwrap_or_default(),
                })
                .collect();
            anyhow::Ok((page, res.next_forward_token))
        }
    })
    .await?;

    tracing::debug!(count = events.len(), "Loaded log events.");

    Ok(events)
}

/// Calls `fetch` with the previous forward token until the stream is
/// exhausted and concatenates the pages in order.
async fn read_all_pages<F, Fut>(mut fetch: F) -> anyhow::Result<Vec<LogEvent>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = anyhow::Result<(Vec<LogEvent>, Option<String>)>>,
{
    let mut events = vec![];
    let mut next_token: Option<String> = None;

    loop {
        let (page, forward_token) = fetch(next_token.clone()).await?;
        tracing::trace!(count = page.len(), "Received log events page.");
        events.extend(page);

        // The forward token stays the same once the end of the stream is
        // reached.
        match forward_token {
            Some(token) if next_token.as_deref() != Some(token.as_str()) => {
                next_token = Some(token)
            },
            _ => break,
        }
    }

    Ok(events)
}

/// Token the page is expected to be requested with, its messages, and the
/// forward token it returns.
#[cfg(test)]
type ScriptedPage =
    (Option<&'static str>, Vec<&'static str>, Option<&'static str>);

#[cfg(test)]
fn scripted_pages(pages: Vec<ScriptedPage>) -> impl FnMut(
    Option<String>,
) -> std::future::Ready<anyhow::Result<(Vec<LogEvent>, Option<String>)>> {
    let mut pages = pages.into_iter();
    move |token| {
        let (expected_token, messages, forward) =
            pages.next().expect("fetched past the last page");
        assert_eq!(token.as_deref(), expected_token);
        let page = messages
            .iter()
            .map(|m| LogEvent {
                timestamp: None,
                message: m.to_string(),
            })
            .collect();
        std::future::ready(Ok((page, forward.map(str::to_string))))
    }
}

#[cfg(test)]
fn messages(events: &[LogEvent]) -> Vec<&str> {
    events.iter().map(|e| e.message.as_str()).collect()
}

#[tokio::test]
async fn pages_are_concatenated_in_order() -> anyhow::Result<()> {
    let events = read_all_pages(scripted_pages(vec![
        (None, vec!["a", "b"], Some("t1")),
        (Some("t1"), vec!["c"], Some("t2")),
        (Some("t2"), vec!["d", "e"], Some("t3")),
        (Some("t3"), vec![], Some("t3")),
    ]))
    .await?;
    assert_eq!(messages(&events), vec!["a", "b", "c", "d", "e"]);
    Ok(())
}

#[tokio::test]
async fn repeated_token_ends_the_stream() -> anyhow::Result<()> {
    let events = read_all_pages(scripted_pages(vec![
        (None, vec!["a"], Some("t1")),
        (Some("t1"), vec!["b"], Some("t1")),
    ]))
    .await?;
    assert_eq!(messages(&events), vec!["a", "b"]);
    Ok(())
}

#[tokio::test]
async fn missing_token_ends_the_stream() -> anyhow::Result<()> {
    let events = read_all_pages(scripted_pages(vec![
        (None, vec!["a"], Some("t1")),
        (Some("t1"), vec!["b"], None),
    ]))
    .await?;
    assert_eq!(messages(&events), vec!["a", "b"]);
    Ok(())
}

#[tokio::test]
async fn empty_first_page_keeps_following_tokens() -> anyhow::Result<()> {
    let events = read_all_pages(scripted_pages(vec![
        (None, vec![], Some("t1")),
        (Some("t1"), vec!["late"], Some("t1")),
    ]))
    .await?;
    assert_eq!(messages(&events), vec!["late"]);
    Ok(())
}

#[tokio::test]
async fn page_error_is_returned() {
    let err = read_all_pages(|_| async {
        Err::<(Vec<LogEvent>, Option<String>), _>(anyhow::anyhow!(
            "ResourceNotFoundException"
        ))
    })
    .await
    .unwrap_err();
    assert!(err.to_string().contains("ResourceNotFound"), "{err}");
}
