//! Plumbing shared by the HTTP-backed clients and tools.
//!
//! - a process-wide pool of `reqwest::Client`s, one per base URL, so connections
//!   are reused across agents and rounds
//! - [`send_and_track`], one chat completion round-trip with usage capture
//! - [`send_and_stream`], the same request with `"stream": true`, decoded from
//!   server-sent events into [`MessageChunk`]s as the bytes arrive

use crate::client_wrapper::{ClientError, MessageChunk, MessageChunkStream, TokenUsage};
use futures_util::{stream, Stream, StreamExt};
use lazy_static::lazy_static;
use openai_rust::chat;
use openai_rust2 as openai_rust;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

lazy_static! {
    static ref HTTP_CLIENT_POOL: Mutex<HashMap<String, reqwest::Client>> =
        Mutex::new(HashMap::new());
}

/// Get or create the shared HTTP client for `base_url`.
///
/// Clients keep idle connections for 90 seconds and send TCP keepalives, which
/// matters for multi-round discussions that call the same endpoint many times.
pub fn get_http_client(base_url: &str) -> reqwest::Client {
    let mut pool = HTTP_CLIENT_POOL
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(client) = pool.get(base_url) {
        return client.clone();
    }

    let client = reqwest::ClientBuilder::new()
        .pool_idle_timeout(Some(Duration::from_secs(90)))
        .pool_max_idle_per_host(10)
        .tcp_keepalive(Some(Duration::from_secs(60)))
        .timeout(Duration::from_secs(300))
        .build()
        .unwrap_or_else(|err| {
            log::warn!(
                "failed to build pooled HTTP client for {}: {}; using defaults",
                base_url,
                err
            );
            reqwest::Client::new()
        });

    pool.insert(base_url.to_string(), client.clone());
    client
}

/// Send a chat request, record its usage, and return the assistant's content.
pub async fn send_and_track(
    api: &openai_rust::Client,
    model: &str,
    formatted_msgs: Vec<chat::Message>,
    url_path: Option<String>,
    usage_slot: &Mutex<Option<TokenUsage>>,
) -> Result<String, ClientError> {
    let chat_arguments = chat::ChatArguments::new(model, formatted_msgs);

    match api.create_chat(chat_arguments, url_path).await {
        Ok(response) => {
            let usage = TokenUsage {
                input_tokens: response.usage.prompt_tokens as usize,
                output_tokens: response.usage.completion_tokens as usize,
                total_tokens: response.usage.total_tokens as usize,
            };
            *usage_slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(usage);

            response
                .choices
                .first()
                .map(|choice| choice.message.content.clone())
                .ok_or_else(|| ClientError::from("chat completion returned no choices"))
        }
        Err(err) => {
            log::error!("roundtable::clients::common::send_and_track(...): API error: {}", err);
            Err(format!("chat completion failed: {}", err).into())
        }
    }
}

/// Open a streamed chat completion against `url` and decode its event stream.
///
/// A non-2xx status is returned as an error carrying the status and the body.
/// Streamed responses carry no usage block, so nothing is recorded.
pub async fn send_and_stream(
    http: &reqwest::Client,
    url: &str,
    api_key: &str,
    model: &str,
    formatted_msgs: &[chat::Message],
) -> Result<MessageChunkStream, ClientError> {
    let messages: Vec<Value> = formatted_msgs
        .iter()
        .map(|msg| json!({ "role": msg.role, "content": msg.content }))
        .collect();
    let body = json!({
        "model": model,
        "messages": messages,
        "stream": true,
    });

    let response = http
        .post(url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let text = response.text().await.unwrap_or_default();
        log::error!("roundtable::clients::common::send_and_stream(...): HTTP {}: {}", status, text);
        return Err(format!("chat stream failed with HTTP {}: {}", status, text).into());
    }

    Ok(sse_chunk_stream(response.bytes_stream()))
}

/// One decoded event of a streamed chat completion.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StreamEvent {
    Delta { content: String, finished: bool },
    Done,
}

/// Decode one blank-line terminated event. Comments, keep-alives and payloads
/// without choices yield `None`.
pub(crate) fn parse_stream_event(event: &str) -> Option<StreamEvent> {
    let data = event
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim_start)
        .collect::<Vec<_>>()
        .join("\n");
    if data.is_empty() {
        return None;
    }
    if data.trim() == "[DONE]" {
        return Some(StreamEvent::Done);
    }

    let value: Value = serde_json::from_str(&data).ok()?;
    let choice = value.get("choices")?.get(0)?;
    let content = choice
        .pointer("/delta/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let finished = choice
        .get("finish_reason")
        .map_or(false, |reason| !reason.is_null());
    Some(StreamEvent::Delta { content, finished })
}

/// Turn a raw byte stream of server-sent events into message chunks.
///
/// Bytes are buffered until a blank line closes an event, so events and UTF-8
/// sequences split across network reads decode intact. The stream ends after the
/// first final chunk: a `finish_reason`, the `[DONE]` marker or the end of the
/// body, whichever comes first.
pub(crate) fn sse_chunk_stream<S, B, E>(bytes: S) -> MessageChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let state = (Box::pin(bytes), Vec::<u8>::new(), false);
    let chunks = stream::unfold(state, |(mut bytes, mut buffer, done)| async move {
        if done {
            return None;
        }
        loop {
            if let Some(end) = buffer.windows(2).position(|pair| pair == b"\n\n") {
                let raw: Vec<u8> = buffer.drain(..end + 2).collect();
                let event = String::from_utf8_lossy(&raw);
                match parse_stream_event(&event) {
                    Some(StreamEvent::Done) => {
                        let last = MessageChunk {
                            content: String::new(),
                            is_final: true,
                        };
                        return Some((Ok(last), (bytes, buffer, true)));
                    }
                    Some(StreamEvent::Delta { content, finished }) => {
                        if content.is_empty() && !finished {
                            continue;
                        }
                        let chunk = MessageChunk {
                            content,
                            is_final: finished,
                        };
                        return Some((Ok(chunk), (bytes, buffer, finished)));
                    }
                    None => continue,
                }
            }

            match bytes.next().await {
                Some(Ok(data)) => {
                    buffer.extend(data.as_ref().iter().copied().filter(|byte| *byte != b'\r'));
                }
                Some(Err(err)) => {
                    let err = ClientError::from(format!("chat stream interrupted: {}", err));
                    return Some((Err(err), (bytes, buffer, true)));
                }
                None => {
                    // body closed without [DONE]; flush whatever is left
                    let rest = String::from_utf8_lossy(&buffer).into_owned();
                    let content = match parse_stream_event(&rest) {
                        Some(StreamEvent::Delta { content, .. }) => content,
                        _ => String::new(),
                    };
                    let last = MessageChunk {
                        content,
                        is_final: true,
                    };
                    return Some((Ok(last), (bytes, Vec::new(), true)));
                }
            }
        }
    });
    Box::pin(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({ "choices": [{ "index": 0, "delta": { "content": content }, "finish_reason": null }] })
        )
    }

    fn from_reads(reads: Vec<Vec<u8>>) -> MessageChunkStream {
        sse_chunk_stream(stream::iter(reads.into_iter().map(Ok::<_, std::io::Error>)))
    }

    async fn collect(chunks: MessageChunkStream) -> Vec<Result<MessageChunk, String>> {
        chunks
            .map(|chunk| chunk.map_err(|err| err.to_string()))
            .collect()
            .await
    }

    #[test]
    fn test_parse_stream_event() {
        assert_eq!(
            parse_stream_event(&delta("Hel")),
            Some(StreamEvent::Delta {
                content: "Hel".to_string(),
                finished: false
            })
        );
        assert_eq!(parse_stream_event("data: [DONE]\n\n"), Some(StreamEvent::Done));
        assert_eq!(
            parse_stream_event(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#),
            Some(StreamEvent::Delta {
                content: String::new(),
                finished: true
            })
        );
        assert_eq!(parse_stream_event(": keep-alive\n\n"), None);
        assert_eq!(parse_stream_event("data: {not json}\n\n"), None);
        assert_eq!(parse_stream_event(r#"data: {"choices":[]}"#), None);
    }

    #[tokio::test]
    async fn test_deltas_split_across_reads() {
        let body = format!(
            ": keep-alive\n\n{}{}{}data: [DONE]\n\n",
            delta(""),
            delta("Caching "),
            delta("héllo")
        );
        let bytes = body.into_bytes();
        // cut inside the JSON and inside the two-byte 'é'
        let cut_a = 20;
        let cut_b = bytes.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let reads = vec![
            bytes[..cut_a].to_vec(),
            bytes[cut_a..cut_b].to_vec(),
            bytes[cut_b..].to_vec(),
        ];

        let chunks = collect(from_reads(reads)).await;
        let chunks: Vec<MessageChunk> = chunks.into_iter().map(Result::unwrap).collect();
        let text: String = chunks.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(text, "Caching héllo");
        assert_eq!(chunks.len(), 3);
        assert!(chunks.last().unwrap().is_final);
        assert!(chunks[..2].iter().all(|c| !c.is_final));
    }

    #[tokio::test]
    async fn test_finish_reason_ends_the_stream_and_crlf_is_accepted() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"},\"finish_reason\":\"stop\"}]}\r\n\r\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\r\n\r\n",
        );
        let chunks = collect(from_reads(vec![body.as_bytes().to_vec()])).await;
        assert_eq!(
            chunks,
            vec![Ok(MessageChunk {
                content: "ok".to_string(),
                is_final: true
            })]
        );
    }

    #[tokio::test]
    async fn test_unterminated_body_is_flushed_as_final() {
        let body = format!("{}data: {}", delta("partial "), json!({ "choices": [{ "delta": { "content": "tail" } }] }));
        let chunks = collect(from_reads(vec![body.into_bytes()])).await;
        let contents: Vec<(String, bool)> = chunks
            .into_iter()
            .map(|c| c.map(|c| (c.content, c.is_final)).unwrap())
            .collect();
        assert_eq!(
            contents,
            vec![("partial ".to_string(), false), ("tail".to_string(), true)]
        );
    }

    #[tokio::test]
    async fn test_read_error_is_reported_once() {
        let reads = vec![
            Ok(delta("so far").into_bytes()),
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer")),
        ];
        let chunks = collect(sse_chunk_stream(stream::iter(reads))).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].as_ref().unwrap().content, "so far");
        assert_eq!(
            chunks[1].as_ref().unwrap_err(),
            "chat stream interrupted: reset by peer"
        );
    }

    #[test]
    fn test_pool_builds_client_per_base_url() {
        let _a = get_http_client("https://a.example.com");
        let _b = get_http_client("https://b.example.com");
        let _a_again = get_http_client("https://a.example.com");

        let pool = HTTP_CLIENT_POOL.lock().unwrap();
        assert!(pool.contains_key("https://a.example.com"));
        assert!(pool.contains_key("https://b.example.com"));
    }
}
