use crate::error::{LlmError, Result};
use crate::llm::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use async_stream::try_stream;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::debug;

/// 发送 JSON 请求并把非 2xx 响应转换成 `ApiError`
pub(crate) async fn send_json<B: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    header_map: HeaderMap,
    body: &B,
) -> Result<Response> {
    let response = client.post(url).headers(header_map).json(body).send().await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        return Err(LlmError::ApiError {
            status,
            message: error_text,
        }
        .into());
    }
    Ok(response)
}

/// POST 并把响应体解析为 `R`
pub(crate) async fn post_json<B, R>(
    client: &Client,
    url: &str,
    header_map: HeaderMap,
    body: &B,
) -> Result<R>
where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
{
    send_json(client, url, header_map, body)
        .await?
        .json::<R>()
        .await
        .map_err(|e| LlmError::InvalidResponse(e.to_string()).into())
}

pub async fn post(
    client: Arc<Client>,
    request_body: &ChatCompletionRequest,
    header_map: HeaderMap,
    url: &str,
) -> Result<ChatCompletionResponse> {
    let completion_response: ChatCompletionResponse =
        post_json(&client, url, header_map, request_body).await?;

    debug!(
        id = %completion_response.id,
        choices = completion_response.choices.len(),
        "Post completion response"
    );

    Ok(completion_response)
}

/// 发起 SSE 流式请求，逐个产出 [`ChatCompletionChunk`]
pub async fn post_stream(
    client: Arc<Client>,
    request_body: &ChatCompletionRequest,
    header_map: HeaderMap,
    url: &str,
) -> Result<impl Stream<Item = Result<ChatCompletionChunk>> + Send + 'static> {
    let response = send_json(&client, url, header_map, request_body).await?;
    let mut bytes = response.bytes_stream();

    Ok(try_stream! {
        let mut buffer: Vec<u8> = Vec::new();
        'outer: while let Some(piece) = bytes.next().await {
            let piece = piece?;
            buffer.extend_from_slice(&piece);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_line(&line)? {
                    Some(SseEvent::Chunk(chunk)) => yield chunk,
                    Some(SseEvent::Done) => break 'outer,
                    None => {}
                }
            }
        }
    })
}

/// SSE 中一行 `data:` 的解析结果
#[derive(Debug)]
pub(crate) enum SseEvent {
    Chunk(ChatCompletionChunk),
    Done,
}

/// 解析一行 SSE 文本；空行、注释行和非 `data:` 字段返回 `None`
pub(crate) fn parse_sse_line(line: &str) -> Result<Option<SseEvent>> {
    let line = line.trim();
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }
    let chunk = serde_json::from_str::<ChatCompletionChunk>(data)
        .map_err(|e| LlmError::InvalidResponse(format!("bad stream chunk: {e}")))?;
    Ok(Some(SseEvent::Chunk(chunk)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sse_content_line() {
        let line = r#"data: {"id":"c1","choices":[{"delta":{"content":"Hi"},"index":0}]}"#;
        match parse_sse_line(line).unwrap() {
            Some(SseEvent::Chunk(chunk)) => {
                assert_eq!(chunk.id, "c1");
                assert_eq!(chunk.choices[0].delta.content.as_deref(), Some("Hi"));
            }
            other => panic!("应该解析出 chunk: {:?}", other),
        }
    }

    #[test]
    fn test_parse_sse_done_and_noise() {
        assert!(matches!(
            parse_sse_line("data: [DONE]").unwrap(),
            Some(SseEvent::Done)
        ));
        assert!(parse_sse_line("").unwrap().is_none());
        assert!(parse_sse_line(": keep-alive").unwrap().is_none());
        assert!(parse_sse_line("event: message").unwrap().is_none());
    }

    #[test]
    fn test_parse_sse_malformed_is_collaborator_error() {
        let err = parse_sse_line("data: {not json").unwrap_err();
        assert!(err.is_collaborator());
    }
}
