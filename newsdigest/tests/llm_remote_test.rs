use std::sync::Arc;

use mockito::Matcher;
use newsdigest::article::{RawArticle, Section, SummarizedArticle};
use newsdigest::errors::ProviderError;
use newsdigest::llm::remote::RemoteLlmProvider;
use newsdigest::llm::summarizer::{LlmSummarizer, PromptStyle};
use newsdigest::llm::{LlmProvider, LlmRequest};
use newsdigest::summarize::SummarizationPort;

fn chat_reply(content: &str) -> String {
    serde_json::json!({
        "model": "gpt-4o-mini",
        "choices": [{
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150 }
    })
    .to_string()
}

fn article(n: usize) -> RawArticle {
    RawArticle::new("feed:test", format!("https://news.example/{n}"), format!("Story number {n}"), "rust")
        .with_snippet(format!("Body of story {n}."))
}

#[tokio::test]
async fn test_remote_provider_with_mock() {
    let mut server = mockito::Server::new_async().await;

    // Mock successful OpenAI response
    let mock = server
        .mock("POST", "/")
        .match_header("authorization", "Bearer fake-api-key")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "gpt-4o-mini",
            "max_tokens": 100,
            "messages": [
                { "role": "system", "content": "Be brief" },
                { "role": "user", "content": "Test prompt" }
            ]
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{
                "model": "gpt-4o-mini",
                "choices": [{
                    "message": {
                        "role": "assistant",
                        "content": "This is a test response"
                    },
                    "finish_reason": "stop"
                }],
                "usage": {
                    "prompt_tokens": 10,
                    "completion_tokens": 5,
                    "total_tokens": 15
                }
            }"#,
        )
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini");

    let request = LlmRequest {
        prompt: "Test prompt".to_string(),
        system: Some("Be brief".to_string()),
        max_tokens: Some(100),
        temperature: Some(0.7),
        timeout_seconds: Some(10),
    };

    let result = provider.generate(request).await;

    assert!(result.is_ok());
    let response = result.unwrap();
    assert_eq!(response.content, "This is a test response");
    assert_eq!(response.usage.prompt_tokens, 10);
    assert_eq!(response.usage.completion_tokens, 5);
    assert_eq!(response.usage.total_tokens, 15);
    assert_eq!(response.model, "gpt-4o-mini");

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_error_handling() {
    let mut server = mockito::Server::new_async().await;

    // Mock API error
    let mock = server
        .mock("POST", "/")
        .with_status(429)
        .with_header("content-type", "application/json")
        .with_body(r#"{"error": {"message": "Rate limit exceeded"}}"#)
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini");

    let result = provider.generate(LlmRequest::new("Test")).await;

    assert!(result.is_err());
    let err = result.unwrap_err();
    assert!(err.to_string().contains("429"));

    mock.assert_async().await;
}

#[tokio::test]
async fn test_remote_provider_timeout() {
    let mut server = mockito::Server::new_async().await;

    // Mock slow response
    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_chunked_body(|w| {
            std::thread::sleep(std::time::Duration::from_secs(3));
            w.write_all(b"too late")
        })
        .create_async()
        .await;

    let provider = RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini");

    let mut request = LlmRequest::new("Test");
    request.timeout_seconds = Some(1);

    let result = provider.generate(request).await;

    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("timed out"));
}

#[tokio::test]
async fn test_llm_summarizer_batch_with_mock() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("exactly 2 strings".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_reply("```json\n[\"First summary.\", \"Second summary.\"]\n```"))
        .create_async()
        .await;

    let provider = Arc::new(RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini"));
    let summarizer = LlmSummarizer::new(provider);

    let summaries = summarizer.summarize_batch(&[article(1), article(2)]).await.unwrap();
    assert_eq!(summaries, vec!["First summary.", "Second summary."]);

    mock.assert_async().await;
}

#[tokio::test]
async fn test_llm_summarizer_sends_focus_and_custom_instructions() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex("Summarize for engineers".to_string()),
            Matcher::Regex("FOCUS: memory safety".to_string()),
            Matcher::Regex("exactly 1 strings".to_string()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_reply("[\"Focused summary.\"]"))
        .expect(1)
        .create_async()
        .await;

    let provider = Arc::new(RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini"));
    let summarizer = LlmSummarizer::new(provider).with_style(PromptStyle {
        instructions: Some("Summarize for engineers.\n{focus}".to_string()),
        focus: Some("memory safety".to_string()),
    });

    let summaries = summarizer.summarize_batch(&[article(1)]).await.unwrap();
    assert_eq!(summaries, vec!["Focused summary."]);
    mock.assert_async().await;
}

#[tokio::test]
async fn test_llm_summarizer_rejects_short_reply() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_reply("[\"Only one.\"]"))
        .create_async()
        .await;

    let provider = Arc::new(RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini"));
    let summarizer = LlmSummarizer::new(provider);

    let err = summarizer
        .summarize_batch(&[article(1), article(2), article(3)])
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::CountMismatch { expected: 3, got: 1 }));
}

#[tokio::test]
async fn test_llm_summarizer_api_failure_is_request_error() {
    let mut server = mockito::Server::new_async().await;

    let _mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("upstream exploded")
        .create_async()
        .await;

    let provider = Arc::new(RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini"));
    let summarizer = LlmSummarizer::new(provider);

    let err = summarizer.summarize_batch(&[article(1)]).await.unwrap_err();
    assert!(matches!(err, ProviderError::Request(_)));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_llm_summarizer_overview() {
    let mut server = mockito::Server::new_async().await;

    let mock = server
        .mock("POST", "/")
        .match_body(Matcher::Regex("Topic: rust".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(chat_reply("  A busy day for Rust.  "))
        .expect(1)
        .create_async()
        .await;

    let provider = Arc::new(RemoteLlmProvider::new(server.url(), "fake-api-key", "gpt-4o-mini"));
    let summarizer = LlmSummarizer::new(provider);

    let sections = vec![Section::new(
        "rust",
        vec![SummarizedArticle::ok(article(1), "Something happened.")],
    )];
    let overview = summarizer.overview(&sections).await.unwrap();
    assert_eq!(overview.as_deref(), Some("A busy day for Rust."));

    // Nothing summarized: no request at all
    let failed = vec![Section::new("rust", vec![SummarizedArticle::failed(article(2))])];
    assert_eq!(summarizer.overview(&failed).await.unwrap(), None);

    mock.assert_async().await;
}
