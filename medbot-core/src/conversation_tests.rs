// medbot-core/src/conversation_tests.rs
#![cfg(test)]

use super::*;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use httpmock::prelude::*;
use serde_json::json;

use crate::api::openai::build_chat_request;
use crate::providers::{GeminiProvider, OpenAIProvider, TextProvider};

// --- Scripted backend ---

struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<ChatMessage>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl ScriptedBackend {
    fn new(replies: Vec<Result<ChatMessage>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _tools: &[ToolDefinition],
    ) -> Result<ChatMessage> {
        self.requests.lock().unwrap().push(messages.to_vec());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(anyhow!("ScriptedBackend: no reply left")))
    }
}

// --- Mock tool provider ---

struct MockToolProvider {
    call_log: Mutex<Vec<(String, String)>>,
    outputs: HashMap<String, Result<String, String>>,
    definitions: Vec<ToolDefinition>,
}

impl MockToolProvider {
    fn new(outputs: Vec<(&str, Result<&str, &str>)>) -> Arc<Self> {
        let definitions = outputs
            .iter()
            .map(|(name, _)| {
                ToolDefinition::single_question(*name, format!("Mock tool {}", name), "A question.")
            })
            .collect();
        let outputs = outputs
            .into_iter()
            .map(|(name, out)| (name.to_string(), out.map(str::to_string).map_err(str::to_string)))
            .collect();
        Arc::new(Self {
            call_log: Mutex::new(Vec::new()),
            outputs,
            definitions,
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.call_log.lock().unwrap().clone()
    }
}

#[async_trait]
impl ToolProvider for MockToolProvider {
    fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.definitions.clone()
    }

    async fn execute_tool(&self, tool_name: &str, input: ToolInput) -> Result<String, ToolError> {
        let question = input.required_str("question").unwrap_or_default().to_string();
        self.call_log
            .lock()
            .unwrap()
            .push((tool_name.to_string(), question));
        match self.outputs.get(tool_name) {
            Some(Ok(output)) => Ok(output.clone()),
            Some(Err(e)) => Err(ToolError::Failed {
                name: tool_name.to_string(),
                source: anyhow!("{}", e),
            }),
            None => Err(ToolError::UnknownTool(tool_name.to_string())),
        }
    }
}

#[derive(Default)]
struct RecordingObserver {
    seen: Mutex<Vec<String>>,
}

impl TurnObserver for RecordingObserver {
    fn tool_called(&self, tool_name: &str) {
        self.seen.lock().unwrap().push(tool_name.to_string());
    }
}

// --- Helpers ---

const SYSTEM_PROMPT: &str = "You are a helpful medical assistant.";

fn tool_call(id: &str, name: &str, arguments: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        call_type: "function".to_string(),
        function: ToolFunction {
            name: name.to_string(),
            arguments: arguments.to_string(),
        },
    }
}

fn requesting(calls: Vec<ToolCall>) -> Result<ChatMessage> {
    Ok(ChatMessage {
        role: Role::Assistant,
        tool_calls: Some(calls),
        ..Default::default()
    })
}

fn answer(text: &str) -> Result<ChatMessage> {
    Ok(ChatMessage::assistant(text))
}

fn question(q: &str) -> String {
    json!({ "question": q }).to_string()
}

// --- Conversation tests ---

#[tokio::test]
async fn test_plain_answer_without_tools() {
    let backend = ScriptedBackend::new(vec![answer("Hello! How can I help?")]);
    let tools = MockToolProvider::new(vec![("query_heart_db", Ok("unused"))]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend.clone(), tools.clone());

    let output = conversation.submit("hello").await.unwrap();

    assert_eq!(output.final_answer, "Hello! How can I help?");
    assert_eq!(output.rounds, 0);
    assert!(output.tool_results.is_empty());
    assert!(tools.calls().is_empty());
    assert_eq!(backend.request_count(), 1);

    let roles: Vec<Role> = conversation.messages().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_single_dataset_tool_call() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let backend = ScriptedBackend::new(vec![
        requesting(vec![tool_call(
            "call_1",
            "query_heart_db",
            &question("average age of heart patients"),
        )]),
        answer("The average age is 54.4 years."),
    ]);
    let tools = MockToolProvider::new(vec![("query_heart_db", Ok("The average age is 54.4"))]);
    let observer = Arc::new(RecordingObserver::default());
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend.clone(), tools.clone())
        .with_observer(observer.clone());

    let output = conversation
        .submit("What is the average age of heart patients?")
        .await
        .unwrap();

    assert_eq!(output.final_answer, "The average age is 54.4 years.");
    assert_eq!(output.rounds, 1);
    assert_eq!(output.tool_results.len(), 1);
    assert_eq!(output.tool_results[0].status, ToolExecutionStatus::Success);
    assert_eq!(
        tools.calls(),
        vec![("query_heart_db".to_string(), "average age of heart patients".to_string())]
    );
    assert_eq!(observer.seen.lock().unwrap().as_slice(), ["query_heart_db"]);

    let messages = conversation.messages();
    assert_eq!(messages.len(), 5);
    let tool_message = &messages[3];
    assert_eq!(tool_message.role, Role::Tool);
    assert_eq!(tool_message.tool_call_id.as_deref(), Some("call_1"));
    assert_eq!(tool_message.name.as_deref(), Some("query_heart_db"));
    assert_eq!(tool_message.text(), "The average age is 54.4");

    // The second request carried the tool result.
    let requests = backend.requests.lock().unwrap();
    assert_eq!(requests[1].len(), 4);
    assert_eq!(requests[1][3], *tool_message);
}

#[tokio::test]
async fn test_two_calls_in_one_reply_answered_in_order() {
    let backend = ScriptedBackend::new(vec![
        requesting(vec![
            tool_call("call_a", "query_heart_db", &question("count heart patients")),
            tool_call("call_b", "search_medical_web", &question("what is a stroke")),
        ]),
        answer("There are 303 heart patients. A stroke is a loss of blood flow to the brain."),
    ]);
    let tools = MockToolProvider::new(vec![
        ("query_heart_db", Ok("303")),
        ("search_medical_web", Ok("A stroke is a loss of blood flow to the brain.")),
    ]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend, tools.clone());

    let output = conversation.submit("Two questions").await.unwrap();

    assert_eq!(output.rounds, 1);
    let calls = tools.calls();
    let names: Vec<&str> = calls.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["query_heart_db", "search_medical_web"]);

    let messages = conversation.messages();
    assert_eq!(messages.len(), 6);
    assert_eq!(messages[3].tool_call_id.as_deref(), Some("call_a"));
    assert_eq!(messages[4].tool_call_id.as_deref(), Some("call_b"));
    assert_eq!(messages[5].role, Role::Assistant);
}

#[tokio::test]
async fn test_transcript_alternates_across_turns() {
    let backend = ScriptedBackend::new(vec![
        answer("first"),
        requesting(vec![tool_call("c1", "query_diabetes_db", &question("q"))]),
        answer("second"),
        answer("third"),
    ]);
    let tools = MockToolProvider::new(vec![("query_diabetes_db", Ok("42"))]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend, tools);

    for text in ["one", "two", "three"] {
        conversation.submit(text).await.unwrap();
    }

    let outside_tools: Vec<Role> = conversation
        .messages()
        .iter()
        .filter(|m| m.role != Role::Tool && m.requested_tool_calls().is_empty())
        .map(|m| m.role)
        .collect();
    assert_eq!(outside_tools.len(), 1 + 2 * 3);
    assert_eq!(outside_tools[0], Role::System);
    for pair in outside_tools[1..].chunks(2) {
        assert_eq!(pair, [Role::User, Role::Assistant]);
    }
}

#[tokio::test]
async fn test_empty_tool_call_list_is_final_answer() {
    let backend = ScriptedBackend::new(vec![Ok(ChatMessage {
        role: Role::Assistant,
        content: Some("Nothing to look up.".to_string()),
        tool_calls: Some(vec![]),
        ..Default::default()
    })]);
    let tools = MockToolProvider::new(vec![]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend.clone(), tools);

    let output = conversation.submit("hi").await.unwrap();
    assert_eq!(output.final_answer, "Nothing to look up.");
    assert_eq!(backend.request_count(), 1);
}

#[tokio::test]
async fn test_tool_failure_is_reported_to_model() {
    let backend = ScriptedBackend::new(vec![
        requesting(vec![tool_call("c1", "query_cancer_db", &question("count"))]),
        answer("I could not query the cancer dataset."),
    ]);
    let tools = MockToolProvider::new(vec![("query_cancer_db", Err("database is locked"))]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend, tools);

    let output = conversation.submit("How many cancer patients?").await.unwrap();

    assert_eq!(output.tool_results[0].status, ToolExecutionStatus::Failure);
    assert_eq!(
        conversation.messages()[3].text(),
        "Error executing tool 'query_cancer_db': database is locked"
    );
    assert_eq!(output.final_answer, "I could not query the cancer dataset.");
}

#[tokio::test]
async fn test_unknown_tool_and_bad_arguments() {
    let backend = ScriptedBackend::new(vec![
        requesting(vec![
            tool_call("c1", "query_foo_db", &question("x")),
            tool_call("c2", "query_heart_db", "{not json"),
        ]),
        answer("Sorry."),
    ]);
    let tools = MockToolProvider::new(vec![("query_heart_db", Ok("unused"))]);
    let observer = Arc::new(RecordingObserver::default());
    let mut conversation =
        Conversation::new(SYSTEM_PROMPT, backend, tools.clone()).with_observer(observer.clone());

    conversation.submit("bad calls").await.unwrap();

    let messages = conversation.messages();
    assert_eq!(messages[3].text(), "Error: Unknown tool 'query_foo_db'");
    assert!(messages[4]
        .text()
        .starts_with("Error executing tool 'query_heart_db': invalid arguments:"));
    assert_eq!(tools.calls().len(), 1);
    assert_eq!(
        observer.seen.lock().unwrap().as_slice(),
        ["query_foo_db", "query_heart_db"]
    );
}

#[tokio::test]
async fn test_tool_loop_limit_rolls_back_turn() {
    let replies = (0..5)
        .map(|i| requesting(vec![tool_call(&format!("c{}", i), "query_heart_db", &question("again"))]))
        .collect();
    let backend = ScriptedBackend::new(replies);
    let tools = MockToolProvider::new(vec![("query_heart_db", Ok("more"))]);
    let mut conversation =
        Conversation::new(SYSTEM_PROMPT, backend.clone(), tools.clone()).with_max_tool_rounds(3);

    let err = conversation.submit("loop forever").await.unwrap_err();

    assert!(matches!(err, MedbotError::ToolLoopLimit(3)));
    assert!(err.to_string().starts_with("Tool-call loop limit exceeded"));
    assert_eq!(tools.calls().len(), 3);
    assert_eq!(backend.request_count(), 4);
    assert_eq!(conversation.messages().len(), 1);
}

#[tokio::test]
async fn test_backend_error_discards_user_message() {
    let backend = ScriptedBackend::new(vec![answer("first answer"), Err(anyhow!("connection refused"))]);
    let tools = MockToolProvider::new(vec![]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend, tools);

    conversation.submit("first").await.unwrap();
    let before = conversation.messages().to_vec();

    let err = conversation.submit("second").await.unwrap_err();
    assert!(matches!(err, MedbotError::Api(_)));
    assert_eq!(conversation.messages(), before.as_slice());

    conversation.reset();
    assert_eq!(conversation.messages().len(), 1);
    assert_eq!(conversation.messages()[0].role, Role::System);
}

#[tokio::test]
async fn test_slow_tool_times_out() {
    struct SlowTools;

    #[async_trait]
    impl ToolProvider for SlowTools {
        fn get_tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition::single_question("query_heart_db", "Slow.", "q")]
        }

        async fn execute_tool(&self, _tool_name: &str, _input: ToolInput) -> Result<String, ToolError> {
            tokio::time::sleep(std::time::Duration::from_secs(5)).await;
            Ok("late".to_string())
        }
    }

    let backend = ScriptedBackend::new(vec![
        requesting(vec![tool_call("c1", "query_heart_db", &question("q"))]),
        answer("The lookup timed out."),
    ]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, backend, Arc::new(SlowTools))
        .with_tool_timeout(std::time::Duration::from_millis(20));

    conversation.submit("slow").await.unwrap();
    assert!(conversation.messages()[3].text().contains("timed out"));
}

// --- End to end over HTTP ---

const CHAT_PATH: &str = "/chat/completions";

fn model_config(server: &MockServer) -> ModelConfig {
    ModelConfig {
        model_name: "gpt-4o-mini".to_string(),
        endpoint: server.url(CHAT_PATH),
        parameters: toml::Value::Table(Default::default()),
    }
}

#[tokio::test]
async fn test_fallback_llm_drives_tool_round_over_http() -> Result<()> {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();

    let server = MockServer::start_async().await;
    let config = model_config(&server);
    let tools = MockToolProvider::new(vec![("query_heart_db", Ok("Average age: 54.4"))]);
    let tool_defs = tools.get_tool_definitions();

    let user_text = "What is the average age of heart patients?";
    let args = question("average age");
    let first_messages = vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user_text)];
    let requested_call = tool_call("call_123", "query_heart_db", &args);
    let second_messages = vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_text),
        ChatMessage {
            role: Role::Assistant,
            tool_calls: Some(vec![requested_call.clone()]),
            ..Default::default()
        },
        ChatMessage::tool_result("call_123", "query_heart_db", "Average age: 54.4"),
    ];

    let first_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(CHAT_PATH)
                .header("Authorization", "Bearer test-token")
                .json_body(build_chat_request(&config, &first_messages, &tool_defs).unwrap());
            then.status(200).json_body(json!({
                "id": "resp1",
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [requested_call]
                    },
                    "finish_reason": "tool_calls"
                }]
            }));
        })
        .await;
    let second_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(CHAT_PATH)
                .json_body(build_chat_request(&config, &second_messages, &tool_defs).unwrap());
            then.status(200).json_body(json!({
                "id": "resp2",
                "choices": [{
                    "index": 0,
                    "message": { "role": "assistant", "content": "The average age is 54.4 years." },
                    "finish_reason": "stop"
                }]
            }));
        })
        .await;

    let primary = Arc::new(OpenAIProvider::new(
        config.clone(),
        reqwest::Client::new(),
        "test-token".to_string(),
    ));
    let llm = Arc::new(FallbackLlm::new(primary, None));
    let mut conversation = Conversation::new(SYSTEM_PROMPT, llm, tools.clone());

    let output = conversation.submit(user_text).await?;

    first_mock.assert_async().await;
    second_mock.assert_async().await;
    assert_eq!(output.final_answer, "The average age is 54.4 years.");
    assert_eq!(tools.calls(), vec![("query_heart_db".to_string(), "average age".to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_primary_outage_answered_by_secondary() -> Result<()> {
    let server = MockServer::start_async().await;
    let config = model_config(&server);
    let gemini_config = ModelConfig {
        model_name: "gemini-2.5-flash".to_string(),
        endpoint: server.url("/v1beta/models"),
        parameters: toml::Value::Table(Default::default()),
    };

    let primary_mock = server
        .mock_async(|when, then| {
            when.method(POST).path(CHAT_PATH);
            then.status(503).body("upstream unavailable");
        })
        .await;
    let secondary_mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1beta/models/gemini-2.5-flash:generateContent")
                .header("x-goog-api-key", "gemini-key")
                .body_contains("User: What causes diabetes?");
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": { "role": "model", "parts": [{ "text": "Insulin resistance or deficiency." }] },
                    "finishReason": "STOP"
                }]
            }));
        })
        .await;

    let primary = Arc::new(OpenAIProvider::new(config, reqwest::Client::new(), "k".to_string()));
    let secondary = Arc::new(GeminiProvider::new(
        gemini_config,
        reqwest::Client::new(),
        "gemini-key".to_string(),
    ));
    let llm = Arc::new(FallbackLlm::new(primary, Some(secondary as Arc<dyn TextProvider>)));
    let tools = MockToolProvider::new(vec![("query_diabetes_db", Ok("unused"))]);
    let mut conversation = Conversation::new(SYSTEM_PROMPT, llm, tools.clone());

    let output = conversation.submit("What causes diabetes?").await?;

    primary_mock.assert_async().await;
    secondary_mock.assert_async().await;
    assert_eq!(output.final_answer, "Insulin resistance or deficiency.");
    assert!(tools.calls().is_empty());
    assert_eq!(conversation.messages().len(), 3);
    Ok(())
}
