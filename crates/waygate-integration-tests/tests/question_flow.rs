//! End-to-end `ask_user` flows: timeout, answered, and stale answers.

use std::sync::Arc;
use waygate_core::id::RequestId;
use waygate_core::protocol::{GatewayFrame, QuestionAnswer, ToolCallOutcome};
use waygate_gateway::{Gateway, GatewayError};
use waygate_packs::PackError;
use waygate_test::{TestAgent, fast_config, memory_store};

async fn expect_tool_response(
    agent: &mut TestAgent,
    request_id: RequestId,
) -> ToolCallOutcome {
    match agent.recv().await {
        Some(GatewayFrame::ToolCallResponse {
            request_id: got,
            outcome,
        }) => {
            assert_eq!(got, request_id);
            outcome
        },
        other => panic!("expected tool response, got {other:?}"),
    }
}

#[tokio::test]
async fn unanswered_question_times_out_cleanly() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;
    let mut questions = gateway.subscribe_questions(agent.principal).await;

    let request_id = RequestId::new();
    agent
        .call_tool(
            request_id,
            "ask_user",
            serde_json::json!({"question": "y/n?", "options": ["y", "n"], "timeout_seconds": 1}),
        )
        .await;

    // The question reaches the client stream but nobody answers.
    let question = questions.recv().await.unwrap();
    assert_eq!(question.question, "y/n?");

    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Output(out) => {
            assert_eq!(out["answered"], false);
            assert_eq!(out["reason"], "timeout");
        },
        ToolCallOutcome::Error(err) => panic!("unexpected error: {err}"),
    }
    assert_eq!(gateway.stats().await.pending_questions, 0);

    // A late answer for the expired question is NotFound.
    let err = gateway
        .answer_question(agent.principal, question.id, QuestionAnswer::selected("y"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GatewayError::Pack(PackError::QuestionNotFound(_))
    ));
    gateway.shutdown().await;
}

#[tokio::test]
async fn client_answer_reaches_the_blocked_tool() {
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;
    let mut questions = gateway.subscribe_questions(agent.principal).await;

    let request_id = RequestId::new();
    agent
        .call_tool(
            request_id,
            "ask_user",
            serde_json::json!({"question": "deploy?", "options": ["yes", "no"]}),
        )
        .await;

    let question = questions.recv().await.unwrap();
    assert_eq!(question.options, vec!["yes", "no"]);
    gateway
        .answer_question(agent.principal, question.id, QuestionAnswer::selected("yes"))
        .await
        .unwrap();

    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Output(out) => {
            assert_eq!(out["answered"], true);
            assert_eq!(out["selected"], "yes");
        },
        ToolCallOutcome::Error(err) => panic!("unexpected error: {err}"),
    }
    gateway.shutdown().await;
}

#[tokio::test]
async fn answer_relayed_over_the_agent_stream_also_lands() {
    // Some frontends relay answers through the agent's own stream
    // (`UserQuestionAnswer`) instead of the client API.
    let gateway = Arc::new(Gateway::new(fast_config(), memory_store()).await.unwrap());
    let mut agent = TestAgent::attach(&gateway, "i1", "/w").await;
    let mut questions = gateway.subscribe_questions(agent.principal).await;

    let request_id = RequestId::new();
    agent
        .call_tool(
            request_id,
            "ask_user",
            serde_json::json!({"question": "free-form?"}),
        )
        .await;

    let question = questions.recv().await.unwrap();
    agent
        .answer_question(question.id, QuestionAnswer::custom("forty-two"))
        .await;

    match expect_tool_response(&mut agent, request_id).await {
        ToolCallOutcome::Output(out) => {
            assert_eq!(out["answered"], true);
            assert_eq!(out["custom_text"], "forty-two");
        },
        ToolCallOutcome::Error(err) => panic!("unexpected error: {err}"),
    }
    gateway.shutdown().await;
}
