use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use data_gpt::chat::ChatFrontend;
use data_gpt::config::AnswerMode;
use data_gpt::llm::{AssistantReply, ChatCompletion, ChatMessage, CompletionRequest, FunctionCall, ToolCall};
use data_gpt::{AskError, Database, ModelProtocolError, PolicyViolation, QueryEngine};
use tempfile::TempDir;

/// Replays canned assistant replies and records every request it receives.
#[derive(Clone, Default)]
struct ScriptedChat {
    replies:  Arc<Mutex<VecDeque<AssistantReply>>>,
    requests: Arc<Mutex<Vec<CompletionRequest>>>,
}

impl ScriptedChat {
    fn new(replies: Vec<AssistantReply>) -> Self {
        Self { replies: Arc::new(Mutex::new(replies.into())), requests: Arc::default() }
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatCompletion for ScriptedChat {
    async fn complete(&self, request: CompletionRequest) -> Result<AssistantReply, AskError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.replies.lock().unwrap().pop_front().expect("unexpected extra completion call"))
    }
}

fn text(content: &str) -> AssistantReply {
    AssistantReply { content: Some(content.to_string()), tool_calls: vec![] }
}

fn sql_call(id: &str, query: &str) -> ToolCall {
    ToolCall {
        id: id.to_string(),
        kind: "function".to_string(),
        function: FunctionCall {
            name: "run_sql_query".to_string(),
            arguments: serde_json::json!({ "query": query }).to_string(),
        },
    }
}

fn calls(tool_calls: Vec<ToolCall>) -> AssistantReply {
    AssistantReply { content: None, tool_calls }
}

fn tool_results(request: &CompletionRequest) -> Vec<(String, String)> {
    request
        .messages
        .iter()
        .filter_map(|m| match m {
            ChatMessage::Tool { tool_call_id, content } => Some((tool_call_id.clone(), content.clone())),
            _ => None,
        })
        .collect()
}

/// A database with 17 users and a few videos.
fn seeded_db() -> (TempDir, Database) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("analytics.db");
    Database::create_schema(&path).unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    for i in 1..=17 {
        conn.execute(
            "INSERT INTO users (id, telegram_id, username, first_name) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![i, 1000 + i, format!("user{i}"), "Имя"],
        )
        .unwrap();
    }
    conn.execute_batch(
        "INSERT INTO videos (id, creator_id, video_created_at, views_count, likes_count) VALUES
            ('v1', 'c1', '2024-03-01T10:00:00Z', 1200, 30),
            ('v2', 'c1', '2024-03-03T12:00:00Z', 800, 12),
            ('v3', 'c2', '2024-03-09T08:30:00Z', 50, 1);",
    )
    .unwrap();

    (dir, Database::new(path, 2, Duration::from_secs(1)))
}

#[tokio::test]
async fn count_question_round_trips_through_the_tool() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![
        calls(vec![sql_call("call_1", "select count(*) from users")]),
        text("Всего 17 пользователей."),
    ]);
    let engine = QueryEngine::new(db, chat.clone());

    let answer = engine.ask_with_db("Сколько всего пользователей?", None).await.unwrap();
    assert_eq!(answer, "Всего 17 пользователей.");

    let requests = chat.requests();
    assert_eq!(requests.len(), 2);

    // First call: schema in the system prompt, tool offered.
    let first = &requests[0];
    assert_eq!(first.tools.len(), 1);
    assert_eq!(first.tools[0].name, "run_sql_query");
    match &first.messages[0] {
        ChatMessage::System { content } => {
            assert!(content.contains("users: id (INTEGER), telegram_id (INTEGER), username (TEXT)"));
        }
        other => panic!("expected system prompt, got {other:?}"),
    }
    assert_eq!(first.messages.last(), Some(&ChatMessage::user("Сколько всего пользователей?")));

    // Follow-up: no tools, assistant turn and the reduced scalar result.
    let second = &requests[1];
    assert!(second.tools.is_empty());
    assert!(second.messages.iter().any(|m| matches!(m, ChatMessage::Assistant { tool_calls, .. } if tool_calls.len() == 1)));
    assert_eq!(tool_results(second), vec![("call_1".to_string(), "17".to_string())]);
}

#[tokio::test]
async fn answer_without_tool_call_is_returned_directly() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![text("Я могу отвечать только на вопросы о данных.")]);
    let engine = QueryEngine::new(db, chat.clone());

    let answer = engine.ask_with_db("Привет, кто ты?", None).await.unwrap();
    assert_eq!(answer, "Я могу отвечать только на вопросы о данных.");
    assert_eq!(chat.requests().len(), 1);
}

#[tokio::test]
async fn rejected_and_failing_queries_become_error_payloads() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![
        calls(vec![
            sql_call("bad_1", "select * from (delete from videos) x"),
            sql_call("bad_2", "select * from videos; drop table videos"),
            sql_call("bad_3", "select missing_column from videos"),
            sql_call("ok_4", "select id, views_count from videos order by views_count desc"),
        ]),
        text("Лидер по просмотрам — v1."),
    ]);
    let engine = QueryEngine::new(db, chat.clone());

    let answer = engine.ask_with_db("Какое видео самое популярное?", None).await.unwrap();
    assert_eq!(answer, "Лидер по просмотрам — v1.");

    let results = tool_results(&chat.requests()[1]);
    let ids: Vec<_> = results.iter().map(|(id, _)| id.as_str()).collect();
    assert_eq!(ids, vec!["bad_1", "bad_2", "bad_3", "ok_4"]);

    let err1: serde_json::Value = serde_json::from_str(&results[0].1).unwrap();
    assert_eq!(err1["error"], "forbidden keyword 'delete' in query");
    let err2: serde_json::Value = serde_json::from_str(&results[1].1).unwrap();
    assert!(err2["error"].as_str().unwrap().contains("single statement"));
    let err3: serde_json::Value = serde_json::from_str(&results[2].1).unwrap();
    assert!(err3["error"].as_str().unwrap().contains("missing_column"));

    let rows: serde_json::Value = serde_json::from_str(&results[3].1).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 3);
    assert_eq!(rows[0]["id"], "v1");
    assert_eq!(rows[0]["views_count"], 1200);
}

#[tokio::test]
async fn extra_rounds_let_the_model_retry() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![
        calls(vec![sql_call("c1", "delete from videos")]),
        calls(vec![sql_call("c2", "select sum(views_count) from videos")]),
        text("Всего 2050 просмотров."),
    ]);
    let engine = QueryEngine::new(db, chat.clone()).with_max_tool_rounds(2);

    let answer = engine.ask_with_db("Сколько всего просмотров?", None).await.unwrap();
    assert_eq!(answer, "Всего 2050 просмотров.");

    let requests = chat.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[1].tools.len(), 1);
    assert!(requests[2].tools.is_empty());

    let second_round = tool_results(&requests[2]);
    assert!(second_round[0].1.contains("only SELECT or WITH"));
    assert_eq!(second_round[1], ("c2".to_string(), "2050".to_string()));
}

#[tokio::test]
async fn round_limit_forces_a_final_answer() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![
        calls(vec![sql_call("c1", "select count(*) from videos")]),
        AssistantReply {
            content: Some("Видео всего 3.".into()),
            tool_calls: vec![sql_call("c2", "select count(*) from users")],
        },
    ]);
    let engine = QueryEngine::new(db, chat.clone());

    let answer = engine.ask_with_db("Сколько всего видео?", None).await.unwrap();
    assert_eq!(answer, "Видео всего 3.");
    assert_eq!(chat.requests().len(), 2);
}

#[tokio::test]
async fn malformed_tool_arguments_end_the_turn() {
    let (_dir, db) = seeded_db();
    let broken = ToolCall {
        id: "c1".into(),
        kind: "function".into(),
        function: FunctionCall { name: "run_sql_query".into(), arguments: "{not json".into() },
    };
    let chat = ScriptedChat::new(vec![calls(vec![broken])]);
    let engine = QueryEngine::new(db, chat);

    let err = engine.ask_with_db("Сколько всего видео?", None).await.unwrap_err();
    assert!(matches!(err, AskError::Protocol(ModelProtocolError::BadToolArguments { .. })));
}

#[tokio::test]
async fn empty_final_answer_is_a_protocol_error() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![
        calls(vec![sql_call("c1", "select count(*) from users")]),
        AssistantReply::default(),
    ]);
    let engine = QueryEngine::new(db, chat);

    let err = engine.ask_with_db("Сколько всего пользователей?", None).await.unwrap_err();
    assert!(matches!(err, AskError::Protocol(ModelProtocolError::EmptyContent)));
}

#[tokio::test]
async fn unknown_tool_gets_an_error_payload() {
    let (_dir, db) = seeded_db();
    let mut call = sql_call("c1", "select 1");
    call.function.name = "drop_everything".into();
    let chat = ScriptedChat::new(vec![calls(vec![call]), text("Не получилось.")]);
    let engine = QueryEngine::new(db, chat.clone());

    engine.ask_with_db("Что-нибудь?", None).await.unwrap();
    let results = tool_results(&chat.requests()[1]);
    assert!(results[0].1.contains("unknown tool 'drop_everything'"));
}

#[tokio::test]
async fn extra_context_is_sent_as_second_system_message() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![text("Ок.")]);
    let engine = QueryEngine::new(db, chat.clone());

    engine
        .ask_with_db("Сколько видео?", Some("date range: 2024-03-01 to 2024-03-05 inclusive"))
        .await
        .unwrap();

    let messages = &chat.requests()[0].messages;
    assert_eq!(messages.len(), 3);
    match &messages[1] {
        ChatMessage::System { content } => {
            assert!(content.contains("date range: 2024-03-01 to 2024-03-05 inclusive"))
        }
        other => panic!("expected context message, got {other:?}"),
    }
}

#[tokio::test]
async fn direct_mode_answers_with_the_reduced_result() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![text("```sql\nSELECT COUNT(*) FROM users\n```")]);
    let engine = QueryEngine::new(db, chat.clone());

    let answer = engine.ask_direct("Сколько всего пользователей?", None).await.unwrap();
    assert_eq!(answer, "17");
    assert!(chat.requests()[0].tools.is_empty());
}

#[tokio::test]
async fn direct_mode_surfaces_policy_violations() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![text("DELETE FROM users")]);
    let engine = QueryEngine::new(db, chat);

    let err = engine.ask_direct("Удали всех пользователей", None).await.unwrap_err();
    assert!(matches!(err, AskError::Policy(PolicyViolation::NotReadOnly)));
}

#[tokio::test]
async fn direct_mode_null_aggregate_reads_as_zero() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![text("select sum(views_count) from videos where creator_id = 'nobody'")]);
    let engine = QueryEngine::new(db, chat);

    let answer = engine.ask_direct("Сколько просмотров у автора nobody?", None).await.unwrap();
    assert_eq!(answer, "0");
}

#[tokio::test]
async fn frontend_enriches_with_dates_and_renders_answer() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![
        calls(vec![sql_call(
            "c1",
            "select count(*) from videos where date(video_created_at) between '2024-03-01' and '2024-03-05'",
        )]),
        text("За этот период вышло 2 видео."),
    ]);
    let frontend = ChatFrontend::new(QueryEngine::new(db, chat.clone()), AnswerMode::Tools);

    let reply = frontend.handle_message("/db  Сколько видео вышло   с 1 по 5 марта 2024?").await;
    assert!(reply.starts_with("✅ Ответ от Data-GPT"));
    assert!(reply.contains("Запрос: Сколько видео вышло с 1 по 5 марта 2024?"));
    assert!(reply.ends_with("За этот период вышло 2 видео."));

    let requests = chat.requests();
    assert_eq!(tool_results(&requests[1]), vec![("c1".to_string(), "2".to_string())]);
    assert!(requests[0].messages.iter().any(|m| matches!(
        m,
        ChatMessage::System { content } if content.contains("date range: 2024-03-01 to 2024-03-05 inclusive")
    )));
}

#[tokio::test]
async fn frontend_rejects_bad_questions_before_calling_the_model() {
    let (_dir, db) = seeded_db();
    let chat = ScriptedChat::new(vec![]);
    let frontend = ChatFrontend::new(QueryEngine::new(db, chat.clone()), AnswerMode::Tools);

    assert_eq!(frontend.handle_message("/db").await, "⚠️ Добавьте вопрос после команды /db.");
    assert!(frontend.handle_message("/db how many users?").await.contains("русском"));
    assert!(chat.requests().is_empty());
}
