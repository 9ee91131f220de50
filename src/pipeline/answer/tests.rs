use super::*;
use crate::RagError;
use crate::pipeline::fakes::FakeCompletion;

fn inputs<'a>(sql: &'a str, display_result: &'a str, full_count: Option<usize>) -> AnswerInputs<'a> {
    AnswerInputs {
        question: "Quantos atores existem?",
        schema_context: "CREATE TABLE actor (actor_id INTEGER)",
        sql,
        display_result,
        full_count,
    }
}

#[test]
fn prompt_embeds_all_inputs() {
    let prompt = answer_prompt(&inputs("SELECT COUNT(*) FROM actor;", "[200]", Some(1)));

    assert!(prompt.contains("Question: Quantos atores existem?"));
    assert!(prompt.contains("Tables Info: CREATE TABLE actor (actor_id INTEGER)"));
    assert!(prompt.contains("SQL Query: SELECT COUNT(*) FROM actor;"));
    assert!(prompt.contains("SQL Result Row Count: 1"));
    assert!(prompt.contains("SQL Result: [200]"));
    assert!(prompt.contains("same language as the question"));
}

#[test]
fn prompt_marks_unknown_count() {
    let prompt = answer_prompt(&inputs("SELECT * FROM actors", "Error: no such table", None));
    assert!(prompt.contains("SQL Result Row Count: unknown"));
    assert!(prompt.contains("SQL Result: Error: no such table"));
}

#[tokio::test]
async fn no_context_stream_yields_fixed_message() {
    let fragments: Vec<String> = no_context_stream()
        .map(|fragment| fragment.expect("fragment"))
        .collect()
        .await;
    assert_eq!(fragments, vec![NO_RELEVANT_TABLES_MESSAGE]);
}

#[tokio::test]
async fn synthesize_streams_backend_fragments() {
    let backend = Arc::new(FakeCompletion::new("", vec!["Existem ", "200 atores."]));
    let synthesizer = AnswerSynthesizer::new(Arc::<FakeCompletion>::clone(&backend));

    let stream = synthesizer
        .synthesize(&inputs("SELECT COUNT(*) FROM actor;", "[200]", Some(1)))
        .await
        .expect("stream should open");
    let text: String = stream
        .map(|fragment| fragment.expect("fragment"))
        .collect::<Vec<_>>()
        .await
        .concat();

    assert_eq!(text, "Existem 200 atores.");
    let prompts = backend.stream_prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("SQL Result: [200]"));
}

#[tokio::test]
async fn synthesize_propagates_backend_unavailable() {
    let synthesizer = AnswerSynthesizer::new(Arc::new(FakeCompletion::failing()));

    let result = synthesizer
        .synthesize(&inputs("SELECT 1", "[1]", Some(1)))
        .await;
    assert!(matches!(result, Err(RagError::Network(_))));
}
