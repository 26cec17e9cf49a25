mod common;

use common::{ScriptedExecutor, Step};
use dr_engine::{
    Conversation, EngineError, ErrorKind, FinishReason, PromptTemplate, Session, SessionOptions, Tokenizer,
    TokenizerFault,
};
use dr_model::ModelConfig;

const END: u32 = 299;

/// One token per ASCII byte; ids from 256 up are special and render as `<id>`.
struct ByteTokenizer;

impl Tokenizer for ByteTokenizer {
    fn encode(&self, text: &str) -> Result<Vec<u32>, TokenizerFault> {
        if !text.is_ascii() {
            return Err(format!("non-ascii input: {text:?}").into());
        }
        Ok(text.bytes().map(u32::from).collect())
    }

    fn decode(&self, tokens: &[u32], skip_special: bool) -> Result<String, TokenizerFault> {
        let mut text = String::new();
        for &t in tokens {
            match u8::try_from(t) {
                Ok(b) => text.push(char::from(b)),
                _ if skip_special => {}
                _ => text.push_str(&format!("<{t}>")),
            }
        }
        Ok(text)
    }
}

fn chat(script: Vec<Step>) -> Conversation<ScriptedExecutor, ByteTokenizer> {
    let config = ModelConfig::from_json(&format!(
        r#"{{"hidden_size": 8, "num_attention_heads": 2, "num_hidden_layers": 2,
            "eos_token_id": {END}, "vocab_size": 300}}"#
    ))
    .unwrap();
    let session = Session::load(config, SessionOptions::default(), |opts| {
        Ok(ScriptedExecutor::new(opts, script).vocab(300).default_token(u32::from(b'x')))
    })
    .unwrap();
    Conversation::new(session, ByteTokenizer)
}

fn ok_script() -> Vec<Step> {
    vec![Step::Token(u32::from(b'O')), Step::Token(u32::from(b'K')), Step::Token(END)]
}

fn fed_text(conv: &Conversation<ScriptedExecutor, ByteTokenizer>, record: usize) -> String {
    let ids = &conv.session().engine().executor().records[record].input_ids;
    ids.iter().map(|&id| char::from(id as u8)).collect()
}

#[test]
fn test_ask_decodes_only_the_reply() {
    let mut conv = chat(ok_script());
    let reply = conv.ask("hello", false).unwrap();
    assert_eq!(reply.text, "OK");
    assert_eq!(reply.generated_tokens, 3);
    assert_eq!(reply.prompt_tokens, PromptTemplate::default().render("hello").len());
    assert_eq!(reply.finish_reason, Some(FinishReason::EndOfSequence(END)));
    assert!(reply.time_to_first_token.is_some());
    assert!(reply.time_to_first_token.unwrap() <= reply.elapsed);
    assert_eq!(fed_text(&conv, 0), PromptTemplate::default().render("hello"));
}

#[test]
fn test_show_special_keeps_end_token() {
    let mut conv = chat(ok_script()).show_special(true);
    let reply = conv.ask("hello", false).unwrap();
    assert_eq!(reply.text, "OK<299>");
}

#[test]
fn test_continuation_skips_template() {
    let mut conv = chat(ok_script());
    let reply = conv.ask("Once upon", true).unwrap();
    assert_eq!(reply.prompt_tokens, "Once upon".len());
    assert_eq!(fed_text(&conv, 0), "Once upon");
}

#[test]
fn test_each_turn_starts_fresh() {
    let mut conv = chat(ok_script());
    let first = conv.ask("hi", false).unwrap();
    let second = conv.ask("hi", false).unwrap();
    assert_eq!(first.text, second.text);
    let records = &conv.session().engine().executor().records;
    assert_eq!(records[3].cache_seq_len, Some(0));
}

#[test]
fn test_document_is_prepended() {
    let mut conv = chat(ok_script()).with_template(PromptTemplate::new("Answer from the document."));
    conv.attach_document("The sky is green.");
    assert_eq!(conv.compose_query("What colour?"), "The sky is green.\n\nWhat colour?");
    conv.ask("What colour?", false).unwrap();
    let fed = fed_text(&conv, 0);
    assert!(fed.starts_with("<|system|>\nAnswer from the document.<|end|>"));
    assert!(fed.contains("<|user|>\nThe sky is green.\n\nWhat colour?<|end|>"));

    assert_eq!(conv.detach_document().as_deref(), Some("The sky is green."));
    assert_eq!(conv.compose_query("What colour?"), "What colour?");
}

#[test]
fn test_turn_budget() {
    let mut conv = chat(vec![]).with_max_tokens(5);
    let reply = conv.ask("abc", true).unwrap();
    assert_eq!(reply.text, "xx");
    assert_eq!(reply.finish_reason, Some(FinishReason::MaxTokens));
}

#[test]
fn test_empty_message_is_rejected() {
    let mut conv = chat(ok_script());
    let err = conv.ask("   \n", false).unwrap_err();
    assert!(matches!(err, EngineError::EmptyMessage));
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
    assert!(conv.session().engine().executor().records.is_empty());
}

#[test]
fn test_tokenizer_failure() {
    let mut conv = chat(ok_script());
    let err = conv.ask("héllo", false).unwrap_err();
    assert!(matches!(err, EngineError::Tokenizer(_)));
    assert_eq!(err.kind(), ErrorKind::Execution);
}
