//! Property-based tests for the tag parser
//!
//! The core law: however the model's text is cut into fragments, the parser
//! reports the same thinking text, the same answer text and the same tool
//! invocations as it does for the unsplit text.

use super::parser::{ParserEvent, TagParser, THINKING_CLOSE, THINKING_OPEN, TOOL_CLOSE, TOOL_OPEN};
use proptest::prelude::*;

/// Everything observable about one parse, with ids stripped
#[derive(Debug, PartialEq)]
struct Observed {
    thinking: String,
    answer: String,
    thinking_blocks: usize,
    invocations: Vec<(String, serde_json::Value)>,
}

fn observe(fragments: &[String]) -> Observed {
    let mut parser = TagParser::new();
    let mut events = Vec::new();
    for fragment in fragments {
        events.extend(parser.feed(fragment));
    }
    events.extend(parser.finish(None));

    let mut observed = Observed {
        thinking: String::new(),
        answer: String::new(),
        thinking_blocks: 0,
        invocations: Vec::new(),
    };
    for event in events {
        match event {
            ParserEvent::ThinkingDelta(t) => observed.thinking.push_str(&t),
            ParserEvent::FinalAnswerDelta(t) => observed.answer.push_str(&t),
            ParserEvent::ThinkingDone => observed.thinking_blocks += 1,
            ParserEvent::ToolInvocation(call) => observed.invocations.push((call.name, call.arguments)),
            ParserEvent::FinalAnswerDone | ParserEvent::StreamEnd { .. } => {}
        }
    }
    observed
}

/// Cut `text` at the given byte offsets (snapped to char boundaries)
fn split_at_offsets(text: &str, mut offsets: Vec<usize>) -> Vec<String> {
    offsets.retain(|&o| o > 0 && o < text.len() && text.is_char_boundary(o));
    offsets.sort_unstable();
    offsets.dedup();

    let mut fragments = Vec::new();
    let mut start = 0;
    for offset in offsets {
        fragments.push(text[start..offset].to_string());
        start = offset;
    }
    fragments.push(text[start..].to_string());
    fragments
}

/// Text that never contains a complete delimiter but may contain `<`, `/` and
/// tag-like words
fn arb_plain() -> impl Strategy<Value = String> {
    "[a-z <>/_.é\n]{0,40}".prop_filter("no complete delimiter", |s| {
        ![THINKING_OPEN, THINKING_CLOSE, TOOL_OPEN, TOOL_CLOSE]
            .iter()
            .any(|d| s.contains(d))
    })
}

fn arb_segment() -> impl Strategy<Value = String> {
    prop_oneof![
        arb_plain(),
        arb_plain().prop_map(|t| format!("{THINKING_OPEN}{t}{THINKING_CLOSE}")),
        "[a-z -]{1,20}".prop_map(|c| format!("{TOOL_OPEN}{c}{TOOL_CLOSE}")),
    ]
}

fn arb_document() -> impl Strategy<Value = String> {
    prop::collection::vec(arb_segment(), 0..6).prop_map(|segments| segments.concat())
}

proptest! {
    #[test]
    fn fragmentation_does_not_change_output(
        doc in arb_document(),
        offsets in prop::collection::vec(0usize..300, 0..20),
    ) {
        let whole = observe(&[doc.clone()]);
        let split = observe(&split_at_offsets(&doc, offsets));
        prop_assert_eq!(whole, split);
    }

    #[test]
    fn text_without_delimiters_is_all_answer(
        text in arb_plain(),
        offsets in prop::collection::vec(0usize..60, 0..10),
    ) {
        let observed = observe(&split_at_offsets(&text, offsets));
        prop_assert_eq!(observed.answer, text);
        prop_assert!(observed.thinking.is_empty());
        prop_assert!(observed.invocations.is_empty());
    }

    #[test]
    fn single_char_fragments_match_whole(doc in arb_document()) {
        let chars: Vec<String> = doc.chars().map(|c| c.to_string()).collect();
        prop_assert_eq!(observe(&[doc.clone()]), observe(&chars));
    }
}
