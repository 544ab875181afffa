//! Lenient parser for LLM-produced `<item>` markup.
//!
//! The model is asked for XML but does not always produce it: fences around the
//! payload, no root element, an unterminated last item, stray text between
//! items. Instead of a tree parse, segments are cut at the literal `</item>`
//! marker and each field is located by its literal opening and closing tags.
//! A segment missing a field is discarded on its own; it never fails the batch.

use serde::Serialize;
use tracing::debug;

use crate::catalog::core::item::Item;

const ITEM_CLOSE: &str = "</item>";
const ITEM_OPEN: &str = "<item>";
const ITEM_OPEN_WITH_ATTRS: &str = "<item ";

/// Fields every item must carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemField {
    /// `<introduction>`
    Introduction,
    /// `<conversation>`
    Conversation,
    /// `<question>`
    Question,
}

impl ItemField {
    /// Tag name without angle brackets.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Self::Introduction => "introduction",
            Self::Conversation => "conversation",
            Self::Question => "question",
        }
    }
}

/// Why a segment produced no item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum DiscardReason {
    /// Opening or closing marker not found.
    MissingField(ItemField),
    /// Markers found but nothing between them.
    EmptyField(ItemField),
}

/// A segment that looked like an item but could not be turned into one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DiscardedSegment {
    /// Zero-based position among the candidate segments.
    pub ordinal: usize,
    /// First problem found.
    pub reason: DiscardReason,
}

/// Result of parsing one LLM response.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParseOutcome {
    /// Complete items, in input order.
    pub items: Vec<Item>,
    /// Segments dropped for missing or empty fields.
    pub discarded: Vec<DiscardedSegment>,
}

impl ParseOutcome {
    /// True when no complete item was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Parse LLM output into items.
#[must_use]
pub fn parse_items(raw: &str) -> ParseOutcome {
    let body = strip_code_fence(raw);
    let mut outcome = ParseOutcome::default();

    let candidates = body
        .split(ITEM_CLOSE)
        .filter_map(item_body)
        .enumerate();

    for (ordinal, segment) in candidates {
        match parse_segment(segment) {
            Ok(item) => outcome.items.push(item),
            Err(reason) => {
                debug!("Discarding item segment {ordinal}: {reason:?}");
                outcome.discarded.push(DiscardedSegment { ordinal, reason });
            }
        }
    }

    outcome
}

/// Remove a Markdown code fence wrapped around the payload, if any.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (`xml`, ...) on the fence line.
    let rest = rest.find('\n').map_or(rest, |newline| &rest[newline + 1..]);
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Text after the item opening marker, or `None` if the segment holds no item.
fn item_body(segment: &str) -> Option<&str> {
    if segment.trim().is_empty() {
        return None;
    }
    let start = [ITEM_OPEN, ITEM_OPEN_WITH_ATTRS]
        .iter()
        .filter_map(|marker| segment.find(marker))
        .min()?;
    let after = &segment[start..];
    let open_end = after.find('>')?;
    Some(&after[open_end + 1..])
}

fn parse_segment(segment: &str) -> Result<Item, DiscardReason> {
    let introduction = extract_field(segment, ItemField::Introduction)?;
    let conversation = extract_field(segment, ItemField::Conversation)?;
    let question = extract_field(segment, ItemField::Question)?;
    Ok(Item::from_checked(introduction, conversation, question))
}

/// Text between the first `<tag>` and the first `</tag>` after it, trimmed.
fn extract_field(segment: &str, field: ItemField) -> Result<&str, DiscardReason> {
    let tag = field.tag();
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");

    let start = segment
        .find(&open)
        .ok_or(DiscardReason::MissingField(field))?
        + open.len();
    let len = segment[start..]
        .find(&close)
        .ok_or(DiscardReason::MissingField(field))?;

    let value = segment[start..start + len].trim();
    if value.is_empty() {
        return Err(DiscardReason::EmptyField(field));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(intro: &str, conv: &str, question: &str) -> String {
        format!(
            "<item>\n  <introduction>{intro}</introduction>\n  <conversation>{conv}</conversation>\n  <question>{question}</question>\n</item>"
        )
    }

    #[test]
    fn test_single_item() {
        let outcome = parse_items(
            "<item><introduction>X</introduction><conversation>Y</conversation><question>Z</question></item>",
        );
        assert_eq!(outcome.items.len(), 1);
        let item = &outcome.items[0];
        assert_eq!(item.introduction, "X");
        assert_eq!(item.conversation, "Y");
        assert_eq!(item.question, "Z");
        assert_eq!(item.full_text, "X\nY\nZ");
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn test_many_items_round_trip_in_order() {
        let fields: Vec<(String, String, String)> = (0..5)
            .map(|i| {
                (
                    format!("料理のクラスで {i}"),
                    format!("では始めましょう {i}"),
                    format!("何をしますか {i}"),
                )
            })
            .collect();
        let raw: String = fields
            .iter()
            .map(|(a, b, c)| block(a, b, c))
            .collect::<Vec<_>>()
            .join("\n\n");

        let outcome = parse_items(&raw);
        assert_eq!(outcome.items.len(), fields.len());
        for (item, (a, b, c)) in outcome.items.iter().zip(&fields) {
            assert_eq!(&item.introduction, a);
            assert_eq!(&item.conversation, b);
            assert_eq!(&item.question, c);
        }
    }

    #[test]
    fn test_segment_missing_question_is_discarded() {
        let raw = format!(
            "{}<item><introduction>P</introduction><conversation>Q</conversation></item>",
            block("A", "B", "C")
        );
        let outcome = parse_items(&raw);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].question, "C");
        assert_eq!(
            outcome.discarded,
            vec![DiscardedSegment {
                ordinal: 1,
                reason: DiscardReason::MissingField(ItemField::Question),
            }]
        );
    }

    #[test]
    fn test_partial_segment_does_not_disturb_neighbours() {
        let raw = [
            block("A1", "B1", "C1"),
            "<item><introduction>only</introduction></item>".to_string(),
            block("A2", "B2", "C2"),
        ]
        .join("\n");
        let outcome = parse_items(&raw);
        let questions: Vec<&str> = outcome.items.iter().map(|i| i.question.as_str()).collect();
        assert_eq!(questions, vec!["C1", "C2"]);
        assert_eq!(outcome.discarded.len(), 1);
        assert_eq!(
            outcome.discarded[0].reason,
            DiscardReason::MissingField(ItemField::Conversation)
        );
    }

    #[test]
    fn test_empty_field_is_discarded() {
        let outcome = parse_items(&block("A", "   ", "C"));
        assert!(outcome.is_empty());
        assert_eq!(
            outcome.discarded[0].reason,
            DiscardReason::EmptyField(ItemField::Conversation)
        );
    }

    #[test]
    fn test_empty_field_names_the_right_field() {
        for (raw, field) in [
            (block(" ", "Y", "Z"), ItemField::Introduction),
            (block("X", "Y", "\n "), ItemField::Question),
        ] {
            let outcome = parse_items(&raw);
            assert!(outcome.items.is_empty());
            assert_eq!(outcome.discarded[0].reason, DiscardReason::EmptyField(field));
        }
    }

    #[test]
    fn test_blank_input_yields_nothing() {
        assert_eq!(parse_items(""), ParseOutcome::default());
        assert_eq!(parse_items("  \n\t "), ParseOutcome::default());
    }

    #[test]
    fn test_code_fence_and_root_wrapper() {
        let raw = format!(
            "```xml\n<items>\n{}\n{}\n</items>\n```\n",
            block("A1", "B1", "C1"),
            block("A2", "B2", "C2")
        );
        let outcome = parse_items(&raw);
        assert_eq!(outcome.items.len(), 2);
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn test_unterminated_last_item() {
        let raw = format!(
            "{}\n<item><introduction>A2</introduction><conversation>B2</conversation><question>C2</question>",
            block("A1", "B1", "C1")
        );
        let outcome = parse_items(&raw);
        assert_eq!(outcome.items.len(), 2);
        assert_eq!(outcome.items[1].question, "C2");
    }

    #[test]
    fn test_text_without_item_marker_is_ignored() {
        let raw = format!("Here are the questions:\n{}\nHope this helps!", block("A", "B", "C"));
        let outcome = parse_items(&raw);
        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.discarded.is_empty());
    }

    #[test]
    fn test_item_with_attributes_and_nested_markup() {
        let raw = "<item id=\"1\"><introduction>I</introduction><conversation>A: <b>hi</b></conversation><question>Q?</question><propositions><proposition id=\"1\">x</proposition></propositions></item>";
        let outcome = parse_items(raw);
        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.items[0].conversation, "A: <b>hi</b>");
    }
}
