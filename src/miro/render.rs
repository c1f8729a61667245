//! Renders a parsed mind map onto a whiteboard.

use serde::Serialize;
use tracing::{info, warn};

use super::client::{board_url, BoardApi, MiroError};
use crate::summary::mindmap::{layout, MindMap, NodePlacement};

const BOARD_NAME_PREFIX: &str = "Mind Map: ";
const MAX_BOARD_NAME: usize = 60;
const BOARD_DESCRIPTION: &str = "Mind map automatically generated from book summary";

/// Result of a render
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedBoard {
    pub board_id: String,
    pub board_url: String,
    pub items_created: usize,
    /// Theme/subtopic nodes that could not be created
    pub items_skipped: usize,
    pub connectors_created: usize,
    pub sticky_note_fallbacks: usize,
    pub structure: MindMap,
}

/// `Mind Map: <topic>`, shortening the topic so the whole name fits 60 chars.
pub fn board_name(topic: &str) -> String {
    let room = MAX_BOARD_NAME - BOARD_NAME_PREFIX.len();
    let name = if topic.chars().count() > room {
        let mut short: String = topic.chars().take(room - 3).collect();
        short.push_str("...");
        short
    } else {
        topic.to_string()
    };
    format!("{}{}", BOARD_NAME_PREFIX, name)
}

/// Draw `map` on a board, creating one unless `board_id` is given.
///
/// The central node must be created; theme and subtopic nodes that fail are
/// skipped (a skipped theme takes its subtopics with it), and failed
/// connectors are logged only.
pub fn render_mind_map(
    api: &dyn BoardApi,
    map: &MindMap,
    board_id: Option<&str>,
) -> Result<RenderedBoard, MiroError> {
    let central_topic = map.central_topic.as_deref().ok_or(MiroError::MissingCentralTopic)?;

    let board_id = match board_id {
        Some(id) => id.to_string(),
        None => api.create_board(&board_name(central_topic), BOARD_DESCRIPTION)?,
    };
    api.verify_board(&board_id)?;

    let nodes = layout(map);
    let mut item_ids: Vec<Option<String>> = Vec::with_capacity(nodes.len());
    let mut rendered = RenderedBoard {
        board_id: board_id.clone(),
        board_url: board_url(&board_id),
        items_created: 0,
        items_skipped: 0,
        connectors_created: 0,
        sticky_note_fallbacks: 0,
        structure: map.clone(),
    };

    for (i, node) in nodes.iter().enumerate() {
        let parent_id = match node.parent {
            None => None,
            Some(p) => match item_ids.get(p).cloned().flatten() {
                Some(id) => Some(id),
                None => {
                    // parent was skipped
                    rendered.items_skipped += 1;
                    item_ids.push(None);
                    continue;
                }
            },
        };

        let created = create_node(api, &board_id, node, &mut rendered);
        match (created, parent_id) {
            (Ok(id), parent) => {
                rendered.items_created += 1;
                if let Some(parent) = parent {
                    match api.create_connector(&board_id, &parent, &id) {
                        Ok(_) => rendered.connectors_created += 1,
                        Err(e) => warn!(node = i, error = %e, "Connector failed"),
                    }
                }
                item_ids.push(Some(id));
            }
            (Err(e), None) => return Err(MiroError::CentralTopic(e.to_string())),
            (Err(e), Some(_)) => {
                warn!(node = i, error = %e, "Skipping node");
                rendered.items_skipped += 1;
                item_ids.push(None);
            }
        }
    }

    info!(
        board = %rendered.board_id,
        created = rendered.items_created,
        skipped = rendered.items_skipped,
        connectors = rendered.connectors_created,
        "Mind map rendered"
    );
    Ok(rendered)
}

/// Card first, sticky note if the card is refused.
fn create_node(
    api: &dyn BoardApi,
    board_id: &str,
    node: &NodePlacement,
    rendered: &mut RenderedBoard,
) -> Result<String, MiroError> {
    match api.create_card(board_id, node) {
        Ok(id) => Ok(id),
        Err(e) => {
            warn!(error = %e, "Card creation failed; falling back to sticky note");
            let id = api.create_sticky_note(board_id, node)?;
            rendered.sticky_note_fallbacks += 1;
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::mindmap::parse_structure;
    use std::cell::RefCell;

    /// Records calls; fails any item whose text contains a trigger word.
    #[derive(Default)]
    struct FakeBoard {
        calls: RefCell<Vec<String>>,
        refuse_cards: bool,
        fail_text: Option<&'static str>,
        next_id: RefCell<usize>,
    }

    impl FakeBoard {
        fn id(&self) -> String {
            let mut n = self.next_id.borrow_mut();
            *n += 1;
            format!("item-{}", n)
        }

        fn count(&self, prefix: &str) -> usize {
            self.calls.borrow().iter().filter(|c| c.starts_with(prefix)).count()
        }
    }

    impl BoardApi for FakeBoard {
        fn create_board(&self, name: &str, _description: &str) -> Result<String, MiroError> {
            self.calls.borrow_mut().push(format!("board {}", name));
            Ok("board-1".to_string())
        }

        fn verify_board(&self, board_id: &str) -> Result<(), MiroError> {
            self.calls.borrow_mut().push(format!("verify {}", board_id));
            if board_id == "missing" {
                return Err(MiroError::BoardAccess(board_id.to_string()));
            }
            Ok(())
        }

        fn create_card(&self, _board_id: &str, node: &NodePlacement) -> Result<String, MiroError> {
            self.calls.borrow_mut().push(format!("card {}", node.text));
            if self.refuse_cards {
                return Err(MiroError::Api { status: 400, message: "cards disabled".to_string() });
            }
            Ok(self.id())
        }

        fn create_sticky_note(&self, _board_id: &str, node: &NodePlacement) -> Result<String, MiroError> {
            self.calls.borrow_mut().push(format!("sticky {}", node.text));
            if self.fail_text.is_some_and(|t| node.text.contains(t)) {
                return Err(MiroError::Api { status: 500, message: "boom".to_string() });
            }
            Ok(self.id())
        }

        fn create_connector(&self, _board_id: &str, start: &str, end: &str) -> Result<String, MiroError> {
            self.calls.borrow_mut().push(format!("connector {}->{}", start, end));
            Ok(self.id())
        }
    }

    const SUMMARY: &str = "# Atomic Habits\n## Identity\n- Vote for who you want to be\n## Environment\n- Make cues obvious\n- Reduce friction";

    #[test]
    fn test_board_name_capped() {
        assert_eq!(board_name("Short"), "Mind Map: Short");
        let name = board_name(&"t".repeat(80));
        assert_eq!(name.chars().count(), MAX_BOARD_NAME);
        assert!(name.ends_with("..."));
    }

    #[test]
    fn test_render_creates_board_and_tree() {
        let api = FakeBoard::default();
        let rendered = render_mind_map(&api, &parse_structure(SUMMARY), None).unwrap();

        assert_eq!(rendered.board_id, "board-1");
        assert_eq!(rendered.board_url, "https://miro.com/app/board/board-1/");
        assert_eq!(rendered.items_created, 6);
        assert_eq!(rendered.connectors_created, 5);
        assert_eq!(api.calls.borrow()[0], "board Mind Map: Atomic Habits");
        assert_eq!(api.count("verify"), 1);
    }

    #[test]
    fn test_existing_board_is_verified() {
        let api = FakeBoard::default();
        let err = render_mind_map(&api, &parse_structure(SUMMARY), Some("missing")).unwrap_err();
        assert!(matches!(err, MiroError::BoardAccess(_)));
        assert_eq!(api.count("board"), 0);
        assert_eq!(api.count("card"), 0);
    }

    #[test]
    fn test_sticky_fallback_and_skips() {
        let api = FakeBoard { refuse_cards: true, fail_text: Some("Environment"), ..FakeBoard::default() };
        let rendered = render_mind_map(&api, &parse_structure(SUMMARY), Some("b")).unwrap();

        // central + Identity + its subtopic; Environment and its two subtopics skipped
        assert_eq!(rendered.items_created, 3);
        assert_eq!(rendered.items_skipped, 3);
        assert_eq!(rendered.sticky_note_fallbacks, 3);
        assert_eq!(rendered.connectors_created, 2);
    }

    #[test]
    fn test_missing_central_topic_makes_no_calls() {
        let api = FakeBoard::default();
        let err = render_mind_map(&api, &parse_structure("plain prose"), None).unwrap_err();
        assert!(matches!(err, MiroError::MissingCentralTopic));
        assert!(api.calls.borrow().is_empty());
    }

    #[test]
    fn test_central_failure_is_fatal() {
        let api = FakeBoard { refuse_cards: true, fail_text: Some("Atomic"), ..FakeBoard::default() };
        let err = render_mind_map(&api, &parse_structure(SUMMARY), Some("b")).unwrap_err();
        assert!(matches!(err, MiroError::CentralTopic(_)));
    }
}
