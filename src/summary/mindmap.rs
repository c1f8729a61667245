//! Mind Map Structure
//!
//! Parses the heading/bullet summary format into a topic tree and lays the tree
//! out radially for a whiteboard.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Central topic used when a summary has themes but no `#` line
pub const DEFAULT_CENTRAL_TOPIC: &str = "Book Summary";

/// Longest node text accepted by the whiteboard
pub const MAX_NODE_TEXT: usize = 255;

pub const THEME_RADIUS: f64 = 900.0;
pub const SUBTOPIC_RADIUS: f64 = 400.0;
/// Total angle a theme's subtopics fan across
pub const SUBTOPIC_SPREAD: f64 = PI / 2.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub title: String,
    pub subtopics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MindMap {
    pub central_topic: Option<String>,
    pub themes: Vec<Theme>,
}

impl MindMap {
    pub fn subtopic_count(&self) -> usize {
        self.themes.iter().map(|t| t.subtopics.len()).sum()
    }
}

/// Parse a summary into a topic tree.
///
/// Lines are trimmed. `# ` sets the central topic (a later one replaces an
/// earlier one), `## ` opens a theme, and `- ` adds a subtopic to the open
/// theme. Everything else is ignored.
pub fn parse_structure(summary: &str) -> MindMap {
    let mut map = MindMap::default();

    for line in summary.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if let Some(title) = line.strip_prefix("# ") {
            map.central_topic = Some(title.trim().to_string());
        } else if let Some(title) = line.strip_prefix("## ") {
            map.themes.push(Theme { title: title.trim().to_string(), subtopics: Vec::new() });
        } else if let Some(point) = line.strip_prefix("- ") {
            if let Some(theme) = map.themes.last_mut() {
                theme.subtopics.push(point.trim().to_string());
            }
        }
    }

    if map.central_topic.is_none() && !map.themes.is_empty() {
        map.central_topic = Some(DEFAULT_CENTRAL_TOPIC.to_string());
    }
    map
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    Central,
    Theme,
    Subtopic,
}

/// Where and how one node is drawn
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePlacement {
    pub kind: NodeKind,
    /// Index of the parent in the placement list
    pub parent: Option<usize>,
    pub text: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub fill_color: &'static str,
}

/// Cap text at `MAX_NODE_TEXT` characters, marking the cut with an ellipsis.
pub fn cap_text(text: &str) -> String {
    if text.chars().count() <= MAX_NODE_TEXT {
        return text.to_string();
    }
    let mut capped: String = text.chars().take(MAX_NODE_TEXT - 3).collect();
    capped.push_str("...");
    capped
}

/// Radial layout: central node at the origin, themes evenly spaced on a
/// circle, subtopics fanned outward on the far side of their theme.
///
/// Placements are ordered parent-first. Returns nothing without a central topic.
pub fn layout(map: &MindMap) -> Vec<NodePlacement> {
    let Some(central) = map.central_topic.as_deref() else {
        return Vec::new();
    };

    let mut nodes = vec![NodePlacement {
        kind: NodeKind::Central,
        parent: None,
        text: cap_text(central),
        x: 0.0,
        y: 0.0,
        width: 300.0,
        height: 120.0,
        fill_color: "light_blue",
    }];

    let theme_count = map.themes.len();
    for (i, theme) in map.themes.iter().enumerate() {
        let angle = (i as f64 / theme_count as f64) * 2.0 * PI;
        let (x, y) = (THEME_RADIUS * angle.cos(), THEME_RADIUS * angle.sin());
        let theme_index = nodes.len();
        nodes.push(NodePlacement {
            kind: NodeKind::Theme,
            parent: Some(0),
            text: cap_text(&theme.title),
            x,
            y,
            width: 250.0,
            height: 100.0,
            fill_color: if i % 2 == 0 { "light_pink" } else { "light_green" },
        });

        let direction = y.atan2(x);
        let n = theme.subtopics.len();
        let step = SUBTOPIC_SPREAD / (n.saturating_sub(1).max(1)) as f64;
        for (j, subtopic) in theme.subtopics.iter().enumerate() {
            let offset = (j as f64 - (n as f64 - 1.0) / 2.0) * step;
            let sub_angle = direction + offset;
            nodes.push(NodePlacement {
                kind: NodeKind::Subtopic,
                parent: Some(theme_index),
                text: cap_text(subtopic),
                x: x + SUBTOPIC_RADIUS * sub_angle.cos(),
                y: y + SUBTOPIC_RADIUS * sub_angle.sin(),
                width: 200.0,
                height: 80.0,
                fill_color: "light_yellow",
            });
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUMMARY: &str = "\
# Deep Work

Intro prose that is ignored.

## Focus
- Schedule deep blocks
- Protect them

## Rest
- Shut down completely
   - Indented bullets still count
not a bullet
";

    #[test]
    fn test_parse_structure() {
        let map = parse_structure(SUMMARY);
        assert_eq!(map.central_topic.as_deref(), Some("Deep Work"));
        assert_eq!(map.themes.len(), 2);
        assert_eq!(map.themes[0].subtopics, vec!["Schedule deep blocks", "Protect them"]);
        assert_eq!(map.themes[1].subtopics.len(), 2);
        assert_eq!(map.subtopic_count(), 4);
    }

    #[test]
    fn test_default_central_topic() {
        let map = parse_structure("## Only Theme\n- point");
        assert_eq!(map.central_topic.as_deref(), Some(DEFAULT_CENTRAL_TOPIC));

        let empty = parse_structure("just prose\n- orphan bullet");
        assert!(empty.central_topic.is_none());
        assert!(empty.themes.is_empty());
    }

    #[test]
    fn test_bullets_before_theme_are_ignored() {
        let map = parse_structure("# T\n- early\n## A\n- kept");
        assert_eq!(map.themes[0].subtopics, vec!["kept"]);
    }

    #[test]
    fn test_cap_text() {
        assert_eq!(cap_text("short"), "short");
        let long = "x".repeat(300);
        let capped = cap_text(&long);
        assert_eq!(capped.chars().count(), MAX_NODE_TEXT);
        assert!(capped.ends_with("..."));
    }

    #[test]
    fn test_layout_geometry() {
        let nodes = layout(&parse_structure(SUMMARY));
        assert_eq!(nodes.len(), 1 + 2 + 4);
        assert_eq!(nodes[0].kind, NodeKind::Central);

        let themes: Vec<&NodePlacement> = nodes.iter().filter(|n| n.kind == NodeKind::Theme).collect();
        assert!((themes[0].x - THEME_RADIUS).abs() < 1e-6);
        assert!(themes[0].y.abs() < 1e-6);
        assert!((themes[1].x + THEME_RADIUS).abs() < 1e-6);
        assert_eq!(themes[0].fill_color, "light_pink");
        assert_eq!(themes[1].fill_color, "light_green");

        for node in nodes.iter().filter(|n| n.kind == NodeKind::Subtopic) {
            let parent = &nodes[node.parent.unwrap()];
            let distance = ((node.x - parent.x).powi(2) + (node.y - parent.y).powi(2)).sqrt();
            assert!((distance - SUBTOPIC_RADIUS).abs() < 1e-6);
            // fanned away from the centre
            assert!(node.x.hypot(node.y) > parent.x.hypot(parent.y));
        }
    }

    #[test]
    fn test_single_subtopic_points_straight_out() {
        let nodes = layout(&parse_structure("# C\n## A\n- only"));
        let sub = &nodes[2];
        assert!((sub.x - (THEME_RADIUS + SUBTOPIC_RADIUS)).abs() < 1e-6);
        assert!(sub.y.abs() < 1e-6);
    }

    #[test]
    fn test_layout_requires_central_topic() {
        assert!(layout(&MindMap::default()).is_empty());
    }
}
