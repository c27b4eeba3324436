//! Spatial placement: collision avoidance and hierarchical reflow.
//!
//! Geometry only. Nodes are treated as axis-aligned boxes anchored at their
//! top-left position, sized by the measured size (or the configured default)
//! plus a fixed padding. Boxes that merely touch count as overlapping.

use std::f64::consts::PI;

use casegraph_shared::{LayoutConfig, Node, NodeKind, Position, Size};
use tracing::debug;

/// Ring angles: the four axis directions first, then the four diagonals.
const RING_ANGLES: [f64; 8] = [
    0.0,
    PI / 2.0,
    PI,
    3.0 * PI / 2.0,
    PI / 4.0,
    3.0 * PI / 4.0,
    5.0 * PI / 4.0,
    7.0 * PI / 4.0,
];

#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Bounds {
    fn at(position: Position, size: Option<Size>, layout: &LayoutConfig) -> Self {
        let (w, h) = size
            .map(|s| (s.width, s.height))
            .unwrap_or((layout.node_width, layout.node_height));
        Self {
            x: position.x,
            y: position.y,
            width: w + layout.padding,
            height: h + layout.padding,
        }
    }

    fn of(node: &Node, layout: &LayoutConfig) -> Self {
        Self::at(node.position, node.measured, layout)
    }

    fn overlaps(&self, other: &Bounds) -> bool {
        !(self.x + self.width < other.x
            || other.x + other.width < self.x
            || self.y + self.height < other.y
            || other.y + other.height < self.y)
    }
}

/// Snap a coordinate to the grid, rounding halves up.
pub fn snap_to_grid(value: f64, grid: f64) -> f64 {
    (value / grid + 0.5).floor() * grid
}

fn snap(position: Position, layout: &LayoutConfig) -> Position {
    Position::new(
        snap_to_grid(position.x, layout.grid_size),
        snap_to_grid(position.y, layout.grid_size),
    )
}

/// Whether a box of `size` at `position` overlaps any node other than `exclude`.
pub fn collides(
    nodes: &[Node],
    position: Position,
    size: Option<Size>,
    exclude: Option<&str>,
    layout: &LayoutConfig,
) -> bool {
    let candidate = Bounds::at(position, size, layout);
    nodes
        .iter()
        .filter(|n| Some(n.id.as_str()) != exclude)
        .any(|n| candidate.overlaps(&Bounds::of(n, layout)))
}

/// Nearest free grid position to `target` for a node of default size.
///
/// Tests the snapped target, then snapped points on rings of increasing
/// radius (step = node width + padding) below the search radius, eight angles
/// per ring. A returned position never overlaps another node unless every
/// candidate collides, in which case the result is
/// `target + (search_radius, 0)`, which may itself overlap in a dense graph.
pub fn find_non_colliding_position(
    nodes: &[Node],
    target: Position,
    exclude: Option<&str>,
    layout: &LayoutConfig,
) -> Position {
    find_position_for(nodes, target, None, exclude, layout)
}

/// [`find_non_colliding_position`] for a node with a known size.
pub fn find_position_for(
    nodes: &[Node],
    target: Position,
    size: Option<Size>,
    exclude: Option<&str>,
    layout: &LayoutConfig,
) -> Position {
    let snapped = snap(target, layout);
    if !collides(nodes, snapped, size, exclude, layout) {
        return snapped;
    }

    let step = layout.node_width + layout.padding;
    let mut distance = step;
    while distance < layout.search_radius {
        for angle in RING_ANGLES {
            // Candidates are tested where they will land, after snapping.
            let candidate = snap(
                Position::new(
                    target.x + angle.cos() * distance,
                    target.y + angle.sin() * distance,
                ),
                layout,
            );
            if !collides(nodes, candidate, size, exclude, layout) {
                return candidate;
            }
        }
        distance += step;
    }

    debug!(
        x = target.x,
        y = target.y,
        radius = layout.search_radius,
        "placement search exhausted, using fallback offset"
    );
    snap(
        Position::new(target.x + layout.search_radius, target.y),
        layout,
    )
}

/// Re-site every node in iteration order against the nodes already resolved.
/// Each node is tested at its measured size when one is known.
pub fn resolve_all_collisions(nodes: Vec<Node>, layout: &LayoutConfig) -> Vec<Node> {
    if nodes.len() <= 1 {
        return nodes;
    }

    let mut resolved: Vec<Node> = Vec::with_capacity(nodes.len());
    for mut node in nodes {
        node.position = find_position_for(
            &resolved,
            node.position,
            node.measured,
            Some(&node.id),
            layout,
        );
        resolved.push(node);
    }
    resolved
}

fn tier(kind: NodeKind) -> usize {
    match kind {
        NodeKind::Entity => 0,
        NodeKind::Agent => 1,
        NodeKind::Summary => 2,
        NodeKind::Finding | NodeKind::Auxiliary => 3,
    }
}

/// Full hierarchical relayout.
///
/// Nodes are bucketed into entity / agent / summary / other tiers, each laid
/// out as a centered row at its tier height, then passed through
/// [`resolve_all_collisions`]. The result is in tier order.
pub fn organize_hierarchical(nodes: &[Node], layout: &LayoutConfig) -> Vec<Node> {
    if nodes.is_empty() {
        return Vec::new();
    }

    let mut tiers: [Vec<&Node>; 4] = Default::default();
    for node in nodes {
        tiers[tier(node.kind())].push(node);
    }

    let mut positioned = Vec::with_capacity(nodes.len());
    for (level, row) in tiers.iter().enumerate() {
        let total_width = row.len().saturating_sub(1) as f64 * layout.tier_spacing;
        let start_x = layout.center_x - total_width / 2.0;
        for (idx, node) in row.iter().enumerate() {
            let mut node = (*node).clone();
            node.position = Position::new(
                snap_to_grid(start_x + idx as f64 * layout.tier_spacing, layout.grid_size),
                layout.tier_y[level],
            );
            positioned.push(node);
        }
    }

    resolve_all_collisions(positioned, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use casegraph_shared::{AgentData, EntityData, MentionData, NodePayload, NodeStatus, SummaryData};

    fn node(id: &str, payload: NodePayload, x: f64, y: f64) -> Node {
        Node {
            id: id.into(),
            label: id.into(),
            position: Position::new(x, y),
            measured: None,
            status: NodeStatus::Idle,
            payload,
        }
    }

    fn agent(id: &str, x: f64, y: f64) -> Node {
        node(id, NodePayload::Agent(AgentData::default()), x, y)
    }

    fn padded_overlap(a: Position, b: Position, layout: &LayoutConfig) -> bool {
        Bounds::at(a, None, layout).overlaps(&Bounds::at(b, None, layout))
    }

    #[test]
    fn snapping_rounds_half_up() {
        assert_eq!(snap_to_grid(100.0, 20.0), 100.0);
        assert_eq!(snap_to_grid(109.0, 20.0), 100.0);
        assert_eq!(snap_to_grid(110.0, 20.0), 120.0);
        assert_eq!(snap_to_grid(-10.0, 20.0), 0.0);
        assert_eq!(snap_to_grid(-11.0, 20.0), -20.0);
    }

    #[test]
    fn empty_canvas_returns_snapped_target() {
        let layout = LayoutConfig::default();
        let pos = find_non_colliding_position(&[], Position::new(100.0, 100.0), None, &layout);
        assert_eq!(pos, Position::new(100.0, 100.0));

        let pos = find_non_colliding_position(&[], Position::new(93.0, 131.0), None, &layout);
        assert_eq!(pos, Position::new(100.0, 140.0));
    }

    #[test]
    fn covered_target_moves_within_radius() {
        let layout = LayoutConfig::default();
        let target = Position::new(100.0, 100.0);
        let existing = vec![agent("a", 100.0, 100.0)];

        let pos = find_non_colliding_position(&existing, target, None, &layout);
        assert!(!padded_overlap(pos, existing[0].position, &layout));
        let dx = pos.x - target.x;
        let dy = pos.y - target.y;
        assert!((dx * dx + dy * dy).sqrt() < layout.search_radius + layout.grid_size);
        // The candidate to the right touches the existing box until snapping
        // moves it one grid step further out.
        assert_eq!(pos, Position::new(440.0, 100.0));
    }

    #[test]
    fn touching_boxes_overlap() {
        let layout = LayoutConfig::default();
        let a = Position::new(0.0, 0.0);
        let touching = Position::new(330.0, 0.0);
        let apart = Position::new(340.0, 0.0);
        assert!(padded_overlap(a, touching, &layout));
        assert!(!padded_overlap(a, apart, &layout));
    }

    #[test]
    fn snapped_result_clears_off_grid_neighbour() {
        let layout = LayoutConfig::default();
        let existing = vec![agent("dragged", 14.0, 0.0)];

        let pos = find_non_colliding_position(&existing, Position::new(15.0, 0.0), None, &layout);
        assert!(!collides(&existing, pos, None, None, &layout));
        // (345, 0) would snap back onto the neighbour's edge, so the first
        // free ring candidate is straight down.
        assert_eq!(pos, Position::new(20.0, 340.0));
    }

    #[test]
    fn placed_node_is_excluded_from_its_own_collision_set() {
        let layout = LayoutConfig::default();
        let nodes = vec![agent("a", 200.0, 200.0)];
        let pos = find_non_colliding_position(&nodes, Position::new(200.0, 200.0), Some("a"), &layout);
        assert_eq!(pos, Position::new(200.0, 200.0));
    }

    #[test]
    fn exhausted_search_falls_back_along_x() {
        let layout = LayoutConfig::default();
        // A huge measured node swallows every ring candidate.
        let mut wall = agent("wall", -5000.0, -5000.0);
        wall.measured = Some(Size {
            width: 10_000.0,
            height: 10_000.0,
        });
        let pos = find_non_colliding_position(&[wall], Position::new(0.0, 0.0), None, &layout);
        assert_eq!(pos, Position::new(1200.0, 0.0));
    }

    #[test]
    fn resolve_separates_stacked_nodes() {
        let layout = LayoutConfig::default();
        let nodes = vec![agent("a", 0.0, 0.0), agent("b", 0.0, 0.0), agent("c", 0.0, 0.0)];
        let resolved = resolve_all_collisions(nodes, &layout);
        assert_eq!(resolved[0].position, Position::new(0.0, 0.0));
        for i in 0..resolved.len() {
            for j in (i + 1)..resolved.len() {
                assert!(!padded_overlap(resolved[i].position, resolved[j].position, &layout));
            }
        }
    }

    #[test]
    fn resolve_uses_measured_size_of_moving_node() {
        let layout = LayoutConfig::default();
        let mut wide = agent("wide", 0.0, 0.0);
        wide.measured = Some(Size {
            width: 500.0,
            height: 120.0,
        });
        // At the default width "wide" would clear "a"; at its measured width
        // it reaches into it and has to move.
        assert!(!collides(&[agent("a", 400.0, 0.0)], Position::new(0.0, 0.0), None, None, &layout));

        let resolved = resolve_all_collisions(vec![agent("a", 400.0, 0.0), wide], &layout);
        assert_eq!(resolved[1].position, Position::new(0.0, 340.0));
        assert!(!collides(
            &resolved[..1],
            resolved[1].position,
            resolved[1].measured,
            None,
            &layout
        ));
    }

    fn mixed_graph() -> Vec<Node> {
        vec![
            node("summary", NodePayload::Summary(SummaryData::default()), 0.0, 0.0),
            agent("sanctions-1", 10.0, 10.0),
            node("entity", NodePayload::Entity(EntityData::default()), 900.0, 900.0),
            agent("pep_check-1", 20.0, 20.0),
            node(
                "mention",
                NodePayload::Mention(MentionData {
                    name: "John Smith".into(),
                    source_title: None,
                }),
                5.0,
                5.0,
            ),
        ]
    }

    #[test]
    fn organize_builds_tiers() {
        let layout = LayoutConfig::default();
        let organized = organize_hierarchical(&mixed_graph(), &layout);
        let ids: Vec<&str> = organized.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["entity", "sanctions-1", "pep_check-1", "summary", "mention"]);

        assert_eq!(organized[0].position, Position::new(500.0, 80.0));
        assert_eq!(organized[1].position, Position::new(340.0, 320.0));
        assert_eq!(organized[2].position, Position::new(680.0, 320.0));
        assert_eq!(organized[3].position, Position::new(500.0, 580.0));
        assert_eq!(organized[4].position, Position::new(500.0, 820.0));
    }

    #[test]
    fn organize_is_idempotent() {
        let layout = LayoutConfig::default();
        let once = organize_hierarchical(&mixed_graph(), &layout);
        let twice = organize_hierarchical(&once, &layout);
        for (a, b) in once.iter().zip(&twice) {
            assert_eq!(a.id, b.id);
            assert!((a.position.x - b.position.x).abs() < 1e-9);
            assert!((a.position.y - b.position.y).abs() < 1e-9);
        }
    }

    #[test]
    fn organize_empty_is_empty() {
        assert!(organize_hierarchical(&[], &LayoutConfig::default()).is_empty());
    }
}
