//! Route tracing through a control point and out along the main line.
//!
//! The fixture's CP1 is a siding turnout: the points signal guards the west
//! end, and the main and siding legs run east into blocks E and Z.

use rs_ctc::cells::{CellColor, GridPos};
use rs_ctc::hal::MockClock;
use rs_ctc::route::trace_route;
use rs_ctc::{Dispatcher, LayoutDocument, Packet};

const LAYOUT: &str = include_str!("fixtures/layout.json");

const LINED_LEFT: u8 = 0x01;
const LINED_RIGHT: u8 = 0x02;
const SW1_NORMAL: u8 = 0x08;
const SW1_REVERSE: u8 = 0x10;

fn panel() -> Dispatcher<MockClock> {
    LayoutDocument::from_json(LAYOUT)
        .unwrap()
        .build(MockClock::new())
        .unwrap()
}

fn report(panel: &mut Dispatcher<MockClock>, byte: u8) {
    panel.apply_packet(&Packet::new(0xFF, 0x50, b'S', vec![byte]));
}

fn lined(panel: &Dispatcher<MockClock>, block: &str) -> bool {
    let rr = panel.railroad();
    rr.block(rr.find_block(block).unwrap()).is_lined()
}

fn color(panel: &Dispatcher<MockClock>, x: i32, y: i32) -> CellColor {
    panel.railroad().grid.get(GridPos::new(x, y)).unwrap().color
}

// ============================================================================
// Raw tracer on the built grid
// ============================================================================

#[test]
fn tracer_walks_main_through_normal_switch() {
    let panel = panel();
    let rr = panel.railroad();

    let trace = trace_route(&rr.grid, GridPos::new(3, 5), false);
    assert_eq!(
        trace.cells,
        (3..=7).map(|x| GridPos::new(x, 5)).collect::<Vec<_>>()
    );
    assert_eq!(trace.next_block, rr.find_block("E"));
}

#[test]
fn tracer_from_siding_rejoins_main() {
    let panel = panel();
    let rr = panel.railroad();

    let trace = trace_route(&rr.grid, GridPos::new(7, 6), true);
    assert_eq!(
        trace.cells,
        vec![
            GridPos::new(7, 6),
            GridPos::new(6, 6),
            GridPos::new(5, 5),
            GridPos::new(4, 5),
            GridPos::new(3, 5),
        ]
    );
    assert_eq!(trace.next_block, rr.find_block("W"));
}

// ============================================================================
// Routes lined by the field
// ============================================================================

#[test]
fn right_route_runs_down_the_main() {
    let mut panel = panel();
    report(&mut panel, LINED_RIGHT | SW1_NORMAL);

    assert!(lined(&panel, "CP1"));
    assert!(lined(&panel, "E"));
    assert!(lined(&panel, "E2"));
    assert!(!lined(&panel, "Z"));
    assert!(!lined(&panel, "W"));

    assert_eq!(color(&panel, 4, 5), CellColor::TrackLined);
    assert_eq!(color(&panel, 7, 5), CellColor::TrackLined);
    assert_eq!(color(&panel, 9, 5), CellColor::TrackLined);
    assert_eq!(color(&panel, 12, 5), CellColor::TrackLined);
    // The siding leg inside the plant is not on the route.
    assert_eq!(color(&panel, 7, 6), CellColor::TrackIdle);
    assert_eq!(color(&panel, 9, 6), CellColor::TrackIdle);
}

#[test]
fn reversed_points_route_into_siding() {
    let mut panel = panel();
    report(&mut panel, LINED_RIGHT | SW1_REVERSE);

    assert!(lined(&panel, "Z"));
    assert!(!lined(&panel, "E"));
    assert_eq!(color(&panel, 6, 6), CellColor::TrackLined);
    assert_eq!(color(&panel, 6, 5), CellColor::TrackIdle);
    assert_eq!(color(&panel, 9, 6), CellColor::TrackLined);
}

#[test]
fn left_route_from_main_leaves_through_the_points() {
    let mut panel = panel();
    report(&mut panel, LINED_LEFT | SW1_NORMAL);

    assert!(lined(&panel, "W"));
    assert!(!lined(&panel, "E"));
    let rr = panel.railroad();
    assert!(rr.block(rr.find_block("W").unwrap()).lined_left_bound());
}

#[test]
fn left_route_from_siding_crosses_the_switch() {
    let mut panel = panel();
    report(&mut panel, LINED_LEFT | SW1_REVERSE);

    assert!(lined(&panel, "W"));
    assert_eq!(color(&panel, 6, 6), CellColor::TrackLined);
    assert_eq!(color(&panel, 6, 5), CellColor::TrackIdle);
}

#[test]
fn occupied_block_ends_the_route() {
    let mut panel = panel();
    panel.apply_packet(&Packet::new(0xFF, 0x52, b'S', vec![0x01]));
    report(&mut panel, LINED_RIGHT | SW1_NORMAL);

    assert!(lined(&panel, "E"));
    assert!(!lined(&panel, "E2"));
    assert_eq!(color(&panel, 11, 5), CellColor::TrackOccupied);
}

#[test]
fn occupancy_drops_a_lined_block() {
    let mut panel = panel();
    report(&mut panel, LINED_RIGHT | SW1_NORMAL);
    assert!(lined(&panel, "E2"));

    panel.apply_packet(&Packet::new(0xFF, 0x52, b'S', vec![0x01]));
    assert!(!lined(&panel, "E2"));
    assert!(lined(&panel, "E"));
}

#[test]
fn cancelled_route_is_cleared_end_to_end() {
    let mut panel = panel();
    report(&mut panel, LINED_RIGHT | SW1_NORMAL);

    panel.clock_mut().set(1_000);
    panel.clear_route("CP1_P").unwrap();
    panel.clock_mut().set(2_000);
    report(&mut panel, SW1_NORMAL);

    for block in ["CP1", "E", "E2"] {
        assert!(!lined(&panel, block), "{} still lined", block);
    }
    assert_eq!(color(&panel, 9, 5), CellColor::TrackIdle);

    let snapshot = panel.snapshot();
    assert!(snapshot.blocks.iter().all(|b| !b.lined));
}
