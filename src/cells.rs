//! Track-diagram cells: segment shapes, palette colors and grid positions.
//!
//! The panel is a grid of square cells. Track cells carry a segment shape
//! which the route tracer uses to decide where a route goes next.
//! Coordinates are screen coordinates: `x` grows to the right, `y` grows
//! downward, so "up" is `y - 1`.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::railroad::{BlockId, SwitchId};

// ============================================================================
// Positions
// ============================================================================

/// A cell coordinate on the panel grid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridPos {
    /// Column, growing to the right.
    pub x: i32,
    /// Row, growing downward.
    pub y: i32,
}

impl GridPos {
    /// Creates a position.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// The position `dx` columns and `dy` rows away.
    pub const fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl fmt::Display for GridPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.x, self.y)
    }
}

// ============================================================================
// Segment shapes
// ============================================================================

/// Shape of the track drawn in one cell.
///
/// Names describe the drawing: `DiagRightUp` runs from the lower left to
/// the upper right, `AngleLeftUp` enters horizontally from the right and
/// leaves toward the upper left. The gapped ends mark block boundaries:
/// `EndHorizRight` has its gap on the right hand side.
///
/// Switch variants name the side the diverging leg leaves toward. The throat
/// of `SwitchRight*` is on the left, the throat of `SwitchLeft*` on the right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentType {
    /// Straight horizontal track.
    Horizontal,
    /// Diagonal, lower left to upper right.
    DiagRightUp,
    /// Diagonal, upper left to lower right.
    DiagLeftUp,
    /// Horizontal from the right, bending down to the left.
    AngleLeftDown,
    /// Horizontal from the right, bending up to the left.
    AngleLeftUp,
    /// Horizontal from the left, bending down to the right.
    AngleRightDown,
    /// Horizontal from the left, bending up to the right.
    AngleRightUp,
    /// Horizontal with a block gap on the right.
    EndHorizRight,
    /// Horizontal with a block gap on the left.
    EndHorizLeft,
    /// Switch, throat left, diverging leg up and to the right.
    SwitchRightUp,
    /// Switch, throat left, diverging leg down and to the right.
    SwitchRightDown,
    /// Switch, throat right, diverging leg up and to the left.
    SwitchLeftUp,
    /// Switch, throat right, diverging leg down and to the left.
    SwitchLeftDown,
    /// Configured with a type name nobody recognises. Never traced through.
    Unknown,
}

impl SegmentType {
    /// Parses a layout cell type name. Unrecognised names give `Unknown`.
    pub fn from_config(name: &str) -> Self {
        match name {
            "horiz" => Self::Horizontal,
            "diag_right_up" => Self::DiagRightUp,
            "diag_left_up" => Self::DiagLeftUp,
            "angle_left_down" => Self::AngleLeftDown,
            "angle_left_up" => Self::AngleLeftUp,
            "angle_right_down" => Self::AngleRightDown,
            "angle_right_up" => Self::AngleRightUp,
            "horiz_rightgap" => Self::EndHorizRight,
            "horiz_leftgap" => Self::EndHorizLeft,
            "switch_right_up" => Self::SwitchRightUp,
            "switch_right_down" => Self::SwitchRightDown,
            "switch_left_up" => Self::SwitchLeftUp,
            "switch_left_down" => Self::SwitchLeftDown,
            _ => Self::Unknown,
        }
    }

    /// Layout name of this shape.
    pub const fn config_name(&self) -> &'static str {
        match self {
            Self::Horizontal => "horiz",
            Self::DiagRightUp => "diag_right_up",
            Self::DiagLeftUp => "diag_left_up",
            Self::AngleLeftDown => "angle_left_down",
            Self::AngleLeftUp => "angle_left_up",
            Self::AngleRightDown => "angle_right_down",
            Self::AngleRightUp => "angle_right_up",
            Self::EndHorizRight => "horiz_rightgap",
            Self::EndHorizLeft => "horiz_leftgap",
            Self::SwitchRightUp => "switch_right_up",
            Self::SwitchRightDown => "switch_right_down",
            Self::SwitchLeftUp => "switch_left_up",
            Self::SwitchLeftDown => "switch_left_down",
            Self::Unknown => "unknown",
        }
    }

    /// True for the four switch shapes.
    pub const fn is_switch(&self) -> bool {
        matches!(
            self,
            Self::SwitchRightUp | Self::SwitchRightDown | Self::SwitchLeftUp | Self::SwitchLeftDown
        )
    }
}

/// Position glyph drawn on a switch cell. The tracer follows this.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPosition {
    /// Straight through.
    #[default]
    Normal,
    /// Diverging.
    Reverse,
}

/// Signal head shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Single head facing left-bound trains.
    SingleLeft,
    /// Single head facing right-bound trains.
    SingleRight,
    /// Double head facing left-bound trains.
    DoubleLeft,
    /// Double head facing right-bound trains.
    DoubleRight,
}

impl SignalKind {
    /// Parses a layout signal type name.
    pub fn from_config(name: &str) -> Option<Self> {
        match name {
            "signal_left" => Some(Self::SingleLeft),
            "signal_right" => Some(Self::SingleRight),
            "signal_double_left" => Some(Self::DoubleLeft),
            "signal_double_right" => Some(Self::DoubleRight),
            _ => None,
        }
    }

    /// True for heads governing trains moving left.
    pub const fn is_left_bound(&self) -> bool {
        matches!(self, Self::SingleLeft | Self::DoubleLeft)
    }
}

// ============================================================================
// Palette
// ============================================================================

/// Every color the panel paints, by meaning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CellColor {
    /// Track with a train in it.
    TrackOccupied,
    /// Empty track, no route.
    TrackIdle,
    /// Track on a lined route.
    TrackLined,
    /// Track under local manual control.
    TrackManual,
    /// Track with no telemetry yet.
    TrackUnknown,
    /// Track with power off.
    TrackNoPower,
    /// Switch locked by an interlocking or occupied.
    SwitchLocked,
    /// Switch position confirmed.
    SwitchNormal,
    /// Switch under local manual control.
    SwitchManual,
    /// Switch position not known.
    SwitchUnknown,
    /// Blinking signal in its dark phase.
    SignalBlinkOff,
    /// Signal displaying a proceed aspect.
    SignalLined,
    /// Signal displaying stop.
    SignalNormal,
    /// Signal awaiting confirmation from the field.
    SignalUnknown,
}

impl CellColor {
    /// `#rrggbb` color string.
    pub const fn hex(&self) -> &'static str {
        match self {
            Self::TrackOccupied => "#ff0000",
            Self::TrackIdle => "#ffffff",
            Self::TrackLined => "#00ff00",
            Self::TrackManual => "#00ccff",
            Self::TrackUnknown => "#cccccc",
            Self::TrackNoPower => "#ffd700",
            Self::SwitchLocked => "#ff0000",
            Self::SwitchNormal => "#00ff00",
            Self::SwitchManual => "#00ccff",
            Self::SwitchUnknown => "#cccccc",
            Self::SignalBlinkOff => "#777777",
            Self::SignalLined => "#00ff00",
            Self::SignalNormal => "#ff0000",
            Self::SignalUnknown => "#cccccc",
        }
    }
}

// ============================================================================
// Track cells
// ============================================================================

/// One track cell on the grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackCell {
    /// Where it is.
    pub pos: GridPos,
    /// What shape of track it draws.
    pub segment: SegmentType,
    /// Current paint.
    pub color: CellColor,
    /// Block this cell belongs to, if any.
    pub owner: Option<BlockId>,
    /// Switch drawn in this cell, for switch shapes.
    pub switch: Option<SwitchId>,
    /// Position glyph, meaningful for switch shapes only.
    pub switch_position: SwitchPosition,
}

impl TrackCell {
    /// A plain track cell owned by `owner`.
    pub fn track(pos: GridPos, segment: SegmentType, owner: Option<BlockId>) -> Self {
        Self {
            pos,
            segment,
            color: CellColor::TrackUnknown,
            owner,
            switch: None,
            switch_position: SwitchPosition::Normal,
        }
    }

    /// A switch cell.
    pub fn switch(
        pos: GridPos,
        segment: SegmentType,
        switch: SwitchId,
        owner: Option<BlockId>,
    ) -> Self {
        Self {
            switch: Some(switch),
            ..Self::track(pos, segment, owner)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_names_round_trip() {
        for name in [
            "horiz",
            "diag_right_up",
            "diag_left_up",
            "angle_left_down",
            "angle_left_up",
            "angle_right_down",
            "angle_right_up",
            "horiz_rightgap",
            "horiz_leftgap",
            "switch_right_up",
            "switch_right_down",
            "switch_left_up",
            "switch_left_down",
        ] {
            assert_eq!(SegmentType::from_config(name).config_name(), name);
        }
        assert_eq!(SegmentType::from_config("spiral"), SegmentType::Unknown);
    }

    #[test]
    fn switch_shapes() {
        assert!(SegmentType::SwitchLeftDown.is_switch());
        assert!(!SegmentType::EndHorizLeft.is_switch());
    }

    #[test]
    fn palette() {
        assert_eq!(CellColor::TrackNoPower.hex(), "#ffd700");
        assert_eq!(CellColor::SignalBlinkOff.hex(), "#777777");
        assert_eq!(CellColor::TrackManual.hex(), "#00ccff");
    }

    #[test]
    fn signal_direction() {
        assert!(SignalKind::from_config("signal_left").unwrap().is_left_bound());
        assert!(!SignalKind::from_config("signal_right").unwrap().is_left_bound());
        assert!(SignalKind::from_config("semaphore").is_none());
    }
}
