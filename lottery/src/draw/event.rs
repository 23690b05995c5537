use super::model::Draw;
use lottery_core::event::Event;
use serde::{Deserialize, Serialize};

/// Draw transitions announced on the draw channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawEventKind {
    /// PLANNED → ACTIVE
    DrawActivated,
    /// ACTIVE → COMPLETED
    DrawCompleted,
    /// PLANNED/ACTIVE → CANCELLED
    DrawCancelled,
}

impl DrawEventKind {
    /// Wire tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DrawActivated => "draw_activated",
            Self::DrawCompleted => "draw_completed",
            Self::DrawCancelled => "draw_cancelled",
        }
    }
}

/// `{"type": "draw_activated", "draw": {...}}`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawEvent {
    /// Which transition happened
    #[serde(rename = "type")]
    pub kind: DrawEventKind,
    /// The draw after the transition
    pub draw: Draw,
}

impl DrawEvent {
    /// Event for `draw` after the transition `kind`.
    #[must_use]
    pub const fn new(kind: DrawEventKind, draw: Draw) -> Self {
        Self { kind, draw }
    }
}

impl Event for DrawEvent {
    fn event_type(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::draw::DrawStatus;
    use crate::types::{DrawId, LotteryConfig};
    use chrono::{TimeZone, Utc};

    #[test]
    fn wire_shape_matches_consumers() {
        let draw = Draw {
            id: DrawId::new(7),
            lottery_type: LotteryConfig::new(5, 36).unwrap(),
            start_time: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            status: DrawStatus::Active,
        };
        let event = DrawEvent::new(DrawEventKind::DrawActivated, draw);

        let value: serde_json::Value = serde_json::from_slice(&event.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "draw_activated");
        assert_eq!(value["draw"]["id"], 7);
        assert_eq!(value["draw"]["lottery_type"], "5 from 36");
        assert_eq!(value["draw"]["status"], "ACTIVE");
        assert_eq!(value["draw"]["start_time"], "2025-01-01T00:00:00Z");

        assert_eq!(DrawEvent::from_json(&event.to_json().unwrap()).unwrap(), event);
    }
}
