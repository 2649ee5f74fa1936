//! The wire shape of the per-job event stream. One `EventFrame` becomes one
//! `data: <json>\n\n` SSE frame; `type` carries the variant tag.

use dedup_common::{Item, RejectionReason};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventFrame {
    Connected {
        #[serde(rename = "websetId")]
        webset_id: String,
    },
    Status {
        status: String,
        #[serde(rename = "itemCount", skip_serializing_if = "Option::is_none")]
        item_count: Option<u64>,
    },
    Item {
        item: Item,
    },
    Pending {
        #[serde(rename = "tmpId")]
        tmp_id: String,
    },
    Drop {
        #[serde(rename = "tmpId")]
        tmp_id: String,
    },
    Confirm {
        data: Item,
    },
    Rejected {
        item: Item,
        reason: RejectionReason,
        details: String,
        #[serde(rename = "existingItem", skip_serializing_if = "Option::is_none")]
        existing_item: Option<String>,
    },
    Finished {
        status: String,
        #[serde(rename = "totalItems")]
        total_items: u64,
    },
    Error {
        error: String,
    },
}

impl EventFrame {
    /// Only `item` frames replay to late subscribers (§8 L4, S6) — the
    /// source this was distilled from never replays `rejected`, `pending`,
    /// or terminal frames, and the open question in spec §9 says to
    /// preserve that observable contract rather than guess at a richer one.
    pub fn is_replayable(&self) -> bool {
        matches!(self, EventFrame::Item { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EventFrame::Connected { .. } => "connected",
            EventFrame::Status { .. } => "status",
            EventFrame::Item { .. } => "item",
            EventFrame::Pending { .. } => "pending",
            EventFrame::Drop { .. } => "drop",
            EventFrame::Confirm { .. } => "confirm",
            EventFrame::Rejected { .. } => "rejected",
            EventFrame::Finished { .. } => "finished",
            EventFrame::Error { .. } => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_item_frames_are_replayable() {
        let item = EventFrame::Item {
            item: sample_item(),
        };
        let pending = EventFrame::Pending {
            tmp_id: "t1".into(),
        };
        let rejected = EventFrame::Rejected {
            item: sample_item(),
            reason: RejectionReason::ExactMatch,
            details: "duplicate".into(),
            existing_item: None,
        };

        assert!(item.is_replayable());
        assert!(!pending.is_replayable());
        assert!(!rejected.is_replayable());
    }

    #[test]
    fn serializes_with_camel_case_fields_and_snake_case_tag() {
        let frame = EventFrame::Pending {
            tmp_id: "abc".into(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "pending");
        assert_eq!(json["tmpId"], "abc");
    }

    fn sample_item() -> Item {
        serde_json::from_value(serde_json::json!({
            "id": "a",
            "url": "https://example.com",
            "name": "Example",
        }))
        .unwrap()
    }
}
