use serde::{Deserialize, Serialize};

use crate::bbox::BBoxesByClass;

/// Detections for one annotated frame, including classes left out of the overlay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameMeta {
    /// Sequence number parsed from the frame file name.
    pub index: u64,
    pub file_name: String,
    pub bboxes_by_class: BBoxesByClass,
}
