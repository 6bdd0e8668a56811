use serde::{Deserialize, Serialize};

/// Bounding boxes grouped by class id, i.e. `bboxes[class_id]` holds every box
/// of that class.
pub type BBoxesByClass = Vec<Vec<Bbox>>;

/// Axis-aligned box in source image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bbox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub confidence: f32,
}

impl Bbox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            confidence,
        }
    }

    /// Builds a box from yolo-style center coordinates.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32, confidence: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0, confidence)
    }

    pub fn width(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.ymax - self.ymin).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn scale(&self, sx: f32, sy: f32) -> Self {
        Self::new(
            self.xmin * sx,
            self.ymin * sy,
            self.xmax * sx,
            self.ymax * sy,
            self.confidence,
        )
    }

    /// Clamps the box into a `width` x `height` image.
    pub fn clamp(&self, width: f32, height: f32) -> Self {
        Self::new(
            self.xmin.clamp(0.0, width),
            self.ymin.clamp(0.0, height),
            self.xmax.clamp(0.0, width),
            self.ymax.clamp(0.0, height),
            self.confidence,
        )
    }

    pub fn intersection(&self, other: &Bbox) -> f32 {
        let w = (self.xmax.min(other.xmax) - self.xmin.max(other.xmin)).max(0.0);
        let h = (self.ymax.min(other.ymax) - self.ymin.max(other.ymin)).max(0.0);
        w * h
    }

    /// Intersection over union, 0 for degenerate boxes.
    pub fn iou(&self, other: &Bbox) -> f32 {
        let inter = self.intersection(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }
}

/// Greedy non-maximum suppression over boxes of a single class.
pub fn nms(mut bboxes: Vec<Bbox>, iou_threshold: f32) -> Vec<Bbox> {
    bboxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut keep: Vec<Bbox> = Vec::with_capacity(bboxes.len());
    for candidate in bboxes {
        if keep.iter().all(|kept| kept.iou(&candidate) <= iou_threshold) {
            keep.push(candidate);
        }
    }
    keep
}

/// Runs [`nms`] independently for every class.
pub fn nms_by_class(bboxes: BBoxesByClass, iou_threshold: f32) -> BBoxesByClass {
    bboxes
        .into_iter()
        .map(|class_bboxes| nms(class_bboxes, iou_threshold))
        .collect()
}

pub fn count(bboxes: &BBoxesByClass) -> usize {
    bboxes.iter().map(Vec::len).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_center() {
        let bbox = Bbox::from_center(50.0, 40.0, 20.0, 10.0, 0.9);
        assert_eq!(bbox.xmin, 40.0);
        assert_eq!(bbox.ymin, 35.0);
        assert_eq!(bbox.xmax, 60.0);
        assert_eq!(bbox.ymax, 45.0);
        assert_eq!(bbox.area(), 200.0);
    }

    #[test]
    fn test_iou() {
        let a = Bbox::new(0.0, 0.0, 10.0, 10.0, 1.0);
        let b = Bbox::new(5.0, 0.0, 15.0, 10.0, 1.0);
        // 50 overlap / 150 union
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);

        let far = Bbox::new(100.0, 100.0, 110.0, 110.0, 1.0);
        assert_eq!(a.iou(&far), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_degenerate_iou() {
        let empty = Bbox::new(5.0, 5.0, 5.0, 5.0, 1.0);
        assert_eq!(empty.iou(&empty), 0.0);
    }

    #[test]
    fn test_nms_keeps_highest_confidence() {
        let bboxes = vec![
            Bbox::new(0.0, 0.0, 10.0, 10.0, 0.6),
            Bbox::new(1.0, 1.0, 11.0, 11.0, 0.9),
            Bbox::new(50.0, 50.0, 60.0, 60.0, 0.3),
        ];
        let kept = nms(bboxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
        assert_eq!(kept[1].confidence, 0.3);
    }

    #[test]
    fn test_nms_by_class_is_per_class() {
        // Identical boxes in two classes must both survive.
        let same = Bbox::new(0.0, 0.0, 10.0, 10.0, 0.8);
        let kept = nms_by_class(vec![vec![same], vec![same]], 0.45);
        assert_eq!(count(&kept), 2);
    }

    #[test]
    fn test_clamp() {
        let bbox = Bbox::new(-5.0, -1.0, 120.0, 50.0, 0.5).clamp(100.0, 40.0);
        assert_eq!(bbox, Bbox::new(0.0, 0.0, 100.0, 40.0, 0.5));
    }
}
