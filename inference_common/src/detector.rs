use std::time::Instant;

use image::DynamicImage;

use crate::annotate::{draw_bboxes, AnnotationStyle, ClassFilter};
use crate::bbox::BBoxesByClass;
use crate::frame_times::FrameTimes;

/// An object detection model applied to one image at a time.
///
/// Implementations must not carry state between frames: the same image with
/// the same weights yields the same boxes.
pub trait Detector {
    /// Class names shipped with the model, indexed by class. Empty if unknown.
    fn class_names(&self) -> &[String] {
        &[]
    }

    /// Detects objects, returning boxes in `image` pixel coordinates grouped by class.
    fn detect(
        &mut self,
        image: &DynamicImage,
        frame_times: &mut FrameTimes,
    ) -> anyhow::Result<BBoxesByClass>;

    /// Detects objects and draws the rendered classes onto a copy of `image`.
    ///
    /// Returned boxes include every class, rendered or not.
    fn infer(
        &mut self,
        image: &DynamicImage,
        filter: &ClassFilter,
        style: &AnnotationStyle,
        frame_times: &mut FrameTimes,
    ) -> anyhow::Result<(DynamicImage, BBoxesByClass)> {
        let bboxes = self.detect(image, frame_times)?;

        let start = Instant::now();
        let annotated = draw_bboxes(image, &bboxes, filter, style);
        frame_times.annotation = start.elapsed();

        Ok((annotated, bboxes))
    }
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn class_names(&self) -> &[String] {
        (**self).class_names()
    }

    fn detect(
        &mut self,
        image: &DynamicImage,
        frame_times: &mut FrameTimes,
    ) -> anyhow::Result<BBoxesByClass> {
        (**self).detect(image, frame_times)
    }
}
