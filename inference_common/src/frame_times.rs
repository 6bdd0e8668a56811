use std::time::Duration;

/// Time spent in each phase of processing a single frame.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct FrameTimes {
    pub frame_read: Duration,
    pub buffer_resize: Duration,
    pub buffer_to_tensor: Duration,
    pub forward_pass: Duration,
    pub bbox_extraction: Duration,
    pub nms: Duration,
    pub annotation: Duration,
    pub frame_write: Duration,
}

impl FrameTimes {
    pub fn total(&self) -> Duration {
        self.fields().iter().sum()
    }

    fn fields(&self) -> [Duration; 8] {
        [
            self.frame_read,
            self.buffer_resize,
            self.buffer_to_tensor,
            self.forward_pass,
            self.bbox_extraction,
            self.nms,
            self.annotation,
            self.frame_write,
        ]
    }

    fn from_fields(f: [Duration; 8]) -> Self {
        Self {
            frame_read: f[0],
            buffer_resize: f[1],
            buffer_to_tensor: f[2],
            forward_pass: f[3],
            bbox_extraction: f[4],
            nms: f[5],
            annotation: f[6],
            frame_write: f[7],
        }
    }

    fn zip_with(&self, other: &Self, op: impl Fn(Duration, Duration) -> Duration) -> Self {
        let (a, b) = (self.fields(), other.fields());
        Self::from_fields(std::array::from_fn(|i| op(a[i], b[i])))
    }
}

/// Collects [`FrameTimes`] over a whole run.
#[derive(Debug, Default)]
pub struct AggregatedTimes {
    frames: Vec<FrameTimes>,
}

impl AggregatedTimes {
    pub fn push(&mut self, times: FrameTimes) {
        self.frames.push(times);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// The first frame pays for lazy session init, `skip_first` leaves it out
    /// as long as there is something else to report.
    fn samples(&self, skip_first: bool) -> &[FrameTimes] {
        if skip_first && self.frames.len() > 1 {
            &self.frames[1..]
        } else {
            &self.frames
        }
    }

    pub fn avg(&self, skip_first: bool) -> FrameTimes {
        let samples = self.samples(skip_first);
        if samples.is_empty() {
            return FrameTimes::default();
        }
        let sum = samples
            .iter()
            .fold(FrameTimes::default(), |acc, t| acc.zip_with(t, |a, b| a + b));
        let n = samples.len() as u32;
        FrameTimes::from_fields(sum.fields().map(|d| d / n))
    }

    pub fn min(&self, skip_first: bool) -> FrameTimes {
        let samples = self.samples(skip_first);
        let Some(first) = samples.first() else {
            return FrameTimes::default();
        };
        samples[1..]
            .iter()
            .fold(*first, |acc, t| acc.zip_with(t, Duration::min))
    }

    pub fn max(&self, skip_first: bool) -> FrameTimes {
        self.samples(skip_first)
            .iter()
            .fold(FrameTimes::default(), |acc, t| acc.zip_with(t, Duration::max))
    }
}
