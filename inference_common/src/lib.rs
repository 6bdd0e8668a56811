pub mod annotate;
pub mod bbox;
pub mod detector;
pub mod frame_files;
pub mod frame_meta;
pub mod frame_times;
pub mod report;
pub mod video_meta;
