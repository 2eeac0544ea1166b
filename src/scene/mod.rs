// Scene segmentation module
// Contains: content difference metric, streaming segmenter

mod metric;
mod segmenter;

pub use metric::ContentFeatures;
pub use segmenter::{Scene, SceneSegmenter};
