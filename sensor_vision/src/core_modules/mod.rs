pub mod defect_detector;
pub mod defect_set;
pub mod frame_accumulator;
pub mod intensity_frame;
pub mod noise_extractor;
