pub mod complementary;

pub use complementary::{
    CorrectionSources, MagReference, OrientationFusion, OrientationState, DEFAULT_FUSION_GAIN,
    DEFAULT_MAG_REJECTION,
};
