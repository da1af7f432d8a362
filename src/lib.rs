//! Real-time animated ocean and sky scene.
//!
//! The crate composes a fixed scene (a perspective camera, a water plane
//! animated by a scrolling normal map, a procedural sky dome and a
//! prefiltered environment probe) and drives it with a per-frame clock.
//! Scene parameters, the camera, the animation clock and asset loading
//! live in the library so they stay testable without a GPU; the binary
//! owns the window and event loop.

pub mod app;
pub mod assets;
pub mod camera;
pub mod render;
pub mod scene;

pub use app::{run_frames, FrameClock, TimeStep};
pub use assets::{flat_normal, load_normal_map, AssetError, NormalMapImage, NormalMapLoader};
pub use camera::Camera;
pub use render::{EnvironmentProbe, ProbeBaker, Renderer, SkyPass, WaterPass};
pub use scene::{
    color_from_srgb_hex, CameraSettings, FogSettings, SceneSettings, SkySettings, SunSettings,
    WaterSettings, TONE_MAPPING_EXPOSURE,
};
