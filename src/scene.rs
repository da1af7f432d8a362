use glam::Vec3;
use serde::{Deserialize, Serialize};

/// ACES filmic exposure applied by every scene shader. Visual calibration
/// constant, not a runtime tunable.
pub const TONE_MAPPING_EXPOSURE: f32 = 0.5;

/// Perspective camera parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraSettings {
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            fov_y_deg: 55.0,
            near: 1.0,
            far: 20000.0,
            position: Vec3::new(30.0, 30.0, 100.0),
        }
    }
}

/// Water surface parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaterSettings {
    /// Edge length of the square water plane, world units.
    pub side: f32,
    /// Face resolution of render targets derived from the water setup;
    /// the environment probe inherits this.
    pub texture_size: u32,
    pub sun_color: Vec3,
    pub water_color: Vec3,
    pub distortion_scale: f32,
    /// Path of the tiling normal map sampled by the water shader.
    pub normal_map: String,
}

impl Default for WaterSettings {
    fn default() -> Self {
        Self {
            side: 10000.0,
            texture_size: 512,
            sun_color: Vec3::ONE,
            water_color: color_from_srgb_hex(0x001e0f),
            distortion_scale: 3.7,
            normal_map: "assets/waternormals.png".to_string(),
        }
    }
}

/// Sky dome scattering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkySettings {
    pub turbidity: f32,
    pub rayleigh: f32,
    pub mie_coefficient: f32,
    pub mie_directional_g: f32,
    /// Uniform scale of the enclosing dome shell, world units.
    pub dome_scale: f32,
}

impl Default for SkySettings {
    fn default() -> Self {
        Self {
            turbidity: 10.0,
            rayleigh: 2.0,
            mie_coefficient: 0.005,
            mie_directional_g: 0.8,
            dome_scale: 10000.0,
        }
    }
}

/// Sun placement in horizon coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SunSettings {
    pub elevation_deg: f32,
    pub azimuth_deg: f32,
}

impl Default for SunSettings {
    fn default() -> Self {
        Self {
            elevation_deg: 2.0,
            azimuth_deg: 180.0,
        }
    }
}

impl SunSettings {
    /// Unit direction vector toward the sun.
    ///
    /// `phi` is the polar angle measured from zenith, `theta` the azimuth;
    /// the conversion keeps `y = cos(phi)` so an elevation of 90 degrees
    /// puts the sun straight overhead.
    pub fn direction(&self) -> Vec3 {
        let phi = (90.0 - self.elevation_deg).to_radians();
        let theta = self.azimuth_deg.to_radians();
        let sin_phi = phi.sin();
        Vec3::new(sin_phi * theta.sin(), phi.cos(), sin_phi * theta.cos())
    }
}

/// Optional scene fog. The water shader mirrors `fog.is_some()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FogSettings {
    pub color: Vec3,
    pub density: f32,
}

/// Full description of the composed scene: one water plane, one sky dome,
/// a sun and an optional fog volume. Composition happens once at startup;
/// neither renderable is removed or replaced afterwards.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SceneSettings {
    pub camera: CameraSettings,
    pub water: WaterSettings,
    pub sky: SkySettings,
    pub sun: SunSettings,
    pub fog: Option<FogSettings>,
}

/// Decodes a packed 0xRRGGBB sRGB color to linear-light floats.
pub fn color_from_srgb_hex(hex: u32) -> Vec3 {
    let channel = |value: u32| {
        let srgb = (value & 0xff) as f32 / 255.0;
        if srgb <= 0.04045 {
            srgb / 12.92
        } else {
            ((srgb + 0.055) / 1.055).powf(2.4)
        }
    };
    Vec3::new(channel(hex >> 16), channel(hex >> 8), channel(hex))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sun_direction_is_unit_length() {
        for (elevation, azimuth) in [
            (2.0, 180.0),
            (0.0, 0.0),
            (45.0, 90.0),
            (-10.0, 300.0),
            (90.0, 12.5),
        ] {
            let sun = SunSettings {
                elevation_deg: elevation,
                azimuth_deg: azimuth,
            };
            assert!(
                (sun.direction().length() - 1.0).abs() < 1e-6,
                "not unit at elevation={elevation} azimuth={azimuth}"
            );
        }
    }

    #[test]
    fn default_sun_matches_expected_vector() {
        // elevation=2, azimuth=180: phi = 88 deg, theta = 180 deg.
        let direction = SunSettings::default().direction();
        assert!(direction.x.abs() < 1e-4);
        assert!((direction.y - 88f32.to_radians().cos()).abs() < 1e-6);
        assert!((direction.y - 0.0349).abs() < 1e-4);
        assert!((direction.z - -0.9994).abs() < 1e-4);
    }

    #[test]
    fn sun_direction_is_deterministic() {
        let sun = SunSettings::default();
        assert_eq!(sun.direction().to_array(), sun.direction().to_array());
    }

    #[test]
    fn zenith_sun_points_straight_up() {
        let sun = SunSettings {
            elevation_deg: 90.0,
            azimuth_deg: 45.0,
        };
        let direction = sun.direction();
        assert!((direction.y - 1.0).abs() < 1e-6);
        assert!(direction.x.abs() < 1e-6);
        assert!(direction.z.abs() < 1e-6);
    }

    #[test]
    fn water_color_decodes_to_linear() {
        let color = color_from_srgb_hex(0x001e0f);
        assert_eq!(color.x, 0.0);
        assert!(color.y > 0.0 && color.y < 0.02);
        assert!(color.z > 0.0 && color.z < color.y);
        assert_eq!(color_from_srgb_hex(0xffffff), Vec3::ONE);
        assert_eq!(color_from_srgb_hex(0x000000), Vec3::ZERO);
    }

    #[test]
    fn defaults_carry_scene_composition() {
        let scene = SceneSettings::default();
        assert_eq!(scene.camera.fov_y_deg, 55.0);
        assert_eq!(scene.camera.far, 20000.0);
        assert_eq!(scene.water.side, 10000.0);
        assert_eq!(scene.water.texture_size, 512);
        assert_eq!(scene.water.distortion_scale, 3.7);
        assert_eq!(scene.sky.turbidity, 10.0);
        assert_eq!(scene.sky.mie_directional_g, 0.8);
        assert!(scene.fog.is_none());
    }
}
