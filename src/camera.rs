use glam::{Mat4, Vec3};

use crate::scene::CameraSettings;

/// Perspective camera for the ocean scene. The only mutation after
/// construction is the aspect ratio, driven by viewport resizes.
#[derive(Debug, Clone)]
pub struct Camera {
    pub fov_y_deg: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
    aspect: f32,
}

impl Camera {
    pub fn new(settings: &CameraSettings, width: u32, height: u32) -> Self {
        let mut camera = Self {
            fov_y_deg: settings.fov_y_deg,
            near: settings.near,
            far: settings.far,
            position: settings.position,
            aspect: 1.0,
        };
        camera.set_viewport(width, height);
        camera
    }

    /// Updates the aspect ratio from new viewport dimensions.
    ///
    /// Degenerate dimensions (either side zero, e.g. a minimized window)
    /// leave the projection untouched and return `false`. Repeated calls
    /// with identical dimensions are no-ops beyond recomputing the same
    /// ratio.
    pub fn set_viewport(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }
        self.aspect = width as f32 / height as f32;
        true
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y_deg.to_radians(), self.aspect, self.near, self.far)
    }

    /// The camera holds its startup orientation, looking down -Z.
    pub fn view(&self) -> Mat4 {
        Mat4::look_to_rh(self.position, Vec3::NEG_Z, Vec3::Y)
    }

    pub fn view_proj(&self) -> Mat4 {
        self.projection() * self.view()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::CameraSettings;

    #[test]
    fn resize_sets_exact_aspect() {
        let mut camera = Camera::new(&CameraSettings::default(), 800, 600);
        assert!(camera.set_viewport(1920, 1080));
        assert_eq!(camera.aspect(), 1920.0 / 1080.0);
    }

    #[test]
    fn degenerate_resize_is_skipped() {
        let mut camera = Camera::new(&CameraSettings::default(), 1280, 720);
        let before = camera.aspect();
        assert!(!camera.set_viewport(0, 720));
        assert!(!camera.set_viewport(1280, 0));
        assert!(!camera.set_viewport(0, 0));
        assert_eq!(camera.aspect(), before);
        assert!(camera.view_proj().is_finite());
    }

    #[test]
    fn repeated_resize_is_idempotent() {
        let mut camera = Camera::new(&CameraSettings::default(), 640, 480);
        camera.set_viewport(1024, 768);
        let first = camera.view_proj();
        camera.set_viewport(1024, 768);
        assert_eq!(first, camera.view_proj());
    }

    #[test]
    fn zero_initial_viewport_falls_back_to_square() {
        let camera = Camera::new(&CameraSettings::default(), 0, 0);
        assert_eq!(camera.aspect(), 1.0);
    }

    #[test]
    fn view_keeps_startup_position() {
        let settings = CameraSettings::default();
        let camera = Camera::new(&settings, 1280, 720);
        let eye = camera.view().inverse().col(3).truncate();
        assert!((eye - settings.position).length() < 1e-3);
    }
}
