//! Keyboard and mouse bindings for the preview window.
//!
//! | key     | effect                         |
//! |---------|--------------------------------|
//! | `[` `]` | fewer / more views per side    |
//! | `-` `=` | smaller / larger tile texture  |
//! | `a` `z` | wider / narrower aperture      |
//! | `f` `v` | focal plane further / closer   |
//! | `r`     | reset the orbit                |

use dofconfig::{
    ArraySettings, ParameterChange, MAX_APERTURE, MAX_FOCAL_DISTANCE, MAX_RESOLUTION, MAX_VIEWS,
    MIN_RESOLUTION, MIN_VIEWS, RESOLUTION_STEP,
};
use glam::{Mat4, Vec3};

const APERTURE_STEP: f32 = 0.01;
const FOCAL_STEP: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlAction {
    Change(ParameterChange),
    ResetView,
}

/// Maps a typed character to an action. Steps clamp at the valid range, so a
/// key that would leave it produces nothing.
pub fn action_for_key(key: &str, array: &ArraySettings) -> Option<ControlAction> {
    let change = match key {
        "[" => ParameterChange::Views(array.views.saturating_sub(1).max(MIN_VIEWS)),
        "]" => ParameterChange::Views((array.views + 1).min(MAX_VIEWS)),
        "-" => ParameterChange::Resolution(
            array
                .resolution
                .saturating_sub(RESOLUTION_STEP)
                .max(MIN_RESOLUTION),
        ),
        "=" | "+" => {
            ParameterChange::Resolution((array.resolution + RESOLUTION_STEP).min(MAX_RESOLUTION))
        }
        "a" => ParameterChange::Aperture(round_step(array.aperture + APERTURE_STEP, MAX_APERTURE)),
        "z" => ParameterChange::Aperture(round_step(array.aperture - APERTURE_STEP, MAX_APERTURE)),
        "f" => ParameterChange::FocalDistance(
            round_step(array.focal_distance + FOCAL_STEP, MAX_FOCAL_DISTANCE).max(FOCAL_STEP),
        ),
        "v" => ParameterChange::FocalDistance(
            round_step(array.focal_distance - FOCAL_STEP, MAX_FOCAL_DISTANCE).max(FOCAL_STEP),
        ),
        "r" => return Some(ControlAction::ResetView),
        _ => return None,
    };
    (!is_noop(change, array)).then_some(ControlAction::Change(change))
}

fn round_step(value: f32, max: f32) -> f32 {
    ((value * 1000.0).round() / 1000.0).clamp(0.0, max)
}

fn is_noop(change: ParameterChange, array: &ArraySettings) -> bool {
    match change {
        ParameterChange::Views(views) => views == array.views,
        ParameterChange::Resolution(resolution) => resolution == array.resolution,
        ParameterChange::Aperture(aperture) => aperture == array.aperture,
        ParameterChange::FocalDistance(distance) => distance == array.focal_distance,
    }
}

/// Orbits the base camera around a target point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrbitController {
    pub target: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub radius: f32,
}

impl OrbitController {
    const RADIANS_PER_PIXEL: f32 = 0.005;
    const MAX_PITCH: f32 = 1.5;
    const MIN_RADIUS: f32 = 0.3;
    const MAX_RADIUS: f32 = 20.0;

    pub fn eye(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        self.target + self.radius * Vec3::new(cos_pitch * sin_yaw, sin_pitch, cos_pitch * cos_yaw)
    }

    /// Camera-to-world transform looking at `target` with +Y up.
    pub fn pose(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), self.target, Vec3::Y).inverse()
    }

    pub fn drag(&mut self, dx: f64, dy: f64) {
        self.yaw -= dx as f32 * Self::RADIANS_PER_PIXEL;
        self.pitch = (self.pitch + dy as f32 * Self::RADIANS_PER_PIXEL)
            .clamp(-Self::MAX_PITCH, Self::MAX_PITCH);
    }

    /// Positive `lines` moves closer.
    pub fn zoom(&mut self, lines: f32) {
        self.radius =
            (self.radius * (1.0 - 0.1 * lines)).clamp(Self::MIN_RADIUS, Self::MAX_RADIUS);
    }
}

impl Default for OrbitController {
    /// Looks at the origin from `(1, 1, 1)`.
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            yaw: std::f32::consts::FRAC_PI_4,
            pitch: (1.0 / 3.0f32.sqrt()).asin(),
            radius: 3.0f32.sqrt(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ArraySettings {
        ArraySettings::default()
    }

    #[test]
    fn bracket_keys_step_views_within_range() {
        let mut array = settings();
        array.views = 4;
        assert_eq!(
            action_for_key("]", &array),
            Some(ControlAction::Change(ParameterChange::Views(5)))
        );
        assert_eq!(
            action_for_key("[", &array),
            Some(ControlAction::Change(ParameterChange::Views(3)))
        );
        array.views = MAX_VIEWS;
        assert_eq!(action_for_key("]", &array), None);
        array.views = MIN_VIEWS;
        assert_eq!(action_for_key("[", &array), None);
    }

    #[test]
    fn resolution_keys_step_by_one_block() {
        let mut array = settings();
        array.resolution = 1024;
        assert_eq!(
            action_for_key("-", &array),
            Some(ControlAction::Change(ParameterChange::Resolution(768)))
        );
        assert_eq!(
            action_for_key("=", &array),
            Some(ControlAction::Change(ParameterChange::Resolution(1280)))
        );
        array.resolution = MAX_RESOLUTION;
        assert_eq!(action_for_key("=", &array), None);
    }

    #[test]
    fn aperture_never_goes_negative() {
        let mut array = settings();
        array.aperture = 0.0;
        assert_eq!(action_for_key("z", &array), None);
        assert_eq!(
            action_for_key("a", &array),
            Some(ControlAction::Change(ParameterChange::Aperture(0.01)))
        );
    }

    #[test]
    fn focal_distance_stays_positive() {
        let mut array = settings();
        array.focal_distance = 0.1;
        assert_eq!(action_for_key("v", &array), None);
        array.focal_distance = 1.73;
        assert_eq!(
            action_for_key("f", &array),
            Some(ControlAction::Change(ParameterChange::FocalDistance(1.83)))
        );
    }

    #[test]
    fn unknown_keys_are_ignored() {
        assert_eq!(action_for_key("q", &settings()), None);
        assert_eq!(action_for_key("r", &settings()), Some(ControlAction::ResetView));
    }

    #[test]
    fn default_orbit_sits_at_one_one_one() {
        let orbit = OrbitController::default();
        assert!(orbit.eye().abs_diff_eq(Vec3::ONE, 1e-5));

        let world_to_camera = orbit.pose().inverse();
        let target = world_to_camera.transform_point3(Vec3::ZERO);
        assert!(target.abs_diff_eq(Vec3::new(0.0, 0.0, -3.0f32.sqrt()), 1e-4));
    }

    #[test]
    fn drag_clamps_pitch_and_zoom_clamps_radius() {
        let mut orbit = OrbitController::default();
        orbit.drag(0.0, 1.0e6);
        assert_eq!(orbit.pitch, 1.5);
        orbit.zoom(100.0);
        assert_eq!(orbit.radius, 0.3);
        orbit.zoom(-1.0e4);
        assert_eq!(orbit.radius, 20.0);
    }
}
