//! Pass ordering and output routing for one pipeline generation.
//!
//! The plan is decided up front by [`ChainPlan::assemble`]; stages never infer
//! where they write. The final stage in the chain is the only one that draws
//! into the presentation surface.

use dofconfig::{LightFieldConfig, ToneMapping};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Draws the scene once per sub-camera into the tile texture.
    Scene,
    /// Box-filters the tiles into one image.
    Average,
    /// Tone maps and colour-encodes the averaged image.
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageTarget {
    Tiles,
    Intermediate,
    Surface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub kind: StageKind,
    pub target: StageTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChainPlan {
    pub views: u32,
    pub resolution: u32,
    pub surface_size: (u32, u32),
    pub exposure: f32,
    pub stages: Vec<StagePlan>,
}

impl ChainPlan {
    /// Scene, then averaging, then output; `tone_mapping = "none"` drops the
    /// output stage so the averaging stage presents directly.
    ///
    /// The last stage always owns the surface: with tone mapping enabled the
    /// output stage presents and the averaging stage writes the intermediate.
    pub fn assemble(config: &LightFieldConfig, surface_size: (u32, u32)) -> Self {
        let mut kinds = vec![StageKind::Scene, StageKind::Average];
        if config.output.tone_mapping != ToneMapping::None {
            kinds.push(StageKind::Output);
        }

        let last = kinds.len() - 1;
        let stages = kinds
            .into_iter()
            .enumerate()
            .map(|(index, kind)| {
                let target = match (index, kind) {
                    (_, StageKind::Scene) => StageTarget::Tiles,
                    (i, _) if i == last => StageTarget::Surface,
                    _ => StageTarget::Intermediate,
                };
                StagePlan { kind, target }
            })
            .collect();

        Self {
            views: config.array.views,
            resolution: config.array.resolution,
            surface_size,
            exposure: config.output.exposure,
            stages,
        }
    }

    pub fn surface_writer(&self) -> Option<StageKind> {
        self.stages
            .iter()
            .find(|stage| stage.target == StageTarget::Surface)
            .map(|stage| stage.kind)
    }

    pub fn target_of(&self, kind: StageKind) -> Option<StageTarget> {
        self.stages
            .iter()
            .find(|stage| stage.kind == kind)
            .map(|stage| stage.target)
    }

    pub fn needs_intermediate(&self) -> bool {
        self.stages
            .iter()
            .any(|stage| stage.target == StageTarget::Intermediate)
    }
}
