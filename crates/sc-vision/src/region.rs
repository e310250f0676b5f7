use crate::correlate::match_template;
use crate::preprocess::to_gray;
use anyhow::{Context, Result};
use image::{GrayImage, RgbaImage};
use sc_capture::{crop_rect, PixelRect};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Region names the pipeline looks up in a profile
pub mod names {
    pub const SUPPLY: &str = "supply";
    pub const SELECTION_PANEL: &str = "selection_panel";
    pub const PRODUCTION_QUEUE: &str = "production_queue";
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionMode {
    #[default]
    Static,
    Template,
}

/// One named region as written in the profile file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionDefinition {
    #[serde(default)]
    pub mode: RegionMode,
    #[serde(default)]
    pub x: u32,
    #[serde(default)]
    pub y: u32,
    #[serde(default)]
    pub w: u32,
    #[serde(default)]
    pub h: u32,
    /// Template image path, relative to the profile file
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default = "default_min_conf")]
    pub template_min_conf: f64,
    /// Extra pixels around a template hit: left, top, right, bottom
    #[serde(default)]
    pub padding: [u32; 4],
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RegionDefinition {
    /// Enabled static rectangle
    pub fn fixed(rect: PixelRect) -> Self {
        Self {
            mode: RegionMode::Static,
            x: rect.x,
            y: rect.y,
            w: rect.width,
            h: rect.height,
            template: None,
            template_min_conf: default_min_conf(),
            padding: [0; 4],
            enabled: true,
        }
    }
}

fn default_min_conf() -> f64 {
    0.8
}

fn default_enabled() -> bool {
    true
}

/// Raw profile file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegionProfile {
    #[serde(default)]
    pub resolution: Option<[u32; 2]>,
    #[serde(default)]
    pub rois: BTreeMap<String, RegionDefinition>,
}

impl RegionProfile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read region profile {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse region profile {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write region profile {}", path.display()))?;
        info!("Region profile written to {}", path.display());
        Ok(())
    }
}

enum Locator {
    Static(PixelRect),
    Template {
        template: GrayImage,
        min_confidence: f64,
        padding: [u32; 4],
    },
}

/// Crops named regions out of frames according to a loaded profile.
/// Template images are read once, here, rather than per frame.
pub struct RegionExtractor {
    name: String,
    regions: HashMap<String, Locator>,
}

impl RegionExtractor {
    /// Load a profile file; template paths resolve against its directory.
    pub fn load(profile_path: &Path) -> Result<Self> {
        let profile = RegionProfile::load(profile_path)?;
        let base_dir = profile_path.parent().unwrap_or_else(|| Path::new("."));
        let name = profile_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        Ok(Self::from_profile(name, &profile, base_dir))
    }

    pub fn from_profile(name: impl Into<String>, profile: &RegionProfile, base_dir: &Path) -> Self {
        let mut regions = HashMap::new();

        for (region_name, def) in &profile.rois {
            if !def.enabled {
                debug!("Region {} disabled", region_name);
                continue;
            }
            let locator = match def.mode {
                RegionMode::Static => Locator::Static(PixelRect::new(def.x, def.y, def.w, def.h)),
                RegionMode::Template => {
                    let Some(rel) = &def.template else {
                        warn!("Region {} uses template mode without a template", region_name);
                        continue;
                    };
                    let path = base_dir.join(rel);
                    match image::open(&path) {
                        Ok(img) => Locator::Template {
                            template: img.to_luma8(),
                            min_confidence: def.template_min_conf,
                            padding: def.padding,
                        },
                        Err(e) => {
                            warn!(
                                "Region {}: failed to load template {}: {}",
                                region_name,
                                path.display(),
                                e
                            );
                            continue;
                        }
                    }
                }
            };
            regions.insert(region_name.clone(), locator);
        }

        let name = name.into();
        info!("Region profile {} ready: {} active region(s)", name, regions.len());
        Self { name, regions }
    }

    /// Profile identifier (the file stem)
    pub fn profile_name(&self) -> &str {
        &self.name
    }

    pub fn has_region(&self, name: &str) -> bool {
        self.regions.contains_key(name)
    }

    /// Crop the named region, or `None` when the region is unknown, disabled,
    /// or its template is not found with enough confidence.
    pub fn crop(&self, frame: &RgbaImage, name: &str) -> Option<RgbaImage> {
        match self.regions.get(name)? {
            Locator::Static(rect) => crop_rect(frame, rect),
            Locator::Template {
                template,
                min_confidence,
                padding,
            } => {
                let hit = match_template(&to_gray(frame), template)?;
                if hit.score < *min_confidence {
                    debug!(
                        "Region {}: template score {:.3} below {:.3}",
                        name, hit.score, min_confidence
                    );
                    return None;
                }
                let [pad_l, pad_t, pad_r, pad_b] = *padding;
                let x0 = hit.x.saturating_sub(pad_l);
                let y0 = hit.y.saturating_sub(pad_t);
                let x1 = (hit.x + template.width() + pad_r).min(frame.width());
                let y1 = (hit.y + template.height() + pad_b).min(frame.height());
                crop_rect(frame, &PixelRect::new(x0, y0, x1 - x0, y1 - y0))
            }
        }
    }
}
