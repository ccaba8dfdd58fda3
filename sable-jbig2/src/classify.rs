//! The lossy symbol classifier: connected components matched against a
//! growing template dictionary by rank-Hausdorff or correlation tests.
//!
//! Every component either joins an existing class or founds a new one; the
//! per-component class IDs, page numbers and placement corners are what a
//! symbolic encoder needs to reproduce the pages from the templates.

use rustc_hash::FxHashMap;

use crate::bitmap::Bitmap;
use crate::cancel::CancelToken;
use crate::component::{ComponentKind, connected_components};
use crate::error::{ErrorKind, Result, bail};
use crate::morph::{Sel, dilate};
use crate::score::{
    correlation_score_thresholded, haus_test, rank_haus_test, xor_count,
};

/// The uniform border added around components and templates before
/// matching, so dilations and small shifts never clip.
pub(crate) const ADDED_PIXELS: u32 = 6;

/// The match test applied to candidate templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    /// Windowed rank-Hausdorff matching against dilated templates.
    #[default]
    RankHaus,
    /// Thresholded normalized cross-correlation.
    Correlation,
}

/// Classifier configuration; validated by [`Classifier::new`].
#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// The match test.
    pub method: Method,
    /// What counts as one component.
    pub component_kind: ComponentKind,
    /// Components wider than this are discarded.
    pub max_component_width: u32,
    /// Components taller than this are discarded.
    pub max_component_height: u32,
    /// Side of the square structuring element dilating Hausdorff
    /// templates, 1..=10.
    pub size_haus: u32,
    /// The rank fraction of the Hausdorff test, 0.5..=1.0.
    pub rank_haus: f32,
    /// The correlation score threshold, 0.4..=0.98.
    pub threshold: f32,
    /// Weight factor tightening the threshold for dense templates,
    /// 0.0..=1.0.
    pub weight_factor: f32,
    /// Whether every instance bitmap is retained per class.
    pub keep_instances: bool,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            method: Method::default(),
            component_kind: ComponentKind::default(),
            max_component_width: 150,
            max_component_height: 150,
            size_haus: 2,
            rank_haus: 0.97,
            threshold: 0.85,
            weight_factor: 0.0,
            keep_instances: false,
        }
    }
}

impl ClassifierSettings {
    fn validate(&self) -> Result<()> {
        if self.max_component_width == 0 || self.max_component_height == 0 {
            bail!(ErrorKind::OutOfRange("max component size must be positive"));
        }
        if !(1..=10).contains(&self.size_haus) {
            bail!(ErrorKind::OutOfRange("size_haus outside 1..=10"));
        }
        if !(0.5..=1.0).contains(&self.rank_haus) {
            bail!(ErrorKind::OutOfRange("rank_haus outside 0.5..=1.0"));
        }
        if !(0.4..=0.98).contains(&self.threshold) {
            bail!(ErrorKind::OutOfRange("threshold outside 0.4..=0.98"));
        }
        if !(0.0..=1.0).contains(&self.weight_factor) {
            bail!(ErrorKind::OutOfRange("weight_factor outside 0.0..=1.0"));
        }
        Ok(())
    }
}

/// The probe order over `(dw, dh)` size differences: the exact size first,
/// then rings of increasing distance out to +-2.
#[rustfmt::skip]
const SEARCH_OFFSETS: [(i32, i32); 25] = [
    (0, 0),
    (-1, 0), (0, -1), (1, 0), (0, 1),
    (-1, -1), (1, -1), (-1, 1), (1, 1),
    (-2, 0), (0, -2), (2, 0), (0, 2),
    (-2, -1), (-1, -2), (1, -2), (2, -1), (2, 1), (1, 2), (-1, 2), (-2, 1),
    (-2, -2), (2, -2), (2, 2), (-2, 2),
];

/// Maximum width/height difference between a component and a matching
/// template, matching the extent of [`SEARCH_OFFSETS`].
const MAX_SIZE_DELTA: u32 = 2;

/// A growing dictionary of class templates plus the per-component
/// assignments.
pub struct Classifier {
    settings: ClassifierSettings,
    cancel: CancelToken,

    /// Bordered, undilated class templates.
    templates: Vec<Bitmap>,
    /// Bordered, dilated templates (rank-Hausdorff only; dilated once at
    /// class creation, never again).
    dilated_templates: Vec<Bitmap>,
    /// Foreground pixel count of each template.
    template_areas: Vec<u32>,
    /// Centroid of each (bordered) template.
    template_centroids: Vec<(f32, f32)>,
    /// Unbordered `height * width` to template indices of that size.
    size_hash: FxHashMap<u64, Vec<usize>>,
    /// Instances per class, kept when `keep_instances` is set.
    instances: Vec<Vec<Bitmap>>,

    /// Per-component class ID, page number and upper-left corner.
    class_ids: Vec<usize>,
    page_numbers: Vec<u32>,
    ul_corners: Vec<(i32, i32)>,
    /// Lower-left corners, filled by [`Classifier::compute_ll_corners`].
    ll_corners: Vec<(i32, i32)>,

    /// Component count per processed page.
    components_per_page: Vec<usize>,
}

impl Classifier {
    /// Create a classifier, validating the settings ranges.
    pub fn new(settings: ClassifierSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            cancel: CancelToken::default(),
            templates: Vec::new(),
            dilated_templates: Vec::new(),
            template_areas: Vec::new(),
            template_centroids: Vec::new(),
            size_hash: FxHashMap::default(),
            instances: Vec::new(),
            class_ids: Vec::new(),
            page_numbers: Vec::new(),
            ul_corners: Vec::new(),
            ll_corners: Vec::new(),
            components_per_page: Vec::new(),
        })
    }

    /// Install a cancellation token polled between components.
    pub fn set_cancel_token(&mut self, cancel: CancelToken) {
        self.cancel = cancel;
    }

    /// The number of classes discovered so far.
    pub fn num_classes(&self) -> usize {
        self.templates.len()
    }

    /// The number of components classified so far.
    pub fn num_components(&self) -> usize {
        self.class_ids.len()
    }

    /// Per-component class IDs, in classification order.
    pub fn class_ids(&self) -> &[usize] {
        &self.class_ids
    }

    /// Per-component page numbers.
    pub fn page_numbers(&self) -> &[u32] {
        &self.page_numbers
    }

    /// Per-component upper-left template corners.
    pub fn ul_corners(&self) -> &[(i32, i32)] {
        &self.ul_corners
    }

    /// Per-component lower-left corners; empty until
    /// [`Classifier::compute_ll_corners`] ran.
    pub fn ll_corners(&self) -> &[(i32, i32)] {
        &self.ll_corners
    }

    /// The class template with its matching border removed.
    pub fn template(&self, class_id: usize) -> Option<Bitmap> {
        let bordered = self.templates.get(class_id)?;
        bordered
            .crop(
                ADDED_PIXELS,
                ADDED_PIXELS,
                bordered.width() - 2 * ADDED_PIXELS,
                bordered.height() - 2 * ADDED_PIXELS,
            )
            .ok()
    }

    /// The stored instances of one class (only with `keep_instances`).
    pub fn class_instances(&self, class_id: usize) -> &[Bitmap] {
        self.instances.get(class_id).map_or(&[], |v| v.as_slice())
    }

    /// Drop all state, ready for the next document.
    pub fn reset(&mut self) {
        self.templates.clear();
        self.dilated_templates.clear();
        self.template_areas.clear();
        self.template_centroids.clear();
        self.size_hash.clear();
        self.instances.clear();
        self.class_ids.clear();
        self.page_numbers.clear();
        self.ul_corners.clear();
        self.ll_corners.clear();
        self.components_per_page.clear();
    }

    /// Extract and classify the components of one page.
    pub fn add_page(&mut self, page: &Bitmap, page_number: u32, method: Method) -> Result<()> {
        let components = connected_components(
            page,
            self.settings.component_kind,
            self.settings.max_component_width,
            self.settings.max_component_height,
        )?;

        log::debug!(
            "classifying page {page_number}: {} components, {} classes so far",
            components.len(),
            self.num_classes()
        );

        for component in &components {
            self.cancel.check()?;
            self.classify_component(component.bounds.x, component.bounds.y, &component.bitmap, page_number, method)?;
        }

        self.components_per_page.push(components.len());
        Ok(())
    }

    /// Match one component against the dictionary, founding a new class on
    /// a miss, and record its assignment and UL corner.
    fn classify_component(
        &mut self,
        box_x: u32,
        box_y: u32,
        component: &Bitmap,
        page_number: u32,
        method: Method,
    ) -> Result<()> {
        let padded = component.add_border(ADDED_PIXELS, ADDED_PIXELS, ADDED_PIXELS, ADDED_PIXELS)?;
        let area = padded.count_ones();
        let centroid = padded.centroid();

        // Dilated copy and row downcounts feed the two match tests.
        let dilated = match method {
            Method::RankHaus => Some(dilate(
                &padded,
                &Sel::brick(self.settings.size_haus, self.settings.size_haus)?,
            )?),
            Method::Correlation => None,
        };
        let downcounts = match method {
            Method::Correlation => Some(padded.row_downcounts()),
            Method::RankHaus => None,
        };

        let width = component.width();
        let height = component.height();

        let mut matched: Option<usize> = None;
        'search: for &(dw, dh) in &SEARCH_OFFSETS {
            let probe_width = width as i64 + dw as i64;
            let probe_height = height as i64 + dh as i64;
            if probe_width <= 0 || probe_height <= 0 {
                continue;
            }

            let key = probe_height as u64 * probe_width as u64;
            let Some(candidates) = self.size_hash.get(&key) else {
                continue;
            };

            for &candidate in candidates {
                let template = &self.templates[candidate];
                let (t_cx, t_cy) = self.template_centroids[candidate];
                let t_area = self.template_areas[candidate];

                let dx = (centroid.0 - t_cx).round() as i32;
                let dy = (centroid.1 - t_cy).round() as i32;

                let is_match = match method {
                    Method::RankHaus => {
                        let dilated = dilated.as_ref().expect("dilated component");
                        let template_dilated = &self.dilated_templates[candidate];
                        if self.settings.rank_haus >= 1.0 {
                            haus_test(
                                &padded,
                                dilated,
                                template,
                                template_dilated,
                                dx,
                                dy,
                                MAX_SIZE_DELTA,
                                MAX_SIZE_DELTA,
                            )
                        } else {
                            rank_haus_test(
                                &padded,
                                dilated,
                                template,
                                template_dilated,
                                dx,
                                dy,
                                MAX_SIZE_DELTA,
                                MAX_SIZE_DELTA,
                                area,
                                t_area,
                                self.settings.rank_haus,
                            )
                        }
                    }
                    Method::Correlation => {
                        // Heavier templates get a stricter threshold.
                        let threshold = if self.settings.weight_factor > 0.0 {
                            let density =
                                t_area as f32 / (template.width() * template.height()) as f32;
                            self.settings.threshold
                                + (1.0 - self.settings.threshold)
                                    * self.settings.weight_factor
                                    * density
                        } else {
                            self.settings.threshold
                        };

                        correlation_score_thresholded(
                            &padded,
                            template,
                            area,
                            t_area,
                            dx,
                            dy,
                            MAX_SIZE_DELTA,
                            MAX_SIZE_DELTA,
                            threshold,
                            downcounts.as_ref().expect("downcounts"),
                        )
                    }
                };

                if is_match {
                    matched = Some(candidate);
                    break 'search;
                }
            }
        }

        let class_id = match matched {
            Some(class_id) => {
                if self.settings.keep_instances {
                    self.instances[class_id].push(padded.clone());
                }
                class_id
            }
            None => {
                let class_id = self.templates.len();

                // A new class: its dilation happens here, once; later
                // matches reuse it as is.
                if method == Method::RankHaus {
                    let template_dilated = dilated
                        .clone()
                        .expect("dilated component for a Hausdorff class");
                    self.dilated_templates.push(template_dilated);
                } else {
                    self.dilated_templates.push(padded.clone());
                }

                self.templates.push(padded.clone());
                self.template_areas.push(area);
                self.template_centroids.push(centroid);
                self.size_hash
                    .entry(height as u64 * width as u64)
                    .or_default()
                    .push(class_id);
                self.instances.push(if self.settings.keep_instances {
                    vec![padded.clone()]
                } else {
                    Vec::new()
                });

                class_id
            }
        };

        // The placement corner: align the template to the component by
        // centroid difference, then take the best of a +-1 pixel window by
        // XOR error.
        let (t_cx, t_cy) = self.template_centroids[class_id];
        let delta_x = (t_cx - centroid.0).round() as i32;
        let delta_y = (t_cy - centroid.1).round() as i32;

        let template = &self.templates[class_id];
        let mut best = (0_i32, 0_i32);
        let mut best_err = u32::MAX;
        for sy in -1..=1 {
            for sx in -1..=1 {
                let err = xor_count(&padded, template, -delta_x + sx, -delta_y + sy);
                if err < best_err {
                    best_err = err;
                    best = (sx, sy);
                }
            }
        }

        self.class_ids.push(class_id);
        self.page_numbers.push(page_number);
        self.ul_corners.push((
            box_x as i32 - delta_x + best.0,
            box_y as i32 - delta_y + best.1,
        ));

        Ok(())
    }

    /// Derive the lower-left corners from the UL corners and each class's
    /// template height; the baseline downstream text placement hangs from.
    pub fn compute_ll_corners(&mut self) {
        self.ll_corners = self
            .class_ids
            .iter()
            .zip(&self.ul_corners)
            .map(|(&class_id, &(x, y))| {
                let height = self.templates[class_id].height() - 2 * ADDED_PIXELS;
                (x, y + height as i32)
            })
            .collect();
    }
}
