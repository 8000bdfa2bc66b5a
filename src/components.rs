//! Connected-component filtering of binary masks.
//!
//! Foreground is any non-zero pixel; regions are 8-connected. After
//! filtering, surviving regions are redrawn solid: background pockets fully
//! enclosed by a region become part of it.

use std::collections::{BTreeMap, HashMap, HashSet};

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::{
    contours::{BorderType, find_contours},
    region_labelling::{Connectivity, connected_components},
};

use crate::enums::FilterMode;
use crate::record::Candidate;

pub const FOREGROUND: u8 = 255;
pub const BACKGROUND: u8 = 0;

pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Bounding box and size of one labelled region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: usize,
}

impl Region {
    fn new(label: u32, x: u32, y: u32) -> Self {
        Self {
            label,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixel_count: 0,
        }
    }

    fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixel_count += 1;
    }

    /// Bounding box width in pixels; a one-pixel column is 1 wide.
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn touches_border(&self, width: u32, height: u32) -> bool {
        self.min_x == 0 || self.min_y == 0 || self.max_x + 1 >= width || self.max_y + 1 >= height
    }
}

/// Label the foreground of `mask` and collect one [`Region`] per label, in
/// label order.
pub fn label_regions(mask: &GrayImage) -> (LabelImage, Vec<Region>) {
    let labels = connected_components(mask, Connectivity::Eight, Luma([BACKGROUND]));
    let regions = collect_regions(&labels);
    (labels, regions)
}

fn collect_regions(labels: &LabelImage) -> Vec<Region> {
    let mut regions: BTreeMap<u32, Region> = BTreeMap::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0];
        if label == 0 {
            continue;
        }
        regions
            .entry(label)
            .or_insert_with(|| Region::new(label, x, y))
            .include(x, y);
    }
    regions.into_values().collect()
}

/// A mask redrawn from the regions that passed a filter.
#[derive(Debug, Clone)]
pub struct FilteredMask {
    pub mask: GrayImage,
    pub labels: LabelImage,
    pub regions: Vec<Region>,
}

/// Keep the regions selected by `mode` and redraw them, holes filled, into a
/// clean mask.
pub fn filter_regions(mask: &GrayImage, mode: FilterMode) -> FilteredMask {
    let (width, height) = mask.dimensions();
    let (labels, regions) = label_regions(mask);

    let kept: Vec<Region> = regions
        .into_iter()
        .filter(|region| match mode {
            FilterMode::RemoveBorder => !region.touches_border(width, height),
            FilterMode::MinimumSize {
                width: min_width,
                height: min_height,
            } => region.width() >= min_width && region.height() >= min_height,
        })
        .collect();

    let mut redrawn = draw_regions(&labels, &kept);
    fill_holes(&mut redrawn);

    FilteredMask {
        mask: redrawn,
        labels,
        regions: kept,
    }
}

/// Draw the given regions of a label image as foreground.
fn draw_regions(labels: &LabelImage, regions: &[Region]) -> GrayImage {
    let kept: HashSet<u32> = regions.iter().map(|region| region.label).collect();
    let (width, height) = labels.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        if kept.contains(&labels.get_pixel(x, y).0[0]) {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    })
}

/// Turn every background pocket that cannot reach the image border into
/// foreground. Background is followed through 4-neighbours, the complement
/// of the 8-connected foreground.
pub fn fill_holes(mask: &mut GrayImage) {
    let (width, height) = mask.dimensions();
    let inverted = GrayImage::from_fn(width, height, |x, y| {
        if mask.get_pixel(x, y).0[0] == BACKGROUND {
            Luma([FOREGROUND])
        } else {
            Luma([BACKGROUND])
        }
    });

    let labels = connected_components(&inverted, Connectivity::Four, Luma([BACKGROUND]));
    let holes: HashSet<u32> = collect_regions(&labels)
        .iter()
        .filter(|pocket| !pocket.touches_border(width, height))
        .map(|pocket| pocket.label)
        .collect();
    if holes.is_empty() {
        return;
    }

    for (x, y, pixel) in mask.enumerate_pixels_mut() {
        if holes.contains(&labels.get_pixel(x, y).0[0]) {
            *pixel = Luma([FOREGROUND]);
        }
    }
}

/// Perimeter and enclosed area of a closed outline through pixel centres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outline {
    pub perimeter: f64,
    pub enclosed_area: f64,
}

impl Outline {
    fn from_points(points: &[(f64, f64)]) -> Self {
        if points.len() < 2 {
            return Self {
                perimeter: 0.0,
                enclosed_area: 0.0,
            };
        }

        let mut perimeter = 0.0;
        let mut twice_area = 0.0;
        for (i, &(x0, y0)) in points.iter().enumerate() {
            let (x1, y1) = points[(i + 1) % points.len()];
            perimeter += (x1 - x0).hypot(y1 - y0);
            twice_area += x0 * y1 - x1 * y0;
        }
        Self {
            perimeter,
            enclosed_area: twice_area.abs() / 2.0,
        }
    }
}

/// Trace the outer outline of every labelled region drawn in `mask`.
///
/// `mask` must not have its holes filled: a region nested in another
/// region's hole only has an outer border of its own while that hole is open.
pub fn measure_outlines(mask: &GrayImage, labels: &LabelImage) -> HashMap<u32, Outline> {
    find_contours::<u32>(mask)
        .into_iter()
        .filter(|contour| contour.border_type == BorderType::Outer)
        .filter_map(|contour| {
            let first = contour.points.first()?;
            let label = labels.get_pixel(first.x, first.y).0[0];
            if label == 0 {
                return None;
            }
            let points: Vec<(f64, f64)> = contour
                .points
                .iter()
                .map(|p| (f64::from(p.x), f64::from(p.y)))
                .collect();
            Some((label, Outline::from_points(&points)))
        })
        .collect()
}

/// One [`Candidate`] per kept region of a size-filtered mask. Each region is
/// measured on its own outer border, before hole filling.
pub fn candidates_from(filtered: &FilteredMask) -> Vec<Candidate> {
    let unfilled = draw_regions(&filtered.labels, &filtered.regions);
    let outlines = measure_outlines(&unfilled, &filtered.labels);
    filtered
        .regions
        .iter()
        .map(|region| {
            let outline = outlines.get(&region.label).copied().unwrap_or(Outline {
                perimeter: 0.0,
                enclosed_area: 0.0,
            });
            Candidate::new(
                region.min_x as i32,
                region.min_y as i32,
                region.width(),
                region.height(),
                outline.perimeter,
                outline.enclosed_area,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> GrayImage {
        let height = rows.len() as u32;
        let width = rows[0].len() as u32;
        GrayImage::from_fn(width, height, |x, y| {
            if rows[y as usize].as_bytes()[x as usize] == b'#' {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    fn rect_mask(width: u32, height: u32, x0: u32, y0: u32, w: u32, h: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if x >= x0 && x < x0 + w && y >= y0 && y < y0 + h {
                Luma([FOREGROUND])
            } else {
                Luma([BACKGROUND])
            }
        })
    }

    #[test]
    fn labels_diagonal_neighbours_together() {
        let mask = mask_from(&[
            "#....", //
            ".#...", //
            "...##", //
        ]);
        let (_, regions) = label_regions(&mask);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].pixel_count, 2);
        assert_eq!((regions[0].width(), regions[0].height()), (2, 2));
    }

    #[test]
    fn border_regions_are_removed_on_every_edge() {
        let mask = mask_from(&[
            "..........", //
            ".........#", //
            "...##.....", //
            "...##.....", //
            "#.........", //
            "......#...", //
            ".....###..", //
            "......#...", //
            "..........", //
            "....#.....", //
        ]);
        let filtered = filter_regions(&mask, FilterMode::RemoveBorder);

        assert_eq!(filtered.regions.len(), 2);
        assert_eq!(filtered.mask.get_pixel(9, 1).0[0], BACKGROUND);
        assert_eq!(filtered.mask.get_pixel(0, 4).0[0], BACKGROUND);
        assert_eq!(filtered.mask.get_pixel(4, 9).0[0], BACKGROUND);
        assert_eq!(filtered.mask.get_pixel(3, 2).0[0], FOREGROUND);
        assert_eq!(filtered.mask.get_pixel(6, 6).0[0], FOREGROUND);
    }

    #[test]
    fn large_border_region_is_removed_regardless_of_size() {
        let mask = rect_mask(30, 30, 0, 5, 25, 20);
        let filtered = filter_regions(&mask, FilterMode::RemoveBorder);
        assert!(filtered.regions.is_empty());
        assert!(filtered.mask.pixels().all(|p| p.0[0] == BACKGROUND));
    }

    #[test]
    fn surviving_regions_are_redrawn_without_holes() {
        let mask = mask_from(&[
            "..........", //
            ".#######..", //
            ".#.....#..", //
            ".#.###.#..", //
            ".#.#.#.#..", //
            ".#.###.#..", //
            ".#.....#..", //
            ".#######..", //
            "..........", //
        ]);
        let filtered = filter_regions(&mask, FilterMode::RemoveBorder);
        for y in 1..8 {
            for x in 1..8 {
                assert_eq!(filtered.mask.get_pixel(x, y).0[0], FOREGROUND, "({x}, {y})");
            }
        }
        assert_eq!(filtered.mask.get_pixel(8, 4).0[0], BACKGROUND);
    }

    #[test]
    fn size_filter_boundary_is_inclusive() {
        // 5 pixels wide (raw extent 4) survives, 4 pixels wide does not.
        let mut mask = rect_mask(20, 12, 1, 1, 5, 5);
        for y in 1..6 {
            for x in 10..14 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        let filtered = filter_regions(
            &mask,
            FilterMode::MinimumSize {
                width: 5,
                height: 5,
            },
        );

        assert_eq!(filtered.regions.len(), 1);
        assert_eq!(filtered.regions[0].min_x, 1);
        assert_eq!(filtered.regions[0].width(), 5);
        assert_eq!(filtered.mask.get_pixel(11, 3).0[0], BACKGROUND);
    }

    #[test]
    fn size_filter_needs_both_dimensions() {
        let mask = rect_mask(20, 20, 2, 2, 12, 3);
        let filtered = filter_regions(
            &mask,
            FilterMode::MinimumSize {
                width: 5,
                height: 5,
            },
        );
        assert!(filtered.regions.is_empty());
    }

    #[test]
    fn fill_holes_leaves_open_bays_alone() {
        let mut mask = mask_from(&[
            ".......", //
            ".#####.", //
            ".#...#.", //
            ".#...#.", //
            ".##.##.", //
            ".......", //
        ]);
        let before = mask.clone();
        fill_holes(&mut mask);
        assert_eq!(mask, before);
    }

    #[test]
    fn square_outline_measurements() {
        let mask = rect_mask(12, 12, 3, 4, 6, 6);
        let filtered = filter_regions(
            &mask,
            FilterMode::MinimumSize {
                width: 5,
                height: 5,
            },
        );
        let candidates = candidates_from(&filtered);

        assert_eq!(candidates.len(), 1);
        let candidate = &candidates[0];
        assert_eq!((candidate.x, candidate.y), (3, 4));
        assert_eq!((candidate.width, candidate.height), (6, 6));
        assert!((candidate.perimeter - 20.0).abs() < 1e-9);
        assert!((candidate.enclosed_area - 25.0).abs() < 1e-9);
        assert!((candidate.circularity - 16.0).abs() < 1e-9);
    }

    #[test]
    fn region_inside_another_regions_hole_keeps_its_outline() {
        let mut mask = GrayImage::new(25, 25);
        for i in 3..18 {
            for (x, y) in [(i, 3), (i, 17), (3, i), (17, i)] {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
        for y in 8..13 {
            for x in 8..13 {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }

        let filtered = filter_regions(
            &mask,
            FilterMode::MinimumSize {
                width: 5,
                height: 5,
            },
        );
        let candidates = candidates_from(&filtered);
        assert_eq!(candidates.len(), 2);

        let ring = candidates.iter().find(|c| c.x == 3).unwrap();
        assert_eq!((ring.width, ring.height), (15, 15));
        assert!((ring.enclosed_area - 196.0).abs() < 1e-9);

        let inner = candidates.iter().find(|c| c.x == 8).unwrap();
        assert_eq!((inner.y, inner.width, inner.height), (8, 5, 5));
        assert!((inner.perimeter - 16.0).abs() < 1e-9);
        assert!((inner.enclosed_area - 16.0).abs() < 1e-9);
        assert!((inner.circularity - 16.0).abs() < 1e-9);

        // The output mask still has the ring's hole filled.
        assert_eq!(filtered.mask.get_pixel(5, 5).0[0], FOREGROUND);
    }

    #[test]
    fn single_point_outline_is_degenerate() {
        let outline = Outline::from_points(&[(3.0, 3.0)]);
        assert_eq!(outline.perimeter, 0.0);
        assert_eq!(outline.enclosed_area, 0.0);
    }
}
