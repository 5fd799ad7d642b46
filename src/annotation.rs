use crate::config::AnnotationConfig;
use crate::frame::Frame;
use crate::landmarks::{HandLandmarkSet, LandmarkError};
use ab_glyph::{FontVec, PxScale};
use image::Rgb;
use imageproc::{
    drawing::{
        draw_filled_circle_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
    },
    rect::Rect,
};
use std::path::PathBuf;
use thiserror::Error;

const BOX_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const LANDMARK_COLOR: Rgb<u8> = Rgb([255, 48, 48]);
const CONNECTION_COLOR: Rgb<u8> = Rgb([224, 224, 224]);
const LANDMARK_RADIUS: i32 = 3;
const LABEL_OFFSET_PX: i32 = 10;

/// Bone pairs of the 21-point hand model: wrist, then thumb to pinky.
const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1),
    (1, 2),
    (2, 3),
    (3, 4),
    (0, 5),
    (5, 6),
    (6, 7),
    (7, 8),
    (5, 9),
    (9, 10),
    (10, 11),
    (11, 12),
    (9, 13),
    (13, 14),
    (14, 15),
    (15, 16),
    (13, 17),
    (0, 17),
    (17, 18),
    (18, 19),
    (19, 20),
];

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Failed to read font {0:?}: {1}")]
    ReadFont(PathBuf, std::io::Error),
    #[error("Invalid font file {0:?}")]
    InvalidFont(PathBuf),
}

/// Pixel rectangle around a hand, corners inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    /// Scales the landmark extent to the image and grows it by `margin` pixels.
    pub fn around(
        landmarks: &HandLandmarkSet,
        width: u32,
        height: u32,
        margin: i32,
    ) -> Result<Self, LandmarkError> {
        let (min, max) = landmarks.bounds()?;
        Ok(Self {
            x1: to_pixel(min.x, width).saturating_sub(margin),
            y1: to_pixel(min.y, height).saturating_sub(margin),
            x2: to_pixel(max.x, width).saturating_add(margin),
            y2: to_pixel(max.y, height).saturating_add(margin),
        })
    }
}

/// Scales a relative coordinate to pixels, clamped to the image extent.
fn to_pixel(value: f32, extent: u32) -> i32 {
    let extent = extent.min(i32::MAX as u32) as f32;
    (value * extent).clamp(0.0, extent) as i32
}

/// Text drawn above the box. Stored labels keep their case.
fn rendered_label(label: &str) -> String {
    label.to_uppercase()
}

pub struct Annotator {
    font: Option<FontVec>,
    margin: i32,
    thickness: i32,
    scale: PxScale,
}

impl Annotator {
    pub fn new(config: &AnnotationConfig) -> Result<Self, AnnotationError> {
        let font = match &config.font_path {
            Some(path) => {
                let bytes = std::fs::read(path)
                    .map_err(|e| AnnotationError::ReadFont(path.clone(), e))?;
                let font = FontVec::try_from_vec(bytes)
                    .map_err(|_| AnnotationError::InvalidFont(path.clone()))?;
                Some(font)
            }
            None => {
                tracing::warn!("No annotation font configured, labels will not be drawn");
                None
            }
        };

        Ok(Self {
            font,
            margin: config.margin_px,
            thickness: config.thickness.max(1),
            scale: PxScale::from(config.font_scale),
        })
    }

    /// Draws the hand skeleton, its bounding box and the uppercased label
    /// above the box.
    pub fn annotate(
        &self,
        frame: &mut Frame,
        landmarks: &HandLandmarkSet,
        label: &str,
    ) -> Result<BoundingBox, LandmarkError> {
        let bbox = BoundingBox::around(landmarks, frame.width(), frame.height(), self.margin)?;
        draw_skeleton(frame, landmarks);
        let image = frame.pixels_mut();

        for t in 0..self.thickness {
            let (x1, y1) = (bbox.x1.saturating_sub(t), bbox.y1.saturating_sub(t));
            let (x2, y2) = (bbox.x2.saturating_add(t), bbox.y2.saturating_add(t));
            if x2 < x1 || y2 < y1 {
                continue;
            }
            let width = (x2 as i64 - x1 as i64 + 1).min(u32::MAX as i64) as u32;
            let height = (y2 as i64 - y1 as i64 + 1).min(u32::MAX as i64) as u32;
            draw_hollow_rect_mut(image, Rect::at(x1, y1).of_size(width, height), BOX_COLOR);
        }

        if let Some(font) = &self.font {
            let text_y = bbox
                .y1
                .saturating_sub(LABEL_OFFSET_PX)
                .saturating_sub(self.scale.y as i32);
            draw_text_mut(
                image,
                BOX_COLOR,
                bbox.x1,
                text_y,
                self.scale,
                font,
                &rendered_label(label),
            );
        }

        Ok(bbox)
    }
}

/// Bones first, then the keypoints on top. Connections to points the detector
/// did not report are skipped.
fn draw_skeleton(frame: &mut Frame, landmarks: &HandLandmarkSet) {
    let (width, height) = (frame.width(), frame.height());
    let pixel = |index: usize| {
        let point = landmarks.points[index];
        (to_pixel(point.x, width), to_pixel(point.y, height))
    };
    let image = frame.pixels_mut();

    for &(from, to) in HAND_CONNECTIONS.iter() {
        if from >= landmarks.points.len() || to >= landmarks.points.len() {
            continue;
        }
        let (start, end) = (pixel(from), pixel(to));
        draw_line_segment_mut(
            image,
            (start.0 as f32, start.1 as f32),
            (end.0 as f32, end.1 as f32),
            CONNECTION_COLOR,
        );
    }

    for index in 0..landmarks.points.len() {
        draw_filled_circle_mut(image, pixel(index), LANDMARK_RADIUS, LANDMARK_COLOR);
    }
}
