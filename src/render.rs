// SPDX-License-Identifier: GPL-3.0-only

//! Flattening a scene into a single raster
//!
//! Objects are painted in z-order over the background and base image. Text
//! and pin labels use the 8x8 bitmap font, stretched to fill the same box
//! that `Shape::bounds` reports.

use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::imageops::{self, FilterType};
use image::{Pixel, Rgba, RgbaImage};

use crate::scene::{Color, ImageAssets, Point, Scene, Shape, TEXT_ADVANCE};

/// Render `scene` at its own size
#[must_use]
pub fn flatten(scene: &Scene, assets: &ImageAssets) -> RgbaImage {
    flatten_scaled(scene, assets, 1.0)
}

/// Render `scene` with every coordinate multiplied by `scale`
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn flatten_scaled(scene: &Scene, assets: &ImageAssets, scale: f64) -> RgbaImage {
    let scale = if scale.is_finite() && scale > 0.0 { scale } else { 1.0 };
    let width = ((f64::from(scene.width) * scale).round() as u32).max(1);
    let height = ((f64::from(scene.height) * scale).round() as u32).max(1);
    let mut canvas = RgbaImage::from_pixel(width, height, scene.background.to_rgba());

    if let Some(base) = scene.base_image.and_then(|id| assets.get(id)) {
        blit(&mut canvas, base, Point::default(), scale);
    }

    for object in &scene.objects {
        paint(&mut canvas, assets, &object.shape, scale);
    }
    canvas
}

fn paint(canvas: &mut RgbaImage, assets: &ImageAssets, shape: &Shape, scale: f64) {
    let at = |p: Point| Point::new(p.x * scale, p.y * scale);
    match shape {
        Shape::Rectangle {
            x,
            y,
            width,
            height,
            stroke,
            stroke_width,
            ..
        } => {
            // Corners are drawn square
            let (min, max) = (at(Point::new(*x, *y)), at(Point::new(x + width, y + height)));
            let corners = [
                min,
                Point::new(max.x, min.y),
                max,
                Point::new(min.x, max.y),
            ];
            for i in 0..4 {
                draw_line(canvas, corners[i], corners[(i + 1) % 4], stroke_width * scale, *stroke);
            }
        }
        Shape::Arrow {
            segments,
            stroke,
            stroke_width,
        } => {
            for segment in segments {
                draw_line(canvas, at(segment.from), at(segment.to), stroke_width * scale, *stroke);
            }
        }
        Shape::Path {
            points,
            stroke,
            stroke_width,
        } => {
            for pair in points.windows(2) {
                draw_line(canvas, at(pair[0]), at(pair[1]), stroke_width * scale, *stroke);
            }
        }
        Shape::Pin {
            x,
            y,
            radius,
            fill,
            stroke,
            number,
        } => {
            let centre = at(Point::new(*x, *y));
            fill_circle(canvas, centre, radius * scale, *fill);
            draw_ring(canvas, centre, radius * scale, 2.0 * scale, *stroke);

            let label = number.to_string();
            let size = radius * scale;
            #[allow(clippy::cast_precision_loss)]
            let width = label.chars().count() as f64 * size * TEXT_ADVANCE;
            let origin = Point::new(centre.x - width / 2.0, centre.y - size / 2.0);
            draw_text(canvas, origin, &label, size, Color::WHITE);
        }
        Shape::Image {
            x,
            y,
            scale: image_scale,
            image,
            ..
        } => {
            if let Some(pixels) = assets.get(*image) {
                blit(canvas, pixels, at(Point::new(*x, *y)), scale * image_scale);
            }
        }
        Shape::Text {
            x,
            y,
            content,
            font_size,
            fill,
        } => draw_text(canvas, at(Point::new(*x, *y)), content, font_size * scale, *fill),
    }
}

/// Glyphs are `size` tall and `size * TEXT_ADVANCE` wide; a newline starts
/// the next line one `size` further down
#[allow(clippy::cast_precision_loss)]
fn draw_text(canvas: &mut RgbaImage, origin: Point, text: &str, size: f64, color: Color) {
    let advance = size * TEXT_ADVANCE;
    let (cell_w, cell_h) = (advance / 8.0, size / 8.0);
    for (line_index, line) in text.lines().enumerate() {
        let top = origin.y + line_index as f64 * size;
        for (index, ch) in line.chars().enumerate() {
            let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
                continue;
            };
            let left = origin.x + index as f64 * advance;
            for (row, bits) in glyph.iter().enumerate() {
                for col in 0..8 {
                    if (bits >> col) & 1 == 0 {
                        continue;
                    }
                    let min = Point::new(left + f64::from(col) * cell_w, top + row as f64 * cell_h);
                    let max = Point::new(min.x + cell_w, min.y + cell_h);
                    fill_rect(canvas, min, max, color);
                }
            }
        }
    }
}

/// Covers pixels whose index lies in `[round(min), round(max))`, so adjacent
/// cells never overlap. Always at least one pixel.
#[allow(clippy::cast_possible_truncation)]
fn fill_rect(canvas: &mut RgbaImage, min: Point, max: Point, color: Color) {
    let color = color.to_rgba();
    let (x0, y0) = (min.x.round() as i64, min.y.round() as i64);
    let x1 = (max.x.round() as i64).max(x0 + 1);
    let y1 = (max.y.round() as i64).max(y0 + 1);
    for y in y0..y1 {
        for x in x0..x1 {
            plot(canvas, x, y, color);
        }
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn blit(canvas: &mut RgbaImage, image: &RgbaImage, at: Point, scale: f64) {
    if (scale - 1.0).abs() < f64::EPSILON {
        imageops::overlay(canvas, image, at.x.round() as i64, at.y.round() as i64);
        return;
    }
    let width = ((f64::from(image.width()) * scale).round() as u32).max(1);
    let height = ((f64::from(image.height()) * scale).round() as u32).max(1);
    let resized = imageops::resize(image, width, height, FilterType::Triangle);
    imageops::overlay(canvas, &resized, at.x.round() as i64, at.y.round() as i64);
}

fn plot(canvas: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    if color[3] == u8::MAX {
        *pixel = color;
    } else {
        pixel.blend(&color);
    }
}

/// Thick line stamped as squares along the segment
#[allow(clippy::cast_possible_truncation)]
fn draw_line(canvas: &mut RgbaImage, from: Point, to: Point, thickness: f64, color: Color) {
    let color = color.to_rgba();
    let (dx, dy) = (to.x - from.x, to.y - from.y);
    let steps = ((dx * dx + dy * dy).sqrt() * 2.0).ceil().max(1.0) as i64;
    let half = (thickness / 2.0).max(0.5) as i64;

    // Stamps overlap, so translucent strokes are deduplicated per pixel
    let mut seen = std::collections::HashSet::new();
    for i in 0..=steps {
        #[allow(clippy::cast_precision_loss)]
        let t = i as f64 / steps as f64;
        let cx = (from.x + dx * t).round() as i64;
        let cy = (from.y + dy * t).round() as i64;
        for oy in -half..=half {
            for ox in -half..=half {
                if seen.insert((cx + ox, cy + oy)) {
                    plot(canvas, cx + ox, cy + oy, color);
                }
            }
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn for_each_in_circle(centre: Point, outer: f64, inner: f64, mut f: impl FnMut(i64, i64)) {
    let min_x = (centre.x - outer).floor() as i64;
    let max_x = (centre.x + outer).ceil() as i64;
    let min_y = (centre.y - outer).floor() as i64;
    let max_y = (centre.y + outer).ceil() as i64;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            #[allow(clippy::cast_precision_loss)]
            let d = ((x as f64 + 0.5 - centre.x).powi(2) + (y as f64 + 0.5 - centre.y).powi(2)).sqrt();
            if d <= outer && d > inner {
                f(x, y);
            }
        }
    }
}

fn fill_circle(canvas: &mut RgbaImage, centre: Point, radius: f64, color: Color) {
    let color = color.to_rgba();
    for_each_in_circle(centre, radius, -1.0, |x, y| plot(canvas, x, y, color));
}

fn draw_ring(canvas: &mut RgbaImage, centre: Point, radius: f64, width: f64, color: Color) {
    let color = color.to_rgba();
    let inner = (radius - width / 2.0).max(0.0);
    for_each_in_circle(centre, radius + width / 2.0, inner, |x, y| {
        plot(canvas, x, y, color);
    });
}
