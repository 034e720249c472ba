// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测结果绘制 (Annotation)
//!
//! 每个类别ID在表内的检测框: 类别颜色的矩形框 + 实心标签底 + 白色标签文字.
//! 类别ID越界的检测框跳过并告警, 不计入数量.

mod glyphs;

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use tracing::{info, warn};

use crate::detection::{ClassCatalog, Detection};
use glyphs::{glyph, lit, GLYPH_HEIGHT, GLYPH_SPACING, GLYPH_WIDTH};

const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 置信度向上取整到两位小数: 0.873 → 0.88
pub fn ceil_confidence(confidence: f32) -> f32 {
    (confidence * 100.0).ceil() / 100.0
}

/// 标签字体
#[derive(Clone)]
pub enum LabelFont {
    /// 内置 5x7 点阵, 按整数倍放大
    Bitmap { scale: u32 },
    /// TTF/OTF 字体
    TrueType { font: FontArc, scale: PxScale },
}

impl LabelFont {
    /// 线宽对应的字号, 字体加载失败时退回点阵字体
    pub fn load(path: Option<&Path>, line_thickness: u32) -> Self {
        let scale = line_thickness.saturating_sub(1).max(1);
        let Some(path) = path else {
            return Self::Bitmap { scale };
        };
        match fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontArc::try_from_vec(bytes).map_err(|e| e.to_string()))
        {
            Ok(font) => {
                info!("🔤 标签字体: {}", path.display());
                Self::TrueType {
                    font,
                    scale: PxScale::from((GLYPH_HEIGHT * scale) as f32 * 1.6),
                }
            }
            Err(e) => {
                warn!("⚠️ 加载字体 {} 失败: {}, 使用内置点阵字体", path.display(), e);
                Self::Bitmap { scale }
            }
        }
    }

    /// 文字尺寸 (width, height)
    pub fn text_size(&self, text: &str) -> (u32, u32) {
        match self {
            Self::Bitmap { scale } => {
                let n = text.chars().count() as u32;
                if n == 0 {
                    return (0, GLYPH_HEIGHT * scale);
                }
                (
                    (n * (GLYPH_WIDTH + GLYPH_SPACING) - GLYPH_SPACING) * scale,
                    GLYPH_HEIGHT * scale,
                )
            }
            Self::TrueType { font, scale } => text_size(*scale, font, text),
        }
    }

    /// 以左上角 (x, y) 绘制
    pub fn draw(&self, img: &mut RgbImage, text: &str, x: i32, y: i32, color: Rgb<u8>) {
        match self {
            Self::Bitmap { scale } => draw_bitmap_text(img, text, x, y, *scale, color),
            Self::TrueType { font, scale } => draw_text_mut(img, color, x, y, *scale, font, text),
        }
    }
}

fn draw_bitmap_text(img: &mut RgbImage, text: &str, x: i32, y: i32, scale: u32, color: Rgb<u8>) {
    let (w, h) = (img.width() as i32, img.height() as i32);
    let s = scale as i32;
    for (i, ch) in text.chars().enumerate() {
        let cx = x + i as i32 * (GLYPH_WIDTH + GLYPH_SPACING) as i32 * s;
        for (row, bits) in glyph(ch).into_iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if !lit(bits, col) {
                    continue;
                }
                // 每个点放大成 scale x scale 的方块
                for dy in 0..s {
                    for dx in 0..s {
                        let px = cx + col as i32 * s + dx;
                        let py = y + row as i32 * s + dy;
                        if px >= 0 && py >= 0 && px < w && py < h {
                            img.put_pixel(px as u32, py as u32, color);
                        }
                    }
                }
            }
        }
    }
}

/// 检测框绘制器
pub struct Annotator {
    catalog: ClassCatalog,
    font: LabelFont,
    thickness: u32,
}

impl Annotator {
    pub fn new(catalog: ClassCatalog, font: LabelFont, thickness: u32) -> Self {
        Self {
            catalog,
            font,
            thickness: thickness.max(1),
        }
    }

    pub fn catalog(&self) -> &ClassCatalog {
        &self.catalog
    }

    /// 标签文字, 类别越界返回 None
    pub fn label(&self, d: &Detection) -> Option<String> {
        let name = self.catalog.name(d.class_id)?;
        Some(format!("{} {:.2}", name, ceil_confidence(d.confidence)))
    }

    /// 在帧上绘制检测结果, 返回实际绘制的数量
    ///
    /// 逆序绘制, 置信度最高的框在最上层
    pub fn annotate(&self, img: &mut RgbImage, detections: &[Detection]) -> usize {
        let mut count = 0;
        for d in detections.iter().rev() {
            let (Some(label), Some(color)) = (self.label(d), self.catalog.color(d.class_id))
            else {
                warn!(
                    "⚠️ 类别ID {} 超出类别表范围 ({}), 已跳过",
                    d.class_id,
                    self.catalog.len()
                );
                continue;
            };
            self.draw_box(img, d, color);
            self.draw_label(img, d, &label, color);
            count += 1;
        }
        count
    }

    /// 线宽以框线为中心
    fn draw_box(&self, img: &mut RgbImage, d: &Detection, color: Rgb<u8>) {
        let (x1, y1, x2, y2) = d.corners();
        let t = self.thickness as i32;
        for offset in -(t / 2)..(t - t / 2) {
            let (l, top) = (x1 - offset, y1 - offset);
            let (w, h) = (x2 - x1 + 2 * offset + 1, y2 - y1 + 2 * offset + 1);
            if w <= 0 || h <= 0 {
                continue;
            }
            draw_hollow_rect_mut(img, Rect::at(l, top).of_size(w as u32, h as u32), color);
        }
    }

    /// 标签底色块: 宽为文字宽, 高为文字高 + 3, 紧贴框的上边
    fn draw_label(&self, img: &mut RgbImage, d: &Detection, label: &str, color: Rgb<u8>) {
        let (x1, y1, _, _) = d.corners();
        let (tw, th) = self.font.text_size(label);
        if tw == 0 {
            return;
        }
        let bg_top = y1 - th as i32 - 3;
        draw_filled_rect_mut(img, Rect::at(x1, bg_top).of_size(tw, th + 3), color);
        self.font.draw(img, label, x1, bg_top + 1, TEXT_COLOR);
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(ClassCatalog::default(), LabelFont::Bitmap { scale: 2 }, 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> RgbImage {
        RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]))
    }

    #[test]
    fn test_ceil_confidence() {
        assert!((ceil_confidence(0.873) - 0.88).abs() < 1e-6);
        assert!((ceil_confidence(0.25) - 0.25).abs() < 1e-6);
        assert!((ceil_confidence(0.999) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_single_detection_round_trip() {
        let annotator = Annotator::default();
        let d = Detection::new(10., 10., 50., 50., 0, 0.873);
        assert_eq!(annotator.label(&d).as_deref(), Some("cardboard 0.88"));

        let mut img = frame();
        let n = annotator.annotate(&mut img, &[d]);
        assert_eq!(n, 1);
        assert_eq!(img.dimensions(), (100, 100));
        // 框线使用 cardboard 的颜色
        assert_eq!(*img.get_pixel(30, 50), Rgb([255, 45, 85]));
        // 框内不受影响
        assert_eq!(*img.get_pixel(30, 30), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_every_class_in_range_renders() {
        let annotator = Annotator::default();
        for id in 0..annotator.catalog().len() {
            let mut img = frame();
            let d = Detection::new(20., 40., 80., 90., id, 0.5);
            assert_eq!(annotator.annotate(&mut img, &[d]), 1);
            let color = annotator.catalog().color(id).unwrap();
            assert_eq!(*img.get_pixel(50, 90), color);
            let label = annotator.label(&d).unwrap();
            assert!(label.starts_with(annotator.catalog().name(id).unwrap()));
        }
    }

    #[test]
    fn test_out_of_range_class_dropped() {
        let annotator = Annotator::default();
        let mut img = frame();
        let ds = [
            Detection::new(10., 10., 50., 50., 11, 0.9),
            Detection::new(10., 10., 50., 50., 1, 0.9),
            Detection::new(10., 10., 50., 50., 99, 0.9),
        ];
        assert_eq!(annotator.annotate(&mut img, &ds), 1);
        assert!(annotator.label(&ds[0]).is_none());
    }

    #[test]
    fn test_label_near_top_edge() {
        let annotator = Annotator::default();
        let mut img = frame();
        // 标签超出图像上边界时被裁剪, 不会越界
        let d = Detection::new(0., 0., 99., 99., 2, 0.5);
        assert_eq!(annotator.annotate(&mut img, &[d]), 1);
    }

    #[test]
    fn test_bitmap_text_size() {
        let font = LabelFont::Bitmap { scale: 2 };
        assert_eq!(font.text_size("ab"), (22, 14));
        assert_eq!(font.text_size(""), (0, 14));
        assert!(matches!(LabelFont::load(None, 3), LabelFont::Bitmap { scale: 2 }));
    }
}
