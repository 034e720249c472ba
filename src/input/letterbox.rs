// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! Letterbox 预处理: 等比缩放 + 灰边填充, 以及检测框的坐标还原

use anyhow::{anyhow, Result};
use fast_image_resize as fr;
use image::{imageops, Rgb, RgbImage};
use ndarray::Array4;
use tracing::warn;

/// 填充颜色
pub const PAD_COLOR: Rgb<u8> = Rgb([114, 114, 114]);

use crate::detection::Detection;

/// 一次 letterbox 变换的几何参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub original: (u32, u32), // 原始帧 (width, height)
    pub resized: (u32, u32),  // 缩放后未填充 (width, height)
    pub shape: (u32, u32),    // 张量 (width, height)
    pub gain: f32,
    pub pad: (u32, u32), // (left, top)
}

impl Letterbox {
    /// 计算缩放比例与填充
    ///
    /// `auto` 为 true 时只填充到 stride 的整数倍 (最小矩形), 否则填满 `target`
    pub fn compute(original: (u32, u32), target: (u32, u32), stride: u32, auto: bool) -> Self {
        let w0 = original.0.max(1) as f32;
        let h0 = original.1.max(1) as f32;
        let gain = (target.0 as f32 / w0).min(target.1 as f32 / h0);
        let nw = ((w0 * gain).round() as u32).max(1);
        let nh = ((h0 * gain).round() as u32).max(1);

        let mut dw = target.0.saturating_sub(nw);
        let mut dh = target.1.saturating_sub(nh);
        if auto && stride > 0 {
            dw %= stride;
            dh %= stride;
        }
        let (dw, dh) = (dw as f32 / 2., dh as f32 / 2.);
        let top = (dh - 0.1).round().max(0.) as u32;
        let bottom = (dh + 0.1).round().max(0.) as u32;
        let left = (dw - 0.1).round().max(0.) as u32;
        let right = (dw + 0.1).round().max(0.) as u32;

        Self {
            original: (original.0, original.1),
            resized: (nw, nh),
            shape: (nw + left + right, nh + top + bottom),
            gain,
            pad: (left, top),
        }
    }

    /// 缩放 + 填充
    pub fn apply(&self, img: &RgbImage) -> Result<RgbImage> {
        let resized = if (img.width(), img.height()) == self.resized {
            img.clone()
        } else {
            resize(img, self.resized.0, self.resized.1)?
        };
        let mut canvas = RgbImage::from_pixel(self.shape.0, self.shape.1, PAD_COLOR);
        imageops::replace(&mut canvas, &resized, self.pad.0 as i64, self.pad.1 as i64);
        Ok(canvas)
    }

    /// 张量坐标 → 原始帧坐标: 去填充、除以缩放比、裁剪到边界、取整
    pub fn scale_box(&self, d: Detection) -> Detection {
        let (left, top) = (self.pad.0 as f32, self.pad.1 as f32);
        let (w, h) = (self.original.0 as f32, self.original.1 as f32);
        let sx = |x: f32| ((x - left) / self.gain).clamp(0., w).round();
        let sy = |y: f32| ((y - top) / self.gain).clamp(0., h).round();
        Detection {
            x1: sx(d.x1),
            y1: sy(d.y1),
            x2: sx(d.x2),
            y2: sy(d.y2),
            ..d
        }
    }
}

/// 双线性缩放 (fast_image_resize)
pub fn resize(img: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let src = fr::images::Image::from_vec_u8(
        img.width(),
        img.height(),
        img.as_raw().clone(),
        fr::PixelType::U8x3,
    )?;
    let mut dst = fr::images::Image::new(width, height, fr::PixelType::U8x3);
    let mut resizer = fr::Resizer::new();
    resizer.resize(
        &src,
        &mut dst,
        &fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
    )?;
    RgbImage::from_raw(width, height, dst.into_vec()).ok_or_else(|| anyhow!("RGB图像转换失败"))
}

/// 推理尺寸向上取整到 stride 的倍数
pub fn check_img_size(imgsz: (u32, u32), stride: u32) -> (u32, u32) {
    let stride = stride.max(1);
    let make_divisible = |x: u32| (x.div_ceil(stride) * stride).max(stride);
    let checked = (make_divisible(imgsz.0), make_divisible(imgsz.1));
    if checked != imgsz {
        warn!(
            "⚠️ 推理尺寸 {:?} 不是 stride={} 的倍数, 已调整为 {:?}",
            imgsz, stride, checked
        );
    }
    checked
}

/// RGB图像 → NCHW张量 (0-1)
pub fn to_tensor(img: &RgbImage) -> Array4<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let mut ys = Array4::<f32>::zeros((1, 3, h, w));
    for (x, y, rgb) in img.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }
    ys
}

/// 原始帧 → (张量, letterbox参数)
pub fn prepare(
    img: &RgbImage,
    imgsz: (u32, u32),
    stride: u32,
    auto: bool,
) -> Result<(Array4<f32>, Letterbox)> {
    let letterbox = Letterbox::compute((img.width(), img.height()), imgsz, stride, auto);
    let padded = letterbox.apply(img)?;
    Ok((to_tensor(&padded), letterbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_full_padding() {
        let lb = Letterbox::compute((200, 100), (640, 640), 32, false);
        assert_eq!(lb.resized, (640, 320));
        assert_eq!(lb.shape, (640, 640));
        assert_eq!(lb.pad, (0, 160));
        assert!((lb.gain - 3.2).abs() < 1e-6);
    }

    #[test]
    fn test_compute_auto_padding() {
        let lb = Letterbox::compute((200, 100), (640, 640), 32, true);
        assert_eq!(lb.shape, (640, 320));
        assert_eq!(lb.pad, (0, 0));

        // 奇数填充: 上少下多
        let lb = Letterbox::compute((100, 99), (100, 100), 32, false);
        assert_eq!(lb.resized, (100, 99));
        assert_eq!(lb.pad, (0, 0));
        assert_eq!(lb.shape, (100, 100));
    }

    #[test]
    fn test_prepare_shapes() {
        let img = RgbImage::from_pixel(100, 50, Rgb([255, 0, 0]));
        let (xs, lb) = prepare(&img, (64, 64), 32, false).unwrap();
        assert_eq!(xs.shape(), &[1, 3, 64, 64]);
        assert_eq!(lb.pad, (0, 16));
        // 填充区域为灰色, 图像区域为红色
        assert!((xs[[0, 0, 0, 0]] - 114. / 255.).abs() < 1e-6);
        assert!((xs[[0, 0, 32, 32]] - 1.).abs() < 1e-6);
        assert!(xs[[0, 1, 32, 32]].abs() < 1e-6);
    }

    #[test]
    fn test_scale_box_clips() {
        let lb = Letterbox::compute((100, 100), (200, 200), 32, false);
        let d = lb.scale_box(Detection::new(-10., 20., 260., 100., 1, 0.5));
        assert_eq!((d.x1, d.y1, d.x2, d.y2), (0., 10., 100., 50.));
        assert_eq!(d.class_id, 1);
    }

    #[test]
    fn test_check_img_size() {
        assert_eq!(check_img_size((640, 640), 32), (640, 640));
        assert_eq!(check_img_size((650, 10), 32), (672, 32));
    }
}
