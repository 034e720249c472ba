// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测结果数据结构
/// Data structures for detection results

/// 检测框 (Detection bounding box)
///
/// 坐标为 x1,y1,x2,y2; 经过 `Letterbox::scale_box` 之后位于原始帧坐标系
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Detection {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: usize,
    pub confidence: f32,
}

impl Detection {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, class_id: usize, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
        }
    }

    /// 由中心点格式 (cx, cy, w, h) 构建
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32, class_id: usize, confidence: f32) -> Self {
        Self::new(
            cx - w / 2.,
            cy - h / 2.,
            cx + w / 2.,
            cy + h / 2.,
            class_id,
            confidence,
        )
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, another: &Detection) -> f32 {
        let l = self.x1.max(another.x1);
        let r = self.x2.min(another.x2);
        let t = self.y1.max(another.y1);
        let b = self.y2.min(another.y2);
        (r - l).max(0.) * (b - t).max(0.)
    }

    pub fn union(&self, another: &Detection) -> f32 {
        self.area() + another.area() - self.intersection_area(another)
    }

    pub fn iou(&self, another: &Detection) -> f32 {
        let union = self.union(another);
        if union <= 0. {
            return 0.;
        }
        self.intersection_area(another) / union
    }

    /// 整数像素坐标 (绘制用)
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        )
    }

    /// 归一化 (cx, cy, w, h), 用于导出YOLO标签
    pub fn xywhn(&self, width: u32, height: u32) -> [f32; 4] {
        let (w, h) = (width.max(1) as f32, height.max(1) as f32);
        [
            (self.x1 + self.x2) / 2. / w,
            (self.y1 + self.y2) / 2. / h,
            self.width() / w,
            self.height() / h,
        ]
    }
}
