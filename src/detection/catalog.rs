// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 类别表: 类别ID → 显示名称 + 显示颜色

use image::Rgb;

/// 垃圾分类模型的类别名称
pub const WASTE_CLASSES: [&str; 11] = [
    "cardboard",
    "clothes",
    "food",
    "glass",
    "metal",
    "paper",
    "plastic",
    "plastic bag",
    "trash",
    "wood",
    "shoe",
];

/// 前几个类别的专用颜色 (RGB)
pub const CLASS_COLORS: [Rgb<u8>; 4] = [
    Rgb([255, 45, 85]),  // 红
    Rgb([175, 82, 222]), // 紫
    Rgb([255, 204, 0]),  // 黄
    Rgb([255, 149, 0]),  // 橙
];

/// 其余类别统一使用的颜色
pub const FALLBACK_COLOR: Rgb<u8> = Rgb([0, 100, 200]);

/// 类别表 (启动时创建, 之后只读)
#[derive(Clone, Debug, PartialEq)]
pub struct ClassCatalog {
    names: Vec<String>,
    colors: Vec<Rgb<u8>>,
    fallback: Rgb<u8>,
}

impl Default for ClassCatalog {
    fn default() -> Self {
        Self::new(
            WASTE_CLASSES.iter().map(|s| s.to_string()).collect(),
            CLASS_COLORS.to_vec(),
            FALLBACK_COLOR,
        )
    }
}

impl ClassCatalog {
    pub fn new(names: Vec<String>, colors: Vec<Rgb<u8>>, fallback: Rgb<u8>) -> Self {
        Self {
            names,
            colors,
            fallback,
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn contains(&self, class_id: usize) -> bool {
        class_id < self.names.len()
    }

    pub fn name(&self, class_id: usize) -> Option<&str> {
        self.names.get(class_id).map(String::as_str)
    }

    /// 越界返回 None; 未单独配色的类别返回统一颜色
    pub fn color(&self, class_id: usize) -> Option<Rgb<u8>> {
        if !self.contains(class_id) {
            return None;
        }
        Some(self.colors.get(class_id).copied().unwrap_or(self.fallback))
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}
