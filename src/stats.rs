// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 运行统计: 帧率 / 检测数 / 帧高度 + 分阶段耗时
//!
//! `StatsCell` 是进程级的"最新值"单元: 写入方每处理完一帧整体替换快照,
//! 读取方拿到的总是某一帧完整的快照 (可能不是最新的那一帧), 不会读到半更新的值.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde::Serialize;

/// 最近一帧的统计快照
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RunStatistics {
    pub fps: f64,
    pub detections: usize,
    pub frame_height: u32,
}

impl RunStatistics {
    pub fn fps_text(&self) -> String {
        self.fps.to_string()
    }

    pub fn detections_text(&self) -> String {
        self.detections.to_string()
    }

    pub fn frame_height_text(&self) -> String {
        self.frame_height.to_string()
    }
}

/// 进程级最新统计值
#[derive(Debug, Clone, Default)]
pub struct StatsCell {
    inner: Arc<RwLock<RunStatistics>>,
}

impl StatsCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, stats: RunStatistics) {
        *self.inner.write() = stats;
    }

    pub fn snapshot(&self) -> RunStatistics {
        *self.inner.read()
    }
}

/// 瞬时帧率: 1 / 距上一帧的时间
#[derive(Debug, Default)]
pub struct FpsMeter {
    prev: Option<Instant>,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 第一帧返回 0
    pub fn tick(&mut self, now: Instant) -> f64 {
        let fps = match self.prev {
            Some(prev) => frame_rate(now.saturating_duration_since(prev)),
            None => 0.0,
        };
        self.prev = Some(now);
        fps
    }
}

/// 帧间隔 → 帧率, 间隔为零时返回 0
pub fn frame_rate(delta: Duration) -> f64 {
    let secs = delta.as_secs_f64();
    if secs > 0.0 {
        1.0 / secs
    } else {
        0.0
    }
}

/// 分阶段累计耗时
#[derive(Debug, Default, Clone, Copy)]
pub struct Profile {
    total: Duration,
    count: u32,
    start: Option<Instant>,
}

impl Profile {
    pub fn start(&mut self) {
        self.start = Some(Instant::now());
    }

    pub fn stop(&mut self) -> Duration {
        let dt = self.start.take().map(|s| s.elapsed()).unwrap_or_default();
        self.total += dt;
        self.count += 1;
        dt
    }

    /// 平均耗时 (毫秒)
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.total.as_secs_f64() * 1000.0 / self.count as f64
    }

    pub fn count(&self) -> u32 {
        self.count
    }
}
