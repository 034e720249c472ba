// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! FFmpeg 解码器 (视频文件 / 摄像头 / 网络流 / 屏幕捕获)
//!
//! 独立线程运行 FfmpegContext, 解码滤镜把 YUV420P 帧转换成 RGB 后
//! 通过有界 channel 交给消费方. 消费方丢弃 `VideoReader` 后, 下一次发送失败即停止解码.

use std::collections::HashMap;
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame, Input};
use image::RgbImage;
use tracing::{debug, info};
#[cfg(target_os = "windows")]
use tracing::warn;

use super::CaptureInfo;
use crate::error::SourceError;

/// 解码输入描述
#[derive(Debug, Clone, Default)]
pub struct InputSpec {
    pub url: String,
    pub format: Option<String>,
    pub opts: Vec<(String, String)>,
    /// 实时源: 消费跟不上时丢帧, 文件源则阻塞等待
    pub live: bool,
}

impl InputSpec {
    pub fn file(path: &str) -> Self {
        Self {
            url: path.to_string(),
            ..Default::default()
        }
    }

    /// 网络流 (RTSP 强制 TCP)
    pub fn stream(url: &str) -> Self {
        let opts = if url.to_lowercase().starts_with("rtsp://") {
            vec![
                ("rtsp_transport".to_string(), "tcp".to_string()),
                ("rtsp_flags".to_string(), "prefer_tcp".to_string()),
            ]
        } else {
            vec![]
        };
        Self {
            url: url.to_string(),
            format: None,
            opts,
            live: true,
        }
    }

    /// 本地摄像头 - 根据平台选择格式
    pub fn camera(index: usize) -> Self {
        #[cfg(target_os = "windows")]
        let (format, url) = ("dshow", format!("video={}", camera_name(index)));
        #[cfg(target_os = "macos")]
        let (format, url) = ("avfoundation", format!("{}", index));
        #[cfg(target_os = "linux")]
        let (format, url) = ("v4l2", format!("/dev/video{}", index));
        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        let (format, url) = ("video4linux2", format!("{}", index));

        Self {
            url,
            format: Some(format.to_string()),
            opts: vec![],
            live: true,
        }
    }

    fn build(&self) -> Input {
        let mut input = Input::new(self.url.clone());
        if let Some(format) = &self.format {
            input = input.set_format(format.clone());
        }
        if !self.opts.is_empty() {
            let opts: HashMap<String, String> = self.opts.iter().cloned().collect();
            input = input.set_input_opts(opts);
        }
        input
    }
}

/// Windows 下 dshow 需要设备名称
#[cfg(target_os = "windows")]
fn camera_name(index: usize) -> String {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().nth(index).unwrap_or_default(),
        Err(e) => {
            warn!("⚠️ 获取摄像头列表失败: {}", e);
            String::new()
        }
    }
}

/// 解码滤镜: YUV420P → RGB
struct RgbFilter {
    tx: Option<Sender<RgbImage>>,
    live: bool,
    decoded: usize,
    dropped: usize,
}

impl FrameFilter for RgbFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            self.dropped += 1;
            return Ok(None);
        }
        let Some(rgb) = (unsafe { yuv420p_to_rgb(&frame) }) else {
            self.dropped += 1;
            return Ok(None);
        };
        let Some(tx) = &self.tx else {
            return Err("decoder closed".to_string());
        };
        self.decoded += 1;

        if self.live {
            match tx.try_send(rgb) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => return Err("receiver closed".to_string()),
            }
        } else if tx.send(rgb).is_err() {
            return Err("receiver closed".to_string());
        }
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        // 关闭发送端, 消费方收到流结束
        self.tx.take();
        debug!("✅ 解码线程退出 (解码{}帧, 丢弃{}帧)", self.decoded, self.dropped);
    }
}

/// YUV420P 帧 → RgbImage (BT.601)
///
/// # Safety
/// `frame` 必须是有效的 YUV420P 帧
unsafe fn yuv420p_to_rgb(frame: &Frame) -> Option<RgbImage> {
    let av = &*frame.as_ptr();
    let (w, h) = (av.width as usize, av.height as usize);
    if w == 0 || h == 0 {
        return None;
    }
    let (data_y, data_u, data_v) = (av.data[0], av.data[1], av.data[2]);
    if data_y.is_null() || data_u.is_null() || data_v.is_null() {
        return None;
    }
    let y_stride = av.linesize[0] as usize;
    let uv_stride = av.linesize[1] as usize;
    if y_stride < w || uv_stride < w.div_ceil(2) {
        return None;
    }

    let mut rgb = vec![0u8; w * h * 3];
    for y in 0..h {
        for x in 0..w {
            let y_val = *data_y.add(y * y_stride + x) as f32;
            let u_val = *data_u.add((y / 2) * uv_stride + x / 2) as f32 - 128.0;
            let v_val = *data_v.add((y / 2) * uv_stride + x / 2) as f32 - 128.0;

            let idx = (y * w + x) * 3;
            rgb[idx] = (y_val + 1.402 * v_val).clamp(0.0, 255.0) as u8;
            rgb[idx + 1] = (y_val - 0.344 * u_val - 0.714 * v_val).clamp(0.0, 255.0) as u8;
            rgb[idx + 2] = (y_val + 1.772 * u_val).clamp(0.0, 255.0) as u8;
        }
    }
    RgbImage::from_raw(w as u32, h as u32, rgb)
}

/// 帧读取器
pub struct VideoReader {
    rx: Receiver<RgbImage>,
    pending: Option<RgbImage>,
    info: CaptureInfo,
}

impl VideoReader {
    /// 启动解码线程, 等待 FFmpeg 打开输入后返回
    pub fn open(spec: InputSpec) -> Result<Self, SourceError> {
        let mut info = probe(&spec);
        let (tx, rx) = bounded(if spec.live { 1 } else { 4 });
        let (init_tx, init_rx) = bounded::<Result<(), String>>(1);
        let filter = RgbFilter {
            tx: Some(tx),
            live: spec.live,
            decoded: 0,
            dropped: 0,
        };

        let name = spec.url.clone();
        thread::Builder::new()
            .name("decoder".to_string())
            .spawn(move || {
                let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
                let pipe = pipe.filter("rgb", Box::new(filter));
                let out = create_null_output().add_frame_pipeline(pipe);

                let ctx = match FfmpegContext::builder()
                    .input(spec.build())
                    .filter_descs(["format=yuv420p"].into())
                    .output(out)
                    .build()
                {
                    Ok(ctx) => ctx,
                    Err(e) => {
                        let _ = init_tx.send(Err(format!("构建失败: {}", e)));
                        return;
                    }
                };
                let sch = match ctx.start() {
                    Ok(sch) => sch,
                    Err(e) => {
                        let _ = init_tx.send(Err(format!("启动失败: {}", e)));
                        return;
                    }
                };
                let _ = init_tx.send(Ok(()));
                if let Err(e) = sch.wait() {
                    debug!("📹 解码循环结束: {}", e);
                }
            })?;

        match init_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(SourceError::open(name, reason)),
            Err(_) => return Err(SourceError::open(name, "decoder thread exited")),
        }

        // 探测不到尺寸时以第一帧为准
        let mut pending = None;
        if info.width == 0 || info.height == 0 {
            if let Ok(first) = rx.recv() {
                info.width = first.width();
                info.height = first.height();
                pending = Some(first);
            }
        }
        info!(
            "✅ 已打开 {} ({}x{} @ {:.1}fps)",
            name, info.width, info.height, info.fps
        );
        Ok(Self { rx, pending, info })
    }

    /// 阻塞读取下一帧, 流结束返回 None
    pub fn read(&mut self) -> Option<RgbImage> {
        self.pending.take().or_else(|| self.rx.recv().ok())
    }

    pub fn info(&self) -> CaptureInfo {
        self.info
    }
}

/// 读取流信息 (帧率/尺寸/总帧数)
fn probe(spec: &InputSpec) -> CaptureInfo {
    let mut info = CaptureInfo::default();
    if spec.format.is_some() {
        return info;
    }
    match find_video_stream_info(spec.url.clone()) {
        Ok(Some(StreamInfo::Video {
            fps,
            width,
            height,
            nb_frames,
            ..
        })) => {
            if fps.is_finite() && fps > 0.0 {
                info.fps = fps;
            }
            info.width = width.max(0) as u32;
            info.height = height.max(0) as u32;
            info.frames = (nb_frames > 0).then_some(nb_frames as u64);
        }
        Ok(_) => debug!("未找到视频流信息: {}", spec.url),
        Err(e) => debug!("读取流信息失败 {}: {}", spec.url, e),
    }
    info
}
