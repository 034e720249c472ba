// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 屏幕捕获: `screen [index] [left top width height]`

use anyhow::Result;

use super::{LoaderOptions, SourceFrame};
use crate::error::SourceError;

#[cfg(feature = "ffmpeg")]
use super::decoder::{InputSpec, VideoReader};
#[cfg(feature = "ffmpeg")]
use super::SourceMode;

/// 捕获区域, 未指定宽高时捕获整个屏幕
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRegion {
    pub screen: usize,
    pub left: u32,
    pub top: u32,
    pub size: Option<(u32, u32)>,
}

impl ScreenRegion {
    pub fn parse(source: &str) -> Result<Self, SourceError> {
        let invalid = || SourceError::InvalidScreen(source.to_string());
        let mut tokens = source.split_whitespace();
        if !tokens
            .next()
            .is_some_and(|t| t.to_lowercase().starts_with("screen"))
        {
            return Err(invalid());
        }
        let params = tokens
            .map(|t| t.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| invalid())?;

        let region = match params.as_slice() {
            [] => Self::default(),
            [screen] => Self {
                screen: *screen as usize,
                ..Default::default()
            },
            [left, top, width, height] => Self {
                left: *left,
                top: *top,
                size: Some((*width, *height)),
                ..Default::default()
            },
            [screen, left, top, width, height] => Self {
                screen: *screen as usize,
                left: *left,
                top: *top,
                size: Some((*width, *height)),
            },
            _ => return Err(invalid()),
        };
        if matches!(region.size, Some((0, _)) | Some((_, 0))) {
            return Err(invalid());
        }
        Ok(region)
    }

    pub fn describe(&self) -> String {
        match self.size {
            Some((w, h)) => format!(
                "screen {} (LTWH): {},{},{},{}: ",
                self.screen, self.left, self.top, w, h
            ),
            None => format!("screen {}: ", self.screen),
        }
    }

    /// 平台相关的 FFmpeg 抓屏输入
    #[cfg(feature = "ffmpeg")]
    fn input_spec(&self) -> InputSpec {
        let mut opts = vec![("framerate".to_string(), "30".to_string())];
        if let Some((w, h)) = self.size {
            opts.push(("video_size".to_string(), format!("{}x{}", w, h)));
        }

        #[cfg(target_os = "windows")]
        let (format, url) = {
            opts.push(("offset_x".to_string(), self.left.to_string()));
            opts.push(("offset_y".to_string(), self.top.to_string()));
            ("gdigrab", "desktop".to_string())
        };
        #[cfg(target_os = "macos")]
        let (format, url) = ("avfoundation", format!("Capture screen {}", self.screen));
        #[cfg(not(any(target_os = "windows", target_os = "macos")))]
        let (format, url) = (
            "x11grab",
            format!(":0.{}+{},{}", self.screen, self.left, self.top),
        );

        InputSpec {
            url,
            format: Some(format.to_string()),
            opts,
            live: true,
        }
    }
}

/// 屏幕捕获加载器 (无限序列)
pub struct LoadScreenshots {
    region: ScreenRegion,
    #[cfg(feature = "ffmpeg")]
    opts: LoaderOptions,
    #[cfg(feature = "ffmpeg")]
    frame: u64,
    #[cfg(feature = "ffmpeg")]
    reader: VideoReader,
}

impl LoadScreenshots {
    #[cfg(feature = "ffmpeg")]
    pub fn new(source: &str, opts: LoaderOptions) -> Result<Self, SourceError> {
        let region = ScreenRegion::parse(source)?;
        let reader = VideoReader::open(region.input_spec())?;
        Ok(Self {
            region,
            opts,
            frame: 0,
            reader,
        })
    }

    #[cfg(not(feature = "ffmpeg"))]
    pub fn new(source: &str, _opts: LoaderOptions) -> Result<Self, SourceError> {
        ScreenRegion::parse(source)?;
        Err(SourceError::FeatureDisabled {
            what: "Screen capture",
            feature: "ffmpeg",
        })
    }

    pub fn region(&self) -> ScreenRegion {
        self.region
    }
}

impl Iterator for LoadScreenshots {
    type Item = Result<SourceFrame>;

    #[cfg(feature = "ffmpeg")]
    fn next(&mut self) -> Option<Self::Item> {
        let image = self.reader.read()?;
        self.frame += 1;
        let capture = super::CaptureInfo {
            width: image.width(),
            height: image.height(),
            ..self.reader.info()
        };
        let built = SourceFrame::build(image, &self.opts, SourceMode::Stream).map(|mut f| {
            f.path = format!("screen{}", self.region.screen);
            f.capture = Some(capture);
            f.frame_index = self.frame;
            f.description = self.region.describe();
            f
        });
        Some(built)
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn next(&mut self) -> Option<Self::Item> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region() {
        assert_eq!(ScreenRegion::parse("screen").unwrap(), ScreenRegion::default());
        assert_eq!(ScreenRegion::parse("screen 2").unwrap().screen, 2);
        let r = ScreenRegion::parse("screen 100 50 640 480").unwrap();
        assert_eq!((r.screen, r.left, r.top, r.size), (0, 100, 50, Some((640, 480))));
        let r = ScreenRegion::parse("Screen 1 0 0 320 240").unwrap();
        assert_eq!((r.screen, r.size), (1, Some((320, 240))));
        assert_eq!(r.describe(), "screen 1 (LTWH): 0,0,320,240: ");
    }

    #[test]
    fn test_parse_invalid() {
        assert!(ScreenRegion::parse("screen 1 2").is_err());
        assert!(ScreenRegion::parse("screen a").is_err());
        assert!(ScreenRegion::parse("screen 0 0 0 0").is_err());
        assert!(ScreenRegion::parse("camera 0").is_err());
    }
}
