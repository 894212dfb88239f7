use std::fmt::{Display, Formatter};

use crate::locator::Locator;

/// A capture camera seen in a device snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraDevice {
    /// Position in the platform's device order (`/dev/videoN`, avfoundation index).
    pub index: usize,
    pub description: String,
    /// Device node, when the platform exposes one.
    pub path: Option<String>,
}

impl CameraDevice {
    /// True when `name` is this camera's description or device node.
    pub fn matches(&self, name: &str) -> bool {
        self.description == name || self.path.as_deref() == Some(name)
    }

    /// Platform capture locator for this camera.
    pub fn locator(&self) -> Locator {
        #[cfg(target_os = "macos")]
        {
            Locator::device("avfoundation", &self.index.to_string())
        }
        #[cfg(target_os = "windows")]
        {
            Locator::device("dshow", &format!("video={}", self.description))
        }
        #[cfg(not(any(target_os = "macos", target_os = "windows")))]
        {
            let path = self
                .path
                .clone()
                .unwrap_or_else(|| format!("/dev/video{}", self.index));
            Locator::device("v4l2", &path)
        }
    }
}

impl Display for CameraDevice {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.index, self.description)?;
        if let Some(path) = &self.path {
            write!(f, " ({})", path)?;
        }
        Ok(())
    }
}

/// Takes a fresh snapshot of the cameras attached right now. Nothing is cached.
pub fn list_cameras() -> Vec<CameraDevice> {
    #[cfg(target_os = "linux")]
    {
        match v4l2_device_paths() {
            Ok(paths) => paths
                .into_iter()
                .enumerate()
                .map(|(index, path)| {
                    let description = v4l2_device_name(&path)
                        .unwrap_or_else(|| path.display().to_string());
                    CameraDevice {
                        index,
                        description,
                        path: Some(path.display().to_string()),
                    }
                })
                .collect(),
            Err(e) => {
                log::warn!("camera enumeration failed: {:#}", e);
                Vec::new()
            }
        }
    }
    #[cfg(not(target_os = "linux"))]
    {
        log::debug!("camera enumeration is not available on this platform");
        Vec::new()
    }
}

#[cfg(target_os = "linux")]
pub fn v4l2_device_paths() -> anyhow::Result<Vec<std::path::PathBuf>> {
    use std::path::PathBuf;
    let mut paths: Vec<PathBuf> = std::fs::read_dir("/dev")?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// Human readable name the driver reports under sysfs.
#[cfg(target_os = "linux")]
fn v4l2_device_name(path: &std::path::Path) -> Option<String> {
    let node = path.file_name()?.to_str()?;
    let name = std::fs::read_to_string(format!("/sys/class/video4linux/{}/name", node)).ok()?;
    let name = name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

/// An FFmpeg capture input format (v4l2, avfoundation, lavfi, ...).
#[derive(Clone, Debug)]
pub struct VideoInputFormat {
    pub name: String,
    pub description: String,
}

impl Display for VideoInputFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

/// Capture formats compiled into the linked FFmpeg. Requires [`crate::init`].
pub fn input_video_formats() -> Vec<VideoInputFormat> {
    ffmpeg_next::device::input::video()
        .map(|format| VideoInputFormat {
            name: format.name().to_string(),
            description: format.description().to_string(),
        })
        .collect()
}
