//! Camera device interface and a directory-backed camera for simulation
//!
//! The capture driver holds the device through a `CameraLease`, which closes
//! the camera when dropped. That covers every exit path, including the driver
//! future being dropped mid-capture.

use crate::domain::types::ShotDirection;
use crate::error::CameraError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A photo source that can be opened once per session
#[async_trait]
pub trait Camera: Send + Sync + 'static {
    /// Acquire and configure the device
    async fn open(&self) -> Result<(), CameraError>;

    /// Take one photo; suspends until the encoded buffer is available
    async fn capture(&self, direction: ShotDirection) -> Result<Bytes, CameraError>;

    /// Release the device. Must be safe to call from `Drop`.
    fn close(&self);
}

/// Exclusive hold on an opened camera, released on drop
pub struct CameraLease<C: Camera> {
    camera: Arc<C>,
}

impl<C: Camera> CameraLease<C> {
    pub async fn acquire(camera: Arc<C>) -> Result<Self, CameraError> {
        camera.open().await?;
        Ok(Self { camera })
    }

    pub async fn capture(&self, direction: ShotDirection) -> Result<Bytes, CameraError> {
        self.camera.capture(direction).await
    }
}

impl<C: Camera> Drop for CameraLease<C> {
    fn drop(&mut self) {
        self.camera.close();
    }
}

/// Camera that serves `<direction>.{jpg,jpeg,png}` files from a directory
pub struct DirectoryCamera {
    dir: PathBuf,
    open: AtomicBool,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), open: AtomicBool::new(false) }
    }

    /// Find the image file for a direction, if any
    pub fn shot_path(&self, direction: ShotDirection) -> Option<PathBuf> {
        ["jpg", "jpeg", "png"]
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", direction.as_str(), ext)))
            .find(|path| path.is_file())
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Camera for DirectoryCamera {
    async fn open(&self) -> Result<(), CameraError> {
        if !self.dir.is_dir() {
            return Err(CameraError::Unavailable(format!(
                "{} is not a directory",
                self.dir.display()
            )));
        }
        if self.open.swap(true, Ordering::Relaxed) {
            return Err(CameraError::Unavailable("camera already in use".to_string()));
        }
        info!(dir = %self.dir.display(), "camera_opened");
        Ok(())
    }

    async fn capture(&self, direction: ShotDirection) -> Result<Bytes, CameraError> {
        if !self.is_open() {
            return Err(CameraError::CaptureFailed {
                direction,
                reason: "camera not open".to_string(),
            });
        }
        let path = self.shot_path(direction).ok_or_else(|| CameraError::CaptureFailed {
            direction,
            reason: format!("no {direction} image in {}", self.dir.display()),
        })?;
        let data = tokio::fs::read(&path).await.map_err(|e| CameraError::CaptureFailed {
            direction,
            reason: format!("{}: {}", path.display(), e),
        })?;
        debug!(direction = %direction, path = %path.display(), bytes = %data.len(), "camera_frame");
        Ok(Bytes::from(data))
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::Relaxed) {
            info!(dir = %self.dir.display(), "camera_closed");
        }
    }
}
