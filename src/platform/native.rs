use super::{apply_with_rollback, CaptureBackend};
use crate::errors::CameraError;
use crate::types::{DeviceIdentity, DeviceInfo, Frame, PixelEncoding, VideoMode};
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{
        ApiBackend, CameraFormat, CameraIndex, ControlValueSetter, FrameFormat,
        KnownCameraControl, RequestedFormat, RequestedFormatType, Resolution,
    },
    Camera,
};

/// List cameras through the platform's default nokhwa backend
pub fn list_devices() -> Result<Vec<DeviceInfo>, CameraError> {
    let cameras = query(ApiBackend::Auto)
        .map_err(|e| CameraError::InitializationError(format!("Failed to query cameras: {}", e)))?;

    Ok(cameras
        .into_iter()
        .map(|info| DeviceInfo {
            identity: DeviceIdentity::new(info.human_name(), info.index().to_string()),
            driver: Some(info.description().to_string()),
        })
        .collect())
}

/// nokhwa-backed capture device (AVFoundation, MediaFoundation)
pub struct NativeBackend {
    identity: DeviceIdentity,
    camera: Camera,
    mode: Option<VideoMode>,
}

impl NativeBackend {
    /// Open the camera whose path is its nokhwa index
    pub fn open(identity: &DeviceIdentity) -> Result<Self, CameraError> {
        let index = identity.path.parse::<u32>().map_err(|_| {
            CameraError::InitializationError(format!("Invalid device index: {}", identity.path))
        })?;

        let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);
        let camera = Self::open_camera(index, requested)?;

        Ok(Self {
            identity: identity.clone(),
            camera,
            mode: None,
        })
    }

    fn open_camera(index: u32, requested: RequestedFormat) -> Result<Camera, CameraError> {
        let mut camera = Camera::new(CameraIndex::Index(index), requested).map_err(|e| {
            CameraError::InitializationError(format!("Failed to initialize camera: {}", e))
        })?;
        camera.open_stream().map_err(|e| {
            CameraError::InitializationError(format!("Failed to start stream: {}", e))
        })?;
        Ok(camera)
    }

    fn control(&mut self, control: KnownCameraControl, value: i32) -> Result<(), CameraError> {
        self.camera
            .set_camera_control(control, ControlValueSetter::Integer(value as i64))
            .map_err(|e| {
                CameraError::ControlError(format!(
                    "Failed to set {:?} on {}: {}",
                    control, self.identity, e
                ))
            })
    }
}

fn encoding_of(format: FrameFormat) -> PixelEncoding {
    match format {
        FrameFormat::MJPEG => PixelEncoding::Mjpeg,
        FrameFormat::YUYV => PixelEncoding::Yuyv,
        FrameFormat::NV12 => PixelEncoding::Nv12,
        FrameFormat::GRAY => PixelEncoding::Gray8,
        FrameFormat::RAWRGB => PixelEncoding::Rgb24,
        #[allow(unreachable_patterns)]
        _ => PixelEncoding::Unknown,
    }
}

fn frame_format_of(encoding: PixelEncoding) -> Option<FrameFormat> {
    match encoding {
        PixelEncoding::Mjpeg => Some(FrameFormat::MJPEG),
        PixelEncoding::Yuyv => Some(FrameFormat::YUYV),
        PixelEncoding::Nv12 => Some(FrameFormat::NV12),
        PixelEncoding::Gray8 => Some(FrameFormat::GRAY),
        PixelEncoding::Rgb24 => Some(FrameFormat::RAWRGB),
        _ => None,
    }
}

/// Switch the open camera to `mode` in place, keeping its stream running
fn apply_request(
    camera: &mut Camera,
    identity: &DeviceIdentity,
    mode: &VideoMode,
) -> Result<(), CameraError> {
    let frame_format = frame_format_of(mode.encoding).ok_or_else(|| {
        CameraError::InitializationError(format!("{} is not supported here", mode.encoding))
    })?;

    let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::Exact(
        CameraFormat::new(Resolution::new(mode.width, mode.height), frame_format, mode.fps),
    ));
    let applied = camera.set_camera_requset(requested).map_err(|e| {
        CameraError::InitializationError(format!("Failed to apply {} on {}: {}", mode, identity, e))
    })?;
    if !camera.is_stream_open() {
        camera.open_stream().map_err(|e| {
            CameraError::InitializationError(format!("Failed to restart stream on {}: {}", identity, e))
        })?;
    }

    if applied.width() != mode.width || applied.height() != mode.height {
        return Err(CameraError::InitializationError(format!(
            "{} applied {}x{} instead of {}",
            identity,
            applied.width(),
            applied.height(),
            mode
        )));
    }
    Ok(())
}

impl CaptureBackend for NativeBackend {
    fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn enumerate_modes(&mut self) -> Result<Vec<VideoMode>, CameraError> {
        let formats = self.camera.compatible_camera_formats().map_err(|e| {
            CameraError::InitializationError(format!(
                "Failed to enumerate formats on {}: {}",
                self.identity, e
            ))
        })?;

        Ok(formats
            .into_iter()
            .map(|format| {
                VideoMode::new(
                    format.width(),
                    format.height(),
                    format.frame_rate(),
                    encoding_of(format.format()),
                )
            })
            .collect())
    }

    fn set_mode(&mut self, mode: &VideoMode) -> Result<(), CameraError> {
        let camera = &mut self.camera;
        let identity = &self.identity;
        apply_with_rollback(|m| apply_request(camera, identity, m), mode, self.mode)?;

        self.mode = Some(*mode);
        log::info!("{} switched to {}", self.identity, mode);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.camera.is_stream_open()
    }

    fn grab(&mut self, frame: &mut Frame) -> Result<(), CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::CaptureError(format!("Failed to capture frame: {}", e)))?;

        let resolution = buffer.resolution();
        frame.fill(
            buffer.buffer(),
            resolution.width_x,
            resolution.height_y,
            encoding_of(buffer.source_frame_format()),
        );
        Ok(())
    }

    fn set_brightness(&mut self, value: i32) -> Result<(), CameraError> {
        self.control(KnownCameraControl::Brightness, value)
    }

    fn set_exposure(&mut self, value: i32) -> Result<(), CameraError> {
        self.control(KnownCameraControl::Exposure, value)
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        let _ = self.camera.stop_stream();
    }
}

// nokhwa's Camera is only ever touched through the owning camera's device lock.
unsafe impl Send for NativeBackend {}
