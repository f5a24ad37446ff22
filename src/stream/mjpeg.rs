//! MJPEG-over-HTTP server for one broadcast stream
//!
//! Each client gets a `multipart/x-mixed-replace` response and receives every
//! frame published after it connected. Slow clients skip frames instead of
//! holding back the publisher.

use super::BroadcastChannels;
use crate::errors::CameraError;
use crate::types::{Frame, PixelEncoding};
use bytes::{BufMut, Bytes, BytesMut};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

const BOUNDARY: &str = "frame";

/// Running MJPEG server bound to one named stream
pub struct MjpegServer {
    local_addr: SocketAddr,
    channels: BroadcastChannels,
    stream_name: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl MjpegServer {
    /// Bind `addr` and start serving `stream_name`.
    ///
    /// The bound port is recorded on the stream so the camera can report it
    /// as part of its endpoint.
    pub async fn bind(
        channels: BroadcastChannels,
        stream_name: &str,
        addr: SocketAddr,
        quality: u8,
    ) -> Result<Self, CameraError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        channels.set_port(stream_name, Some(local_addr.port()));
        log::info!("MJPEG stream {} listening on http://{}", stream_name, local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let accept_channels = channels.clone();
        let name = stream_name.to_string();
        let quality = quality.clamp(1, 100);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        log::debug!("MJPEG server for {} shutting down", name);
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            let Some(frames) = accept_channels.subscribe(&name) else {
                                log::warn!("Stream {} has no channel yet, refusing {}", name, peer);
                                continue;
                            };
                            log::debug!("MJPEG client {} connected to {}", peer, name);
                            tokio::spawn(async move {
                                if let Err(e) = serve_client(stream, frames, quality).await {
                                    log::debug!("MJPEG client {} disconnected: {}", peer, e);
                                }
                            });
                        }
                        Err(e) => log::error!("MJPEG accept error: {}", e),
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            channels,
            stream_name: stream_name.to_string(),
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Stop accepting clients and wait for the accept loop to exit
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("MJPEG accept loop ended abnormally: {}", e);
            }
        }
    }

    fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
            self.channels.set_port(&self.stream_name, None);
        }
    }
}

impl Drop for MjpegServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn serve_client(
    mut stream: TcpStream,
    mut frames: broadcast::Receiver<Arc<Frame>>,
    quality: u8,
) -> Result<(), CameraError> {
    // The request itself is irrelevant; every path serves the stream.
    let mut request = [0u8; 1024];
    let _ = stream.read(&mut request).await?;

    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary={}\r\nCache-Control: no-cache\r\nConnection: close\r\n\r\n",
        BOUNDARY
    );
    stream.write_all(header.as_bytes()).await?;
    stream.flush().await?;

    loop {
        let frame = match frames.recv().await {
            Ok(frame) => frame,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                log::trace!("MJPEG client lagged, skipped {} frames", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return Ok(()),
        };

        let jpeg = match tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await {
            Ok(Ok(jpeg)) => jpeg,
            Ok(Err(e)) => {
                log::debug!("Skipping frame: {}", e);
                continue;
            }
            Err(e) => {
                return Err(CameraError::StreamError(format!("encode task failed: {}", e)));
            }
        };

        stream.write_all(&multipart_chunk(&jpeg)).await?;
        stream.flush().await?;
    }
}

/// Wrap one JPEG image as a multipart body part
pub fn multipart_chunk(jpeg: &[u8]) -> Bytes {
    let head = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        BOUNDARY,
        jpeg.len()
    );
    let mut part = BytesMut::with_capacity(head.len() + jpeg.len() + 2);
    part.put_slice(head.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Encode a frame as JPEG.
///
/// MJPEG frames pass through untouched. Packed YUV and planar formats other
/// than YUYV are not supported.
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>, CameraError> {
    let image = match frame.encoding {
        PixelEncoding::Mjpeg => return Ok(frame.data.clone()),
        PixelEncoding::Rgb24 => rgb_image(frame.width, frame.height, frame.data.clone())?,
        PixelEncoding::Bgr24 => {
            let mut data = frame.data.clone();
            for pixel in data.chunks_exact_mut(3) {
                pixel.swap(0, 2);
            }
            rgb_image(frame.width, frame.height, data)?
        }
        PixelEncoding::Yuyv => {
            rgb_image(frame.width, frame.height, yuyv_to_rgb(&frame.data))?
        }
        PixelEncoding::Gray8 => {
            let gray = image::GrayImage::from_vec(frame.width, frame.height, frame.data.clone())
                .ok_or_else(|| short_buffer(frame))?;
            image::DynamicImage::ImageLuma8(gray)
        }
        other => {
            return Err(CameraError::StreamError(format!(
                "cannot encode {} frames as JPEG",
                other
            )));
        }
    };

    let mut jpeg = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    image
        .write_with_encoder(encoder)
        .map_err(|e| CameraError::StreamError(format!("JPEG encoding failed: {}", e)))?;
    Ok(jpeg)
}

fn rgb_image(width: u32, height: u32, data: Vec<u8>) -> Result<image::DynamicImage, CameraError> {
    let len = data.len();
    image::RgbImage::from_vec(width, height, data)
        .map(image::DynamicImage::ImageRgb8)
        .ok_or_else(|| {
            CameraError::StreamError(format!(
                "{} bytes is too short for a {}x{} RGB frame",
                len, width, height
            ))
        })
}

fn short_buffer(frame: &Frame) -> CameraError {
    CameraError::StreamError(format!(
        "{} bytes is too short for a {}x{} {} frame",
        frame.data.len(),
        frame.width,
        frame.height,
        frame.encoding
    ))
}

/// BT.601 YUYV (YUV 4:2:2) to packed RGB
fn yuyv_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(data.len() / 2 * 3);
    for chunk in data.chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        for y in [y0, y1] {
            let c = y as f32 - 16.0;
            let d = u as f32 - 128.0;
            let e = v as f32 - 128.0;
            rgb.push((1.164 * c + 1.596 * e).clamp(0.0, 255.0) as u8);
            rgb.push((1.164 * c - 0.392 * d - 0.813 * e).clamp(0.0, 255.0) as u8);
            rgb.push((1.164 * c + 2.017 * d).clamp(0.0, 255.0) as u8);
        }
    }
    rgb
}
