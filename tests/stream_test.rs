#[cfg(test)]
mod stream_tests {
    use std::sync::Arc;
    use visioncam::notify::ChannelNotifier;
    use visioncam::testing::SyntheticDevice;
    use visioncam::types::{Frame, PixelEncoding, VideoMode};
    use visioncam::{BroadcastChannels, Camera, CameraParams, DeviceIdentity, MjpegServer};

    fn camera_on(channels: &BroadcastChannels, notifier: ChannelNotifier) -> Camera {
        let modes = vec![
            VideoMode::new(320, 240, 30, PixelEncoding::Mjpeg),
            VideoMode::new(640, 480, 30, PixelEncoding::Mjpeg),
        ];
        Camera::new(
            CameraParams::new(DeviceIdentity::new("front", "/dev/synthetic/front")),
            SyntheticDevice::new("front", modes).boxed(),
            Arc::new(channels.clone()),
            Arc::new(notifier),
        )
        .unwrap()
    }

    #[test]
    fn test_subscriber_follows_resolution_change() {
        let channels = BroadcastChannels::new();
        let (notifier, mut events) = ChannelNotifier::new();
        let camera = camera_on(&channels, notifier);
        let mut frames = channels.subscribe("front").unwrap();

        let mut frame = Frame::empty();
        camera.capture_frame(&mut frame).unwrap();
        camera.publish_frame(&frame).unwrap();

        camera.set_active_mode(1, true).unwrap();
        camera.capture_frame(&mut frame).unwrap();
        camera.publish_frame(&frame).unwrap();

        assert_eq!(frames.try_recv().unwrap().width, 320);
        assert_eq!(frames.try_recv().unwrap().width, 640);

        let event = events.try_recv().unwrap();
        assert_eq!(event.camera, "front");
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_endpoint_reports_current_size() {
        let channels = BroadcastChannels::new();
        let (notifier, _events) = ChannelNotifier::new();
        let camera = camera_on(&channels, notifier);

        let endpoint = camera.stream_endpoint().unwrap();
        assert_eq!((endpoint.width, endpoint.height), (320, 240));
        assert_eq!(endpoint.port, None);

        camera.set_active_mode(1, true).unwrap();
        let endpoint = camera.stream_endpoint().unwrap();
        assert_eq!((endpoint.width, endpoint.height), (640, 480));
    }

    #[tokio::test]
    async fn test_endpoint_carries_server_port() {
        let channels = BroadcastChannels::new();
        let (notifier, _events) = ChannelNotifier::new();
        let camera = camera_on(&channels, notifier);

        let server = MjpegServer::bind(
            channels.clone(),
            camera.name(),
            "127.0.0.1:0".parse().unwrap(),
            80,
        )
        .await
        .unwrap();
        assert_eq!(camera.stream_endpoint().unwrap().port, Some(server.port()));

        camera.set_active_mode(1, true).unwrap();
        assert_eq!(camera.stream_endpoint().unwrap().port, Some(server.port()));

        server.shutdown().await;
        assert_eq!(camera.stream_endpoint().unwrap().port, None);
    }
}
