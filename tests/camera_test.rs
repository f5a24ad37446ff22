#[cfg(test)]
mod camera_tests {
    use std::sync::Arc;
    use std::time::Duration;
    use visioncam::calibration::CalibrationValues;
    use visioncam::testing::{CountingNotifier, RecordingChannels, SyntheticDevice};
    use visioncam::timing::ManualClock;
    use visioncam::types::{Frame, PixelEncoding, Resolution, VideoMode};
    use visioncam::{Camera, CameraError, CameraParams, DeviceIdentity};

    fn mode(width: u32, height: u32, fps: u32) -> VideoMode {
        VideoMode::new(width, height, fps, PixelEncoding::Yuyv)
    }

    fn native_modes() -> Vec<VideoMode> {
        vec![mode(320, 200, 30), mode(160, 120, 60), mode(640, 480, 30)]
    }

    fn params() -> CameraParams {
        CameraParams::new(DeviceIdentity::new("front", "/dev/synthetic/front"))
    }

    fn build(
        params: CameraParams,
        device: SyntheticDevice,
    ) -> (Result<Camera, CameraError>, RecordingChannels, CountingNotifier) {
        let channels = RecordingChannels::new();
        let notifier = CountingNotifier::new();
        let camera = Camera::new(
            params,
            device.boxed(),
            Arc::new(channels.clone()),
            Arc::new(notifier.clone()),
        );
        (camera, channels, notifier)
    }

    #[test]
    fn test_filters_modes_and_picks_first() {
        let device = SyntheticDevice::new("front", native_modes());
        let handle = device.handle();
        let (camera, channels, notifier) = build(params(), device);
        let camera = camera.unwrap();

        assert_eq!(camera.available_modes(), &[mode(320, 200, 30), mode(640, 480, 30)]);
        assert_eq!(camera.active_mode(), mode(320, 200, 30));
        assert_eq!(camera.active_mode_index(), 0);
        assert_eq!(handle.set_mode_calls(), vec![mode(320, 200, 30)]);

        let created = channels.created();
        assert_eq!(created.len(), 1);
        assert_eq!((created[0].width, created[0].height), (320, 200));
        assert_eq!(created[0].name, "front");
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_switch_to_new_resolution_replaces_channel_once() {
        let device = SyntheticDevice::new("front", native_modes());
        let handle = device.handle();
        let (camera, channels, notifier) = build(params(), device);
        let camera = camera.unwrap();

        camera.set_active_mode(1, true).unwrap();

        assert_eq!(camera.active_mode(), mode(640, 480, 30));
        assert_eq!(channels.creations(), 2);
        let endpoint = camera.stream_endpoint().unwrap();
        assert_eq!((endpoint.width, endpoint.height), (640, 480));
        assert_eq!(notifier.cameras(), vec!["front".to_string()]);
        assert_eq!(
            handle.set_mode_calls(),
            vec![mode(320, 200, 30), mode(640, 480, 30)]
        );
        assert_eq!(camera.calibration().resolution(), Resolution::new(640, 480));
    }

    #[test]
    fn test_reselecting_active_mode_is_idempotent() {
        let (camera, channels, notifier) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        camera.set_active_mode(0, true).unwrap();
        camera.set_active_mode(0, true).unwrap();

        assert_eq!(channels.creations(), 1);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_same_resolution_switch_keeps_channel() {
        let modes = vec![mode(640, 480, 30), mode(640, 480, 60)];
        let (camera, channels, notifier) = build(params(), SyntheticDevice::new("front", modes));
        let camera = camera.unwrap();

        camera.set_active_mode(1, true).unwrap();

        assert_eq!(camera.active_mode(), mode(640, 480, 60));
        assert_eq!(channels.creations(), 1);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_switch_without_propagation_keeps_channel() {
        let (camera, channels, notifier) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        camera.set_active_mode(1, false).unwrap();

        assert_eq!(camera.active_mode(), mode(640, 480, 30));
        assert_eq!(camera.calibration().resolution(), Resolution::new(640, 480));
        assert_eq!(channels.creations(), 1);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_no_acceptable_modes_is_bad_device() {
        let device = SyntheticDevice::new("tiny", vec![mode(160, 120, 60), mode(320, 240, 15)]);
        let handle = device.handle();
        let (camera, channels, _) = build(params(), device);

        match camera {
            Err(CameraError::BadDevice { native_modes, .. }) => assert_eq!(native_modes, 2),
            other => panic!("expected BadDevice, got {:?}", other.err()),
        }
        assert!(handle.is_closed());
        assert!(handle.set_mode_calls().is_empty());
        assert_eq!(channels.creations(), 0);
    }

    #[test]
    fn test_preferred_mode_selection() {
        let (camera, _, _) = build(
            params().with_preferred_mode(1),
            SyntheticDevice::new("front", native_modes()),
        );
        assert_eq!(camera.unwrap().active_mode(), mode(640, 480, 30));

        let (camera, _, _) = build(
            params().with_preferred_mode(7),
            SyntheticDevice::new("front", native_modes()),
        );
        assert_eq!(camera.unwrap().active_mode(), mode(320, 200, 30));
    }

    #[test]
    fn test_out_of_range_mode_index_changes_nothing() {
        let (camera, channels, _) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        let result = camera.set_active_mode(2, true);
        assert!(matches!(
            result,
            Err(CameraError::InvalidModeIndex { index: 2, available: 2 })
        ));
        assert_eq!(camera.active_mode_index(), 0);
        assert_eq!(channels.creations(), 1);
    }

    #[test]
    fn test_failed_mode_push_leaves_state_untouched() {
        let device = SyntheticDevice::new("front", native_modes());
        let handle = device.handle();
        let (camera, channels, notifier) = build(params(), device);
        let camera = camera.unwrap();
        let calibration = camera.calibration();

        handle.fail_set_mode(true);
        assert!(camera.set_active_mode(1, true).is_err());

        assert_eq!(camera.active_mode(), mode(320, 200, 30));
        assert_eq!(camera.calibration(), calibration);
        assert_eq!(channels.creations(), 1);
        assert_eq!(notifier.count(), 0);
    }

    #[test]
    fn test_failed_channel_creation_keeps_old_channel() {
        let (camera, channels, notifier) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        channels.fail_next_creation();
        let result = camera.set_active_mode(1, true);
        assert!(matches!(result, Err(CameraError::StreamError(_))));

        // The device did switch, so the stored mode follows it.
        assert_eq!(camera.active_mode(), mode(640, 480, 30));
        assert_eq!(notifier.count(), 0);

        let old_size = Frame::new(vec![0; 320 * 200], 320, 200, PixelEncoding::Gray8);
        camera.publish_frame(&old_size).unwrap();
        assert_eq!(channels.created()[0].frames, 1);
    }

    #[test]
    fn test_retry_after_failed_channel_creation_resizes_channel() {
        let (camera, channels, notifier) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        channels.fail_next_creation();
        assert!(camera.set_active_mode(1, true).is_err());

        let mut frame = Frame::empty();
        camera.capture_frame(&mut frame).unwrap();
        assert!(camera.publish_frame(&frame).is_err());

        camera.set_active_mode(1, true).unwrap();
        assert_eq!(channels.creations(), 2);
        assert_eq!(notifier.count(), 1);

        camera.capture_frame(&mut frame).unwrap();
        camera.publish_frame(&frame).unwrap();
        assert_eq!(channels.created()[1].frames, 1);
    }

    #[test]
    fn test_propagating_switch_resizes_channel_left_stale() {
        let (camera, channels, notifier) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        camera.set_active_mode(1, false).unwrap();
        let mut frame = Frame::empty();
        camera.capture_frame(&mut frame).unwrap();
        assert!(camera.publish_frame(&frame).is_err());

        camera.set_active_mode(1, true).unwrap();
        assert_eq!(channels.creations(), 2);
        assert_eq!(notifier.count(), 1);
        let endpoint = camera.stream_endpoint().unwrap();
        assert_eq!((endpoint.width, endpoint.height), (640, 480));

        camera.capture_frame(&mut frame).unwrap();
        camera.publish_frame(&frame).unwrap();
        assert_eq!(channels.created()[1].frames, 1);
    }

    #[test]
    fn test_readiness_wait_gives_up_at_timeout() {
        let clock = ManualClock::new();
        let device = SyntheticDevice::new("front", native_modes())
            .connecting_after(None)
            .advancing(clock.clone(), Duration::from_millis(100));
        let handle = device.handle();

        let params = params()
            .with_clock(Arc::new(clock.clone()))
            .with_ready_timeout(Duration::from_millis(1500));
        let (camera, _, _) = build(params, device);

        assert!(camera.is_ok());
        assert_eq!(handle.connect_polls(), 16);
        assert_eq!(clock_ms(&clock), 1600);
    }

    #[test]
    fn test_readiness_wait_ends_when_connected() {
        let clock = ManualClock::new();
        let device = SyntheticDevice::new("front", native_modes())
            .connecting_after(Some(3))
            .advancing(clock.clone(), Duration::from_millis(10));
        let handle = device.handle();

        let (camera, _, _) = build(params().with_clock(Arc::new(clock)), device);

        assert!(camera.is_ok());
        assert_eq!(handle.connect_polls(), 4);
    }

    #[test]
    fn test_synchronous_device_is_not_polled() {
        let device = SyntheticDevice::new("front", native_modes());
        let handle = device.handle();
        let (camera, _, _) = build(params(), device);
        assert!(camera.is_ok());
        assert_eq!(handle.connect_polls(), 0);
    }

    fn clock_ms(clock: &ManualClock) -> u128 {
        use visioncam::timing::Clock;
        clock.elapsed().as_millis()
    }

    #[test]
    fn test_capture_tokens_increase() {
        let device = SyntheticDevice::new("front", native_modes());
        let handle = device.handle();
        let (camera, _, _) = build(params(), device);
        let camera = camera.unwrap();

        let mut frame = Frame::empty();
        let first = camera.capture_frame(&mut frame).unwrap();
        let second = camera.capture_frame(&mut frame).unwrap();
        assert!(first > 0);
        assert!(second > first);
        assert_eq!((frame.width, frame.height), (320, 200));

        handle.fail_grab(true);
        assert_eq!(camera.capture_frame(&mut frame), None);
        handle.fail_grab(false);
        assert!(camera.capture_frame(&mut frame).unwrap() > second);
    }

    #[test]
    fn test_publish_checks_frame_size() {
        let (camera, channels, _) =
            build(params(), SyntheticDevice::new("front", native_modes()));
        let camera = camera.unwrap();

        let mut frame = Frame::empty();
        camera.capture_frame(&mut frame).unwrap();
        camera.publish_frame(&frame).unwrap();

        let wrong = Frame::new(vec![0; 640 * 480], 640, 480, PixelEncoding::Gray8);
        assert!(matches!(
            camera.publish_frame(&wrong),
            Err(CameraError::StreamError(_))
        ));
        assert_eq!(channels.created()[0].frames, 1);
    }

    #[test]
    fn test_field_of_view_recomputes_calibration() {
        let (camera, _, _) = build(
            params().with_fov(70.0),
            SyntheticDevice::new("front", native_modes()),
        );
        let camera = camera.unwrap();
        assert_eq!(
            camera.calibration(),
            CalibrationValues::compute(Resolution::new(320, 200), 70.0)
        );

        camera.set_field_of_view(50.0);
        assert_eq!(camera.field_of_view(), 50.0);
        assert_eq!(
            camera.calibration(),
            CalibrationValues::compute(Resolution::new(320, 200), 50.0)
        );
    }

    #[test]
    fn test_camera_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Camera>();
    }
}
