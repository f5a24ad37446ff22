//! Synthetic frame content

use crate::types::{Frame, PixelEncoding};

/// Create an RGB24 test frame whose content changes with `frame_number`
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32) -> Frame {
    let mut frame = Frame::empty();
    fill_synthetic(&mut frame, frame_number, width, height);
    frame
}

/// Overwrite `frame` with a gradient, reusing its allocation
pub fn fill_synthetic(frame: &mut Frame, frame_number: u64, width: u32, height: u32) {
    let base = (frame_number % 256) as u8;
    frame.data.clear();
    frame.data.reserve((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            frame.data.push(base.wrapping_add((x % 256) as u8));
            frame.data.push(base.wrapping_add((y % 256) as u8));
            frame.data.push(base.wrapping_add(((x + y) % 256) as u8));
        }
    }
    frame.width = width;
    frame.height = height;
    frame.encoding = PixelEncoding::Rgb24;
}
