//! FFmpeg-backed source for video files, stream URLs and capture devices.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use image::RgbImage;

use super::FrameSource;
use crate::error::FrameReadError;

pub struct FfmpegSource {
    location: String,
    input: Option<ffmpeg::format::context::Input>,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    native_fps: f64,
    frame_count: u64,
    eof_sent: bool,
}

impl FfmpegSource {
    pub fn open(location: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        if location.starts_with("/dev/video") {
            ffmpeg::device::register_all();
        }
        let input = ffmpeg::format::input(&location)
            .with_context(|| format!("failed to open '{}' with ffmpeg", location))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("'{}' has no video track", location))?;
        let stream_index = input_stream.index();
        let native_fps = f64::from(input_stream.avg_frame_rate());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            location: location.to_string(),
            input: Some(input),
            stream_index,
            decoder,
            scaler,
            native_fps,
            frame_count: 0,
            eof_sent: false,
        })
    }

    fn read_error(&self, reason: impl std::fmt::Display) -> FrameReadError {
        FrameReadError {
            frame_index: self.frame_count,
            reason: format!("{}: {}", self.location, reason),
        }
    }

    fn receive_decoded(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        let mut decoded = ffmpeg::frame::Video::empty();
        if self.decoder.receive_frame(&mut decoded).is_err() {
            return Ok(None);
        }
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&decoded, &mut rgb_frame)
            .map_err(|e| self.read_error(format!("scale frame to RGB: {}", e)))?;
        let image = frame_to_image(&rgb_frame).map_err(|e| self.read_error(e))?;
        self.frame_count += 1;
        Ok(Some(image))
    }
}

impl FrameSource for FfmpegSource {
    fn native_fps(&self) -> f64 {
        self.native_fps
    }

    fn read_next(&mut self) -> Result<Option<RgbImage>, FrameReadError> {
        loop {
            if let Some(image) = self.receive_decoded()? {
                return Ok(Some(image));
            }
            if self.eof_sent {
                return Ok(None);
            }

            let stream_index = self.stream_index;
            let Some(input) = self.input.as_mut() else {
                return Err(self.read_error("source closed"));
            };
            let next = input
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);

            match next {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .map_err(|e| self.read_error(format!("send packet to decoder: {}", e)))?,
                None => {
                    self.eof_sent = true;
                    self.decoder
                        .send_eof()
                        .map_err(|e| self.read_error(format!("flush decoder: {}", e)))?;
                }
            }
        }
    }

    fn close(&mut self) {
        if self.input.take().is_some() {
            log::debug!(
                "closed ffmpeg input {} after {} frames",
                self.location,
                self.frame_count
            );
        }
    }
}

fn frame_to_image(frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    let pixels = if stride == row_bytes {
        data.get(..row_bytes * height as usize)
            .context("ffmpeg frame is shorter than its dimensions")?
            .to_vec()
    } else {
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            pixels.extend_from_slice(
                data.get(start..start + row_bytes)
                    .context("ffmpeg frame row is out of bounds")?,
            );
        }
        pixels
    };

    RgbImage::from_raw(width, height, pixels).context("ffmpeg frame size mismatch")
}
