//! H.264 decode backend over the `openh264` crate.

use tracing::warn;

use crate::codec::annexb::AccessUnitSplitter;
use crate::codec::{DecodeError, VideoDecoder};
use crate::frame::{Plane, VideoFrame};

/// A streaming H.264 decoder: Annex B in, YUV 4:2:0 pictures out.
pub struct OpenH264Decoder {
    raw: openh264::decoder::Decoder,
    splitter: AccessUnitSplitter,
}

impl OpenH264Decoder {
    pub fn new() -> Result<Self, DecodeError> {
        let raw = openh264::decoder::Decoder::new()
            .map_err(|e| DecodeError::Fatal(format!("cannot create decode context: {e}")))?;
        Ok(Self {
            raw,
            splitter: AccessUnitSplitter::new(),
        })
    }

    fn convert(yuv: &impl openh264::formats::YUVSource) -> VideoFrame {
        let (width, height) = yuv.dimensions();
        let (sy, su, sv) = yuv.strides();
        VideoFrame::new(
            width as u32,
            height as u32,
            vec![
                Plane::new(yuv.y().to_vec(), sy),
                Plane::new(yuv.u().to_vec(), su),
                Plane::new(yuv.v().to_vec(), sv),
            ],
        )
    }
}

impl VideoDecoder for OpenH264Decoder {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError> {
        let mut frames = Vec::new();
        let mut corrupt: Option<String> = None;

        for unit in self.splitter.push(data) {
            match self.raw.decode(&unit) {
                Ok(Some(yuv)) => frames.push(Self::convert(&yuv)),
                // The decoder is buffering (parameter sets, reordering).
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "skipping undecodable access unit");
                    corrupt = Some(e.to_string());
                }
            }
        }

        // Surface corruption only when the whole chunk yielded nothing;
        // otherwise the good pictures win.
        if frames.is_empty() {
            if let Some(msg) = corrupt {
                return Err(DecodeError::Corrupt(msg));
            }
        }
        Ok(frames)
    }
}
