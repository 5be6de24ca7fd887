//! Streaming Ogg Opus encoder
//!
//! Produces a valid `audio/ogg; codecs=opus` stream in pieces: the header
//! pages, then whole pages for each captured slice, then an end-of-stream
//! page. Concatenating every piece in order yields a complete file.
//!
//! Settings:
//! - 16kHz mono input
//! - VOIP application, 16kbps VBR

use ogg::writing::{PacketWriteEndInfo, PacketWriter};

/// Sample rate the encoder expects
pub const TARGET_SAMPLE_RATE: u32 = 16000;

/// Opus frame size in samples (20ms at 16kHz)
pub const FRAME_SIZE: usize = 320;

/// Ogg Opus granule positions always count 48kHz samples
const GRANULE_PER_FRAME: u64 = (FRAME_SIZE as u64) * 48000 / TARGET_SAMPLE_RATE as u64;

const TARGET_BITRATE: i32 = 16000;

/// Largest packet libopus can emit
const MAX_PACKET_SIZE: usize = 4000;

/// Incremental Opus encoder writing Ogg pages
pub struct OggOpusEncoder {
    encoder: opus::Encoder,
    writer: PacketWriter<'static, Vec<u8>>,
    serial: u32,
    granule_pos: u64,
    pending: Vec<i16>,
    headers_written: bool,
    finished: bool,
}

impl OggOpusEncoder {
    pub fn new() -> Result<Self, EncodingError> {
        let mut encoder = opus::Encoder::new(
            TARGET_SAMPLE_RATE,
            opus::Channels::Mono,
            opus::Application::Voip,
        )
        .map_err(|e| EncodingError::OpusInit(e.to_string()))?;

        let init = |e: opus::Error| EncodingError::OpusInit(e.to_string());
        encoder
            .set_bitrate(opus::Bitrate::Bits(TARGET_BITRATE))
            .map_err(init)?;
        encoder.set_vbr(true).map_err(init)?;
        encoder.set_inband_fec(true).map_err(init)?;

        Ok(Self {
            encoder,
            writer: PacketWriter::new(Vec::new()),
            serial: stream_serial(),
            granule_pos: 0,
            pending: Vec::new(),
            headers_written: false,
            finished: false,
        })
    }

    /// Encode every complete frame in `samples` and return the finished pages.
    ///
    /// Samples that do not fill a frame are kept for the next call. The first
    /// call also returns the identification and comment headers.
    pub fn encode(&mut self, samples: &[i16]) -> Result<Vec<u8>, EncodingError> {
        if self.finished {
            return Err(EncodingError::Finished);
        }
        self.write_headers()?;

        self.pending.extend_from_slice(samples);
        let frames = self.pending.len() / FRAME_SIZE;
        for index in 0..frames {
            let end_info = if index + 1 == frames {
                PacketWriteEndInfo::EndPage
            } else {
                PacketWriteEndInfo::NormalPacket
            };
            let start = index * FRAME_SIZE;
            let frame: Vec<i16> = self.pending[start..start + FRAME_SIZE].to_vec();
            self.write_frame(&frame, end_info)?;
        }
        self.pending.drain(..frames * FRAME_SIZE);

        Ok(self.take_output())
    }

    /// Pad and encode the remaining samples, then close the stream
    pub fn finish(&mut self) -> Result<Vec<u8>, EncodingError> {
        if self.finished {
            return Err(EncodingError::Finished);
        }
        self.write_headers()?;

        let mut frame = std::mem::take(&mut self.pending);
        frame.resize(FRAME_SIZE, 0);
        self.write_frame(&frame, PacketWriteEndInfo::EndStream)?;
        self.finished = true;

        Ok(self.take_output())
    }

    fn write_frame(&mut self, frame: &[i16], end_info: PacketWriteEndInfo) -> Result<(), EncodingError> {
        let mut packet = vec![0u8; MAX_PACKET_SIZE];
        let len = self
            .encoder
            .encode(frame, &mut packet)
            .map_err(|e| EncodingError::OpusEncode(e.to_string()))?;
        packet.truncate(len);

        self.granule_pos += GRANULE_PER_FRAME;
        self.writer
            .write_packet(packet, self.serial, end_info, self.granule_pos)
            .map_err(|e| EncodingError::OggWrite(e.to_string()))
    }

    /// Write the OpusHead and OpusTags packets, each on its own page
    fn write_headers(&mut self) -> Result<(), EncodingError> {
        if self.headers_written {
            return Ok(());
        }

        let mut id_header = Vec::with_capacity(19);
        id_header.extend_from_slice(b"OpusHead");
        id_header.push(1); // version
        id_header.push(1); // mono
        id_header.extend_from_slice(&0u16.to_le_bytes()); // pre-skip
        id_header.extend_from_slice(&TARGET_SAMPLE_RATE.to_le_bytes());
        id_header.extend_from_slice(&0i16.to_le_bytes()); // output gain
        id_header.push(0); // channel mapping family

        let vendor = b"drive-recorder";
        let mut comment_header = Vec::new();
        comment_header.extend_from_slice(b"OpusTags");
        comment_header.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        comment_header.extend_from_slice(vendor);
        comment_header.extend_from_slice(&0u32.to_le_bytes()); // no user comments

        for header in [id_header, comment_header] {
            self.writer
                .write_packet(header, self.serial, PacketWriteEndInfo::EndPage, 0)
                .map_err(|e| EncodingError::OggWrite(e.to_string()))?;
        }
        self.headers_written = true;
        Ok(())
    }

    fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(self.writer.inner_mut())
    }
}

/// Pseudo-random serial number for the Ogg logical stream
fn stream_serial() -> u32 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    (now.as_secs() as u32) ^ now.subsec_nanos()
}

/// Encoding errors
#[derive(Debug, thiserror::Error)]
pub enum EncodingError {
    #[error("Failed to initialise Opus encoder: {0}")]
    OpusInit(String),

    #[error("Opus encoding failed: {0}")]
    OpusEncode(String),

    #[error("Failed to write OGG packet: {0}")]
    OggWrite(String),

    #[error("Stream already finished")]
    Finished,
}
