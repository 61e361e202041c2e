//! Audio clips and their concatenation into the final podcast.
//!
//! Clips are joined in the order given, without gaps or crossfades. All clips
//! must share the first clip's encoding; a mismatch is an error rather than a
//! silently corrupt file.

use std::fmt;
use std::io::{Cursor, Seek, Write};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use symphonia::core::codecs::{CODEC_TYPE_MP1, CODEC_TYPE_MP2, CODEC_TYPE_MP3};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::PodcastError;

/// Synthesized audio for one utterance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioClip {
    sequence_index: usize,
    speaker_label: String,
    bytes: Vec<u8>,
}

impl AudioClip {
    pub fn new(sequence_index: usize, speaker_label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            sequence_index,
            speaker_label: speaker_label.into(),
            bytes,
        }
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }

    pub fn speaker_label(&self) -> &str {
        &self.speaker_label
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// Stream parameters of an MPEG audio clip, as reported by the symphonia probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mp3Format {
    pub layer: u8,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Encoding of a clip, as far as joining is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    Mp3(Mp3Format),
    Wav(WavSpec),
}

impl AudioEncoding {
    /// Identify the clip encoding.
    ///
    /// WAV is recognized by its RIFF header and read with hound. Anything else
    /// must be an MPEG audio stream whose first frame starts right after an
    /// optional ID3v2 tag; symphonia then confirms it and reports its
    /// parameters. Leading junk is rejected instead of being joined.
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            let reader = WavReader::new(Cursor::new(bytes)).ok()?;
            return Some(AudioEncoding::Wav(reader.spec()));
        }

        let stream = bytes.get(id3v2_len(bytes)..)?;
        if !starts_with_frame_sync(stream) {
            return None;
        }
        probe_mpeg_audio(stream).map(AudioEncoding::Mp3)
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            AudioEncoding::Mp3(_) => "mp3",
            AudioEncoding::Wav(_) => "wav",
        }
    }
}

impl fmt::Display for AudioEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioEncoding::Mp3(mp3) => write!(
                f,
                "MPEG layer {} {} Hz {}",
                mp3.layer,
                mp3.sample_rate,
                if mp3.channels == 1 { "mono" } else { "stereo" }
            ),
            AudioEncoding::Wav(spec) => write!(
                f,
                "WAV {} Hz {} ch {}-bit {}",
                spec.sample_rate,
                spec.channels,
                spec.bits_per_sample,
                match spec.sample_format {
                    SampleFormat::Float => "float",
                    SampleFormat::Int => "int",
                }
            ),
        }
    }
}

/// The final joined podcast.
#[derive(Debug, Clone)]
pub struct PodcastAudio {
    encoding: AudioEncoding,
    bytes: Vec<u8>,
    clip_indices: Vec<usize>,
}

impl PodcastAudio {
    pub fn encoding(&self) -> AudioEncoding {
        self.encoding
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Sequence indices of the clips that went into this file, in order.
    pub fn clip_indices(&self) -> &[usize] {
        &self.clip_indices
    }

    pub fn file_extension(&self) -> &'static str {
        self.encoding.file_extension()
    }
}

/// Join `clips` in the given order.
///
/// Callers must pass at least one clip; an empty slice yields
/// [`PodcastError::NoClips`].
pub fn concatenate(clips: &[AudioClip]) -> Result<PodcastAudio, PodcastError> {
    let first = clips.first().ok_or(PodcastError::NoClips)?;
    let encoding =
        AudioEncoding::detect(first.bytes()).ok_or_else(|| PodcastError::FormatMismatch {
            index: first.sequence_index(),
            expected: "MP3 or WAV".to_string(),
            found: "unrecognized data".to_string(),
        })?;

    for clip in &clips[1..] {
        let found = AudioEncoding::detect(clip.bytes());
        if found != Some(encoding) {
            return Err(PodcastError::FormatMismatch {
                index: clip.sequence_index(),
                expected: encoding.to_string(),
                found: found
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unrecognized data".to_string()),
            });
        }
    }

    let bytes = match encoding {
        AudioEncoding::Mp3(_) => join_mp3(clips),
        AudioEncoding::Wav(spec) => join_wav(clips, spec)?,
    };

    Ok(PodcastAudio {
        encoding,
        bytes,
        clip_indices: clips.iter().map(AudioClip::sequence_index).collect(),
    })
}

/// Byte-level join. Tags are kept only where they cannot end up mid-stream:
/// the leading ID3v2 tag of the first clip and the trailing ID3v1 tag of the
/// last clip.
fn join_mp3(clips: &[AudioClip]) -> Vec<u8> {
    let last = clips.len() - 1;
    let mut joined = Vec::with_capacity(clips.iter().map(|c| c.bytes().len()).sum());

    for (i, clip) in clips.iter().enumerate() {
        let mut data = clip.bytes();
        if i > 0 {
            data = &data[id3v2_len(data).min(data.len())..];
        }
        if i < last && has_id3v1(data) {
            data = &data[..data.len() - 128];
        }
        joined.extend_from_slice(data);
    }

    joined
}

fn join_wav(clips: &[AudioClip], spec: WavSpec) -> Result<Vec<u8>, PodcastError> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = WavWriter::new(&mut cursor, spec).map_err(|e| wav_error(&clips[0], spec, e))?;
        match spec.sample_format {
            SampleFormat::Float => copy_samples::<f32, _>(clips, spec, &mut writer)?,
            SampleFormat::Int => copy_samples::<i32, _>(clips, spec, &mut writer)?,
        }
        writer
            .finalize()
            .map_err(|e| wav_error(&clips[clips.len() - 1], spec, e))?;
    }
    Ok(cursor.into_inner())
}

fn copy_samples<S, W>(
    clips: &[AudioClip],
    spec: WavSpec,
    writer: &mut WavWriter<W>,
) -> Result<(), PodcastError>
where
    S: hound::Sample,
    W: Write + Seek,
{
    for clip in clips {
        let reader = WavReader::new(Cursor::new(clip.bytes())).map_err(|e| wav_error(clip, spec, e))?;
        for sample in reader.into_samples::<S>() {
            let sample = sample.map_err(|e| wav_error(clip, spec, e))?;
            writer
                .write_sample(sample)
                .map_err(|e| wav_error(clip, spec, e))?;
        }
    }
    Ok(())
}

fn wav_error(clip: &AudioClip, spec: WavSpec, e: hound::Error) -> PodcastError {
    PodcastError::FormatMismatch {
        index: clip.sequence_index(),
        expected: AudioEncoding::Wav(spec).to_string(),
        found: format!("undecodable WAV data ({})", e),
    }
}

/// Length of a leading ID3v2 tag, or 0.
fn id3v2_len(bytes: &[u8]) -> usize {
    if bytes.len() < 10 || &bytes[..3] != b"ID3" {
        return 0;
    }
    let size = bytes[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b & 0x7f) as usize);
    let footer = if bytes[5] & 0x10 != 0 { 10 } else { 0 };
    10 + size + footer
}

fn has_id3v1(bytes: &[u8]) -> bool {
    bytes.len() >= 128 && &bytes[bytes.len() - 128..bytes.len() - 125] == b"TAG"
}

fn starts_with_frame_sync(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0xff && bytes[1] & 0xe0 == 0xe0
}

/// Probe an MPEG audio stream with symphonia and read its codec parameters.
fn probe_mpeg_audio(stream: &[u8]) -> Option<Mp3Format> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(stream.to_vec())), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .ok()?;

    let format = probed.format;
    let params = &format.default_track()?.codec_params;
    let layer = if params.codec == CODEC_TYPE_MP3 {
        3
    } else if params.codec == CODEC_TYPE_MP2 {
        2
    } else if params.codec == CODEC_TYPE_MP1 {
        1
    } else {
        return None;
    };

    Some(Mp3Format {
        layer,
        sample_rate: params.sample_rate?,
        channels: params.channels?.count() as u16,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// MPEG-1 layer III, 128 kbps, 44.1 kHz, joint stereo: 417-byte frames.
    const MPEG1_L3_44K_STEREO: ([u8; 4], usize) = ([0xff, 0xfb, 0x90, 0x64], 417);
    /// MPEG-2 layer III, 64 kbps, 24 kHz, mono: 192-byte frames.
    const MPEG2_L3_24K_MONO: ([u8; 4], usize) = ([0xff, 0xf3, 0x84, 0xc4], 192);

    fn wav_bytes(sample_rate: u32, samples: &[i16]) -> Vec<u8> {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec).unwrap();
            for s in samples {
                writer.write_sample(*s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    /// `count` back-to-back frames whose bodies are filled with `fill`.
    fn mp3_frames((header, frame_len): ([u8; 4], usize), count: usize, fill: u8) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(frame_len * count);
        for _ in 0..count {
            bytes.extend_from_slice(&header);
            bytes.resize(bytes.len() + frame_len - header.len(), fill);
        }
        bytes
    }

    fn id3v1_tag() -> Vec<u8> {
        let mut tag = b"TAG".to_vec();
        tag.resize(128, 0);
        tag
    }

    fn read_samples(bytes: &[u8]) -> Vec<i16> {
        WavReader::new(Cursor::new(bytes))
            .unwrap()
            .into_samples::<i16>()
            .map(Result::unwrap)
            .collect()
    }

    #[test]
    fn test_detect_encodings() {
        let wav = AudioEncoding::detect(&wav_bytes(24000, &[0, 1])).unwrap();
        assert!(matches!(wav, AudioEncoding::Wav(spec) if spec.sample_rate == 24000));

        let mp3 = AudioEncoding::detect(&mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11)).unwrap();
        assert_eq!(
            mp3,
            AudioEncoding::Mp3(Mp3Format {
                layer: 3,
                sample_rate: 44100,
                channels: 2,
            })
        );
        assert_eq!(mp3.file_extension(), "mp3");

        assert!(AudioEncoding::detect(b"not audio at all").is_none());
        // ADTS AAC shares the sync word but is not MPEG audio.
        assert!(AudioEncoding::detect(&[0xff, 0xf1, 0x50, 0x80, 0, 0, 0, 0]).is_none());
    }

    #[test]
    fn test_detect_mp3_behind_id3v2() {
        let mut bytes = b"ID3\x04\x00\x00\x00\x00\x00\x05hello".to_vec();
        bytes.extend_from_slice(&mp3_frames(MPEG2_L3_24K_MONO, 4, 0x22));
        let encoding = AudioEncoding::detect(&bytes).unwrap();
        assert!(matches!(
            encoding,
            AudioEncoding::Mp3(Mp3Format { sample_rate: 24000, channels: 1, .. })
        ));
    }

    #[test]
    fn test_detect_rejects_junk_before_first_frame() {
        let mut bytes = b"\x00\x01garbage-binary-not-audio".to_vec();
        bytes.extend_from_slice(&mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11));
        assert!(AudioEncoding::detect(&bytes).is_none());
    }

    #[test]
    fn test_concatenate_rejects_junk_prefixed_mp3_clip() {
        let mut junk = b"\x00\x01garbage-binary-not-audio".to_vec();
        junk.extend_from_slice(&mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11));

        let clips = vec![
            AudioClip::new(0, "Host", mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11)),
            AudioClip::new(1, "Guest", junk),
        ];
        match concatenate(&clips) {
            Err(PodcastError::FormatMismatch { index, found, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(found, "unrecognized data");
            }
            other => panic!("expected format mismatch, got {:?}", other.map(|p| p.bytes().len())),
        }
    }

    #[test]
    fn test_concatenate_wav_preserves_order() {
        let clips = vec![
            AudioClip::new(0, "Host", wav_bytes(24000, &[1, 1])),
            AudioClip::new(1, "Guest", wav_bytes(24000, &[2, 2, 2])),
            AudioClip::new(3, "Host", wav_bytes(24000, &[4])),
        ];

        let podcast = concatenate(&clips).unwrap();
        assert_eq!(podcast.clip_indices(), &[0, 1, 3]);
        assert_eq!(podcast.file_extension(), "wav");
        assert_eq!(read_samples(podcast.bytes()), vec![1, 1, 2, 2, 2, 4]);
    }

    #[test]
    fn test_concatenate_wav_rejects_sample_rate_mismatch() {
        let clips = vec![
            AudioClip::new(0, "Host", wav_bytes(24000, &[1])),
            AudioClip::new(1, "Guest", wav_bytes(44100, &[2])),
        ];

        match concatenate(&clips) {
            Err(PodcastError::FormatMismatch { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected format mismatch, got {:?}", other.map(|p| p.clip_indices().to_vec())),
        }
    }

    #[test]
    fn test_concatenate_rejects_mixed_codecs() {
        let clips = vec![
            AudioClip::new(0, "Host", mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11)),
            AudioClip::new(1, "Guest", wav_bytes(44100, &[2])),
        ];
        assert!(matches!(
            concatenate(&clips),
            Err(PodcastError::FormatMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_concatenate_rejects_mp3_parameter_mismatch() {
        let clips = vec![
            AudioClip::new(0, "Host", mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11)),
            AudioClip::new(1, "Guest", mp3_frames(MPEG2_L3_24K_MONO, 4, 0x22)),
        ];
        assert!(matches!(
            concatenate(&clips),
            Err(PodcastError::FormatMismatch { index: 1, .. })
        ));
    }

    #[test]
    fn test_concatenate_rejects_unrecognized_first_clip() {
        let clips = vec![AudioClip::new(4, "Host", b"garbage".to_vec())];
        assert!(matches!(
            concatenate(&clips),
            Err(PodcastError::FormatMismatch { index: 4, .. })
        ));
    }

    #[test]
    fn test_concatenate_mp3_strips_inner_tags() {
        let one = mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x11);
        let two = mp3_frames(MPEG1_L3_44K_STEREO, 4, 0x22);

        let mut first = one.clone();
        first.extend_from_slice(&id3v1_tag());

        let mut second = b"ID3\x04\x00\x00\x00\x00\x00\x02xx".to_vec();
        second.extend_from_slice(&two);
        second.extend_from_slice(&id3v1_tag());

        let podcast = concatenate(&[
            AudioClip::new(0, "Host", first),
            AudioClip::new(1, "Guest", second),
        ])
        .unwrap();

        let mut expected = one;
        expected.extend_from_slice(&two);
        expected.extend_from_slice(&id3v1_tag());
        assert_eq!(podcast.bytes(), expected.as_slice());
    }

    #[test]
    fn test_concatenate_empty_is_error() {
        assert!(matches!(concatenate(&[]), Err(PodcastError::NoClips)));
    }
}
