//! Codec configuration records
//!
//! The initialization segment carries the decoder configuration for each
//! track. Browsers need it summarised as an RFC 6381 codec string
//! (`avc1.42E01E`, `mp4a.40.2`) before they will create a `SourceBuffer`.
//!
//! AVCDecoderConfigurationRecord (`avcC` box payload), leading bytes:
//! ```text
//! configurationVersion (1) | AVCProfileIndication (1) | profile_compatibility (1)
//! | AVCLevelIndication (1) | ... parameter sets
//! ```
//!
//! Elementary stream descriptor (`esds` box payload, after version/flags):
//! ```text
//! ES_Descriptor (tag 0x03)
//!   └─ DecoderConfigDescriptor (tag 0x04): objectTypeIndication (1) ...
//!        └─ DecoderSpecificInfo (tag 0x05): AudioSpecificConfig
//! ```

use bytes::{Buf, Bytes};

use crate::error::MediaError;

/// AVC decoder configuration (from the `avcC` box)
///
/// Only the profile and level bytes are kept; the parameter sets that
/// follow are not needed for the codec string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvcConfig {
    /// AVC profile (66=Baseline, 77=Main, 100=High, etc.)
    pub profile: u8,
    /// Profile compatibility flags
    pub compatibility: u8,
    /// AVC level (e.g., 31 = 3.1)
    pub level: u8,
}

impl AvcConfig {
    /// Parse the head of an AVCDecoderConfigurationRecord
    pub fn parse(mut data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 4 {
            return Err(MediaError::InvalidAvcConfig);
        }

        let version = data.get_u8();
        if version != 1 {
            return Err(MediaError::InvalidAvcConfig);
        }

        Ok(AvcConfig {
            profile: data.get_u8(),
            compatibility: data.get_u8(),
            level: data.get_u8(),
        })
    }

    /// RFC 6381 codec string, e.g. `avc1.42E01E`
    pub fn codec_string(&self) -> String {
        format!(
            "avc1.{:02X}{:02X}{:02X}",
            self.profile, self.compatibility, self.level
        )
    }
}

/// Audio configuration (from the `esds` box)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// MPEG-4 objectTypeIndication (0x40 for AAC)
    pub object_type_indication: u8,
    /// Audio object type from the AudioSpecificConfig (2 = AAC LC)
    pub audio_object_type: u8,
}

impl AudioConfig {
    const ES_DESCRIPTOR: u8 = 0x03;
    const DECODER_CONFIG_DESCRIPTOR: u8 = 0x04;
    const DECODER_SPECIFIC_INFO: u8 = 0x05;

    /// Parse from an `esds` box payload (including version/flags)
    pub fn parse_esds(mut data: Bytes) -> Result<Self, MediaError> {
        if data.len() < 4 {
            return Err(MediaError::InvalidAacConfig);
        }
        data.advance(4);

        let mut es = Self::descriptor(&mut data, Self::ES_DESCRIPTOR)?;
        if es.len() < 3 {
            return Err(MediaError::InvalidAacConfig);
        }
        es.advance(2); // ES_ID
        let flags = es.get_u8();
        if flags & 0x80 != 0 {
            Self::skip(&mut es, 2)?; // dependsOn_ES_ID
        }
        if flags & 0x40 != 0 {
            if es.is_empty() {
                return Err(MediaError::InvalidAacConfig);
            }
            let url_len = es.get_u8() as usize;
            Self::skip(&mut es, url_len)?;
        }
        if flags & 0x20 != 0 {
            Self::skip(&mut es, 2)?; // OCR_ES_Id
        }

        let mut decoder = Self::descriptor(&mut es, Self::DECODER_CONFIG_DESCRIPTOR)?;
        if decoder.len() < 13 {
            return Err(MediaError::InvalidAacConfig);
        }
        let object_type_indication = decoder.get_u8();
        decoder.advance(12); // streamType, bufferSizeDB, maxBitrate, avgBitrate

        let specific = Self::descriptor(&mut decoder, Self::DECODER_SPECIFIC_INFO)?;
        if specific.is_empty() {
            return Err(MediaError::InvalidAacConfig);
        }
        let audio_object_type = (specific[0] >> 3) & 0x1F;

        Ok(AudioConfig {
            object_type_indication,
            audio_object_type,
        })
    }

    /// Read one descriptor with the expected tag and return its body
    fn descriptor(data: &mut Bytes, tag: u8) -> Result<Bytes, MediaError> {
        if data.is_empty() || data.get_u8() != tag {
            return Err(MediaError::InvalidAacConfig);
        }

        // expandable size: up to 4 bytes, 7 bits each
        let mut len = 0usize;
        for _ in 0..4 {
            if data.is_empty() {
                return Err(MediaError::InvalidAacConfig);
            }
            let b = data.get_u8();
            len = (len << 7) | (b & 0x7F) as usize;
            if b & 0x80 == 0 {
                break;
            }
        }

        if data.len() < len {
            return Err(MediaError::InvalidAacConfig);
        }
        Ok(data.copy_to_bytes(len))
    }

    fn skip(data: &mut Bytes, n: usize) -> Result<(), MediaError> {
        if data.len() < n {
            return Err(MediaError::InvalidAacConfig);
        }
        data.advance(n);
        Ok(())
    }

    /// RFC 6381 codec string, e.g. `mp4a.40.2`
    pub fn codec_string(&self) -> String {
        format!(
            "mp4a.{:x}.{}",
            self.object_type_indication, self.audio_object_type
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const AVCC_BASELINE: &[u8] = &[
        0x01, // version
        0x42, // profile (Baseline)
        0xE0, // compatibility
        0x1E, // level 3.0
        0xFF, // length size - 1 = 3
        0xE1, // 1 SPS
        0x00, 0x04, 0x67, 0x42, 0xE0, 0x1E, // SPS
        0x01, // 1 PPS
        0x00, 0x02, 0x68, 0xCE, // PPS
    ];

    pub(crate) const ESDS_AAC_LC: &[u8] = &[
        0x00, 0x00, 0x00, 0x00, // version/flags
        0x03, 0x19, // ES_Descriptor, len 25
        0x00, 0x01, // ES_ID
        0x00, // flags
        0x04, 0x11, // DecoderConfigDescriptor, len 17
        0x40, // objectTypeIndication (AAC)
        0x15, // streamType
        0x00, 0x00, 0x00, // bufferSizeDB
        0x00, 0x01, 0xF4, 0x00, // maxBitrate
        0x00, 0x01, 0xF4, 0x00, // avgBitrate
        0x05, 0x02, 0x12, 0x10, // DecoderSpecificInfo: AAC LC, 44.1kHz, stereo
        0x06, 0x01, 0x02, // SLConfigDescriptor
    ];

    #[test]
    fn test_avc_config_parse() {
        let config = AvcConfig::parse(Bytes::from_static(AVCC_BASELINE)).unwrap();

        assert_eq!(config.profile, 66);
        assert_eq!(config.compatibility, 0xE0);
        assert_eq!(config.level, 30);
        assert_eq!(config.codec_string(), "avc1.42E01E");
    }

    #[test]
    fn test_avc_config_invalid_version() {
        let mut data = AVCC_BASELINE.to_vec();
        data[0] = 0x02;
        assert_eq!(
            AvcConfig::parse(Bytes::from(data)).unwrap_err(),
            MediaError::InvalidAvcConfig
        );
    }

    #[test]
    fn test_avc_config_truncated() {
        let data = Bytes::copy_from_slice(&AVCC_BASELINE[..3]);
        assert!(AvcConfig::parse(data).is_err());
    }

    #[test]
    fn test_avc_config_high_profile_codec_string() {
        let data = Bytes::from_static(&[0x01, 0x64, 0x00, 0x29, 0xFF, 0xE0, 0x00]);
        let config = AvcConfig::parse(data).unwrap();
        assert_eq!(config.codec_string(), "avc1.640029");
    }

    #[test]
    fn test_esds_parse() {
        let config = AudioConfig::parse_esds(Bytes::from_static(ESDS_AAC_LC)).unwrap();

        assert_eq!(config.object_type_indication, 0x40);
        assert_eq!(config.audio_object_type, 2);
        assert_eq!(config.codec_string(), "mp4a.40.2");
    }

    #[test]
    fn test_esds_wrong_tag() {
        let mut data = ESDS_AAC_LC.to_vec();
        data[4] = 0x04;
        assert_eq!(
            AudioConfig::parse_esds(Bytes::from(data)).unwrap_err(),
            MediaError::InvalidAacConfig
        );
    }

    #[test]
    fn test_esds_multi_byte_length() {
        // Same descriptors, lengths written in the 4-byte expandable form
        let data: &[u8] = &[
            0x00, 0x00, 0x00, 0x00, //
            0x03, 0x80, 0x80, 0x80, 0x1F, //
            0x00, 0x01, 0x00, //
            0x04, 0x80, 0x80, 0x80, 0x14, //
            0x40, 0x15, 0x00, 0x00, 0x00, 0x00, 0x01, 0xF4, 0x00, 0x00, 0x01, 0xF4, 0x00, //
            0x05, 0x80, 0x80, 0x80, 0x02, 0x2B, 0x92, //
            0x06, 0x01, 0x02,
        ];
        let config = AudioConfig::parse_esds(Bytes::from_static(data)).unwrap();
        assert_eq!(config.audio_object_type, 5);
        assert_eq!(config.codec_string(), "mp4a.40.5");
    }
}
