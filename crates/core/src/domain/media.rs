// Media kind detection from container magic bytes

use serde::{Deserialize, Serialize};

/// Number of leading bytes needed by `sniff_container`
pub const SNIFF_LEN: usize = 512;

const TS_PACKET_LEN: usize = 188;

/// Video containers the pipeline accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoContainer {
    Mp4,
    QuickTime,
    Matroska,
    Avi,
    MpegTs,
}

/// Identify the container from the first bytes of a file.
///
/// Returns `None` for anything that is not a recognised video container.
pub fn sniff_container(header: &[u8]) -> Option<VideoContainer> {
    if header.len() >= 12 {
        let box_type = &header[4..8];
        if box_type == b"ftyp" {
            return Some(if &header[8..12] == b"qt  " {
                VideoContainer::QuickTime
            } else {
                VideoContainer::Mp4
            });
        }
        if matches!(box_type, b"moov" | b"mdat" | b"wide" | b"free" | b"skip") {
            return Some(VideoContainer::QuickTime);
        }
        if &header[0..4] == b"RIFF" && &header[8..12] == b"AVI " {
            return Some(VideoContainer::Avi);
        }
    }

    if header.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        return Some(VideoContainer::Matroska);
    }

    // Two consecutive sync bytes one packet apart
    if header.len() > TS_PACKET_LEN && header[0] == 0x47 && header[TS_PACKET_LEN] == 0x47 {
        return Some(VideoContainer::MpegTs);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ftyp(brand: &[u8; 4]) -> Vec<u8> {
        let mut v = vec![0, 0, 0, 0x20];
        v.extend_from_slice(b"ftyp");
        v.extend_from_slice(brand);
        v.extend_from_slice(&[0; 20]);
        v
    }

    #[test]
    fn test_sniff_mp4_brands() {
        assert_eq!(sniff_container(&ftyp(b"isom")), Some(VideoContainer::Mp4));
        assert_eq!(sniff_container(&ftyp(b"mp42")), Some(VideoContainer::Mp4));
        assert_eq!(
            sniff_container(&ftyp(b"qt  ")),
            Some(VideoContainer::QuickTime)
        );
    }

    #[test]
    fn test_sniff_webm() {
        let header = [0x1A, 0x45, 0xDF, 0xA3, 0x9F, 0x42, 0x86, 0x81];
        assert_eq!(sniff_container(&header), Some(VideoContainer::Matroska));
    }

    #[test]
    fn test_sniff_avi() {
        let mut header = b"RIFF".to_vec();
        header.extend_from_slice(&[0x10, 0, 0, 0]);
        header.extend_from_slice(b"AVI LIST");
        assert_eq!(sniff_container(&header), Some(VideoContainer::Avi));
    }

    #[test]
    fn test_sniff_mpeg_ts() {
        let mut header = vec![0u8; 400];
        header[0] = 0x47;
        header[188] = 0x47;
        assert_eq!(sniff_container(&header), Some(VideoContainer::MpegTs));
    }

    #[test]
    fn test_reject_non_video() {
        assert_eq!(sniff_container(b"\x89PNG\r\n\x1a\n0000000000"), None);
        assert_eq!(sniff_container(b"hello world, not a video"), None);
        assert_eq!(sniff_container(&[]), None);
    }
}
