// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn wav_header_is_44_bytes_and_self_describing() {
    let pcm = vec![0u8; 480];
    let wav = wav_container(&pcm, 24_000, 1);
    assert_eq!(wav.len(), 44 + 480);

    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
    assert_eq!(&wav[12..16], b"fmt ");
    assert_eq!(&wav[36..40], b"data");

    let riff_len = u32::from_le_bytes([wav[4], wav[5], wav[6], wav[7]]);
    assert_eq!(riff_len, 36 + 480);
    let sample_rate = u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]);
    assert_eq!(sample_rate, 24_000);
    let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
    assert_eq!(data_len, 480);
}

#[test]
fn wav_byte_rate_accounts_for_channels() {
    let wav = wav_container(&[], 16_000, 2);
    let byte_rate = u32::from_le_bytes([wav[28], wav[29], wav[30], wav[31]]);
    assert_eq!(byte_rate, 16_000 * 2 * 2);
    let block_align = u16::from_le_bytes([wav[32], wav[33]]);
    assert_eq!(block_align, 4);
}

#[test]
fn empty_pcm_still_produces_a_valid_container() {
    let wav = wav_container(&[], 24_000, 1);
    assert_eq!(wav.len(), 44);
    let data_len = u32::from_le_bytes([wav[40], wav[41], wav[42], wav[43]]);
    assert_eq!(data_len, 0);
}
