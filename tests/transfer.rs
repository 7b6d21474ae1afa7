//! Behavior of the transfer variants over plain memory.
//!
//! Every assertion here holds whether the scalar or the streaming-store
//! engine is behind the call; the large-range cases are sized well past
//! the default threshold so both engines get exercised on x86_64.

use pmembase::{
    memcpy_nodrain, memcpy_persist, memmove_persist, memset_nodrain, memset_persist, drain,
};

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

#[test]
fn memcpy_small_range() {
    let src = pattern(64, 1);
    let mut dst = vec![0u8; 64];
    unsafe { memcpy_persist(dst.as_mut_ptr(), src.as_ptr(), 64) };
    assert_eq!(dst, src);
}

#[test]
fn memcpy_large_range() {
    let src = pattern(64 * 1024, 2);
    let mut dst = vec![0u8; 64 * 1024];
    unsafe { memcpy_persist(dst.as_mut_ptr(), src.as_ptr(), src.len()) };
    assert_eq!(dst, src);
}

#[test]
fn memcpy_unaligned_head_and_tail() {
    // Offsets force the prolog and every sub-tail stage: 8192 + 13 bytes
    // landing at dst offset 3 leaves a 61-byte head, a 16/4/1-byte tail.
    let src = pattern(8192 + 13, 3);
    let mut dst = vec![0u8; 8192 + 16];
    unsafe { memcpy_persist(dst.as_mut_ptr().add(3), src.as_ptr(), src.len()) };
    assert_eq!(&dst[3..3 + src.len()], &src[..]);
    assert_eq!(&dst[..3], &[0, 0, 0]);
}

#[test]
fn memcpy_misaligned_source() {
    let backing = pattern(16384, 4);
    let src = &backing[5..5 + 8000];
    let mut dst = vec![0u8; 8000];
    unsafe { memcpy_persist(dst.as_mut_ptr(), src.as_ptr(), src.len()) };
    assert_eq!(dst, src);
}

#[test]
fn memcpy_around_streaming_threshold() {
    // One byte below the default threshold stays on the scalar path, the
    // exact threshold switches to streaming stores; contents must match
    // either way.
    for len in [255usize, 256, 257] {
        let src = pattern(len, len as u8);
        let mut dst = vec![0u8; len];
        unsafe { memcpy_persist(dst.as_mut_ptr(), src.as_ptr(), len) };
        assert_eq!(dst, src, "len {}", len);
    }
}

#[test]
fn memmove_backward_overlap() {
    // dst = src + 4096 with a 10 KB copy: the ranges overlap and the copy
    // must run backward to avoid clobbering unread source bytes.
    let len = 10 * 1024;
    let shift = 4096;
    let mut buf = pattern(len + shift, 5);
    let mut expected = buf.clone();
    expected.copy_within(0..len, shift);

    unsafe { memmove_persist(buf.as_mut_ptr().add(shift), buf.as_ptr(), len) };
    assert_eq!(buf, expected);
}

#[test]
fn memmove_forward_overlap() {
    // dst = src - 4096: forward copy is the safe direction.
    let len = 10 * 1024;
    let shift = 4096;
    let mut buf = pattern(len + shift, 6);
    let mut expected = buf.clone();
    expected.copy_within(shift..shift + len, 0);

    unsafe { memmove_persist(buf.as_mut_ptr(), buf.as_ptr().add(shift), len) };
    assert_eq!(buf, expected);
}

#[test]
fn memmove_self_copy_is_noop() {
    let mut buf = pattern(4096, 7);
    let expected = buf.clone();
    let p = buf.as_mut_ptr();
    unsafe { memmove_persist(p, p as *const u8, buf.len()) };
    assert_eq!(buf, expected);
}

#[test]
fn zero_length_transfers() {
    let src = [0u8; 1];
    let mut dst = [9u8; 1];
    unsafe {
        memcpy_nodrain(dst.as_mut_ptr(), src.as_ptr(), 0);
        memset_nodrain(dst.as_mut_ptr(), 0, 0);
    }
    drain();
    assert_eq!(dst, [9u8]);
}

#[test]
fn memset_small_and_large() {
    for len in [32usize, 300, 8192] {
        let mut buf = vec![0u8; len];
        unsafe { memset_persist(buf.as_mut_ptr(), 0x41, len) };
        assert!(buf.iter().all(|&b| b == 0x41), "len {}", len);
    }
}

#[test]
fn memset_uses_low_byte_of_fill_value() {
    let mut buf = vec![0u8; 1024];
    unsafe { memset_persist(buf.as_mut_ptr(), 0x241, buf.len()) };
    assert!(buf.iter().all(|&b| b == 0x41));
}

#[test]
fn memset_unaligned_destination() {
    let mut buf = vec![0u8; 8192 + 9];
    unsafe { memset_persist(buf.as_mut_ptr().add(7), 0x5A, 8192 + 1) };
    assert_eq!(&buf[..7], &[0; 7]);
    assert!(buf[7..7 + 8193].iter().all(|&b| b == 0x5A));
    assert_eq!(buf[8192 + 8], 0);
}
