//! Streaming-store transfer variants.
//!
//! Large copies bypass the cache with non-temporal 16-byte stores, issued
//! eight at a time over 128-byte chunks. Destination bytes outside the
//! cache-line-aligned body are copied with ordinary stores and flushed with
//! whatever flush instruction the dispatch installed. Non-temporal stores
//! are weakly ordered, so every variant ends with sfence.

use std::ptr;

use core::arch::x86_64::{
    __m128i, _mm_cvtsi128_si32, _mm_loadu_si128, _mm_set1_epi8, _mm_sfence, _mm_stream_si128,
    _mm_stream_si32,
};

use crate::dispatch::{self, FlushFn};
use crate::flush::FLUSH_ALIGN;

const ALIGN_MASK: usize = FLUSH_ALIGN - 1;

// 128-byte chunk: eight 16-byte streaming stores per iteration.
const CHUNK_SIZE: usize = 128;
const CHUNK_SHIFT: usize = 7;
const CHUNK_MASK: usize = CHUNK_SIZE - 1;

const MOVNT_SIZE: usize = 16;
const MOVNT_SHIFT: usize = 4;
const MOVNT_MASK: usize = MOVNT_SIZE - 1;

const DWORD_SIZE: usize = 4;
const DWORD_SHIFT: usize = 2;
const DWORD_MASK: usize = DWORD_SIZE - 1;

/// memmove to pmem without hw drain, using non-temporal stores.
pub(crate) unsafe fn memmove_nodrain_movnt(dest: *mut u8, src: *const u8, len: usize) {
    if len == 0 || src == dest as *const u8 {
        return;
    }

    let d = dispatch::dispatch();
    if len < d.movnt_threshold {
        ptr::copy(src, dest, len);
        (d.flush)(dest as *const u8, len);
        return;
    }

    // Ranges are disjoint, or dest lies below src: copying forward cannot
    // overwrite unread source bytes. Otherwise mirror the walk from the
    // high end.
    if (dest as usize).wrapping_sub(src as usize) >= len {
        movnt_forward(dest, src, len, d.flush);
    } else {
        movnt_backward(dest, src, len, d.flush);
    }

    // serialize non-temporal store instructions
    _mm_sfence();
}

/// memset to pmem without hw drain, using non-temporal stores.
pub(crate) unsafe fn memset_nodrain_movnt(dest: *mut u8, c: u8, len: usize) {
    let d = dispatch::dispatch();
    if len < d.movnt_threshold {
        ptr::write_bytes(dest, c, len);
        (d.flush)(dest as *const u8, len);
        return;
    }

    let mut dest = dest;
    let mut len = len;

    // fill up to the next cache-line boundary
    let mut cnt = dest as usize & ALIGN_MASK;
    if cnt != 0 {
        cnt = FLUSH_ALIGN - cnt;
        if cnt > len {
            cnt = len;
        }
        ptr::write_bytes(dest, c, cnt);
        (d.flush)(dest as *const u8, cnt);
        dest = dest.add(cnt);
        len -= cnt;
    }

    let xmm = _mm_set1_epi8(c as i8);
    let mut dst = dest as *mut __m128i;

    cnt = len >> CHUNK_SHIFT;
    for _ in 0..cnt {
        _mm_stream_si128(dst, xmm);
        _mm_stream_si128(dst.add(1), xmm);
        _mm_stream_si128(dst.add(2), xmm);
        _mm_stream_si128(dst.add(3), xmm);
        _mm_stream_si128(dst.add(4), xmm);
        _mm_stream_si128(dst.add(5), xmm);
        _mm_stream_si128(dst.add(6), xmm);
        _mm_stream_si128(dst.add(7), xmm);
        dst = dst.add(8);
    }

    // fill the tail (<128 bytes) in 16-byte chunks
    len &= CHUNK_MASK;
    if len != 0 {
        cnt = len >> MOVNT_SHIFT;
        for _ in 0..cnt {
            _mm_stream_si128(dst, xmm);
            dst = dst.add(1);
        }
    }

    // fill the last bytes (<16), first dwords then bytes
    len &= MOVNT_MASK;
    if len != 0 {
        let mut d32 = dst as *mut i32;
        cnt = len >> DWORD_SHIFT;
        for _ in 0..cnt {
            _mm_stream_si32(d32, _mm_cvtsi128_si32(xmm));
            d32 = d32.add(1);
        }

        cnt = len & DWORD_MASK;
        if cnt != 0 {
            ptr::write_bytes(d32 as *mut u8, c, cnt);
            (d.flush)(d32 as *const u8, cnt);
        }
    }

    _mm_sfence();
}

unsafe fn movnt_forward(dest: *mut u8, src: *const u8, len: usize, flush: FlushFn) {
    let mut dest = dest;
    let mut src = src;
    let mut len = len;

    // copy up to the first cache-line boundary of dest
    let mut cnt = dest as usize & ALIGN_MASK;
    if cnt > 0 {
        cnt = FLUSH_ALIGN - cnt;
        if cnt > len {
            cnt = len;
        }
        ptr::copy(src, dest, cnt);
        flush(dest as *const u8, cnt);
        dest = dest.add(cnt);
        src = src.add(cnt);
        len -= cnt;
    }

    let mut d = dest as *mut __m128i;
    let mut s = src as *const __m128i;

    cnt = len >> CHUNK_SHIFT;
    for _ in 0..cnt {
        let xmm0 = _mm_loadu_si128(s);
        let xmm1 = _mm_loadu_si128(s.add(1));
        let xmm2 = _mm_loadu_si128(s.add(2));
        let xmm3 = _mm_loadu_si128(s.add(3));
        let xmm4 = _mm_loadu_si128(s.add(4));
        let xmm5 = _mm_loadu_si128(s.add(5));
        let xmm6 = _mm_loadu_si128(s.add(6));
        let xmm7 = _mm_loadu_si128(s.add(7));
        s = s.add(8);
        _mm_stream_si128(d, xmm0);
        _mm_stream_si128(d.add(1), xmm1);
        _mm_stream_si128(d.add(2), xmm2);
        _mm_stream_si128(d.add(3), xmm3);
        _mm_stream_si128(d.add(4), xmm4);
        _mm_stream_si128(d.add(5), xmm5);
        _mm_stream_si128(d.add(6), xmm6);
        _mm_stream_si128(d.add(7), xmm7);
        d = d.add(8);
    }

    // copy the tail (<128 bytes) in 16-byte chunks
    len &= CHUNK_MASK;
    if len != 0 {
        cnt = len >> MOVNT_SHIFT;
        for _ in 0..cnt {
            _mm_stream_si128(d, _mm_loadu_si128(s));
            s = s.add(1);
            d = d.add(1);
        }
    }

    // copy the last bytes (<16), first dwords then bytes
    len &= MOVNT_MASK;
    if len != 0 {
        cnt = len >> DWORD_SHIFT;
        let mut d32 = d as *mut i32;
        let mut s32 = s as *const i32;
        for _ in 0..cnt {
            _mm_stream_si32(d32, s32.read_unaligned());
            d32 = d32.add(1);
            s32 = s32.add(1);
        }

        cnt = len & DWORD_MASK;
        if cnt > 0 {
            ptr::copy(s32 as *const u8, d32 as *mut u8, cnt);
            flush(d32 as *const u8, cnt);
        }
    }
}

unsafe fn movnt_backward(dest: *mut u8, src: *const u8, len: usize, flush: FlushFn) {
    let mut dest = dest.add(len);
    let mut src = src.add(len);
    let mut len = len;

    // copy the bytes above the last cache-line boundary of dest
    let mut cnt = dest as usize & ALIGN_MASK;
    if cnt > 0 {
        if cnt > len {
            cnt = len;
        }
        dest = dest.sub(cnt);
        src = src.sub(cnt);
        ptr::copy(src, dest, cnt);
        flush(dest as *const u8, cnt);
        len -= cnt;
    }

    let mut d = dest as *mut __m128i;
    let mut s = src as *const __m128i;

    cnt = len >> CHUNK_SHIFT;
    for _ in 0..cnt {
        let xmm0 = _mm_loadu_si128(s.sub(1));
        let xmm1 = _mm_loadu_si128(s.sub(2));
        let xmm2 = _mm_loadu_si128(s.sub(3));
        let xmm3 = _mm_loadu_si128(s.sub(4));
        let xmm4 = _mm_loadu_si128(s.sub(5));
        let xmm5 = _mm_loadu_si128(s.sub(6));
        let xmm6 = _mm_loadu_si128(s.sub(7));
        let xmm7 = _mm_loadu_si128(s.sub(8));
        s = s.sub(8);
        _mm_stream_si128(d.sub(1), xmm0);
        _mm_stream_si128(d.sub(2), xmm1);
        _mm_stream_si128(d.sub(3), xmm2);
        _mm_stream_si128(d.sub(4), xmm3);
        _mm_stream_si128(d.sub(5), xmm4);
        _mm_stream_si128(d.sub(6), xmm5);
        _mm_stream_si128(d.sub(7), xmm6);
        _mm_stream_si128(d.sub(8), xmm7);
        d = d.sub(8);
    }

    // copy the tail (<128 bytes) in 16-byte chunks
    len &= CHUNK_MASK;
    if len != 0 {
        cnt = len >> MOVNT_SHIFT;
        for _ in 0..cnt {
            d = d.sub(1);
            s = s.sub(1);
            _mm_stream_si128(d, _mm_loadu_si128(s));
        }
    }

    // copy the last bytes (<16), first dwords then bytes
    len &= MOVNT_MASK;
    if len != 0 {
        cnt = len >> DWORD_SHIFT;
        let mut d32 = d as *mut i32;
        let mut s32 = s as *const i32;
        for _ in 0..cnt {
            d32 = d32.sub(1);
            s32 = s32.sub(1);
            _mm_stream_si32(d32, s32.read_unaligned());
        }

        cnt = len & DWORD_MASK;
        if cnt > 0 {
            let d8 = (d32 as *mut u8).sub(cnt);
            let s8 = (s32 as *const u8).sub(cnt);
            ptr::copy(s8, d8, cnt);
            flush(d8 as *const u8, cnt);
        }
    }
}
