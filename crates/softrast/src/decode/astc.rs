//! Embedded ASTC codec for 4×4 blocks
//!
//! Decodes the LDR profile of ASTC for a 4×4 footprint: void-extent blocks,
//! bounded-integer-sequence encoding (bits, trits, quints), weight-grid
//! infill, the partition hash, and the LDR colour endpoint modes. HDR
//! endpoint modes and the mixed multi-partition endpoint-mode encoding
//! decode to the error colour, as do reserved block modes; every input still
//! produces a full RGBA16F block.
//!
//! The error colour is opaque magenta, as the format specifies for
//! incorrectly encoded blocks.

use half::f16;

use super::{BlockRgbaF16, TexelRgbaF16, BLOCK_DIM};

/// Footprint edge length; this decoder handles 4×4 blocks.
const FOOTPRINT: usize = 4;

/// Reads fields from the 128 block bits, returning zeros past the end.
#[derive(Clone, Copy)]
struct BitReader {
    bits: u128,
}

impl BitReader {
    fn get(&self, offset: usize, count: usize) -> u32 {
        if count == 0 || offset >= 128 {
            return 0;
        }
        let mask = if count >= 32 {
            u32::MAX
        } else {
            (1 << count) - 1
        };
        ((self.bits >> offset) as u32) & mask
    }
}

/// A quantization range: `levels = (trits? 3 : 1) * (quints? 5 : 1) * 2^bits`.
#[derive(Clone, Copy)]
struct Range {
    bits: u32,
    trits: bool,
    quints: bool,
}

/// Endpoint quantization levels, largest to smallest.
const COLOR_RANGES: [Range; 21] = [
    Range { bits: 8, trits: false, quints: false }, // 256
    Range { bits: 6, trits: true, quints: false },  // 192
    Range { bits: 5, trits: false, quints: true },  // 160
    Range { bits: 7, trits: false, quints: false }, // 128
    Range { bits: 5, trits: true, quints: false },  // 96
    Range { bits: 4, trits: false, quints: true },  // 80
    Range { bits: 6, trits: false, quints: false }, // 64
    Range { bits: 4, trits: true, quints: false },  // 48
    Range { bits: 3, trits: false, quints: true },  // 40
    Range { bits: 5, trits: false, quints: false }, // 32
    Range { bits: 3, trits: true, quints: false },  // 24
    Range { bits: 2, trits: false, quints: true },  // 20
    Range { bits: 4, trits: false, quints: false }, // 16
    Range { bits: 2, trits: true, quints: false },  // 12
    Range { bits: 1, trits: false, quints: true },  // 10
    Range { bits: 3, trits: false, quints: false }, // 8
    Range { bits: 1, trits: true, quints: false },  // 6
    Range { bits: 0, trits: false, quints: true },  // 5
    Range { bits: 2, trits: false, quints: false }, // 4
    Range { bits: 0, trits: true, quints: false },  // 3
    Range { bits: 1, trits: false, quints: false }, // 2
];

impl Range {
    /// Bits needed to store `count` values in this range.
    fn encoded_bits(&self, count: u32) -> u32 {
        let mut bits = count * self.bits;
        if self.trits {
            bits += (8 * count).div_ceil(5);
        }
        if self.quints {
            bits += (7 * count).div_ceil(3);
        }
        bits
    }
}

/// Weight ranges indexed by `R = {r2, r1, r0}` for low and high precision.
fn weight_range(r: u32, high_precision: bool) -> Option<Range> {
    let table: [(u32, bool, bool); 6] = if high_precision {
        [
            (1, false, true),  // 0..9
            (2, true, false),  // 0..11
            (4, false, false), // 0..15
            (2, false, true),  // 0..19
            (3, true, false),  // 0..23
            (5, false, false), // 0..31
        ]
    } else {
        [
            (1, false, false), // 0..1
            (0, true, false),  // 0..2
            (2, false, false), // 0..3
            (0, false, true),  // 0..4
            (1, true, false),  // 0..5
            (3, false, false), // 0..7
        ]
    };
    if r < 2 {
        return None;
    }
    let (bits, trits, quints) = table[(r - 2) as usize];
    Some(Range { bits, trits, quints })
}

/// Decodes a bounded integer sequence of `count` values.
///
/// `reversed` reads the stream from bit 127 downward, the storage order of
/// weight data.
fn decode_ise(block: &BitReader, range: Range, count: usize, start: usize, reversed: bool) -> Vec<(u32, u32)> {
    // Returned pairs are (bits_value, trit_or_quint_value).
    let read = |offset: usize, count_bits: usize| -> u32 {
        if reversed {
            let mut v = 0;
            for i in 0..count_bits {
                if offset + i >= 128 {
                    break;
                }
                let bit_pos = 127 - (offset + i);
                v |= block.get(bit_pos, 1) << i;
            }
            v
        } else {
            block.get(offset, count_bits)
        }
    };
    let start_offset = start;
    let b = range.bits as usize;

    let mut out = Vec::with_capacity(count);
    if range.trits {
        let mut i = 0;
        let mut offset = start_offset;
        while i < count {
            let group = (count - i).min(5);
            // Interleaving: m0 T10 m1 T32 m2 T4 m3 T65 m4 T7.
            let mut m = [0_u32; 5];
            let mut t_bits = 0_u32;
            let t_chunks = [(2, 0), (2, 2), (1, 4), (2, 5), (1, 7)];
            for j in 0..5 {
                if j < group {
                    m[j] = read(offset, b);
                    offset += b;
                }
                let (chunk_len, chunk_pos) = t_chunks[j];
                t_bits |= read(offset, chunk_len) << chunk_pos;
                offset += chunk_len;
            }
            let trits = decode_trit_quintuplet(t_bits);
            for j in 0..group {
                out.push((m[j], trits[j]));
            }
            i += group;
        }
    } else if range.quints {
        let mut i = 0;
        let mut offset = start_offset;
        while i < count {
            let group = (count - i).min(3);
            // Interleaving: m0 Q210 m1 Q43 m2 Q65.
            let mut m = [0_u32; 3];
            let mut q_bits = 0_u32;
            let q_chunks = [(3, 0), (2, 3), (2, 5)];
            for j in 0..3 {
                if j < group {
                    m[j] = read(offset, b);
                    offset += b;
                }
                let (chunk_len, chunk_pos) = q_chunks[j];
                q_bits |= read(offset, chunk_len) << chunk_pos;
                offset += chunk_len;
            }
            let quints = decode_quint_triplet(q_bits);
            for j in 0..group {
                out.push((m[j], quints[j]));
            }
            i += group;
        }
    } else {
        let mut offset = start_offset;
        for _ in 0..count {
            out.push((read(offset, b), 0));
            offset += b;
        }
    }
    out
}

/// Decodes the packed 8-bit trit block into five trit values.
fn decode_trit_quintuplet(t: u32) -> [u32; 5] {
    let (c, t4, t3);
    if (t >> 2) & 0x7 == 0b111 {
        c = (((t >> 5) & 0x7) << 2) | (t & 0x3);
        t4 = 2;
        t3 = 2;
    } else {
        c = t & 0x1F;
        if (t >> 5) & 0x3 == 0b11 {
            t4 = 2;
            t3 = (t >> 7) & 1;
        } else {
            t4 = (t >> 7) & 1;
            t3 = (t >> 5) & 0x3;
        }
    }
    let (t2, t1, t0);
    if c & 0x3 == 0b11 {
        t2 = 2;
        t1 = (c >> 4) & 1;
        let c3 = (c >> 3) & 1;
        let c2 = (c >> 2) & 1;
        t0 = (c3 << 1) | (c2 & (1 - c3));
    } else if (c >> 2) & 0x3 == 0b11 {
        t2 = 2;
        t1 = 2;
        t0 = c & 0x3;
    } else {
        t2 = (c >> 4) & 1;
        t1 = (c >> 2) & 0x3;
        t0 = c & 0x3;
    }
    [t0, t1, t2, t3, t4]
}

/// Decodes the packed 7-bit quint block into three quint values.
fn decode_quint_triplet(q: u32) -> [u32; 3] {
    let (q2, q1, q0);
    if (q >> 1) & 0x3 == 0b11 && (q >> 5) & 0x3 == 0b00 {
        let top = q & 1;
        let mid = ((q >> 4) & 1) & (1 - top);
        let low = ((q >> 3) & 1) & (1 - top);
        q2 = (top << 2) | (mid << 1) | low;
        q1 = 4;
        q0 = 4;
    } else {
        let c;
        if (q >> 1) & 0x3 == 0b11 {
            q2 = 4;
            c = (((q >> 3) & 0x3) << 3) | ((!(q >> 5) & 0x3) << 1) | (q & 1);
        } else {
            q2 = (q >> 5) & 0x3;
            c = q & 0x1F;
        }
        if c & 0x7 == 0b101 {
            q1 = 4;
            q0 = (c >> 3) & 0x3;
        } else {
            q1 = (c >> 3) & 0x3;
            q0 = c & 0x7;
        }
    }
    [q0, q1, q2]
}

/// Unquantizes a colour endpoint value to 0..255.
fn unquantize_color(value: (u32, u32), range: Range) -> u32 {
    let (m, tq) = value;
    if !range.trits && !range.quints {
        // Bit replication.
        let b = range.bits;
        if b == 8 {
            return m;
        }
        let mut v = m << (8 - b);
        let mut fill = b;
        while fill < 8 {
            v |= v >> fill;
            fill *= 2;
        }
        return v & 0xFF;
    }

    let b = range.bits;
    let a = if m & 1 != 0 { 0x1FF } else { 0 };
    let (bv, c) = if range.trits {
        match b {
            1 => (0, 204),
            2 => {
                let x = (m >> 1) & 1;
                ((x << 8) | (x << 4) | (x << 2) | (x << 1), 93)
            }
            3 => {
                let x = (m >> 1) & 0x3;
                let (cb, cc) = (x & 1, (x >> 1) & 1);
                (
                    (cc << 8) | (cb << 7) | (cc << 3) | (cb << 2) | (cc << 1) | cb,
                    44,
                )
            }
            4 => {
                let x = (m >> 1) & 0x7;
                let (b0, b1, b2) = (x & 1, (x >> 1) & 1, (x >> 2) & 1);
                (
                    (b2 << 8) | (b1 << 7) | (b0 << 6) | (b2 << 2) | (b1 << 1) | b0,
                    22,
                )
            }
            5 => {
                let x = (m >> 1) & 0xF;
                let (b0, b1, b2, b3) = (x & 1, (x >> 1) & 1, (x >> 2) & 1, (x >> 3) & 1);
                (
                    (b3 << 8) | (b2 << 7) | (b1 << 6) | (b0 << 5) | (b3 << 1) | b2,
                    11,
                )
            }
            6 => {
                let x = (m >> 1) & 0x1F;
                let (b0, b1, b2, b3, b4) =
                    (x & 1, (x >> 1) & 1, (x >> 2) & 1, (x >> 3) & 1, (x >> 4) & 1);
                (
                    (b4 << 8) | (b3 << 7) | (b2 << 6) | (b1 << 5) | (b0 << 4) | b4,
                    5,
                )
            }
            _ => (0, 0),
        }
    } else {
        match b {
            1 => (0, 113),
            2 => {
                let x = (m >> 1) & 1;
                ((x << 8) | (x << 3) | (x << 2), 54)
            }
            3 => {
                let x = (m >> 1) & 0x3;
                let (cb, cc) = (x & 1, (x >> 1) & 1);
                (
                    (cc << 8) | (cb << 7) | (cc << 2) | (cb << 1) | cc,
                    26,
                )
            }
            4 => {
                let x = (m >> 1) & 0x7;
                let (b0, b1, b2) = (x & 1, (x >> 1) & 1, (x >> 2) & 1);
                (
                    (b2 << 8) | (b1 << 7) | (b0 << 6) | (b2 << 1) | b1,
                    13,
                )
            }
            5 => {
                let x = (m >> 1) & 0xF;
                let (b0, b1, b2, b3) = (x & 1, (x >> 1) & 1, (x >> 2) & 1, (x >> 3) & 1);
                (
                    (b3 << 8) | (b2 << 7) | (b1 << 6) | (b0 << 5) | b3,
                    6,
                )
            }
            _ => (0, 0),
        }
    };
    let mut t = tq * c + bv;
    t ^= a;
    (a & 0x80) | (t >> 2)
}

/// Unquantizes a weight value to 0..64.
fn unquantize_weight(value: (u32, u32), range: Range) -> u32 {
    let (m, tq) = value;
    if range.bits == 0 {
        // Trit- and quint-only ranges map straight onto 0..64.
        return if range.trits { tq * 32 } else { tq * 16 };
    }
    let mut w = if !range.trits && !range.quints {
        let b = range.bits;
        let mut v = m << (6 - b);
        let mut fill = b;
        while fill < 6 {
            v |= v >> fill;
            fill *= 2;
        }
        v & 0x3F
    } else {
        let a = if m & 1 != 0 { 0x7F } else { 0 };
        let (bv, c) = if range.trits {
            match range.bits {
                1 => (0, 50),
                2 => {
                    let x = (m >> 1) & 1;
                    ((x << 5) | (x << 2) | x, 23)
                }
                _ => {
                    let x = (m >> 1) & 0x3;
                    let (b0, b1) = (x & 1, (x >> 1) & 1);
                    ((b1 << 6) | (b0 << 5) | (b1 << 1) | b0, 11)
                }
            }
        } else {
            match range.bits {
                1 => (0, 28),
                _ => {
                    let x = (m >> 1) & 1;
                    ((x << 5) | x, 13)
                }
            }
        };
        let mut t = tq * c + bv;
        t ^= a;
        (a & 0x20) | (t >> 2)
    };
    if w > 32 {
        w += 1;
    }
    w
}

fn hash52(mut p: u32) -> u32 {
    p ^= p >> 15;
    p = p.wrapping_sub(p << 17);
    p = p.wrapping_add(p << 7);
    p = p.wrapping_add(p << 4);
    p ^= p >> 5;
    p = p.wrapping_add(p << 16);
    p ^= p >> 7;
    p ^= p >> 3;
    p ^= p << 6;
    p ^= p >> 17;
    p
}

/// The partition hash: selects the subset a texel belongs to.
fn select_partition(seed: u32, x: u32, y: u32, partition_count: u32) -> usize {
    // 4x4 blocks have fewer than 31 texels, so coordinates are doubled.
    let x = x << 1;
    let y = y << 1;
    let z = 0;

    let seed = seed + (partition_count - 1) * 1024;
    let rnum = hash52(seed);

    let mut s = [
        rnum & 0xF,
        (rnum >> 4) & 0xF,
        (rnum >> 8) & 0xF,
        (rnum >> 12) & 0xF,
        (rnum >> 16) & 0xF,
        (rnum >> 20) & 0xF,
        (rnum >> 24) & 0xF,
        (rnum >> 28) & 0xF,
        (rnum >> 18) & 0xF,
        (rnum >> 22) & 0xF,
        (rnum >> 26) & 0xF,
        ((rnum >> 30) | (rnum << 2)) & 0xF,
    ];
    for v in &mut s {
        *v = *v * *v;
    }

    let (sh1, sh2) = if seed & 1 != 0 {
        (
            if seed & 2 != 0 { 4 } else { 5 },
            if partition_count == 3 { 6 } else { 5 },
        )
    } else {
        (
            if partition_count == 3 { 6 } else { 5 },
            if seed & 2 != 0 { 4 } else { 5 },
        )
    };
    let sh3 = if seed & 0x10 != 0 { sh1 } else { sh2 };

    for (i, v) in s.iter_mut().enumerate() {
        *v >>= match i {
            0 | 2 | 4 | 6 => sh1,
            1 | 3 | 5 | 7 => sh2,
            _ => sh3,
        };
    }

    let mut a = s[0] * x + s[1] * y + s[10] * z + (rnum >> 14);
    let mut b = s[2] * x + s[3] * y + s[11] * z + (rnum >> 10);
    let mut c = s[4] * x + s[5] * y + s[8] * z + (rnum >> 6);
    let mut d = s[6] * x + s[7] * y + s[9] * z + (rnum >> 2);

    a &= 0x3F;
    b &= 0x3F;
    c &= 0x3F;
    d &= 0x3F;

    if partition_count <= 3 {
        d = 0;
    }
    if partition_count <= 2 {
        c = 0;
    }

    if a >= b && a >= c && a >= d {
        0
    } else if b >= c && b >= d {
        1
    } else if c >= d {
        2
    } else {
        3
    }
}

/// An RGBA endpoint pair in 8-bit components.
#[derive(Clone, Copy, Default)]
struct EndpointPair {
    e0: [i32; 4],
    e1: [i32; 4],
}

fn blue_contract(e: &mut [i32; 4]) {
    e[0] = (e[0] + e[2]) >> 1;
    e[1] = (e[1] + e[2]) >> 1;
}

fn bit_transfer_signed(a: &mut i32, b: &mut i32) {
    *b >>= 1;
    *b |= *a & 0x80;
    *a >>= 1;
    *a &= 0x3F;
    if *a & 0x20 != 0 {
        *a -= 0x40;
    }
}

fn clamp_unorm8(e: &mut [i32; 4]) {
    for v in e {
        *v = (*v).clamp(0, 255);
    }
}

/// Builds the endpoint pair for one partition from its unquantized values.
///
/// Returns `None` for HDR endpoint modes.
fn decode_endpoints(cem: u32, v: &[i32]) -> Option<EndpointPair> {
    let mut pair = EndpointPair::default();
    match cem {
        0 => {
            pair.e0 = [v[0], v[0], v[0], 255];
            pair.e1 = [v[1], v[1], v[1], 255];
        }
        1 => {
            let l0 = (v[0] >> 2) | (v[1] & 0xC0);
            let l1 = (l0 + (v[1] & 0x3F)).min(255);
            pair.e0 = [l0, l0, l0, 255];
            pair.e1 = [l1, l1, l1, 255];
        }
        4 => {
            pair.e0 = [v[0], v[0], v[0], v[2]];
            pair.e1 = [v[1], v[1], v[1], v[3]];
        }
        5 => {
            let (mut v0, mut v1, mut v2, mut v3) = (v[0], v[1], v[2], v[3]);
            bit_transfer_signed(&mut v1, &mut v0);
            bit_transfer_signed(&mut v3, &mut v2);
            pair.e0 = [v0, v0, v0, v2];
            pair.e1 = [v0 + v1, v0 + v1, v0 + v1, v2 + v3];
            clamp_unorm8(&mut pair.e0);
            clamp_unorm8(&mut pair.e1);
        }
        6 => {
            pair.e0 = [
                (v[0] * v[3]) >> 8,
                (v[1] * v[3]) >> 8,
                (v[2] * v[3]) >> 8,
                255,
            ];
            pair.e1 = [v[0], v[1], v[2], 255];
        }
        8 => {
            let s0 = v[0] + v[2] + v[4];
            let s1 = v[1] + v[3] + v[5];
            if s1 >= s0 {
                pair.e0 = [v[0], v[2], v[4], 255];
                pair.e1 = [v[1], v[3], v[5], 255];
            } else {
                pair.e0 = [v[1], v[3], v[5], 255];
                pair.e1 = [v[0], v[2], v[4], 255];
                blue_contract(&mut pair.e0);
                blue_contract(&mut pair.e1);
            }
        }
        9 => {
            let (mut v0, mut v1, mut v2, mut v3, mut v4, mut v5) =
                (v[0], v[1], v[2], v[3], v[4], v[5]);
            bit_transfer_signed(&mut v1, &mut v0);
            bit_transfer_signed(&mut v3, &mut v2);
            bit_transfer_signed(&mut v5, &mut v4);
            if v1 + v3 + v5 >= 0 {
                pair.e0 = [v0, v2, v4, 255];
                pair.e1 = [v0 + v1, v2 + v3, v4 + v5, 255];
            } else {
                pair.e0 = [v0 + v1, v2 + v3, v4 + v5, 255];
                pair.e1 = [v0, v2, v4, 255];
                blue_contract(&mut pair.e0);
                blue_contract(&mut pair.e1);
            }
            clamp_unorm8(&mut pair.e0);
            clamp_unorm8(&mut pair.e1);
        }
        10 => {
            pair.e0 = [
                (v[0] * v[3]) >> 8,
                (v[1] * v[3]) >> 8,
                (v[2] * v[3]) >> 8,
                v[4],
            ];
            pair.e1 = [v[0], v[1], v[2], v[5]];
        }
        12 => {
            let s0 = v[0] + v[2] + v[4];
            let s1 = v[1] + v[3] + v[5];
            if s1 >= s0 {
                pair.e0 = [v[0], v[2], v[4], v[6]];
                pair.e1 = [v[1], v[3], v[5], v[7]];
            } else {
                pair.e0 = [v[1], v[3], v[5], v[7]];
                pair.e1 = [v[0], v[2], v[4], v[6]];
                blue_contract(&mut pair.e0);
                blue_contract(&mut pair.e1);
            }
        }
        13 => {
            let (mut v0, mut v1, mut v2, mut v3, mut v4, mut v5, mut v6, mut v7) =
                (v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7]);
            bit_transfer_signed(&mut v1, &mut v0);
            bit_transfer_signed(&mut v3, &mut v2);
            bit_transfer_signed(&mut v5, &mut v4);
            bit_transfer_signed(&mut v7, &mut v6);
            if v1 + v3 + v5 >= 0 {
                pair.e0 = [v0, v2, v4, v6];
                pair.e1 = [v0 + v1, v2 + v3, v4 + v5, v6 + v7];
            } else {
                pair.e0 = [v0 + v1, v2 + v3, v4 + v5, v6 + v7];
                pair.e1 = [v0, v2, v4, v6];
                blue_contract(&mut pair.e0);
                blue_contract(&mut pair.e1);
            }
            clamp_unorm8(&mut pair.e0);
            clamp_unorm8(&mut pair.e1);
        }
        _ => return None, // HDR endpoint modes.
    }
    Some(pair)
}

/// Converts an interpolated UNORM16 value to half float.
fn unorm16_to_f16(v: u32) -> f16 {
    if v == 0xFFFF {
        f16::from_f32(1.0)
    } else {
        f16::from_f32(v as f32 / 65536.0)
    }
}

fn error_block() -> BlockRgbaF16 {
    let magenta = TexelRgbaF16 {
        r: f16::from_f32(1.0),
        g: f16::from_f32(0.0),
        b: f16::from_f32(1.0),
        a: f16::from_f32(1.0),
    };
    [[magenta; BLOCK_DIM]; BLOCK_DIM]
}

fn void_extent_block(block: &BitReader, hdr_profile: bool) -> BlockRgbaF16 {
    let hdr_color = block.get(9, 1) != 0;
    let channels = [
        block.get(64, 16) as u16,
        block.get(80, 16) as u16,
        block.get(96, 16) as u16,
        block.get(112, 16) as u16,
    ];
    let texel = if hdr_color && hdr_profile {
        TexelRgbaF16::from_bits(channels[0], channels[1], channels[2], channels[3])
    } else {
        TexelRgbaF16 {
            r: unorm16_to_f16(u32::from(channels[0])),
            g: unorm16_to_f16(u32::from(channels[1])),
            b: unorm16_to_f16(u32::from(channels[2])),
            a: unorm16_to_f16(u32::from(channels[3])),
        }
    };
    [[texel; BLOCK_DIM]; BLOCK_DIM]
}

/// The weight grid shape a block mode selects.
struct BlockMode {
    grid_w: usize,
    grid_h: usize,
    range: Range,
    dual_plane: bool,
}

fn decode_block_mode(mode: u32) -> Option<BlockMode> {
    if mode & 0x3 == 0 {
        // Large weight grids; none fit inside a 4x4 footprint.
        return None;
    }
    let r = ((mode >> 4) & 1) | ((mode & 0x3) << 1);
    let high_precision = (mode >> 9) & 1 != 0;
    let dual_plane = (mode >> 10) & 1 != 0;
    let a = (mode >> 5) & 0x3;
    let b = (mode >> 7) & 0x3;

    let (w, h) = match (mode >> 2) & 0x3 {
        0 => (b + 4, a + 2),
        1 => (b + 8, a + 2),
        2 => (a + 2, b + 8),
        _ => {
            if mode & 0x100 != 0 {
                ((b & 1) + 2, a + 2)
            } else {
                (a + 2, (b & 1) + 6)
            }
        }
    };
    let range = weight_range(r, high_precision)?;
    if w as usize > FOOTPRINT || h as usize > FOOTPRINT {
        return None;
    }
    Some(BlockMode {
        grid_w: w as usize,
        grid_h: h as usize,
        range,
        dual_plane,
    })
}

/// Bilinearly infills the decimated weight grid at one texel.
fn infill_weight(weights: &[u32], grid_w: usize, grid_h: usize, stride: usize, plane: usize, x: usize, y: usize) -> u32 {
    let ds = (1024 + FOOTPRINT / 2) / (FOOTPRINT - 1);
    let cs = ds * x;
    let ct = ds * y;
    let gs = (cs * (grid_w - 1) + 32) >> 6;
    let gt = (ct * (grid_h - 1) + 32) >> 6;
    let js = gs >> 4;
    let fs = (gs & 0xF) as u32;
    let jt = gt >> 4;
    let ft = (gt & 0xF) as u32;

    let w11 = (fs * ft + 8) >> 4;
    let w10 = ft - w11;
    let w01 = fs - w11;
    let w00 = (16 + w11) - fs - ft;

    let sample = |sx: usize, sy: usize| -> u32 {
        let sx = sx.min(grid_w - 1);
        let sy = sy.min(grid_h - 1);
        weights[(sy * grid_w + sx) * stride + plane]
    };

    (sample(js, jt) * w00 + sample(js + 1, jt) * w01 + sample(js, jt + 1) * w10 + sample(js + 1, jt + 1) * w11 + 8) >> 4
}

/// Decodes one 4×4 ASTC block to half-float texels.
#[must_use]
pub fn decode_block(bytes: &[u8; 16], hdr_profile: bool) -> BlockRgbaF16 {
    let block = BitReader {
        bits: u128::from_le_bytes(*bytes),
    };

    if block.get(0, 9) == 0x1FC {
        return void_extent_block(&block, hdr_profile);
    }

    let Some(mode) = decode_block_mode(block.get(0, 11)) else {
        return error_block();
    };

    let partition_count = block.get(11, 2) + 1;
    if mode.dual_plane && partition_count == 4 {
        return error_block();
    }

    // Colour endpoint mode and the start of endpoint data.
    let (cem, endpoint_start, config_bits) = if partition_count == 1 {
        (block.get(13, 4), 17, 17)
    } else {
        let cem_field = block.get(23, 6);
        if cem_field & 0x3 != 0 {
            // Mixed endpoint-mode classes store extra bits below the
            // weights; not supported, decode as an error.
            return error_block();
        }
        (cem_field >> 2, 29, 29)
    };

    let weight_count = mode.grid_w * mode.grid_h * if mode.dual_plane { 2 } else { 1 };
    let weight_bits = mode.range.encoded_bits(weight_count as u32);
    if weight_bits > 96 {
        return error_block();
    }

    let ccs_bits = if mode.dual_plane { 2 } else { 0 };
    let available = 128_i32 - config_bits as i32 - weight_bits as i32 - ccs_bits;
    let values_per_partition = 2 * (cem / 4 + 1);
    let value_count = (values_per_partition * partition_count) as usize;
    let Some(color_range) = COLOR_RANGES
        .iter()
        .find(|r| r.encoded_bits(value_count as u32) as i32 <= available)
        .copied()
    else {
        return error_block();
    };

    // Weights are stored bit-reversed from the top of the block.
    let raw_weights = decode_ise(&block, mode.range, weight_count, 0, true);
    let weights: Vec<u32> = raw_weights
        .iter()
        .map(|&v| unquantize_weight(v, mode.range))
        .collect();

    let raw_values = decode_ise(&block, color_range, value_count, endpoint_start, false);
    let values: Vec<i32> = raw_values
        .iter()
        .map(|&v| unquantize_color(v, color_range) as i32)
        .collect();

    let mut pairs = [EndpointPair::default(); 4];
    for p in 0..partition_count as usize {
        let start = p * values_per_partition as usize;
        let end = start + values_per_partition as usize;
        match decode_endpoints(cem, &values[start..end]) {
            Some(pair) => pairs[p] = pair,
            None => return error_block(),
        }
    }

    let ccs = if mode.dual_plane {
        // The plane-2 component sits directly below the weight data.
        let pos = 128 - weight_bits as usize - 2;
        block.get(pos, 2) as usize
    } else {
        4
    };

    let partition_seed = block.get(13, 10);
    let stride = if mode.dual_plane { 2 } else { 1 };
    let mut out = BlockRgbaF16::default();
    for y in 0..BLOCK_DIM {
        for x in 0..BLOCK_DIM {
            let partition = if partition_count > 1 {
                select_partition(partition_seed, x as u32, y as u32, partition_count)
            } else {
                0
            };
            let pair = &pairs[partition];

            let w1 = infill_weight(&weights, mode.grid_w, mode.grid_h, stride, 0, x, y);
            let w2 = if mode.dual_plane {
                infill_weight(&weights, mode.grid_w, mode.grid_h, stride, 1, x, y)
            } else {
                w1
            };

            let mut channels = [0_u32; 4];
            for (c, out_c) in channels.iter_mut().enumerate() {
                let w = if mode.dual_plane && c == ccs { w2 } else { w1 };
                let c0 = (pair.e0[c] as u32) * 0x101;
                let c1 = (pair.e1[c] as u32) * 0x101;
                *out_c = (c0 * (64 - w) + c1 * w + 32) >> 6;
            }
            out[y][x] = TexelRgbaF16 {
                r: unorm16_to_f16(channels[0]),
                g: unorm16_to_f16(channels[1]),
                b: unorm16_to_f16(channels[2]),
                a: unorm16_to_f16(channels[3]),
            };
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BitWriter {
        bits: u128,
    }

    impl BitWriter {
        fn new() -> Self {
            Self { bits: 0 }
        }
        fn put(&mut self, offset: u32, value: u128, count: u32) {
            self.bits |= (value & ((1 << count) - 1)) << offset;
        }
        /// Writes weight bits, which are stored reversed from bit 127.
        fn put_weight_bit(&mut self, index: u32, bit: u128) {
            self.bits |= bit << (127 - index);
        }
        fn finish(&self) -> [u8; 16] {
            self.bits.to_le_bytes()
        }
    }

    #[test]
    fn ldr_void_extent_is_a_uniform_block() {
        let mut w = BitWriter::new();
        w.put(0, 0x1FC, 9); // void extent, LDR colour
        w.put(9, 0, 1);
        w.put(10, 0b11, 2);
        w.put(12, 0x1FFF_FFFF_FFFF_F, 52); // all-ones extent coordinates
        w.put(64, 0xFFFF, 16); // red
        w.put(80, 0, 16); // green
        w.put(96, 0x8000, 16); // blue
        w.put(112, 0xFFFF, 16); // alpha
        let texels = decode_block(&w.finish(), false);
        for row in &texels {
            for texel in row {
                assert_eq!(f32::from(texel.r), 1.0);
                assert_eq!(f32::from(texel.g), 0.0);
                assert!((f32::from(texel.b) - 0.5).abs() < 1e-3);
                assert_eq!(f32::from(texel.a), 1.0);
            }
        }
    }

    #[test]
    fn hdr_void_extent_carries_raw_half_floats() {
        let mut w = BitWriter::new();
        w.put(0, 0x1FC, 9);
        w.put(9, 1, 1); // HDR colour
        w.put(64, 0x4500, 16); // 5.0 in half float
        w.put(80, 0x3C00, 16);
        w.put(96, 0, 16);
        w.put(112, 0x3C00, 16);
        let texels = decode_block(&w.finish(), true);
        assert_eq!(f32::from(texels[0][0].r), 5.0);
        assert_eq!(f32::from(texels[2][1].g), 1.0);
    }

    #[test]
    fn reserved_block_modes_decode_to_the_error_color() {
        // Block mode with bits[1:0] = 00 requests a weight grid wider than
        // the footprint.
        let texels = decode_block(&[0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], false);
        assert_eq!(f32::from(texels[0][0].r), 1.0);
        assert_eq!(f32::from(texels[0][0].g), 0.0);
        assert_eq!(f32::from(texels[0][0].b), 1.0);
    }

    #[test]
    fn single_partition_rgb_block_with_flat_weights() {
        // Block mode 0x42: 4x4 weight grid, 2-bit weights, no dual plane.
        let mut w = BitWriter::new();
        w.put(0, 0x42, 11);
        w.put(11, 0, 2); // one partition
        w.put(13, 8, 4); // CEM 8: direct RGB
        // Six 8-bit endpoint values from bit 17: r0 r1 g0 g1 b0 b1.
        // s0 = 32+64+96 < s1 = 255+255+255, so no endpoint swap.
        let values = [32_u128, 255, 64, 255, 96, 255];
        for (i, v) in values.iter().enumerate() {
            w.put(17 + (i as u32) * 8, *v, 8);
        }
        // All sixteen 2-bit weights = 2 (unquantized 43).
        for i in 0..16 {
            // Weight bits LSB-first in the reversed stream.
            w.put_weight_bit(i * 2, 0);
            w.put_weight_bit(i * 2 + 1, 1);
        }
        let texels = decode_block(&w.finish(), false);
        // r = ((32*257)*(64-43) + (255*257)*43 + 32) >> 6 = 46730 -> ~0.713.
        let expected_r = 46730.0 / 65536.0;
        let expected_g = ((64 * 257 * 21 + 255 * 257 * 43 + 32) >> 6) as f32 / 65536.0;
        for row in &texels {
            for texel in row {
                assert!((f32::from(texel.r) - expected_r).abs() < 2e-3);
                assert!((f32::from(texel.g) - expected_g).abs() < 2e-3);
                assert_eq!(f32::from(texel.a), 1.0);
            }
        }
    }

    #[test]
    fn luma_blocks_are_gray() {
        // Same shape as the RGB test but CEM 0 with endpoints 0 and 255 and
        // all weights zero: every texel is endpoint zero (black).
        let mut w = BitWriter::new();
        w.put(0, 0x42, 11);
        w.put(11, 0, 2);
        w.put(13, 0, 4); // CEM 0: luma direct
        w.put(17, 0, 8); // v0
        w.put(25, 255, 8); // v1
        let texels = decode_block(&w.finish(), false);
        for row in &texels {
            for texel in row {
                assert_eq!(f32::from(texel.r), 0.0);
                assert_eq!(f32::from(texel.g), 0.0);
                assert_eq!(f32::from(texel.b), 0.0);
                assert_eq!(f32::from(texel.a), 1.0);
            }
        }
    }

    #[test]
    fn partition_hash_is_stable_across_calls() {
        for seed in [0_u32, 5, 100, 1023] {
            for count in 2..=3 {
                let a = select_partition(seed, 1, 2, count);
                let b = select_partition(seed, 1, 2, count);
                assert_eq!(a, b);
                assert!(a < count as usize);
            }
        }
    }

    #[test]
    fn trit_quintuplets_cover_the_value_range() {
        for t in 0..=255_u32 {
            for v in decode_trit_quintuplet(t) {
                assert!(v <= 2, "trit block {t:#x} produced {v}");
            }
        }
    }

    #[test]
    fn quint_triplets_cover_the_value_range() {
        for q in 0..=127_u32 {
            for v in decode_quint_triplet(q) {
                assert!(v <= 4, "quint block {q:#x} produced {v}");
            }
        }
    }
}
