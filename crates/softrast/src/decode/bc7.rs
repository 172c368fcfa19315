//! BC7 block decoding
//!
//! Eight modes identified by the position of the lowest set bit. Each mode
//! fixes the subset count, partition/rotation/index-selection bits, endpoint
//! widths, and p-bit layout; every field location is derived from those
//! widths, so the mode table drives the whole decode.
//!
//! References:
//! - `ARB_texture_compression_bptc`
//! - <https://docs.microsoft.com/en-us/windows/win32/direct3d11/bc7-format>

use super::partitions::{ANCHOR_2, ANCHOR_3A, ANCHOR_3B, PARTITION_2, PARTITION_3};
use super::{BlockRgba8, TexelRgba8, BLOCK_DIM};

/// A contiguous field within the 128 block bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bitfield {
    offset: i32,
    count: i32,
}

impl Bitfield {
    /// The field of `bits` bits immediately after this one.
    const fn then(self, bits: i32) -> Self {
        Self {
            offset: self.offset + self.count,
            count: bits,
        }
    }
}

/// Per-mode layout parameters.
struct Mode {
    /// Mode index, equal to the bit position of the leading 1; -1 is invalid.
    idx: i32,
    /// Number of subsets per partition.
    ns: i32,
    /// Partition bits.
    pb: i32,
    /// Rotation bits.
    rb: i32,
    /// Index-selection bits.
    isb: i32,
    /// Colour bits per endpoint channel.
    cb: i32,
    /// Alpha bits per endpoint.
    ab: i32,
    /// Per-endpoint p-bits.
    epb: i32,
    /// Shared p-bits.
    spb: i32,
    /// Primary index bits per texel.
    ib: i32,
    /// Primary index bits total.
    ibc: i32,
    /// Secondary index bits per texel.
    ib2: i32,
}

impl Mode {
    const fn num_colors(&self) -> i32 {
        self.ns * 2
    }
    const fn partition(&self) -> Bitfield {
        Bitfield {
            offset: self.idx + 1,
            count: self.pb,
        }
    }
    const fn rotation(&self) -> Bitfield {
        self.partition().then(self.rb)
    }
    const fn index_selection(&self) -> Bitfield {
        self.rotation().then(self.isb)
    }
    const fn red(&self, idx: i32) -> Bitfield {
        self.index_selection().then(self.cb * idx).then(self.cb)
    }
    const fn green(&self, idx: i32) -> Bitfield {
        self.red(self.num_colors() - 1)
            .then(self.cb * idx)
            .then(self.cb)
    }
    const fn blue(&self, idx: i32) -> Bitfield {
        self.green(self.num_colors() - 1)
            .then(self.cb * idx)
            .then(self.cb)
    }
    const fn alpha(&self, idx: i32) -> Bitfield {
        self.blue(self.num_colors() - 1)
            .then(self.ab * idx)
            .then(self.ab)
    }
    const fn endpoint_pbit(&self, idx: i32) -> Bitfield {
        self.alpha(self.num_colors() - 1)
            .then(self.epb * idx)
            .then(self.epb)
    }
    const fn shared_pbit0(&self) -> Bitfield {
        self.endpoint_pbit(self.num_colors() - 1).then(self.spb)
    }
    const fn shared_pbit1(&self) -> Bitfield {
        self.shared_pbit0().then(self.spb)
    }
    const fn primary_index(&self, offset: i32, count: i32) -> Bitfield {
        self.shared_pbit1().then(offset).then(count)
    }
    const fn secondary_index(&self, offset: i32, count: i32) -> Bitfield {
        self.shared_pbit1().then(self.ibc + offset).then(count)
    }
}

#[rustfmt::skip]
static MODES: [Mode; 9] = [
    //     IDX      NS       PB       RB       ISB      CB       AB       EPB      SPB      IB       IBC       IB2
    Mode { idx: 0,  ns: 3,   pb: 4,   rb: 0,   isb: 0,  cb: 4,   ab: 0,   epb: 1,  spb: 0,  ib: 3,   ibc: 45,  ib2: 0 },
    Mode { idx: 1,  ns: 2,   pb: 6,   rb: 0,   isb: 0,  cb: 6,   ab: 0,   epb: 0,  spb: 1,  ib: 3,   ibc: 46,  ib2: 0 },
    Mode { idx: 2,  ns: 3,   pb: 6,   rb: 0,   isb: 0,  cb: 5,   ab: 0,   epb: 0,  spb: 0,  ib: 2,   ibc: 29,  ib2: 0 },
    Mode { idx: 3,  ns: 2,   pb: 6,   rb: 0,   isb: 0,  cb: 7,   ab: 0,   epb: 1,  spb: 0,  ib: 2,   ibc: 30,  ib2: 0 },
    Mode { idx: 4,  ns: 1,   pb: 0,   rb: 2,   isb: 1,  cb: 5,   ab: 6,   epb: 0,  spb: 0,  ib: 2,   ibc: 31,  ib2: 3 },
    Mode { idx: 5,  ns: 1,   pb: 0,   rb: 2,   isb: 0,  cb: 7,   ab: 8,   epb: 0,  spb: 0,  ib: 2,   ibc: 31,  ib2: 2 },
    Mode { idx: 6,  ns: 1,   pb: 0,   rb: 0,   isb: 0,  cb: 7,   ab: 7,   epb: 1,  spb: 0,  ib: 4,   ibc: 63,  ib2: 0 },
    Mode { idx: 7,  ns: 2,   pb: 6,   rb: 0,   isb: 0,  cb: 5,   ab: 5,   epb: 1,  spb: 0,  ib: 2,   ibc: 30,  ib2: 0 },
    Mode { idx: -1, ns: 0,   pb: 0,   rb: 0,   isb: 0,  cb: 0,   ab: 0,   epb: 0,  spb: 0,  ib: 0,   ibc: 0,   ib2: 0 },
];

/// An endpoint colour while precision is being rebuilt.
#[derive(Clone, Copy, Default)]
struct Endpoint {
    rgb: [u16; 3],
    a: u16,
}

struct Block {
    bits: u128,
}

struct IndexInfo {
    value: u64,
    num_bits: i32,
}

impl Block {
    fn get(&self, bf: Bitfield) -> u64 {
        let mask = (1_u128 << bf.count) - 1;
        ((self.bits >> bf.offset) & mask) as u64
    }

    fn mode(&self) -> &'static Mode {
        let low = self.bits as u8;
        let position = low.trailing_zeros() as usize;
        &MODES[position.min(8)]
    }

    fn interpolate(e0: u16, e1: u16, index: &IndexInfo) -> u16 {
        const WEIGHTS_2: [u32; 4] = [0, 21, 43, 64];
        const WEIGHTS_3: [u32; 8] = [0, 9, 18, 27, 37, 46, 55, 64];
        const WEIGHTS_4: [u32; 16] =
            [0, 4, 9, 13, 17, 21, 26, 30, 34, 38, 43, 47, 51, 55, 60, 64];
        let weight = match index.num_bits {
            2 => WEIGHTS_2[index.value as usize],
            3 => WEIGHTS_3[index.value as usize],
            _ => WEIGHTS_4[index.value as usize],
        };
        (((64 - weight) * u32::from(e0) + weight * u32::from(e1) + 32) >> 6) as u16
    }

    fn subset_index(mode: &Mode, partition: usize, texel: usize) -> usize {
        match mode.ns {
            2 => usize::from(PARTITION_2[partition][texel]),
            3 => usize::from(PARTITION_3[partition][texel]),
            _ => 0,
        }
    }

    fn anchor_index(mode: &Mode, partition: usize, subset: usize) -> usize {
        // The anchor of subset zero is always texel zero; the other subsets
        // take theirs from the anchor tables.
        match subset {
            1 if mode.ns == 2 => usize::from(ANCHOR_2[partition]),
            1 => usize::from(ANCHOR_3A[partition]),
            2 => usize::from(ANCHOR_3B[partition]),
            _ => 0,
        }
    }

    /// Reads the colour index for one texel, advancing `bit_offset`.
    ///
    /// The colour index comes from the secondary index when the mode has an
    /// index-selection bit set to one, and from the primary index otherwise.
    fn color_index(&self, mode: &Mode, is_anchor: bool, bit_offset: &mut i32) -> IndexInfo {
        let secondary = self.get(mode.index_selection()) == 1;
        let num_bits = if secondary { mode.ib2 } else { mode.ib };
        let num_read_bits = num_bits - i32::from(is_anchor);
        let field = if secondary {
            mode.secondary_index(*bit_offset, num_read_bits)
        } else {
            mode.primary_index(*bit_offset, num_read_bits)
        };
        let value = self.get(field);
        *bit_offset += num_read_bits;
        IndexInfo { value, num_bits }
    }

    /// Reads the alpha index for one texel, advancing `bit_offset`.
    ///
    /// The alpha index comes from the secondary index when the block has one
    /// and the index-selection bit is zero or absent.
    fn alpha_index(&self, mode: &Mode, is_anchor: bool, bit_offset: &mut i32) -> IndexInfo {
        let secondary = mode.ib2 != 0 && self.get(mode.index_selection()) == 0;
        let num_bits = if secondary { mode.ib2 } else { mode.ib };
        let num_read_bits = num_bits - i32::from(is_anchor);
        let field = if secondary {
            mode.secondary_index(*bit_offset, num_read_bits)
        } else {
            mode.primary_index(*bit_offset, num_read_bits)
        };
        let value = self.get(field);
        *bit_offset += num_read_bits;
        IndexInfo { value, num_bits }
    }
}

/// Decodes one BC7 block to RGBA8 texels.
#[must_use]
pub fn decode_block(bytes: &[u8; 16]) -> BlockRgba8 {
    let block = Block {
        bits: u128::from_le_bytes(*bytes),
    };
    let mode = block.mode();

    if mode.idx < 0 {
        // Invalid mode: transparent black.
        return BlockRgba8::default();
    }

    let mut subsets = [[Endpoint::default(); 2]; 3];
    for (i, subset) in subsets.iter_mut().enumerate().take(mode.ns as usize) {
        for (j, endpoint) in subset.iter_mut().enumerate() {
            let idx = (i * 2 + j) as i32;
            endpoint.rgb[0] = block.get(mode.red(idx)) as u16;
            endpoint.rgb[1] = block.get(mode.green(idx)) as u16;
            endpoint.rgb[2] = block.get(mode.blue(idx)) as u16;
            endpoint.a = if mode.ab > 0 {
                block.get(mode.alpha(idx)) as u16
            } else {
                255
            };
        }
    }

    if mode.spb > 0 {
        let pbits = [block.get(mode.shared_pbit0()), block.get(mode.shared_pbit1())];
        for (i, subset) in subsets.iter_mut().enumerate().take(2) {
            for endpoint in subset.iter_mut() {
                for c in &mut endpoint.rgb {
                    *c = (*c << 1) | pbits[i] as u16;
                }
            }
        }
    }

    if mode.epb > 0 {
        for (i, subset) in subsets.iter_mut().enumerate().take(mode.ns as usize) {
            for (j, endpoint) in subset.iter_mut().enumerate() {
                let pbit = block.get(mode.endpoint_pbit((i * 2 + j) as i32)) as u16;
                for c in &mut endpoint.rgb {
                    *c = (*c << 1) | pbit;
                }
                if mode.ab > 0 {
                    endpoint.a = (endpoint.a << 1) | pbit;
                }
            }
        }
    }

    // Shift endpoints into 8-bit range and replicate the high bits into the
    // freshly exposed low bits.
    let color_bits = mode.cb + mode.spb + mode.epb;
    let alpha_bits = mode.ab + mode.spb + mode.epb;
    for subset in subsets.iter_mut().take(mode.ns as usize) {
        for endpoint in subset.iter_mut() {
            for c in &mut endpoint.rgb {
                *c <<= 8 - color_bits;
                *c |= *c >> color_bits;
            }
            if mode.ab > 0 {
                endpoint.a <<= 8 - alpha_bits;
                endpoint.a |= endpoint.a >> alpha_bits;
            }
        }
    }

    let partition = block.get(mode.partition()) as usize;
    let rotation = block.get(mode.rotation());

    let mut color_index_offset = 0;
    let mut alpha_index_offset = 0;
    let mut out = BlockRgba8::default();
    for y in 0..BLOCK_DIM {
        for x in 0..BLOCK_DIM {
            let texel = y * BLOCK_DIM + x;
            let subset_idx = Block::subset_index(mode, partition, texel);
            let subset = &subsets[subset_idx];

            let is_anchor = Block::anchor_index(mode, partition, subset_idx) == texel;
            let color_idx = block.color_index(mode, is_anchor, &mut color_index_offset);
            let alpha_idx = block.alpha_index(mode, is_anchor, &mut alpha_index_offset);

            let mut texel_out = TexelRgba8::new(
                Block::interpolate(subset[0].rgb[0], subset[1].rgb[0], &color_idx) as u8,
                Block::interpolate(subset[0].rgb[1], subset[1].rgb[1], &color_idx) as u8,
                Block::interpolate(subset[0].rgb[2], subset[1].rgb[2], &color_idx) as u8,
                Block::interpolate(subset[0].a, subset[1].a, &alpha_idx) as u8,
            );
            match rotation {
                1 => std::mem::swap(&mut texel_out.a, &mut texel_out.r),
                2 => std::mem::swap(&mut texel_out.a, &mut texel_out.g),
                3 => std::mem::swap(&mut texel_out.a, &mut texel_out.b),
                _ => {}
            }
            out[y][x] = texel_out;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_layout_offsets_match_the_specification() {
        assert_eq!(MODES[0].num_colors(), 6);
        assert_eq!(MODES[0].partition(), Bitfield { offset: 1, count: 4 });
        assert_eq!(MODES[0].red(0), Bitfield { offset: 5, count: 4 });
        assert_eq!(MODES[0].red(5), Bitfield { offset: 25, count: 4 });
        assert_eq!(MODES[0].green(0), Bitfield { offset: 29, count: 4 });
        assert_eq!(MODES[0].blue(5), Bitfield { offset: 73, count: 4 });
        assert_eq!(MODES[0].endpoint_pbit(0), Bitfield { offset: 77, count: 1 });
        assert_eq!(MODES[0].endpoint_pbit(5), Bitfield { offset: 82, count: 1 });
        assert_eq!(MODES[0].primary_index(0, 2), Bitfield { offset: 83, count: 2 });
        assert_eq!(MODES[0].primary_index(43, 1), Bitfield { offset: 126, count: 1 });
    }

    struct BitWriter {
        bits: u128,
        offset: u32,
    }

    impl BitWriter {
        fn new() -> Self {
            Self { bits: 0, offset: 0 }
        }
        fn push(&mut self, value: u128, count: u32) {
            self.bits |= (value & ((1 << count) - 1)) << self.offset;
            self.offset += count;
        }
        fn finish(&self) -> [u8; 16] {
            self.bits.to_le_bytes()
        }
    }

    #[test]
    fn mode0_partition0_keeps_subsets_separate() {
        // Mode 0: three subsets, 4-bit endpoints, one p-bit per endpoint.
        // Subset endpoints: 0 = red to blue, 1 = green/green, 2 = white.
        let mut w = BitWriter::new();
        w.push(0b1, 1); // mode 0
        w.push(0, 4); // partition 0
        let reds = [15, 0, 0, 0, 15, 15];
        let greens = [0, 0, 15, 15, 15, 15];
        let blues = [0, 15, 0, 0, 15, 15];
        for r in reds {
            w.push(r, 4);
        }
        for g in greens {
            w.push(g, 4);
        }
        for b in blues {
            w.push(b, 4);
        }
        // P-bits and all indices zero.
        let texels = decode_block(&w.finish());

        // With a zero p-bit, nibble 15 expands to 11110_111 = 247.
        let red = TexelRgba8::new(247, 0, 0, 255);
        let green = TexelRgba8::new(0, 247, 0, 255);
        let white = TexelRgba8::new(247, 247, 247, 255);
        for y in 0..4 {
            for x in 0..4 {
                let expected = match PARTITION_3[0][y * 4 + x] {
                    0 => red,
                    1 => green,
                    _ => white,
                };
                assert_eq!(texels[y][x], expected, "texel ({x}, {y})");
            }
        }
    }

    #[test]
    fn mode0_indices_interpolate_between_endpoints() {
        let mut w = BitWriter::new();
        w.push(0b1, 1); // mode 0
        w.push(0, 4); // partition 0
        // All six endpoints: black -> white per subset.
        for value in [0, 15, 0, 15, 0, 15] {
            w.push(value, 4);
        }
        for value in [0, 15, 0, 15, 0, 15] {
            w.push(value, 4);
        }
        for value in [0, 15, 0, 15, 0, 15] {
            w.push(value, 4);
        }
        w.push(0, 6); // p-bits
        // Texel 0 is subset 0's anchor: 2 stored bits. Give it index 3.
        w.push(0b11, 2);
        // Texel 1: full 3 bits, index 7 (endpoint 1).
        w.push(0b111, 3);
        let texels = decode_block(&w.finish());

        // Index 3 of 8 carries weight 27: (64-27)*0 + 27*247 + 32 >> 6 = 104.
        assert_eq!(texels[0][0], TexelRgba8::new(104, 104, 104, 255));
        assert_eq!(texels[0][1], TexelRgba8::new(247, 247, 247, 255));
    }

    #[test]
    fn mode5_rotation_swaps_alpha_into_red() {
        let mut w = BitWriter::new();
        w.push(0b100000, 6); // mode 5
        w.push(1, 2); // rotation 1: swap alpha and red
        for value in [127_u128, 127] {
            w.push(value, 7); // red endpoints
        }
        for value in [0_u128, 0, 0, 0] {
            w.push(value, 7); // green, blue endpoints
        }
        for value in [128_u128, 128] {
            w.push(value, 8); // alpha endpoints
        }
        let texels = decode_block(&w.finish());
        // Colour decodes to (255, 0, 0, 128); rotation swaps r and a.
        assert_eq!(texels[2][3], TexelRgba8::new(128, 0, 0, 255));
    }

    #[test]
    fn zero_block_is_an_invalid_mode() {
        let texels = decode_block(&[0; 16]);
        assert_eq!(texels[0][0], TexelRgba8::new(0, 0, 0, 0));
        assert_eq!(texels[3][3], TexelRgba8::new(0, 0, 0, 0));
    }
}
