//! QARMA-64 tweakable block cipher
//!
//! Used by the cipher-based indexing policy as a pseudorandom permutation
//! over set indices. No side-channel resistance is claimed.

/// One 4-bit cell of the 64-bit state.
type Cell = u8;

const ALPHA: u64 = 0xC0AC29B7C97C50DD;

/// Round constants.
const C: [u64; 8] = [
    0x0000000000000000,
    0x13198A2E03707344,
    0xA4093822299F31D0,
    0x082EFA98EC4E6C89,
    0x452821E638D01377,
    0xBE5466CF34E90C6C,
    0x3F84D5B5B5470917,
    0x9216D5D98979FB1B,
];

/// ShuffleCells permutation and its inverse.
const T: [usize; 16] = [0, 11, 6, 13, 10, 1, 12, 7, 5, 14, 3, 8, 15, 4, 9, 2];
const T_INV: [usize; 16] =
    [0, 5, 15, 10, 13, 8, 2, 7, 11, 14, 4, 1, 6, 3, 9, 12];

/// Tweak cell permutation and its inverse.
const H: [usize; 16] = [6, 5, 14, 15, 0, 1, 2, 3, 7, 12, 13, 4, 8, 9, 10, 11];
const H_INV: [usize; 16] =
    [4, 5, 6, 7, 11, 1, 0, 8, 12, 13, 14, 15, 9, 10, 2, 3];

/// Cells the tweak-schedule LFSR is applied to.
const LFSR_CELLS: [usize; 7] = [0, 1, 3, 4, 8, 11, 13];

/// MixColumns circulant; entries are 4-bit left-rotation amounts, zero
/// entries are skipped.
const M: [u32; 16] = [0, 1, 2, 1, 1, 0, 1, 2, 2, 1, 0, 1, 1, 2, 1, 0];

const SBOX: [[Cell; 16]; 3] = [
    [0, 14, 2, 10, 9, 15, 8, 11, 6, 4, 3, 7, 13, 12, 1, 5],
    [10, 13, 14, 6, 15, 7, 3, 5, 9, 8, 0, 12, 11, 1, 2, 4],
    [11, 6, 8, 15, 12, 0, 9, 14, 3, 7, 4, 5, 13, 2, 1, 10],
];

const SBOX_INV: [[Cell; 16]; 3] = [
    [0, 14, 2, 10, 9, 15, 8, 11, 6, 4, 3, 7, 13, 12, 1, 5],
    [10, 13, 14, 6, 15, 7, 3, 5, 9, 8, 0, 12, 11, 1, 2, 4],
    [5, 14, 13, 8, 10, 11, 1, 9, 2, 6, 15, 0, 4, 12, 7, 3],
];

/// S-box selection. The variant is part of the cipher's identity: test
/// vectors only match for the variant they were produced with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SboxVariant {
    /// Lightest version, fixed points at 0 and 2.
    Sigma0,
    /// No fixed points.
    Sigma1,
    /// Lightweight S-box from the PRINCE family.
    #[default]
    Sigma2,
}

impl SboxVariant {
    fn index(self) -> usize {
        match self {
            SboxVariant::Sigma0 => 0,
            SboxVariant::Sigma1 => 1,
            SboxVariant::Sigma2 => 2,
        }
    }
}

/// QARMA-64: a lightweight tweakable block cipher.
///
/// The instance is immutable; `enc` and `dec` derive all round keys from
/// `(w0, k0)` per call, so a single cipher can be shared freely.
#[derive(Debug)]
pub struct Qarma64 {
    w0: u64,
    k0: u64,
    sbox: SboxVariant,
}

impl Qarma64 {
    /// Build a cipher with the default S-box variant.
    pub fn new(w0: u64, k0: u64) -> Self {
        Self::with_sbox(w0, k0, SboxVariant::default())
    }

    pub fn with_sbox(w0: u64, k0: u64, sbox: SboxVariant) -> Self {
        Self { w0, k0, sbox }
    }

    /// Encrypt a 64-bit block under the given tweak.
    /// `rounds` must be in `[1, 7]`.
    pub fn enc(&self, plaintext: u64, tweak: u64, rounds: usize) -> u64 {
        assert!((1..=7).contains(&rounds));
        let w1 = self.w0.rotate_right(1) ^ (self.w0 >> 63);
        self.transform(self.w0, w1, self.k0, self.k0, plaintext, tweak, rounds)
    }

    /// Decrypt a 64-bit block under the given tweak. Inverse of [`enc`]
    /// for the same tweak and round count.
    ///
    /// [`enc`]: Qarma64::enc
    pub fn dec(&self, ciphertext: u64, tweak: u64, rounds: usize) -> u64 {
        assert!((1..=7).contains(&rounds));
        // Decryption runs the same skeleton with swapped whitening keys,
        // k1 = MixColumns(k0) and alpha folded into k0
        let w0 = self.w0.rotate_right(1) ^ (self.w0 >> 63);
        let w1 = self.w0;
        let k1 = cell2text(&mix_columns(&text2cell(self.k0)));
        let k0 = self.k0 ^ ALPHA;
        self.transform(w0, w1, k0, k1, ciphertext, tweak, rounds)
    }

    /// The reflective round skeleton shared by both directions.
    fn transform(
        &self,
        w0: u64,
        w1: u64,
        k0: u64,
        k1: u64,
        text: u64,
        mut tweak: u64,
        rounds: usize,
    ) -> u64 {
        let mut is = text ^ w0;

        for i in 0..rounds {
            is = self.forward(is, k0 ^ tweak ^ C[i], i);
            tweak = forward_update_key(tweak);
        }

        is = self.forward(is, w1 ^ tweak, 1);
        is = pseudo_reflect(is, k1);
        is = self.backward(is, w0 ^ tweak, 1);

        for i in (0..rounds).rev() {
            tweak = backward_update_key(tweak);
            is = self.backward(is, k0 ^ tweak ^ C[i] ^ ALPHA, i);
        }

        is ^ w1
    }

    /// One forward round. Round 0 applies SubCells only.
    fn forward(&self, is: u64, tk: u64, r: usize) -> u64 {
        let mut cell = text2cell(is ^ tk);
        if r != 0 {
            cell = mix_columns(&shuffle(&cell, &T));
        }
        let sbox = &SBOX[self.sbox.index()];
        for c in cell.iter_mut() {
            *c = sbox[*c as usize];
        }
        cell2text(&cell)
    }

    /// One backward round, the inverse of [`forward`].
    ///
    /// [`forward`]: Qarma64::forward
    fn backward(&self, is: u64, tk: u64, r: usize) -> u64 {
        let mut cell = text2cell(is);
        let sbox_inv = &SBOX_INV[self.sbox.index()];
        for c in cell.iter_mut() {
            *c = sbox_inv[*c as usize];
        }
        if r != 0 {
            cell = shuffle(&mix_columns(&cell), &T_INV);
        }
        cell2text(&cell) ^ tk
    }
}

/// Split a 64-bit word into 16 cells; cell `i` is nibble `15 - i`, so cell 0
/// holds the most significant nibble.
fn text2cell(is: u64) -> [Cell; 16] {
    let mut cell = [0; 16];
    for (i, c) in cell.iter_mut().enumerate() {
        *c = ((is >> (4 * (15 - i))) & 0xF) as Cell;
    }
    cell
}

/// Exact inverse of [`text2cell`].
fn cell2text(cell: &[Cell; 16]) -> u64 {
    cell.iter().fold(0, |is, &c| (is << 4) | u64::from(c & 0xF))
}

fn shuffle(cell: &[Cell; 16], perm: &[usize; 16]) -> [Cell; 16] {
    let mut out = [0; 16];
    for (o, &p) in out.iter_mut().zip(perm.iter()) {
        *o = cell[p];
    }
    out
}

fn mix_columns(cell: &[Cell; 16]) -> [Cell; 16] {
    let mut out = [0; 16];
    for x in 0..4 {
        for y in 0..4 {
            let mut temp = 0;
            for j in 0..4 {
                let b = M[4 * x + j];
                if b != 0 {
                    let a = cell[4 * j + y];
                    temp ^= ((a << b) & 0x0F) | (a >> (4 - b));
                }
            }
            out[4 * x + y] = temp;
        }
    }
    out
}

fn pseudo_reflect(is: u64, tk: u64) -> u64 {
    let mut cell = mix_columns(&shuffle(&text2cell(is), &T));

    // AddRoundTweakey
    for (i, c) in cell.iter_mut().enumerate() {
        *c ^= ((tk >> (4 * (15 - i))) & 0xF) as Cell;
    }

    cell2text(&shuffle(&cell, &T_INV))
}

fn lfsr(x: Cell) -> Cell {
    let b0 = x & 1;
    let b1 = (x >> 1) & 1;
    let b2 = (x >> 2) & 1;
    let b3 = (x >> 3) & 1;

    ((b0 ^ b1) << 3) | (b3 << 2) | (b2 << 1) | b1
}

fn lfsr_inv(x: Cell) -> Cell {
    let b0 = x & 1;
    let b1 = (x >> 1) & 1;
    let b2 = (x >> 2) & 1;
    let b3 = (x >> 3) & 1;

    (b0 ^ b3) | (b0 << 1) | (b1 << 2) | (b2 << 3)
}

/// Advance the tweak by one round: permute cells by `h`, then clock the
/// LFSR on the fixed cell subset.
fn forward_update_key(t: u64) -> u64 {
    let mut temp = shuffle(&text2cell(t), &H);
    for &i in LFSR_CELLS.iter() {
        temp[i] = lfsr(temp[i]);
    }
    cell2text(&temp)
}

/// Exact inverse of [`forward_update_key`].
fn backward_update_key(t: u64) -> u64 {
    let mut cell = text2cell(t);
    for &i in LFSR_CELLS.iter() {
        cell[i] = lfsr_inv(cell[i]);
    }
    cell2text(&shuffle(&cell, &H_INV))
}
