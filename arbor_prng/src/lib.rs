// Seeded, portable random source for sequence generation.
//
// xoshiro256++ (Blackman & Vigna, 2019) with SplitMix64 seed expansion. The
// generator implements `rand::RngCore` and `rand::SeedableRng`, so all of
// `arbor_music` can take `&mut impl Rng` and still replay a run bit-for-bit
// from a single `u64` seed on any platform. `rand`'s own `StdRng` makes no
// such promise across releases, which is why the core step lives here.
//
// There is no global instance. Whoever starts a generation run constructs an
// `ArborRng` and threads it through by `&mut`; two sessions never share one.
//
// The state is serde-serializable so a paused session can be persisted and
// resumed with an identical continuation stream.

use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

/// xoshiro256++ generator state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArborRng {
    s: [u64; 4],
}

impl ArborRng {
    /// Create a generator from a `u64` seed.
    ///
    /// The seed is expanded with SplitMix64, which never yields the all-zero
    /// state xoshiro cannot leave.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        ArborRng {
            s: std::array::from_fn(|_| splitmix64(&mut sm)),
        }
    }

    fn step(&mut self) -> u64 {
        let [s0, s1, s2, s3] = self.s;
        let result = s0.wrapping_add(s3).rotate_left(23).wrapping_add(s0);

        let t = s1 << 17;
        let s2 = s2 ^ s0;
        let s3 = s3 ^ s1;
        let s1 = s1 ^ s2;
        let s0 = s0 ^ s3;

        self.s = [s0, s1, s2 ^ t, s3.rotate_left(45)];
        result
    }

    /// Advance the stream by `n` outputs without using them. Used to derive
    /// independent sub-streams from one seed in tests and tools.
    pub fn discard(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }
}

impl RngCore for ArborRng {
    fn next_u32(&mut self) -> u32 {
        (self.step() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        self.step()
    }

    fn fill_bytes(&mut self, dst: &mut [u8]) {
        for chunk in dst.chunks_mut(8) {
            let bytes = self.step().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }
}

impl SeedableRng for ArborRng {
    type Seed = [u8; 32];

    fn from_seed(seed: Self::Seed) -> Self {
        let mut s = [0u64; 4];
        for (word, bytes) in s.iter_mut().zip(seed.chunks_exact(8)) {
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            *word = u64::from_le_bytes(buf);
        }
        if s == [0; 4] {
            return ArborRng::new(0);
        }
        ArborRng { s }
    }

    fn seed_from_u64(state: u64) -> Self {
        ArborRng::new(state)
    }
}

/// SplitMix64 step, used only to expand seeds.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
