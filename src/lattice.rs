//! Approximate, window-granular knowledge about where matches of a term
//! can or cannot be found in the message-number space.
//!
//! The number space is cut into `bits` windows of `span` numbers each. Bit
//! `0` is the newest window and also swallows every number above the
//! covered range, so that fresh messages never fall off the lattice.
//!
//! A [`Lattice`] holds two bitsets:
//! * `main` – the window may contain a match,
//! * `reverse` – the window is known to contain no match at all.
//!
//! The two are not complements of each other: a window with both bits
//! cleared simply has not been examined. Only `reverse` bits are used to
//! skip windows during a search.

use roaring::RoaringBitmap;

use crate::msg::Msg;

// ------------- LatticeConfig -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatticeConfig {
    bits: u32,
    span: u64,
    gap: u64,
}

impl LatticeConfig {
    pub const DEFAULT_BITS: u32 = 65536;
    pub const DEFAULT_SPAN: u64 = 128;

    /// The spacing used by `fill` defaults to half a window.
    pub fn new(bits: u32, span: u64) -> Self {
        let bits = bits.max(1);
        let span = span.max(1);
        Self {
            bits,
            span,
            gap: span / 2,
        }
    }
    pub fn with_gap(mut self, gap: u64) -> Self {
        self.gap = gap;
        self
    }
    pub fn bits(&self) -> u32 {
        self.bits
    }
    pub fn span(&self) -> u64 {
        self.span
    }
    pub fn gap(&self) -> u64 {
        self.gap
    }
    /// Window of the given message number.
    pub fn bit(&self, msg: Msg) -> u32 {
        let top = u64::from(self.bits - 1);
        let window = (msg / self.span).min(top);
        // window <= bits - 1, so the cast is lossless
        self.bits - 1 - window as u32
    }
    /// Lowest message number inside the window.
    pub fn floor(&self, bit: u32) -> Msg {
        u64::from(self.bits - 1 - bit.min(self.bits - 1)).saturating_mul(self.span)
    }
    /// Highest message number inside the window.
    pub fn ceiling(&self, bit: u32) -> Msg {
        let bit = bit.min(self.bits - 1);
        if bit == 0 {
            Msg::MAX
        } else {
            self.floor(bit - 1) - 1
        }
    }
}

impl Default for LatticeConfig {
    fn default() -> Self {
        Self::new(Self::DEFAULT_BITS, Self::DEFAULT_SPAN)
    }
}

// ------------- Lattice -------------
#[derive(Debug, Clone, PartialEq)]
pub struct Lattice {
    config: LatticeConfig,
    main: RoaringBitmap,
    reverse: RoaringBitmap,
}

impl Lattice {
    pub fn config(&self) -> &LatticeConfig {
        &self.config
    }
    pub fn main(&self) -> &RoaringBitmap {
        &self.main
    }
    pub fn reverse(&self) -> &RoaringBitmap {
        &self.reverse
    }
    pub fn may_contain(&self, bit: u32) -> bool {
        self.main.contains(bit)
    }
    /// True when the window is guaranteed to hold no match.
    pub fn is_void(&self, bit: u32) -> bool {
        self.reverse.contains(bit)
    }
}

// ------------- LatticeBuilder -------------
/// Mutable staging area for a [`Lattice`]. Single owner, not shared
/// between threads; every operation consumes and returns the builder so
/// calls can be chained before `build()`.
#[derive(Debug, Clone)]
pub struct LatticeBuilder {
    config: LatticeConfig,
    main: RoaringBitmap,
    reverse: RoaringBitmap,
}

impl LatticeBuilder {
    pub fn new(config: LatticeConfig) -> Self {
        Self {
            config,
            main: RoaringBitmap::new(),
            reverse: RoaringBitmap::new(),
        }
    }

    pub fn build(self) -> Lattice {
        Lattice {
            config: self.config,
            main: self.main,
            reverse: self.reverse,
        }
    }

    /// Fill the lattice from numbers sorted in descending order.
    pub fn fill(mut self, numbers: &[Msg]) -> Self {
        debug_assert!(numbers.windows(2).all(|w| w[0] > w[1]));
        let mut previous = Msg::MAX;
        for &number in numbers {
            if previous.saturating_sub(number) < self.config.gap {
                continue;
            }
            previous = number;
            self.main.insert(self.config.bit(number));
        }
        self.reverse.clear();
        let mut tail = numbers.iter().peekable();
        for bit in 0..self.config.bits {
            let floor = self.config.floor(bit);
            let mut seen = false;
            while tail.next_if(|&&number| number >= floor).is_some() {
                seen = true;
            }
            if !seen {
                self.reverse.insert(bit);
            }
        }
        self
    }

    pub fn always(mut self) -> Self {
        self.main.insert_range(0..self.config.bits);
        self.reverse.clear();
        self
    }

    pub fn never(mut self) -> Self {
        self.main.clear();
        self.reverse.insert_range(0..self.config.bits);
        self
    }

    /// A window is void under AND if it is void in any operand.
    pub fn and<'a, I>(mut self, lattices: I) -> Self
    where
        I: IntoIterator<Item = &'a Lattice>,
    {
        for lattice in lattices {
            debug_assert_eq!(lattice.config, self.config);
            self.main &= &lattice.main;
            self.reverse |= &lattice.reverse;
        }
        self
    }

    /// A window is void under OR only if it is void in every operand.
    pub fn or<'a, I>(mut self, lattices: I) -> Self
    where
        I: IntoIterator<Item = &'a Lattice>,
    {
        for lattice in lattices {
            debug_assert_eq!(lattice.config, self.config);
            self.main |= &lattice.main;
            self.reverse &= &lattice.reverse;
        }
        self
    }

    pub fn revert(mut self) -> Self {
        std::mem::swap(&mut self.main, &mut self.reverse);
        self
    }

    /// Forget every absence guarantee, keeping `main` as it is.
    pub fn relax(mut self) -> Self {
        self.reverse.clear();
        self
    }

    /// Everything in the builder is replaced by the copy.
    pub fn copy(mut self, lattice: &Lattice) -> Self {
        self.config = lattice.config;
        self.main = lattice.main.clone();
        self.reverse = lattice.reverse.clone();
        self
    }

    /// Update the window of one message; `numbers` are all the members of
    /// the set, sorted in descending order.
    pub fn set(mut self, msg: Msg, present: bool, numbers: &[Msg]) -> Self {
        let bit = self.config.bit(msg);
        if present {
            self.main.insert(bit);
        } else if self.void(numbers, bit) {
            self.reverse.insert(bit);
        }
        self
    }

    fn void(&self, numbers: &[Msg], bit: u32) -> bool {
        let ceiling = self.config.ceiling(bit);
        let start = numbers.partition_point(|&number| number > ceiling);
        match numbers.get(start) {
            Some(&number) => number < self.config.floor(bit),
            None => true,
        }
    }
}
