//! Streaming k-mer builder.
//!
//! [`KmerBuilder`] consumes one base at a time and keeps a forward mer and
//! its reverse-complement twin in lockstep: the forward mer takes each
//! base's code on its right end while the reverse mer takes the
//! complement's code on its left end. Once enough clean bases have
//! accumulated the canonical mer (the lexicographic minimum of the pair)
//! is available after every completing call.
//!
//! The construction discipline is fixed when the builder is made and each
//! discipline carries only its own state. Unknown bases never fail a call;
//! they reset validity tracking and streaming continues.

use crate::alphabet;
use crate::constants::INVALID_CODE;
use crate::mer::{Mer, MerCodec};
use thiserror::Error;
use tracing::debug;

/// Configuration errors, detected once at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// Mer size zero or beyond the codec's word capacity.
    #[error("mer size {requested} out of range 1..={capacity}")]
    MerSizeOutOfRange {
        /// The size asked for.
        requested: u32,
        /// What the configured codec can hold.
        capacity: u32,
    },
    /// A template character other than '1' or '0'.
    #[error("template may contain only '1' and '0', found {0:?}")]
    BadTemplateCharacter(char),
    /// A template without a single count position builds nothing.
    #[error("template {0:?} has no count positions")]
    EmptyTemplate(String),
}

/// Validity tracking with an unsigned offset.
///
/// "Zero valid bases" is represented by `count == zero` (with
/// `zero == mer_size`) rather than literal 0, so spaced invalidation can
/// push the count *below* zero — the rest of the broken template pass has
/// to drain before a fresh mer may start — without signed arithmetic or
/// unsigned underflow: the force-reduction is bounded by the number of
/// count positions in one pass, which is exactly `zero`.
#[derive(Debug, Clone)]
struct ValidLength {
    count: u32,
    zero: u32,
    full: u32,
}

impl ValidLength {
    fn new(mer_size: u32) -> Self {
        Self {
            count: mer_size,
            zero: mer_size,
            full: 2 * mer_size,
        }
    }

    #[inline]
    fn advance(&mut self) {
        if self.count < self.full {
            self.count += 1;
        }
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.count == self.full
    }

    #[inline]
    fn reset(&mut self) {
        self.count = self.zero;
    }

    /// Push the count `deficit` positions below the zero baseline.
    #[inline]
    fn force_below_zero(&mut self, deficit: u32) {
        debug_assert!(deficit <= self.zero);
        self.count = self.zero - deficit;
    }

    /// True valid base count (counter minus offset); zero while below the
    /// baseline.
    #[inline]
    fn valid_bases(&self) -> u32 {
        self.count.saturating_sub(self.zero)
    }
}

/// The lockstep forward/reverse pair plus validity, shared by every
/// discipline.
#[derive(Debug, Clone)]
struct MerPair<M: MerCodec> {
    fwd: M,
    rev: M,
    valid: ValidLength,
}

impl<M: MerCodec> MerPair<M> {
    fn new(mer_size: u32) -> Self {
        Self {
            fwd: M::new(mer_size),
            rev: M::new(mer_size),
            valid: ValidLength::new(mer_size),
        }
    }

    #[inline]
    fn push(&mut self, cf: u64, cr: u64) {
        self.fwd.append_right(cf);
        self.rev.append_left(cr);
    }

    /// Append and advance validity; the return value is the discipline
    /// contract: false exactly when this append completed the mer.
    #[inline]
    fn push_and_count(&mut self, cf: u64, cr: u64) -> bool {
        self.push(cf, cr);
        self.valid.advance();
        !self.valid.is_full()
    }
}

/// Homopolymer-run tracking for the compressed disciplines.
#[derive(Debug, Clone)]
struct RunState {
    /// Code of the base the current run repeats; `None` marks the very
    /// first base of the sequence (and after invalidation), where an empty
    /// mer would otherwise read as a run of A.
    last: Option<u64>,
    /// Input bases consumed by the current run so far.
    run_length: u32,
    /// Whether the current run's representative landed on a count
    /// position. Always true without a template.
    counted: bool,
    /// Input bases consumed per mer position, cyclic over `mer_size`
    /// slots; `index` is the slot of the most recent position.
    spans: Box<[u32]>,
    index: usize,
}

impl RunState {
    fn new(mer_size: u32) -> Self {
        Self {
            last: None,
            run_length: 0,
            counted: false,
            spans: vec![0; mer_size as usize].into_boxed_slice(),
            // First append advances to slot 0.
            index: mer_size as usize - 1,
        }
    }

    #[inline]
    fn is_repeat(&self, cf: u64) -> bool {
        self.last == Some(cf)
    }

    #[inline]
    fn extend(&mut self) {
        self.run_length += 1;
        if self.counted {
            self.spans[self.index] += 1;
        }
    }

    /// Start a new run; record its (so far single-base) span when it
    /// occupies a mer position.
    #[inline]
    fn begin(&mut self, cf: u64, counted: bool) {
        self.last = Some(cf);
        self.run_length = 1;
        self.counted = counted;
        if counted {
            self.index = (self.index + 1) % self.spans.len();
            self.spans[self.index] = 1;
        }
    }

    fn reset(&mut self) {
        self.last = None;
        self.run_length = 0;
        self.counted = false;
    }
}

/// Cyclic spaced-seed template for the spaced disciplines.
#[derive(Debug, Clone)]
struct TemplateState {
    /// `true` = count position, `false` = skip.
    pattern: Box<[bool]>,
    pos: usize,
}

impl TemplateState {
    fn parse(template: &str) -> Result<(Self, u32), BuilderError> {
        let mut pattern = Vec::with_capacity(template.len());
        for ch in template.chars() {
            match ch {
                '1' => pattern.push(true),
                '0' => pattern.push(false),
                other => return Err(BuilderError::BadTemplateCharacter(other)),
            }
        }
        let mer_size = pattern.iter().filter(|&&c| c).count() as u32;
        if mer_size == 0 {
            return Err(BuilderError::EmptyTemplate(template.to_string()));
        }
        Ok((
            Self {
                pattern: pattern.into_boxed_slice(),
                pos: 0,
            },
            mer_size,
        ))
    }

    /// Whether the current position counts, advancing past it.
    #[inline]
    fn step(&mut self) -> bool {
        let counted = self.pattern[self.pos];
        self.pos = (self.pos + 1) % self.pattern.len();
        counted
    }

    /// Count positions remaining in the current pass, after the current
    /// position. Bounds the invalidation deficit: at most the mer size.
    fn counts_left_in_pass(&self) -> u32 {
        self.pattern[self.pos + 1..].iter().filter(|&&c| c).count() as u32
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    fn len(&self) -> u32 {
        self.pattern.len() as u32
    }
}

/// Per-discipline state; selected once at construction, so an invalid
/// discipline is unrepresentable.
#[derive(Debug, Clone)]
enum Discipline {
    Contiguous,
    Compressed(RunState),
    Spaced(TemplateState),
    CompressedSpaced(RunState, TemplateState),
}

/// Stateful consumer of one base at a time, producing forward,
/// reverse-complement, and canonical k-mers.
#[derive(Debug, Clone)]
pub struct KmerBuilder<M: MerCodec = Mer> {
    mers: MerPair<M>,
    discipline: Discipline,
    mer_size: u32,
}

impl<M: MerCodec> KmerBuilder<M> {
    fn check_mer_size(mer_size: u32) -> Result<u32, BuilderError> {
        if mer_size == 0 || mer_size > M::MAX_MER_SIZE {
            return Err(BuilderError::MerSizeOutOfRange {
                requested: mer_size,
                capacity: M::MAX_MER_SIZE,
            });
        }
        Ok(mer_size)
    }

    fn with_discipline(mer_size: u32, discipline: Discipline) -> Self {
        Self {
            mers: MerPair::new(mer_size),
            discipline,
            mer_size,
        }
    }

    /// Plain sliding-window builder of `mer_size`-base mers.
    pub fn contiguous(mer_size: u32) -> Result<Self, BuilderError> {
        let mer_size = Self::check_mer_size(mer_size)?;
        debug!(mer_size, "contiguous mer builder");
        Ok(Self::with_discipline(mer_size, Discipline::Contiguous))
    }

    /// Homopolymer-compressing builder: each run of identical bases
    /// contributes one mer position.
    pub fn compressed(mer_size: u32) -> Result<Self, BuilderError> {
        let mer_size = Self::check_mer_size(mer_size)?;
        debug!(mer_size, "compressed mer builder");
        Ok(Self::with_discipline(
            mer_size,
            Discipline::Compressed(RunState::new(mer_size)),
        ))
    }

    /// Spaced-seed builder; the mer size is the number of `1` positions in
    /// `template` and the pattern cycles across successive windows.
    pub fn spaced(template: &str) -> Result<Self, BuilderError> {
        let (state, mer_size) = TemplateState::parse(template)?;
        let mer_size = Self::check_mer_size(mer_size)?;
        debug!(mer_size, template, "spaced mer builder");
        Ok(Self::with_discipline(mer_size, Discipline::Spaced(state)))
    }

    /// Homopolymer compression feeding a spaced-seed template.
    pub fn compressed_spaced(template: &str) -> Result<Self, BuilderError> {
        let (state, mer_size) = TemplateState::parse(template)?;
        let mer_size = Self::check_mer_size(mer_size)?;
        debug!(mer_size, template, "compressed+spaced mer builder");
        Ok(Self::with_discipline(
            mer_size,
            Discipline::CompressedSpaced(RunState::new(mer_size), state),
        ))
    }

    /// Feed one base. Returns true while another base is needed to finish
    /// the current mer; a false return means this call completed a mer and
    /// the accessors expose it. Unknown characters are absorbed (the mer
    /// goes invalid and rebuilds), never an error.
    pub fn add_base(&mut self, ch: u8) -> bool {
        let cf = alphabet::letter_to_bits(ch);
        let cr = alphabet::letter_to_bits(alphabet::complement_symbol(ch));
        let invalid = cf == INVALID_CODE;
        match &mut self.discipline {
            Discipline::Contiguous => Self::add_contiguous(&mut self.mers, cf, cr, invalid),
            Discipline::Compressed(run) => {
                Self::add_compressed(&mut self.mers, run, cf, cr, invalid)
            }
            Discipline::Spaced(tmpl) => Self::add_spaced(&mut self.mers, tmpl, cf, cr, invalid),
            Discipline::CompressedSpaced(run, tmpl) => {
                Self::add_compressed_spaced(&mut self.mers, run, tmpl, cf, cr, invalid)
            }
        }
    }

    fn add_contiguous(mers: &mut MerPair<M>, cf: u64, cr: u64, invalid: bool) -> bool {
        if invalid {
            mers.valid.reset();
            return true;
        }
        mers.push_and_count(cf, cr)
    }

    fn add_compressed(
        mers: &mut MerPair<M>,
        run: &mut RunState,
        cf: u64,
        cr: u64,
        invalid: bool,
    ) -> bool {
        if invalid {
            mers.valid.reset();
            run.reset();
            return true;
        }
        if run.is_repeat(cf) {
            run.extend();
            return true;
        }
        run.begin(cf, true);
        mers.push_and_count(cf, cr)
    }

    fn add_spaced(
        mers: &mut MerPair<M>,
        tmpl: &mut TemplateState,
        cf: u64,
        cr: u64,
        invalid: bool,
    ) -> bool {
        if invalid {
            mers.valid.force_below_zero(tmpl.counts_left_in_pass());
            tmpl.step();
            return true;
        }
        if !tmpl.step() {
            return true;
        }
        mers.push_and_count(cf, cr)
    }

    fn add_compressed_spaced(
        mers: &mut MerPair<M>,
        run: &mut RunState,
        tmpl: &mut TemplateState,
        cf: u64,
        cr: u64,
        invalid: bool,
    ) -> bool {
        if invalid {
            mers.valid.force_below_zero(tmpl.counts_left_in_pass());
            tmpl.step();
            run.reset();
            return true;
        }
        if run.is_repeat(cf) {
            run.extend();
            return true;
        }
        // A run boundary emits one logical symbol into the template
        // machine; whether it lands on a count or a skip position is an
        // independent event.
        let counted = tmpl.step();
        run.begin(cf, counted);
        if !counted {
            return true;
        }
        mers.push_and_count(cf, cr)
    }

    /// Mask both mers: the forward one clears high, the reverse one clears
    /// low, matching how each accumulates bits.
    pub fn mask(&mut self) {
        self.mers.fwd.mask(true);
        self.mers.rev.mask(false);
    }

    /// The forward-strand mer.
    pub fn forward_mer(&self) -> &M {
        &self.mers.fwd
    }

    /// The reverse-complement mer.
    pub fn reverse_mer(&self) -> &M {
        &self.mers.rev
    }

    /// The canonical mer: the lexicographic minimum of forward and
    /// reverse. Ties (palindromes) resolve to the forward mer.
    pub fn canonical_mer(&self) -> &M {
        if self.mers.fwd <= self.mers.rev {
            &self.mers.fwd
        } else {
            &self.mers.rev
        }
    }

    /// Configured number of bases per mer.
    pub fn mer_size(&self) -> u32 {
        self.mer_size
    }

    /// Template pattern length in positions; for the unspaced disciplines
    /// a window simply spans `mer_size` positions.
    pub fn template_span(&self) -> u32 {
        match &self.discipline {
            Discipline::Spaced(t) | Discipline::CompressedSpaced(_, t) => t.len(),
            _ => self.mer_size,
        }
    }

    /// How many input bases mer position `position` consumed, `position`
    /// 0 being the oldest base of the current mer. Positions consume
    /// exactly one base outside the compressed disciplines.
    pub fn base_span(&self, position: u32) -> u32 {
        assert!(position < self.mer_size, "position {position} out of range");
        match &self.discipline {
            Discipline::Compressed(run) | Discipline::CompressedSpaced(run, _) => {
                run.spans[(run.index + 1 + position as usize) % self.mer_size as usize]
            }
            _ => 1,
        }
    }

    /// Number of bases currently valid toward a complete mer.
    pub fn valid_bases(&self) -> u32 {
        self.mers.valid.valid_bases()
    }

    /// Whether the last completed mer is still current (validity is full).
    pub fn is_complete(&self) -> bool {
        self.mers.valid.is_full()
    }

    /// Reset run tracking, template position, and validity to
    /// post-construction values; with `clear_mer` the mer storage is
    /// zeroed too.
    pub fn clear(&mut self, clear_mer: bool) {
        self.mers.valid.reset();
        match &mut self.discipline {
            Discipline::Contiguous => {}
            Discipline::Compressed(run) => run.reset(),
            Discipline::Spaced(tmpl) => tmpl.reset(),
            Discipline::CompressedSpaced(run, tmpl) => {
                run.reset();
                tmpl.reset();
            }
        }
        if clear_mer {
            self.mers.fwd.clear();
            self.mers.rev.clear();
        }
    }
}
